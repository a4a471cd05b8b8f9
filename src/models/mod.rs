//! Data models representing database rows, request bodies and responses.

/// Delivery and handling analytics
pub mod analytics;
/// Backup monitoring: alerts, settings, schedules, history
pub mod backup;
/// Home dashboard
pub mod dashboard;
/// Vehicles, documents and maintenance schedules
pub mod fleet;
/// Excel import pipeline
pub mod import;

/// Clamp a `?limit=` parameter to `1..=max`, using `default` when absent.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, 100, 500), 100);
        assert_eq!(clamp_limit(Some(0), 100, 500), 1);
        assert_eq!(clamp_limit(Some(-5), 100, 500), 1);
        assert_eq!(clamp_limit(Some(10_000), 100, 500), 500);
        assert_eq!(clamp_limit(Some(42), 100, 500), 42);
    }
}
