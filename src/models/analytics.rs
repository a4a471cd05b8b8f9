//! Delivery and handling analytics models.
//!
//! This module defines:
//! - `AnalyticsQuery`: raw query-string filters shared by the analytics endpoints
//! - `Period` / `Granularity`: the resolved date range and its time bucket size
//! - Row types for the aggregate queries and the response bodies built from them

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw filter parameters as they arrive on the query string.
///
/// Dates are kept as strings so a malformed value becomes a JSON 400 with a
/// readable message instead of a bare extractor rejection.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub bu: Option<String>,
    pub divisione: Option<String>,
    pub deposito: Option<String>,
    pub vettore: Option<String>,
}

/// Business dimension filters, already trimmed; `None` means "all".
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DimensionFilters {
    pub bu: Option<String>,
    pub divisione: Option<String>,
    pub deposito: Option<String>,
    pub vettore: Option<String>,
}

/// Inclusive date range of an analytics request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Period {
    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// The period of equal length that ends the day before this one starts.
    ///
    /// `None` when it would fall outside chrono's date range.
    pub fn previous(&self) -> Option<Period> {
        let to = self.from.checked_sub_signed(chrono::Duration::days(1))?;
        let from = to.checked_sub_signed(chrono::Duration::days(self.days() - 1))?;
        Some(Period { from, to })
    }
}

/// Size of the time buckets in a trend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

/// Fully validated filters for a delivery/handling query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilters {
    pub period: Period,
    pub dimensions: DimensionFilters,
}

/// Headline numbers for a delivery period.
#[derive(Debug, Clone, Default, sqlx::FromRow, Serialize)]
pub struct DeliveryTotals {
    pub consegne: i64,
    pub colli: i64,
    pub peso_kg: f64,
    pub importo: f64,
    pub pod_ricevuti: i64,
}

/// Percentage change against the previous period; `None` when the previous
/// value was zero.
#[derive(Debug, Clone, Serialize)]
pub struct Variation {
    pub consegne: Option<f64>,
    pub colli: Option<f64>,
    pub importo: Option<f64>,
}

/// One point of a delivery trend series.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeliveryBucketRow {
    pub bucket: String,
    pub consegne: i64,
    pub colli: i64,
    pub importo: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryTrendPoint {
    pub key: String,
    pub label: String,
    pub consegne: i64,
    pub colli: i64,
    pub importo: f64,
}

/// Aggregates for one value of a business dimension.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Breakdown {
    pub name: String,
    pub consegne: i64,
    pub colli: i64,
    pub importo: f64,
}

/// Response body of `GET /api/analytics/delivery`.
#[derive(Debug, Serialize)]
pub struct DeliveryAnalytics {
    pub period: Period,
    pub granularity: Granularity,
    pub totals: DeliveryTotals,
    pub importo_medio: f64,
    pub previous_period: Period,
    pub previous_totals: DeliveryTotals,
    pub variation: Variation,
    pub trend: Vec<DeliveryTrendPoint>,
    pub by_bu: Vec<Breakdown>,
    pub by_divisione: Vec<Breakdown>,
    pub by_deposito: Vec<Breakdown>,
    pub top_vettori: Vec<Breakdown>,
    pub by_tipologia: Vec<Breakdown>,
    pub top_province: Vec<Breakdown>,
}

#[derive(Debug, Clone, Default, sqlx::FromRow, Serialize)]
pub struct HandlingTotals {
    pub movimenti: i64,
    pub colli: i64,
    pub pallet: i64,
    pub importo: f64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct HandlingBreakdown {
    pub name: String,
    pub movimenti: i64,
    pub pallet: i64,
    pub importo: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HandlingBucketRow {
    pub bucket: String,
    pub movimenti: i64,
    pub pallet: i64,
    pub importo: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlingTrendPoint {
    pub key: String,
    pub label: String,
    pub movimenti: i64,
    pub pallet: i64,
    pub importo: f64,
}

/// Response body of `GET /api/analytics/handling`.
#[derive(Debug, Serialize)]
pub struct HandlingAnalytics {
    pub period: Period,
    pub granularity: Granularity,
    pub totals: HandlingTotals,
    pub by_tipo_movimento: Vec<HandlingBreakdown>,
    pub by_deposito: Vec<HandlingBreakdown>,
    pub trend: Vec<HandlingTrendPoint>,
}

/// Distinct values for the filter dropdowns.
#[derive(Debug, Serialize)]
pub struct FilterOptions {
    pub bu: Vec<String>,
    pub divisione: Vec<String>,
    pub deposito: Vec<String>,
    pub vettore: Vec<String>,
}

/// One delivery line as written to the Excel export.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeliveryExportRow {
    pub data_consegna: NaiveDate,
    pub bu: Option<String>,
    pub divisione: Option<String>,
    pub deposito: Option<String>,
    pub vettore: Option<String>,
    pub cliente: Option<String>,
    pub localita: Option<String>,
    pub provincia: Option<String>,
    pub num_documento: Option<String>,
    pub tipologia: Option<String>,
    pub colli: i32,
    pub peso_kg: f64,
    pub importo: f64,
    pub pod_ricevuto: bool,
}

/// Body of `PATCH /api/deliveries/{id}/pod`.
#[derive(Debug, Deserialize)]
pub struct PodUpdateRequest {
    pub ricevuto: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_days_are_inclusive() {
        let period = Period {
            from: date(2024, 3, 1),
            to: date(2024, 3, 31),
        };
        assert_eq!(period.days(), 31);

        let single = Period {
            from: date(2024, 3, 5),
            to: date(2024, 3, 5),
        };
        assert_eq!(single.days(), 1);
    }

    #[test]
    fn previous_period_has_equal_length_and_ends_the_day_before() {
        let period = Period {
            from: date(2024, 3, 1),
            to: date(2024, 3, 10),
        };
        let previous = period.previous().unwrap();
        assert_eq!(previous.to, date(2024, 2, 29));
        assert_eq!(previous.from, date(2024, 2, 20));
        assert_eq!(previous.days(), period.days());
    }

    #[test]
    fn no_previous_period_before_the_first_representable_date() {
        let period = Period {
            from: NaiveDate::MIN,
            to: NaiveDate::MIN,
        };
        assert_eq!(period.previous(), None);
    }
}
