//! Backup monitoring service.
//!
//! Reads and maintains the tables the backup agents write to: alerts,
//! settings, schedules and run history, plus the dashboard built on top.
//! Schedule queries go through [`with_retry`].

use chrono::{NaiveDateTime, TimeDelta, Utc};
use sqlx::{MySql, QueryBuilder};

use crate::{
    db::{DbPool, with_retry},
    error::AppError,
    models::{
        backup::{
            ALERT_STATUSES, AlertCounts, AlertStatus, AlertsQuery, BACKUP_TYPES, BackupAlert,
            BackupDashboard, BackupRun, BackupSchedule, ConfigEntry, CreateAlertRequest,
            CreateScheduleRequest, CronValidation, HistoryQuery, LastSuccess, RUN_STATUSES,
            RunCounts, SEVERITIES, UpdateAlertRequest, UpdateConfigRequest, UpdateScheduleRequest,
            compute_health, ensure_allowed, validate_config_value, validate_required,
            validate_retention,
        },
        clamp_limit,
    },
    services::cron::{CronExpr, estimate_next_run},
};

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

const ALERT_COLUMNS: &str = "SELECT id, alert_type, severity, message, database_name, status, \
     created_at, acknowledged_at, acknowledged_by, resolved_at FROM backup_alerts";

const SCHEDULE_COLUMNS: &str = "SELECT id, name, cron_expression, backup_type, database_name, \
     retention_days, enabled, last_run, next_run, created_at, updated_at FROM backup_schedules";

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

pub async fn list_alerts(pool: &DbPool, query: AlertsQuery) -> Result<Vec<BackupAlert>, AppError> {
    let mut qb = QueryBuilder::<MySql>::new(ALERT_COLUMNS);
    qb.push(" WHERE 1 = 1");

    if let Some(status) = query.status {
        ensure_allowed("status", &status, &ALERT_STATUSES)?;
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(severity) = query.severity {
        ensure_allowed("severity", &severity, &SEVERITIES)?;
        qb.push(" AND severity = ").push_bind(severity);
    }

    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(clamp_limit(query.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT));

    Ok(qb.build_query_as::<BackupAlert>().fetch_all(pool).await?)
}

async fn fetch_alert(pool: &DbPool, alert_id: i64) -> Result<BackupAlert, AppError> {
    sqlx::query_as::<_, BackupAlert>(&format!("{ALERT_COLUMNS} WHERE id = ?"))
        .bind(alert_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Alert"))
}

pub async fn create_alert(pool: &DbPool, request: CreateAlertRequest) -> Result<BackupAlert, AppError> {
    request.validate()?;

    let result = sqlx::query(
        "INSERT INTO backup_alerts (alert_type, severity, message, database_name, status, created_at) \
         VALUES (?, ?, ?, ?, 'active', ?)",
    )
    .bind(request.alert_type.trim())
    .bind(&request.severity)
    .bind(request.message.trim())
    .bind(&request.database_name)
    .bind(now())
    .execute(pool)
    .await?;

    let alert = fetch_alert(pool, result.last_insert_id() as i64).await?;
    tracing::info!(alert_id = alert.id, severity = %alert.severity, "backup alert raised");
    Ok(alert)
}

/// Acknowledge or resolve an alert.
///
/// The row is locked while the transition is checked, so two operators
/// clicking at once cannot both win.
pub async fn update_alert(
    pool: &DbPool,
    alert_id: i64,
    request: UpdateAlertRequest,
) -> Result<BackupAlert, AppError> {
    let mut tx = pool.begin().await?;

    let current: String = sqlx::query_scalar("SELECT status FROM backup_alerts WHERE id = ? FOR UPDATE")
        .bind(alert_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Alert"))?;

    let from = AlertStatus::parse(&current)
        .ok_or_else(|| AppError::Conflict(format!("Alert has unknown status '{current}'")))?;
    let to = from.apply(request.action)?;
    let at = now();

    match to {
        AlertStatus::Acknowledged => {
            sqlx::query(
                "UPDATE backup_alerts SET status = ?, acknowledged_at = ?, acknowledged_by = ? \
                 WHERE id = ?",
            )
            .bind(to.as_str())
            .bind(at)
            .bind(&request.user)
            .bind(alert_id)
            .execute(&mut *tx)
            .await?;
        }
        _ => {
            sqlx::query("UPDATE backup_alerts SET status = ?, resolved_at = ? WHERE id = ?")
                .bind(to.as_str())
                .bind(at)
                .bind(alert_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;

    tracing::info!(alert_id, from = from.as_str(), to = to.as_str(), "backup alert updated");
    fetch_alert(pool, alert_id).await
}

pub async fn delete_alert(pool: &DbPool, alert_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM backup_alerts WHERE id = ?")
        .bind(alert_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Alert"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub async fn list_config(pool: &DbPool) -> Result<Vec<ConfigEntry>, AppError> {
    Ok(sqlx::query_as::<_, ConfigEntry>(
        "SELECT config_key, config_value, updated_at FROM backup_config ORDER BY config_key",
    )
    .fetch_all(pool)
    .await?)
}

/// Validate every setting, then write them all or none.
pub async fn update_config(
    pool: &DbPool,
    request: UpdateConfigRequest,
) -> Result<Vec<ConfigEntry>, AppError> {
    if request.settings.is_empty() {
        return Err(AppError::invalid("settings must not be empty"));
    }

    let validated = request
        .settings
        .iter()
        .map(|(key, value)| validate_config_value(key, value).map(|text| (key.as_str(), text)))
        .collect::<Result<Vec<_>, _>>()?;

    let at = now();
    let mut tx = pool.begin().await?;
    for (key, value) in &validated {
        sqlx::query(
            "INSERT INTO backup_config (config_key, config_value, updated_at) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE config_value = VALUES(config_value), updated_at = VALUES(updated_at)",
        )
        .bind(*key)
        .bind(value)
        .bind(at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(keys = validated.len(), "backup settings updated");
    list_config(pool).await
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

fn parse_cron(expression: &str) -> Result<CronExpr, AppError> {
    CronExpr::parse(expression)
        .map_err(|e| AppError::invalid(format!("Invalid cron expression: {e}")))
}

fn next_run_for(expr: &CronExpr, enabled: bool, now: NaiveDateTime) -> Option<NaiveDateTime> {
    enabled.then(|| estimate_next_run(expr, now))
}

/// `next_run` after an update: kept as stored unless the expression or the
/// enabled flag changed.
fn next_run_after_update(
    current: &BackupSchedule,
    cron_expression: &str,
    enabled: bool,
    expr: &CronExpr,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    if cron_expression == current.cron_expression && enabled == current.enabled {
        current.next_run
    } else {
        next_run_for(expr, enabled, now)
    }
}

/// Answer for `GET /api/backup/schedules/validate`.
pub fn validate_expression(expression: &str, now: NaiveDateTime) -> CronValidation {
    match CronExpr::parse(expression) {
        Ok(expr) => CronValidation {
            valid: true,
            error: None,
            next_run: Some(estimate_next_run(&expr, now)),
        },
        Err(e) => CronValidation {
            valid: false,
            error: Some(e.to_string()),
            next_run: None,
        },
    }
}

pub async fn list_schedules(pool: &DbPool) -> Result<Vec<BackupSchedule>, AppError> {
    let sql = format!("{SCHEDULE_COLUMNS} ORDER BY name");
    Ok(with_retry("list backup schedules", || {
        sqlx::query_as::<_, BackupSchedule>(&sql).fetch_all(pool)
    })
    .await?)
}

async fn fetch_schedule(pool: &DbPool, schedule_id: i64) -> Result<BackupSchedule, AppError> {
    let sql = format!("{SCHEDULE_COLUMNS} WHERE id = ?");
    with_retry("fetch backup schedule", || {
        sqlx::query_as::<_, BackupSchedule>(&sql)
            .bind(schedule_id)
            .fetch_optional(pool)
    })
    .await?
    .ok_or(AppError::NotFound("Schedule"))
}

pub async fn create_schedule(
    pool: &DbPool,
    request: CreateScheduleRequest,
) -> Result<BackupSchedule, AppError> {
    let name = request.name.trim();
    validate_required("name", name)?;
    validate_required("database_name", &request.database_name)?;
    ensure_allowed("backup_type", &request.backup_type, &BACKUP_TYPES)?;
    validate_retention(request.retention_days)?;
    let expr = parse_cron(&request.cron_expression)?;

    let at = now();
    let next_run = next_run_for(&expr, request.enabled, at);
    let cron_expression = request.cron_expression.trim();

    let result = with_retry("create backup schedule", || {
        sqlx::query(
            "INSERT INTO backup_schedules \
             (name, cron_expression, backup_type, database_name, retention_days, enabled, next_run, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(cron_expression)
        .bind(&request.backup_type)
        .bind(request.database_name.trim())
        .bind(request.retention_days)
        .bind(request.enabled)
        .bind(next_run)
        .bind(at)
        .bind(at)
        .execute(pool)
    })
    .await
    .map_err(|e| AppError::conflict_on_duplicate(e, format!("Schedule '{name}' already exists")))?;

    let schedule = fetch_schedule(pool, result.last_insert_id() as i64).await?;
    tracing::info!(schedule_id = schedule.id, name = %schedule.name, "backup schedule created");
    Ok(schedule)
}

/// Apply a partial update. `next_run` is recomputed only when the expression or
/// the enabled flag changes, and cleared when the schedule ends up disabled.
pub async fn update_schedule(
    pool: &DbPool,
    schedule_id: i64,
    request: UpdateScheduleRequest,
) -> Result<BackupSchedule, AppError> {
    let current = fetch_schedule(pool, schedule_id).await?;

    let name = request
        .name
        .map(|n| n.trim().to_string())
        .unwrap_or_else(|| current.name.clone());
    let cron_expression = request
        .cron_expression
        .map(|c| c.trim().to_string())
        .unwrap_or_else(|| current.cron_expression.clone());
    let backup_type = request
        .backup_type
        .unwrap_or_else(|| current.backup_type.clone());
    let database_name = request
        .database_name
        .map(|d| d.trim().to_string())
        .unwrap_or_else(|| current.database_name.clone());
    let retention_days = request.retention_days.unwrap_or(current.retention_days);
    let enabled = request.enabled.unwrap_or(current.enabled);

    validate_required("name", &name)?;
    validate_required("database_name", &database_name)?;
    ensure_allowed("backup_type", &backup_type, &BACKUP_TYPES)?;
    validate_retention(retention_days)?;
    let expr = parse_cron(&cron_expression)?;

    let at = now();
    let next_run = next_run_after_update(&current, &cron_expression, enabled, &expr, at);

    with_retry("update backup schedule", || {
        sqlx::query(
            "UPDATE backup_schedules SET name = ?, cron_expression = ?, backup_type = ?, \
             database_name = ?, retention_days = ?, enabled = ?, next_run = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&name)
        .bind(&cron_expression)
        .bind(&backup_type)
        .bind(&database_name)
        .bind(retention_days)
        .bind(enabled)
        .bind(next_run)
        .bind(at)
        .bind(schedule_id)
        .execute(pool)
    })
    .await
    .map_err(|e| AppError::conflict_on_duplicate(e, format!("Schedule '{name}' already exists")))?;

    tracing::info!(schedule_id, enabled, "backup schedule updated");
    fetch_schedule(pool, schedule_id).await
}

pub async fn delete_schedule(pool: &DbPool, schedule_id: i64) -> Result<(), AppError> {
    let result = with_retry("delete backup schedule", || {
        sqlx::query("DELETE FROM backup_schedules WHERE id = ?")
            .bind(schedule_id)
            .execute(pool)
    })
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Schedule"));
    }
    tracing::info!(schedule_id, "backup schedule deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// History and dashboard
// ---------------------------------------------------------------------------

pub async fn list_history(pool: &DbPool, query: HistoryQuery) -> Result<Vec<BackupRun>, AppError> {
    let mut qb = QueryBuilder::<MySql>::new(
        "SELECT id, database_name, backup_type, status, size_bytes, file_path, error_message, \
         started_at, finished_at FROM backup_history WHERE 1 = 1",
    );

    if let Some(status) = query.status {
        ensure_allowed("status", &status, &RUN_STATUSES)?;
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(database) = query.database.filter(|d| !d.trim().is_empty()) {
        qb.push(" AND database_name = ").push_bind(database);
    }

    qb.push(" ORDER BY started_at DESC, id DESC LIMIT ")
        .push_bind(clamp_limit(query.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT));

    Ok(qb.build_query_as::<BackupRun>().fetch_all(pool).await?)
}

#[derive(sqlx::FromRow)]
struct OutcomeCounts {
    success: i64,
    failed: i64,
}

#[derive(sqlx::FromRow)]
struct ScheduleStats {
    enabled: i64,
    next_run: Option<NaiveDateTime>,
}

/// Success share of finished runs, as a percentage with one decimal.
pub fn success_rate(success: i64, failed: i64) -> Option<f64> {
    let finished = success + failed;
    if finished == 0 {
        return None;
    }
    Some((success as f64 / finished as f64 * 1000.0).round() / 10.0)
}

pub async fn dashboard(pool: &DbPool) -> Result<BackupDashboard, AppError> {
    let now = now();
    let day_ago = now - TimeDelta::hours(24);
    let month_ago = now - TimeDelta::days(30);

    let last_24h = sqlx::query_as::<_, RunCounts>(
        "SELECT CAST(COALESCE(SUM(status = 'success'), 0) AS SIGNED) AS success, \
         CAST(COALESCE(SUM(status = 'failed'), 0) AS SIGNED) AS failed, \
         CAST(COALESCE(SUM(status = 'running'), 0) AS SIGNED) AS running \
         FROM backup_history WHERE started_at >= ?",
    )
    .bind(day_ago)
    .fetch_one(pool)
    .await?;

    let month = sqlx::query_as::<_, OutcomeCounts>(
        "SELECT CAST(COALESCE(SUM(status = 'success'), 0) AS SIGNED) AS success, \
         CAST(COALESCE(SUM(status = 'failed'), 0) AS SIGNED) AS failed \
         FROM backup_history WHERE started_at >= ?",
    )
    .bind(month_ago)
    .fetch_one(pool)
    .await?;

    let total_size_bytes_30d: i64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(SUM(size_bytes), 0) AS SIGNED) FROM backup_history \
         WHERE status = 'success' AND started_at >= ?",
    )
    .bind(month_ago)
    .fetch_one(pool)
    .await?;

    let last_success = sqlx::query_as::<_, LastSuccess>(
        "SELECT database_name, finished_at, size_bytes FROM backup_history \
         WHERE status = 'success' AND finished_at IS NOT NULL \
         ORDER BY finished_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    let active_alerts = sqlx::query_as::<_, AlertCounts>(
        "SELECT CAST(COALESCE(SUM(severity = 'info'), 0) AS SIGNED) AS info, \
         CAST(COALESCE(SUM(severity = 'warning'), 0) AS SIGNED) AS warning, \
         CAST(COALESCE(SUM(severity = 'error'), 0) AS SIGNED) AS error, \
         CAST(COALESCE(SUM(severity = 'critical'), 0) AS SIGNED) AS critical \
         FROM backup_alerts WHERE status = 'active'",
    )
    .fetch_one(pool)
    .await?;

    let schedules = with_retry("backup schedule stats", || {
        sqlx::query_as::<_, ScheduleStats>(
            "SELECT COUNT(*) AS enabled, MIN(next_run) AS next_run \
             FROM backup_schedules WHERE enabled = 1",
        )
        .fetch_one(pool)
    })
    .await?;

    let health = compute_health(
        now,
        last_success.as_ref().map(|s| s.finished_at),
        &active_alerts,
        &last_24h,
    );

    Ok(BackupDashboard {
        health,
        last_24h,
        success_rate_30d: success_rate(month.success, month.failed),
        last_success,
        total_size_bytes_30d,
        active_alerts,
        enabled_schedules: schedules.enabled,
        next_scheduled_run: schedules.next_run,
        generated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn valid_expressions_report_their_next_run() {
        let answer = validate_expression("0 2 * * *", at(1, 0));
        assert!(answer.valid);
        assert_eq!(answer.error, None);
        assert_eq!(answer.next_run, Some(at(2, 0)));
    }

    #[test]
    fn invalid_expressions_report_why() {
        let answer = validate_expression("0 25 * * *", at(1, 0));
        assert!(!answer.valid);
        assert!(answer.error.unwrap().contains("hour"));
        assert_eq!(answer.next_run, None);
    }

    #[test]
    fn disabled_schedules_have_no_next_run() {
        let expr = CronExpr::parse("0 2 * * *").unwrap();
        assert_eq!(next_run_for(&expr, false, at(1, 0)), None);
        assert_eq!(next_run_for(&expr, true, at(1, 0)), Some(at(2, 0)));
    }

    fn schedule(cron_expression: &str, enabled: bool, next_run: Option<NaiveDateTime>) -> BackupSchedule {
        BackupSchedule {
            id: 1,
            name: "nightly".into(),
            cron_expression: cron_expression.into(),
            backup_type: "full".into(),
            database_name: "erp".into(),
            retention_days: 30,
            enabled,
            last_run: None,
            next_run,
            created_at: at(0, 0),
            updated_at: at(0, 0),
        }
    }

    #[test]
    fn updates_keep_next_run_unless_timing_changes() {
        let stored = at(3, 0);
        let current = schedule("0 3 * * *", true, Some(stored));

        let same = CronExpr::parse("0 3 * * *").unwrap();
        assert_eq!(
            next_run_after_update(&current, "0 3 * * *", true, &same, at(1, 0)),
            Some(stored)
        );

        let moved = CronExpr::parse("0 2 * * *").unwrap();
        assert_eq!(
            next_run_after_update(&current, "0 2 * * *", true, &moved, at(1, 0)),
            Some(at(2, 0))
        );

        assert_eq!(
            next_run_after_update(&current, "0 3 * * *", false, &same, at(1, 0)),
            None
        );

        let paused = schedule("0 3 * * *", false, None);
        assert_eq!(
            next_run_after_update(&paused, "0 3 * * *", true, &same, at(1, 0)),
            Some(at(3, 0))
        );
    }

    #[test]
    fn cron_errors_are_client_errors() {
        assert!(matches!(
            parse_cron("every day"),
            Err(AppError::InvalidRequest(msg)) if msg.starts_with("Invalid cron expression")
        ));
    }

    #[test]
    fn success_rate_ignores_running_backups() {
        assert_eq!(success_rate(0, 0), None);
        assert_eq!(success_rate(3, 1), Some(75.0));
        assert_eq!(success_rate(2, 1), Some(66.7));
    }
}
