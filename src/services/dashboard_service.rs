//! Home dashboard: one call that pulls a headline number from every module.

use chrono::{Datelike, Duration, NaiveDate};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        clamp_limit,
        dashboard::{
            DashboardSummary, DocumentAlerts, LastBackup, MaintenanceAlerts, MonthDeliveries,
            POD_GRACE_DAYS, PodMissing,
        },
        fleet::{DOCUMENT_WARNING_DAYS, DocumentStatus, SCHEDULE_WARNING_DAYS, SCHEDULE_WARNING_KM, ScheduleStatus},
    },
    services::fleet_service,
};

const DEFAULT_POD_LIMIT: i64 = 50;
const MAX_POD_LIMIT: i64 = 500;

/// First day of the month containing `today`.
pub fn month_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

/// Deliveries dated before this day and still without a POD count as missing.
pub fn pod_cutoff(today: NaiveDate) -> NaiveDate {
    today - Duration::days(POD_GRACE_DAYS)
}

pub async fn summary(pool: &DbPool, today: NaiveDate) -> Result<DashboardSummary, AppError> {
    let from = month_start(today);

    let consegne_mese = sqlx::query_as::<_, MonthDeliveries>(
        "SELECT COUNT(*) AS consegne, CAST(COALESCE(SUM(importo), 0) AS DOUBLE) AS importo \
         FROM fatt_delivery WHERE data_consegna BETWEEN ? AND ?",
    )
    .bind(from)
    .bind(today)
    .fetch_one(pool)
    .await?;

    let pod_mancanti: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM fatt_delivery WHERE pod_ricevuto = 0 AND data_consegna < ?",
    )
    .bind(pod_cutoff(today))
    .fetch_one(pool)
    .await?;

    let documents = fleet_service::expiring_documents(pool, DOCUMENT_WARNING_DAYS, today).await?;
    let documenti = DocumentAlerts {
        scaduti: documents
            .iter()
            .filter(|d| d.stato == DocumentStatus::Scaduto)
            .count(),
        in_scadenza: documents
            .iter()
            .filter(|d| d.stato == DocumentStatus::InScadenza)
            .count(),
    };

    let schedules =
        fleet_service::due_schedules(pool, SCHEDULE_WARNING_KM, SCHEDULE_WARNING_DAYS, today).await?;
    let manutenzioni = MaintenanceAlerts {
        scadute: schedules
            .iter()
            .filter(|s| s.stato == ScheduleStatus::Scaduto)
            .count(),
        in_scadenza: schedules
            .iter()
            .filter(|s| s.stato == ScheduleStatus::InScadenza)
            .count(),
    };

    let alert_backup_attivi: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM backup_alerts WHERE status = 'active'")
            .fetch_one(pool)
            .await?;

    let ultimo_backup = sqlx::query_as::<_, LastBackup>(
        "SELECT database_name, status, started_at, finished_at FROM backup_history \
         ORDER BY started_at DESC, id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(DashboardSummary {
        mese_da: from,
        mese_a: today,
        consegne_mese,
        pod_mancanti,
        documenti,
        manutenzioni,
        alert_backup_attivi,
        ultimo_backup,
    })
}

/// Deliveries without a POD past the grace period, oldest first.
pub async fn pod_missing(
    pool: &DbPool,
    limit: Option<i64>,
    today: NaiveDate,
) -> Result<Vec<PodMissing>, AppError> {
    Ok(sqlx::query_as::<_, PodMissing>(
        "SELECT id, data_consegna, bu, deposito, vettore, cliente, num_documento, \
         CAST(importo AS DOUBLE) AS importo, CAST(DATEDIFF(?, data_consegna) AS SIGNED) AS giorni \
         FROM fatt_delivery WHERE pod_ricevuto = 0 AND data_consegna < ? \
         ORDER BY data_consegna, id LIMIT ?",
    )
    .bind(today)
    .bind(pod_cutoff(today))
    .bind(clamp_limit(limit, DEFAULT_POD_LIMIT, MAX_POD_LIMIT))
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_starts_on_the_first() {
        assert_eq!(month_start(date(2024, 2, 29)), date(2024, 2, 1));
        assert_eq!(month_start(date(2024, 3, 1)), date(2024, 3, 1));
    }

    #[test]
    fn pod_grace_period_is_a_week() {
        assert_eq!(pod_cutoff(date(2024, 3, 5)), date(2024, 2, 27));
    }
}
