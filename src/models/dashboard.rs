//! Home dashboard models.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Deliveries older than this without a POD are reported as missing.
pub const POD_GRACE_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, sqlx::FromRow, Serialize)]
pub struct MonthDeliveries {
    pub consegne: i64,
    pub importo: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentAlerts {
    pub scaduti: usize,
    pub in_scadenza: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceAlerts {
    pub scadute: usize,
    pub in_scadenza: usize,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LastBackup {
    pub database_name: String,
    pub status: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

/// Response body of `GET /api/dashboard/summary`.
#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub mese_da: NaiveDate,
    pub mese_a: NaiveDate,
    pub consegne_mese: MonthDeliveries,
    pub pod_mancanti: i64,
    pub documenti: DocumentAlerts,
    pub manutenzioni: MaintenanceAlerts,
    pub alert_backup_attivi: i64,
    pub ultimo_backup: Option<LastBackup>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodMissingQuery {
    pub limit: Option<i64>,
}

/// A delivery still waiting for its proof of delivery.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PodMissing {
    pub id: i64,
    pub data_consegna: NaiveDate,
    pub bu: Option<String>,
    pub deposito: Option<String>,
    pub vettore: Option<String>,
    pub cliente: Option<String>,
    pub num_documento: Option<String>,
    pub importo: f64,
    pub giorni: i64,
}
