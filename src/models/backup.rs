//! Backup monitoring models.
//!
//! This module defines:
//! - Alerts (`backup_alerts`) with their severity/status allow-lists and the
//!   acknowledge/resolve state machine
//! - Key/value settings (`backup_config`) and their validation rules
//! - Schedules (`backup_schedules`) and run history (`backup_history`)
//! - The dashboard summary and its health rules

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AppError;

pub const SEVERITIES: [&str; 4] = ["info", "warning", "error", "critical"];
pub const ALERT_STATUSES: [&str; 3] = ["active", "acknowledged", "resolved"];
pub const BACKUP_TYPES: [&str; 3] = ["full", "incremental", "differential"];
pub const RUN_STATUSES: [&str; 3] = ["running", "success", "failed"];

/// Check `value` against an allow-list, naming `field` in the error.
pub fn ensure_allowed(field: &str, value: &str, allowed: &[&str]) -> Result<(), AppError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(AppError::invalid(format!(
            "{field} must be one of: {}",
            allowed.join(", ")
        )))
    }
}

/// Lifecycle of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(AlertStatus::Active),
            "acknowledged" => Some(AlertStatus::Acknowledged),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// Apply `action`, or explain why the alert cannot take it.
    pub fn apply(self, action: AlertAction) -> Result<AlertStatus, AppError> {
        match (self, action) {
            (AlertStatus::Active, AlertAction::Acknowledge) => Ok(AlertStatus::Acknowledged),
            (AlertStatus::Active | AlertStatus::Acknowledged, AlertAction::Resolve) => {
                Ok(AlertStatus::Resolved)
            }
            (from, action) => Err(AppError::Conflict(format!(
                "Cannot {} an alert that is {}",
                action.as_str(),
                from.as_str()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Acknowledge,
    Resolve,
}

impl AlertAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertAction::Acknowledge => "acknowledge",
            AlertAction::Resolve => "resolve",
        }
    }
}

/// Row of the `backup_alerts` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BackupAlert {
    pub id: i64,
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    pub database_name: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub acknowledged_at: Option<NaiveDateTime>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<NaiveDateTime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    pub database_name: Option<String>,
}

impl CreateAlertRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.alert_type.trim().is_empty() {
            return Err(AppError::invalid("alert_type is required"));
        }
        if self.message.trim().is_empty() {
            return Err(AppError::invalid("message is required"));
        }
        ensure_allowed("severity", &self.severity, &SEVERITIES)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateAlertRequest {
    pub action: AlertAction,
    pub user: Option<String>,
}

/// Row of the `backup_config` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ConfigEntry {
    pub config_key: String,
    pub config_value: String,
    pub updated_at: NaiveDateTime,
}

/// Body of `PUT /api/backup/config`. Values may be sent as JSON strings,
/// numbers or booleans; they are stored as text.
#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub settings: BTreeMap<String, serde_json::Value>,
}

/// Keys that may be written through the API.
pub const CONFIG_KEYS: [&str; 7] = [
    "retention_days",
    "backup_directory",
    "compression_enabled",
    "alert_on_failure",
    "notification_email",
    "max_backup_size_gb",
    "check_interval_minutes",
];

fn config_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn int_in_range(raw: &str, min: i64, max: i64) -> bool {
    raw.parse::<i64>().is_ok_and(|n| (min..=max).contains(&n))
}

fn looks_like_email(raw: &str) -> bool {
    match raw.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !raw.contains(char::is_whitespace)
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
        }
        None => false,
    }
}

/// Validate one setting and return the text to store.
pub fn validate_config_value(key: &str, value: &serde_json::Value) -> Result<String, AppError> {
    if !CONFIG_KEYS.contains(&key) {
        return Err(AppError::invalid(format!("Unknown setting '{key}'")));
    }

    let invalid = || AppError::invalid(format!("Invalid value for '{key}'"));
    let text = config_text(value).ok_or_else(invalid)?;

    let ok = match key {
        "retention_days" => int_in_range(&text, 1, 3650),
        "check_interval_minutes" => int_in_range(&text, 1, 1440),
        "backup_directory" => !text.is_empty() && text.chars().count() <= 255,
        "compression_enabled" | "alert_on_failure" => text == "true" || text == "false",
        "notification_email" => looks_like_email(&text),
        "max_backup_size_gb" => text
            .parse::<f64>()
            .is_ok_and(|n| n.is_finite() && n > 0.0),
        _ => false,
    };

    if ok { Ok(text) } else { Err(invalid()) }
}

/// Row of the `backup_schedules` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BackupSchedule {
    pub id: i64,
    pub name: String,
    pub cron_expression: String,
    pub backup_type: String,
    pub database_name: String,
    pub retention_days: i32,
    pub enabled: bool,
    pub last_run: Option<NaiveDateTime>,
    pub next_run: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn default_retention() -> i32 {
    30
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub cron_expression: String,
    pub backup_type: String,
    pub database_name: String,
    #[serde(default = "default_retention")]
    pub retention_days: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateScheduleRequest {
    pub name: Option<String>,
    pub cron_expression: Option<String>,
    pub backup_type: Option<String>,
    pub database_name: Option<String>,
    pub retention_days: Option<i32>,
    pub enabled: Option<bool>,
}

pub fn validate_retention(days: i32) -> Result<(), AppError> {
    if (1..=3650).contains(&days) {
        Ok(())
    } else {
        Err(AppError::invalid("retention_days must be between 1 and 3650"))
    }
}

pub fn validate_required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        Err(AppError::invalid(format!("{field} is required")))
    } else {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct CronValidationQuery {
    pub expression: String,
}

#[derive(Debug, Serialize)]
pub struct CronValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<NaiveDateTime>,
}

/// Row of the `backup_history` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BackupRun {
    pub id: i64,
    pub database_name: String,
    pub backup_type: String,
    pub status: String,
    pub size_bytes: Option<i64>,
    pub file_path: Option<String>,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub database: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, sqlx::FromRow, Serialize)]
pub struct RunCounts {
    pub success: i64,
    pub failed: i64,
    pub running: i64,
}

#[derive(Debug, Clone, Default, sqlx::FromRow, Serialize)]
pub struct AlertCounts {
    pub info: i64,
    pub warning: i64,
    pub error: i64,
    pub critical: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LastSuccess {
    pub database_name: String,
    pub finished_at: NaiveDateTime,
    pub size_bytes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupHealth {
    Healthy,
    Warning,
    Critical,
}

/// Backups older than this make the dashboard warn.
pub const STALE_WARNING_HOURS: i64 = 26;
/// Backups older than this make the dashboard critical.
pub const STALE_CRITICAL_HOURS: i64 = 72;

/// Overall state shown on the backup dashboard.
pub fn compute_health(
    now: NaiveDateTime,
    last_success: Option<NaiveDateTime>,
    alerts: &AlertCounts,
    last_24h: &RunCounts,
) -> BackupHealth {
    let age = last_success.map(|at| now - at);

    let critical = alerts.critical > 0
        || age.is_none_or(|age| age > TimeDelta::hours(STALE_CRITICAL_HOURS));
    if critical {
        return BackupHealth::Critical;
    }

    let warning = age.is_some_and(|age| age > TimeDelta::hours(STALE_WARNING_HOURS))
        || alerts.error > 0
        || alerts.warning > 0
        || last_24h.failed > 0;
    if warning {
        BackupHealth::Warning
    } else {
        BackupHealth::Healthy
    }
}

/// Response body of `GET /api/backup/dashboard`.
#[derive(Debug, Serialize)]
pub struct BackupDashboard {
    pub health: BackupHealth,
    pub last_24h: RunCounts,
    pub success_rate_30d: Option<f64>,
    pub last_success: Option<LastSuccess>,
    pub total_size_bytes_30d: i64,
    pub active_alerts: AlertCounts,
    pub enabled_schedules: i64,
    pub next_scheduled_run: Option<NaiveDateTime>,
    pub generated_at: NaiveDateTime,
}
