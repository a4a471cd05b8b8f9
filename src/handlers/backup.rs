//! Backup monitoring endpoints.
//!
//! - GET/POST /api/backup/alerts, PATCH/DELETE /api/backup/alerts/{id}
//! - GET/PUT /api/backup/config
//! - GET/POST /api/backup/schedules, PUT/DELETE /api/backup/schedules/{id}
//! - GET /api/backup/schedules/validate
//! - GET /api/backup/history
//! - GET /api/backup/dashboard

use axum::{extract::State, http::StatusCode};
use chrono::Utc;

use super::extract::{Json, Path, Query};
use crate::{
    db::DbPool,
    error::AppError,
    models::backup::{
        AlertsQuery, BackupAlert, BackupDashboard, BackupRun, BackupSchedule, ConfigEntry,
        CreateAlertRequest, CreateScheduleRequest, CronValidation, CronValidationQuery,
        HistoryQuery, UpdateAlertRequest, UpdateConfigRequest, UpdateScheduleRequest,
    },
    services::backup_service,
};

/// List alerts, newest first.
///
/// # Endpoint
///
/// `GET /api/backup/alerts?status=active&severity=critical&limit=100`
///
/// `limit` is clamped to 1..=500. An unknown status or severity is a 400.
pub async fn list_alerts(
    State(pool): State<DbPool>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Vec<BackupAlert>>, AppError> {
    Ok(Json(backup_service::list_alerts(&pool, query).await?))
}

/// Raise a new alert.
///
/// # Request Body
///
/// ```json
/// {
///   "alert_type": "backup_failed",
///   "severity": "critical",
///   "message": "mysqldump exited with status 2",
///   "database_name": "erp"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the stored alert, status `active`
/// - **Error (400)**: empty type/message or unknown severity
pub async fn create_alert(
    State(pool): State<DbPool>,
    Json(request): Json<CreateAlertRequest>,
) -> Result<(StatusCode, Json<BackupAlert>), AppError> {
    let alert = backup_service::create_alert(&pool, request).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// Acknowledge or resolve an alert.
///
/// # Request Body
///
/// `{ "action": "acknowledge", "user": "mrossi" }` or `{ "action": "resolve" }`
///
/// # Response
///
/// - **Success (200 OK)**: the updated alert
/// - **Error (404)**: unknown alert
/// - **Error (409)**: the alert cannot take that action from its current status
pub async fn update_alert(
    State(pool): State<DbPool>,
    Path(alert_id): Path<i64>,
    Json(request): Json<UpdateAlertRequest>,
) -> Result<Json<BackupAlert>, AppError> {
    Ok(Json(backup_service::update_alert(&pool, alert_id, request).await?))
}

pub async fn delete_alert(
    State(pool): State<DbPool>,
    Path(alert_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    backup_service::delete_alert(&pool, alert_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_config(State(pool): State<DbPool>) -> Result<Json<Vec<ConfigEntry>>, AppError> {
    Ok(Json(backup_service::list_config(&pool).await?))
}

/// Update settings in one transaction.
///
/// # Request Body
///
/// ```json
/// { "settings": { "retention_days": 30, "compression_enabled": true } }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: every stored setting
/// - **Error (400)**: an unknown key or invalid value; nothing is written
pub async fn update_config(
    State(pool): State<DbPool>,
    Json(request): Json<UpdateConfigRequest>,
) -> Result<Json<Vec<ConfigEntry>>, AppError> {
    Ok(Json(backup_service::update_config(&pool, request).await?))
}

pub async fn list_schedules(
    State(pool): State<DbPool>,
) -> Result<Json<Vec<BackupSchedule>>, AppError> {
    Ok(Json(backup_service::list_schedules(&pool).await?))
}

/// Create a backup schedule.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "erp nightly",
///   "cron_expression": "0 2 * * *",
///   "backup_type": "full",
///   "database_name": "erp",
///   "retention_days": 30,
///   "enabled": true
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the schedule with its computed `next_run`
/// - **Error (400)**: invalid cron, type or retention
/// - **Error (409)**: a schedule with that name exists
pub async fn create_schedule(
    State(pool): State<DbPool>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<BackupSchedule>), AppError> {
    let schedule = backup_service::create_schedule(&pool, request).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Partially update a schedule; omitted fields keep their value.
pub async fn update_schedule(
    State(pool): State<DbPool>,
    Path(schedule_id): Path<i64>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<BackupSchedule>, AppError> {
    Ok(Json(
        backup_service::update_schedule(&pool, schedule_id, request).await?,
    ))
}

pub async fn delete_schedule(
    State(pool): State<DbPool>,
    Path(schedule_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    backup_service::delete_schedule(&pool, schedule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check a cron expression without saving anything.
///
/// # Endpoint
///
/// `GET /api/backup/schedules/validate?expression=0%202%20*%20*%20*`
///
/// Always 200; the body says whether the expression is valid.
pub async fn validate_cron(Query(query): Query<CronValidationQuery>) -> Json<CronValidation> {
    Json(backup_service::validate_expression(
        &query.expression,
        Utc::now().naive_utc(),
    ))
}

/// Backup runs, newest first, optionally filtered by status and database.
pub async fn history(
    State(pool): State<DbPool>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<BackupRun>>, AppError> {
    Ok(Json(backup_service::list_history(&pool, query).await?))
}

pub async fn dashboard(State(pool): State<DbPool>) -> Result<Json<BackupDashboard>, AppError> {
    Ok(Json(backup_service::dashboard(&pool).await?))
}
