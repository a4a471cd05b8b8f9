//! Excel import endpoints.
//!
//! - POST /api/import/delivery - upload a delivery workbook
//! - GET /api/import/history - latest imports
//! - DELETE /api/import/{id} - roll back one import

use axum::extract::{Multipart, State};

use super::extract::{Json, Path};
use crate::{
    db::DbPool,
    error::AppError,
    models::import::{ImportDeleted, ImportHistory, ImportSummary},
    routes::AppState,
    services::import_service,
};

/// Import a delivery workbook into `fatt_delivery`.
///
/// # Endpoint
///
/// `POST /api/import/delivery` (multipart/form-data)
///
/// # Form fields
///
/// - `file` - the `.xlsx` / `.xlsm` / `.xls` workbook (required)
/// - `sheet` - sheet name; the first sheet when omitted
///
/// # Response
///
/// - **Success (200 OK)**: the [`ImportSummary`], including up to 100 row errors
/// - **Error (400)**: no file, wrong extension, unreadable workbook, unknown
///   sheet or missing required columns
/// - **Error (409)**: the same file was already imported
pub async fn import_delivery(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportSummary>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut sheet: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("sheet") => {
                let value = field.text().await?;
                let value = value.trim();
                if !value.is_empty() {
                    sheet = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| AppError::invalid("Missing 'file' field"))?;
    tracing::debug!(file = %file_name, size = bytes.len(), sheet = ?sheet, "workbook upload received");

    let summary = import_service::import_delivery_workbook(
        &state.pool,
        &file_name,
        bytes,
        sheet,
        state.config.effective_batch_size(),
    )
    .await?;

    Ok(Json(summary))
}

/// The 50 most recent imports, newest first.
pub async fn history(State(pool): State<DbPool>) -> Result<Json<Vec<ImportHistory>>, AppError> {
    Ok(Json(import_service::list_history(&pool).await?))
}

/// Delete an import together with every delivery row it created.
///
/// # Response
///
/// - **Success (200 OK)**: `{ "deleted_rows": 1234 }`
/// - **Error (404)**: unknown import id
pub async fn delete(
    State(pool): State<DbPool>,
    Path(import_id): Path<i64>,
) -> Result<Json<ImportDeleted>, AppError> {
    Ok(Json(import_service::delete_import(&pool, import_id).await?))
}
