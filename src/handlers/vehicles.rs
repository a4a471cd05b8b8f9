//! Fleet endpoints: vehicles, their documents and maintenance schedules.
//!
//! - GET/POST /api/vehicles, GET /api/vehicles/{id}, PATCH /api/vehicles/{id}/km
//! - GET/POST /api/vehicles/{id}/documents
//! - GET /api/vehicles/documents/{doc_id}/download, DELETE /api/vehicles/documents/{doc_id}
//! - GET /api/vehicles/documents/expiring
//! - GET/POST /api/vehicles/{id}/schedules
//! - POST /api/vehicles/schedules/{sid}/complete, DELETE /api/vehicles/schedules/{sid}
//! - GET /api/vehicles/schedules/due

use axum::{
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::{
    extract::{Json, Path, Query},
    today,
};
use crate::{
    db::DbPool,
    error::AppError,
    models::fleet::{
        CompleteScheduleRequest, CreateScheduleRequest, CreateVehicleRequest, DocumentView,
        DueQuery, DueSchedule, ExpiringDocumentView, ExpiringQuery, NewDocument, ScheduleView,
        UpdateKmRequest, Vehicle, VehicleSchedule, VehiclesQuery, DOCUMENT_WARNING_DAYS,
        SCHEDULE_WARNING_DAYS, SCHEDULE_WARNING_KM,
    },
    routes::AppState,
    services::{analytics_service::parse_date_param, fleet_service, storage::sanitize_file_name},
};

const DEFAULT_MIME: &str = "application/octet-stream";

/// List vehicles, optionally only active (`?attivo=true`) or retired ones.
pub async fn list(
    State(pool): State<DbPool>,
    Query(query): Query<VehiclesQuery>,
) -> Result<Json<Vec<Vehicle>>, AppError> {
    Ok(Json(fleet_service::list_vehicles(&pool, query.attivo).await?))
}

/// Register a vehicle.
///
/// # Request Body
///
/// ```json
/// { "targa": "ab 123 cd", "marca": "Iveco", "modello": "Daily", "km_attuali": 120000 }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the vehicle, with `targa` stored as `AB123CD`
/// - **Error (400)**: plate is not 5-10 letters/digits
/// - **Error (409)**: plate already registered
pub async fn create(
    State(pool): State<DbPool>,
    Json(request): Json<CreateVehicleRequest>,
) -> Result<(StatusCode, Json<Vehicle>), AppError> {
    let vehicle = fleet_service::create_vehicle(&pool, request).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn get(
    State(pool): State<DbPool>,
    Path(vehicle_id): Path<i64>,
) -> Result<Json<Vehicle>, AppError> {
    Ok(Json(fleet_service::get_vehicle(&pool, vehicle_id).await?))
}

/// Record an odometer reading. It may not be lower than the stored one.
pub async fn update_km(
    State(pool): State<DbPool>,
    Path(vehicle_id): Path<i64>,
    Json(request): Json<UpdateKmRequest>,
) -> Result<Json<Vehicle>, AppError> {
    Ok(Json(
        fleet_service::update_km(&pool, vehicle_id, request.km).await?,
    ))
}

/// Documents of one vehicle with their computed `stato`.
pub async fn list_documents(
    State(pool): State<DbPool>,
    Path(vehicle_id): Path<i64>,
) -> Result<Json<Vec<DocumentView>>, AppError> {
    Ok(Json(
        fleet_service::list_documents(&pool, vehicle_id, today()).await?,
    ))
}

/// Read the multipart body of a document upload.
async fn read_document_upload(multipart: &mut Multipart) -> Result<NewDocument, AppError> {
    let mut tipo = None;
    let mut descrizione = None;
    let mut data_scadenza = None;
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("tipo") => tipo = Some(field.text().await?.trim().to_lowercase()),
            Some("descrizione") => descrizione = Some(field.text().await?),
            Some("data_scadenza") => {
                data_scadenza = parse_date_param("data_scadenza", Some(field.text().await?))?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("documento").to_string();
                let mime = field.content_type().unwrap_or(DEFAULT_MIME).to_string();
                let bytes = field.bytes().await?;
                file = Some((file_name, mime, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let tipo = tipo.ok_or_else(|| AppError::invalid("Missing 'tipo' field"))?;
    let (file_name, mime_type, bytes) =
        file.ok_or_else(|| AppError::invalid("Missing 'file' field"))?;

    Ok(NewDocument {
        tipo,
        descrizione,
        data_scadenza,
        file_name,
        mime_type,
        bytes,
    })
}

/// Upload a document for a vehicle.
///
/// # Endpoint
///
/// `POST /api/vehicles/{id}/documents` (multipart/form-data)
///
/// # Form fields
///
/// - `tipo` - assicurazione, revisione, bollo, libretto or altro
/// - `descrizione` - optional
/// - `data_scadenza` - optional, `YYYY-MM-DD`
/// - `file` - the document itself
///
/// # Response
///
/// - **Success (201 Created)**: the stored document with its `stato`
/// - **Error (400)**: missing/invalid field or empty file
/// - **Error (404)**: unknown vehicle; nothing is written to disk
pub async fn upload_document(
    State(state): State<AppState>,
    Path(vehicle_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentView>), AppError> {
    let upload = read_document_upload(&mut multipart).await?;
    let document =
        fleet_service::add_document(&state.pool, &state.storage, vehicle_id, upload, today())
            .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// Send a stored document back with its original mime type.
pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> Result<Response, AppError> {
    let (document, bytes) =
        fleet_service::read_document(&state.pool, &state.storage, document_id).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_file_name(&document.file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, document.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    fleet_service::delete_document(&state.pool, &state.storage, document_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Expired documents and those expiring within `days` (1..=365, default 30),
/// for active vehicles only, soonest first.
pub async fn expiring_documents(
    State(pool): State<DbPool>,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<Vec<ExpiringDocumentView>>, AppError> {
    let days = query.days.unwrap_or(DOCUMENT_WARNING_DAYS);
    if !(1..=365).contains(&days) {
        return Err(AppError::invalid("days must be between 1 and 365"));
    }
    Ok(Json(
        fleet_service::expiring_documents(&pool, days, today()).await?,
    ))
}

/// Maintenance schedules of one vehicle with their computed `stato`.
pub async fn list_schedules(
    State(pool): State<DbPool>,
    Path(vehicle_id): Path<i64>,
) -> Result<Json<Vec<ScheduleView>>, AppError> {
    Ok(Json(
        fleet_service::list_schedules(&pool, vehicle_id, today()).await?,
    ))
}

/// Create a maintenance schedule.
///
/// # Request Body
///
/// ```json
/// { "tipo": "tagliando", "intervallo_km": 30000, "intervallo_mesi": 12,
///   "ultimo_km": 90000, "ultima_data": "2024-01-31" }
/// ```
///
/// `ultimo_km` defaults to the vehicle's odometer and `ultima_data` to today.
///
/// # Response
///
/// - **Success (201 Created)**: the schedule with `prossimo_km` / `prossima_data`
/// - **Error (400)**: unknown tipo, or no positive interval
/// - **Error (404)**: unknown vehicle
pub async fn create_schedule(
    State(pool): State<DbPool>,
    Path(vehicle_id): Path<i64>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<VehicleSchedule>), AppError> {
    let schedule = fleet_service::create_schedule(&pool, vehicle_id, request, today()).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Record a completed service: `{ "km": 120500, "data": "2024-03-05" }`.
pub async fn complete_schedule(
    State(pool): State<DbPool>,
    Path(schedule_id): Path<i64>,
    Json(request): Json<CompleteScheduleRequest>,
) -> Result<Json<VehicleSchedule>, AppError> {
    Ok(Json(
        fleet_service::complete_schedule(&pool, schedule_id, request, today()).await?,
    ))
}

pub async fn delete_schedule(
    State(pool): State<DbPool>,
    Path(schedule_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    fleet_service::delete_schedule(&pool, schedule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Overdue and upcoming maintenance across active vehicles.
///
/// # Endpoint
///
/// `GET /api/vehicles/schedules/due?km_threshold=1000&days=30`
pub async fn due_schedules(
    State(pool): State<DbPool>,
    Query(query): Query<DueQuery>,
) -> Result<Json<Vec<DueSchedule>>, AppError> {
    let km_threshold = query.km_threshold.unwrap_or(SCHEDULE_WARNING_KM);
    let days = query.days.unwrap_or(SCHEDULE_WARNING_DAYS);
    if km_threshold < 0 || days < 0 {
        return Err(AppError::invalid("km_threshold and days must not be negative"));
    }
    Ok(Json(
        fleet_service::due_schedules(&pool, km_threshold, days, today()).await?,
    ))
}
