//! Fleet service: vehicles, document uploads and maintenance schedules.

use chrono::NaiveDate;

use crate::{
    db::DbPool,
    error::AppError,
    models::fleet::{
        CompleteScheduleRequest, CreateScheduleRequest, CreateVehicleRequest, DocumentView,
        DueSchedule, ExpiringDocument, ExpiringDocumentView, FleetScheduleRow, NewDocument,
        ScheduleStatus, ScheduleView, Vehicle, VehicleDocument, VehicleSchedule, next_due,
        normalize_targa, schedule_status, validate_km, SCHEDULE_WARNING_DAYS, SCHEDULE_WARNING_KM,
    },
    services::storage::DocumentStorage,
};

const VEHICLE_COLUMNS: &str =
    "SELECT id, targa, marca, modello, km_attuali, attivo, created_at FROM vehicles";

const DOCUMENT_COLUMNS: &str = "SELECT id, vehicle_id, tipo, descrizione, data_scadenza, \
     file_name, file_path, mime_type, size_bytes, uploaded_at FROM vehicle_documents";

const SCHEDULE_COLUMNS: &str = "SELECT id, vehicle_id, tipo, descrizione, intervallo_km, \
     intervallo_mesi, ultimo_km, ultima_data, prossimo_km, prossima_data, created_at \
     FROM vehicle_schedules";

fn empty_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

pub async fn list_vehicles(pool: &DbPool, attivo: Option<bool>) -> Result<Vec<Vehicle>, AppError> {
    let vehicles = match attivo {
        Some(attivo) => {
            sqlx::query_as::<_, Vehicle>(&format!("{VEHICLE_COLUMNS} WHERE attivo = ? ORDER BY targa"))
                .bind(attivo)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as::<_, Vehicle>(&format!("{VEHICLE_COLUMNS} ORDER BY targa"))
                .fetch_all(pool)
                .await?
        }
    };
    Ok(vehicles)
}

pub async fn get_vehicle(pool: &DbPool, vehicle_id: i64) -> Result<Vehicle, AppError> {
    sqlx::query_as::<_, Vehicle>(&format!("{VEHICLE_COLUMNS} WHERE id = ?"))
        .bind(vehicle_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Vehicle"))
}

pub async fn create_vehicle(pool: &DbPool, request: CreateVehicleRequest) -> Result<Vehicle, AppError> {
    let targa = normalize_targa(&request.targa)?;
    let km = request.km_attuali.unwrap_or(0);
    if km < 0 {
        return Err(AppError::invalid("km_attuali must not be negative"));
    }

    let result = sqlx::query(
        "INSERT INTO vehicles (targa, marca, modello, km_attuali, attivo) VALUES (?, ?, ?, ?, 1)",
    )
    .bind(&targa)
    .bind(empty_to_none(request.marca))
    .bind(empty_to_none(request.modello))
    .bind(km)
    .execute(pool)
    .await
    .map_err(|e| AppError::conflict_on_duplicate(e, format!("Vehicle {targa} already exists")))?;

    tracing::info!(targa = %targa, "vehicle registered");
    get_vehicle(pool, result.last_insert_id() as i64).await
}

/// Record a new odometer reading.
pub async fn update_km(pool: &DbPool, vehicle_id: i64, km: i32) -> Result<Vehicle, AppError> {
    let vehicle = get_vehicle(pool, vehicle_id).await?;
    validate_km(vehicle.km_attuali, km)?;

    // the guard keeps a concurrent higher reading from being overwritten
    sqlx::query("UPDATE vehicles SET km_attuali = ? WHERE id = ? AND km_attuali <= ?")
        .bind(km)
        .bind(vehicle_id)
        .bind(km)
        .execute(pool)
        .await?;

    get_vehicle(pool, vehicle_id).await
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

pub async fn list_documents(
    pool: &DbPool,
    vehicle_id: i64,
    today: NaiveDate,
) -> Result<Vec<DocumentView>, AppError> {
    get_vehicle(pool, vehicle_id).await?;

    let documents = sqlx::query_as::<_, VehicleDocument>(&format!(
        "{DOCUMENT_COLUMNS} WHERE vehicle_id = ? ORDER BY data_scadenza IS NULL, data_scadenza, id"
    ))
    .bind(vehicle_id)
    .fetch_all(pool)
    .await?;

    Ok(documents
        .into_iter()
        .map(|d| DocumentView::new(d, today))
        .collect())
}

async fn get_document(pool: &DbPool, document_id: i64) -> Result<VehicleDocument, AppError> {
    sqlx::query_as::<_, VehicleDocument>(&format!("{DOCUMENT_COLUMNS} WHERE id = ?"))
        .bind(document_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Document"))
}

/// Store the uploaded file, then record it. The file is removed again if
/// the row cannot be written.
pub async fn add_document(
    pool: &DbPool,
    storage: &DocumentStorage,
    vehicle_id: i64,
    upload: NewDocument,
    today: NaiveDate,
) -> Result<DocumentView, AppError> {
    upload.validate()?;
    get_vehicle(pool, vehicle_id).await?;

    let stored = storage
        .store(vehicle_id, &upload.file_name, &upload.bytes)
        .await?;

    let inserted = sqlx::query(
        "INSERT INTO vehicle_documents \
         (vehicle_id, tipo, descrizione, data_scadenza, file_name, file_path, mime_type, size_bytes) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(vehicle_id)
    .bind(&upload.tipo)
    .bind(empty_to_none(upload.descrizione))
    .bind(upload.data_scadenza)
    .bind(&upload.file_name)
    .bind(&stored.relative_path)
    .bind(&upload.mime_type)
    .bind(stored.size_bytes)
    .execute(pool)
    .await;

    let result = match inserted {
        Ok(result) => result,
        Err(e) => {
            if let Err(cleanup) = storage.remove(&stored.relative_path).await {
                tracing::warn!(error = %cleanup, path = %stored.relative_path, "orphaned upload left on disk");
            }
            return Err(e.into());
        }
    };

    tracing::info!(vehicle_id, tipo = %upload.tipo, size = stored.size_bytes, "vehicle document uploaded");
    let document = get_document(pool, result.last_insert_id() as i64).await?;
    Ok(DocumentView::new(document, today))
}

/// The document row and its file contents.
pub async fn read_document(
    pool: &DbPool,
    storage: &DocumentStorage,
    document_id: i64,
) -> Result<(VehicleDocument, Vec<u8>), AppError> {
    let document = get_document(pool, document_id).await?;
    let bytes = storage.read(&document.file_path).await?;
    Ok((document, bytes))
}

/// Delete the row first, then the file; a file that is already gone is ignored.
pub async fn delete_document(
    pool: &DbPool,
    storage: &DocumentStorage,
    document_id: i64,
) -> Result<(), AppError> {
    let document = get_document(pool, document_id).await?;

    let result = sqlx::query("DELETE FROM vehicle_documents WHERE id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Document"));
    }

    storage.remove(&document.file_path).await?;
    tracing::info!(document_id, vehicle_id = document.vehicle_id, "vehicle document deleted");
    Ok(())
}

/// Documents of active vehicles expiring on or before `today + days`, soonest first.
pub async fn expiring_documents(
    pool: &DbPool,
    days: i64,
    today: NaiveDate,
) -> Result<Vec<ExpiringDocumentView>, AppError> {
    let until = today + chrono::Duration::days(days);

    let rows = sqlx::query_as::<_, ExpiringDocument>(
        "SELECT d.id, d.vehicle_id, v.targa, d.tipo, d.descrizione, d.data_scadenza \
         FROM vehicle_documents d JOIN vehicles v ON v.id = d.vehicle_id \
         WHERE v.attivo = 1 AND d.data_scadenza IS NOT NULL AND d.data_scadenza <= ? \
         ORDER BY d.data_scadenza, d.id",
    )
    .bind(until)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|d| ExpiringDocumentView::new(d, today))
        .collect())
}

// ---------------------------------------------------------------------------
// Maintenance schedules
// ---------------------------------------------------------------------------

pub async fn list_schedules(
    pool: &DbPool,
    vehicle_id: i64,
    today: NaiveDate,
) -> Result<Vec<ScheduleView>, AppError> {
    let vehicle = get_vehicle(pool, vehicle_id).await?;

    let schedules = sqlx::query_as::<_, VehicleSchedule>(&format!(
        "{SCHEDULE_COLUMNS} WHERE vehicle_id = ? ORDER BY id"
    ))
    .bind(vehicle_id)
    .fetch_all(pool)
    .await?;

    Ok(schedules
        .into_iter()
        .map(|schedule| {
            let stato = schedule_status(
                vehicle.km_attuali,
                schedule.prossimo_km,
                schedule.prossima_data,
                today,
                SCHEDULE_WARNING_KM,
                SCHEDULE_WARNING_DAYS,
            );
            ScheduleView { schedule, stato }
        })
        .collect())
}

async fn get_schedule(pool: &DbPool, schedule_id: i64) -> Result<VehicleSchedule, AppError> {
    sqlx::query_as::<_, VehicleSchedule>(&format!("{SCHEDULE_COLUMNS} WHERE id = ?"))
        .bind(schedule_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Schedule"))
}

/// Create a schedule. The last service defaults to the vehicle's current
/// odometer and today when not given.
pub async fn create_schedule(
    pool: &DbPool,
    vehicle_id: i64,
    request: CreateScheduleRequest,
    today: NaiveDate,
) -> Result<VehicleSchedule, AppError> {
    request.validate()?;
    let vehicle = get_vehicle(pool, vehicle_id).await?;

    let ultimo_km = request.ultimo_km.unwrap_or(vehicle.km_attuali);
    let ultima_data = request.ultima_data.unwrap_or(today);
    let (prossimo_km, prossima_data) = next_due(
        request.intervallo_km,
        request.intervallo_mesi,
        Some(ultimo_km),
        Some(ultima_data),
    );

    let result = sqlx::query(
        "INSERT INTO vehicle_schedules \
         (vehicle_id, tipo, descrizione, intervallo_km, intervallo_mesi, ultimo_km, ultima_data, prossimo_km, prossima_data) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(vehicle_id)
    .bind(&request.tipo)
    .bind(empty_to_none(request.descrizione))
    .bind(request.intervallo_km)
    .bind(request.intervallo_mesi)
    .bind(ultimo_km)
    .bind(ultima_data)
    .bind(prossimo_km)
    .bind(prossima_data)
    .execute(pool)
    .await?;

    tracing::info!(vehicle_id, tipo = %request.tipo, "maintenance schedule created");
    get_schedule(pool, result.last_insert_id() as i64).await
}

/// Record a completed service and roll the schedule forward.
pub async fn complete_schedule(
    pool: &DbPool,
    schedule_id: i64,
    request: CompleteScheduleRequest,
    today: NaiveDate,
) -> Result<VehicleSchedule, AppError> {
    if request.km < 0 {
        return Err(AppError::invalid("km must not be negative"));
    }
    let data = request.data.unwrap_or(today);

    let mut tx = pool.begin().await?;

    let schedule = sqlx::query_as::<_, VehicleSchedule>(&format!(
        "{SCHEDULE_COLUMNS} WHERE id = ? FOR UPDATE"
    ))
    .bind(schedule_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Schedule"))?;

    let (prossimo_km, prossima_data) = next_due(
        schedule.intervallo_km,
        schedule.intervallo_mesi,
        Some(request.km),
        Some(data),
    );

    sqlx::query(
        "UPDATE vehicle_schedules SET ultimo_km = ?, ultima_data = ?, prossimo_km = ?, prossima_data = ? \
         WHERE id = ?",
    )
    .bind(request.km)
    .bind(data)
    .bind(prossimo_km)
    .bind(prossima_data)
    .bind(schedule_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE vehicles SET km_attuali = ? WHERE id = ? AND km_attuali < ?")
        .bind(request.km)
        .bind(schedule.vehicle_id)
        .bind(request.km)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(schedule_id, km = request.km, "maintenance completed");
    get_schedule(pool, schedule_id).await
}

pub async fn delete_schedule(pool: &DbPool, schedule_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM vehicle_schedules WHERE id = ?")
        .bind(schedule_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Schedule"));
    }
    Ok(())
}

/// Overdue and upcoming maintenance across active vehicles, overdue first.
pub async fn due_schedules(
    pool: &DbPool,
    km_threshold: i32,
    days: i64,
    today: NaiveDate,
) -> Result<Vec<DueSchedule>, AppError> {
    let rows = sqlx::query_as::<_, FleetScheduleRow>(
        "SELECT s.id, s.vehicle_id, s.tipo, s.descrizione, s.intervallo_km, s.intervallo_mesi, \
         s.ultimo_km, s.ultima_data, s.prossimo_km, s.prossima_data, s.created_at, \
         v.targa, v.km_attuali \
         FROM vehicle_schedules s JOIN vehicles v ON v.id = s.vehicle_id \
         WHERE v.attivo = 1 AND (s.prossimo_km IS NOT NULL OR s.prossima_data IS NOT NULL)",
    )
    .fetch_all(pool)
    .await?;

    let mut due: Vec<DueSchedule> = rows
        .into_iter()
        .filter_map(|row| {
            let stato = schedule_status(
                row.km_attuali,
                row.schedule.prossimo_km,
                row.schedule.prossima_data,
                today,
                km_threshold,
                days,
            );
            (stato != ScheduleStatus::Ok).then_some(DueSchedule { row, stato })
        })
        .collect();

    due.sort_by(|a, b| {
        a.stato
            .cmp(&b.stato)
            .then(a.row.schedule.prossima_data.cmp(&b.row.schedule.prossima_data))
            .then(a.row.schedule.id.cmp(&b.row.schedule.id))
    });
    Ok(due)
}
