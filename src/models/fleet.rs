//! Fleet models: vehicles, their documents and maintenance schedules.
//!
//! Document and schedule states are never stored; they are derived from the
//! expiry/due values and today's date each time a row is read.

use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DOCUMENT_TYPES: [&str; 5] = ["assicurazione", "revisione", "bollo", "libretto", "altro"];
pub const SCHEDULE_TYPES: [&str; 4] = ["tagliando", "gomme", "freni", "altro"];

/// Documents expiring within this many days are flagged.
pub const DOCUMENT_WARNING_DAYS: i64 = 30;
/// Default thresholds for "due soon" maintenance.
pub const SCHEDULE_WARNING_KM: i32 = 1000;
pub const SCHEDULE_WARNING_DAYS: i64 = 30;

/// Row of the `vehicles` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Vehicle {
    pub id: i64,
    pub targa: String,
    pub marca: Option<String>,
    pub modello: Option<String>,
    pub km_attuali: i32,
    pub attivo: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Default, Deserialize)]
pub struct VehiclesQuery {
    pub attivo: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    pub targa: String,
    pub marca: Option<String>,
    pub modello: Option<String>,
    pub km_attuali: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKmRequest {
    pub km: i32,
}

/// Uppercase the plate and drop whitespace; 5 to 10 letters or digits.
pub fn normalize_targa(raw: &str) -> Result<String, AppError> {
    let targa: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    let len = targa.chars().count();
    if !(5..=10).contains(&len) || !targa.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::invalid(
            "targa must be 5-10 letters or digits",
        ));
    }
    Ok(targa)
}

/// A new odometer reading must not go backwards.
pub fn validate_km(current: i32, km: i32) -> Result<(), AppError> {
    if km < 0 {
        return Err(AppError::invalid("km must not be negative"));
    }
    if km < current {
        return Err(AppError::invalid(format!(
            "km must not be lower than the current reading ({current})"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Scaduto,
    InScadenza,
    Valido,
    NessunaScadenza,
}

pub fn document_status(scadenza: Option<NaiveDate>, today: NaiveDate) -> DocumentStatus {
    match scadenza {
        None => DocumentStatus::NessunaScadenza,
        Some(date) if date < today => DocumentStatus::Scaduto,
        Some(date) if (date - today).num_days() <= DOCUMENT_WARNING_DAYS => {
            DocumentStatus::InScadenza
        }
        Some(_) => DocumentStatus::Valido,
    }
}

/// Row of the `vehicle_documents` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct VehicleDocument {
    pub id: i64,
    pub vehicle_id: i64,
    pub tipo: String,
    pub descrizione: Option<String>,
    pub data_scadenza: Option<NaiveDate>,
    pub file_name: String,
    /// Relative to the upload root; never sent to clients.
    #[serde(skip_serializing)]
    pub file_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: VehicleDocument,
    pub stato: DocumentStatus,
}

impl DocumentView {
    pub fn new(document: VehicleDocument, today: NaiveDate) -> Self {
        let stato = document_status(document.data_scadenza, today);
        Self { document, stato }
    }
}

/// Fields of a document upload once the multipart body has been read.
#[derive(Debug)]
pub struct NewDocument {
    pub tipo: String,
    pub descrizione: Option<String>,
    pub data_scadenza: Option<NaiveDate>,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl NewDocument {
    pub fn validate(&self) -> Result<(), AppError> {
        if !DOCUMENT_TYPES.contains(&self.tipo.as_str()) {
            return Err(AppError::invalid(format!(
                "tipo must be one of: {}",
                DOCUMENT_TYPES.join(", ")
            )));
        }
        if self.bytes.is_empty() {
            return Err(AppError::invalid("file is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

/// A document of an active vehicle that is expired or about to expire.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ExpiringDocument {
    pub id: i64,
    pub vehicle_id: i64,
    pub targa: String,
    pub tipo: String,
    pub descrizione: Option<String>,
    pub data_scadenza: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct ExpiringDocumentView {
    #[serde(flatten)]
    pub document: ExpiringDocument,
    /// Negative once expired.
    pub giorni_rimanenti: i64,
    pub stato: DocumentStatus,
}

impl ExpiringDocumentView {
    pub fn new(document: ExpiringDocument, today: NaiveDate) -> Self {
        Self {
            giorni_rimanenti: (document.data_scadenza - today).num_days(),
            stato: document_status(Some(document.data_scadenza), today),
            document,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scaduto,
    InScadenza,
    Ok,
}

/// Maintenance state against either due value; the worse one wins.
pub fn schedule_status(
    km_attuali: i32,
    prossimo_km: Option<i32>,
    prossima_data: Option<NaiveDate>,
    today: NaiveDate,
    km_threshold: i32,
    days_threshold: i64,
) -> ScheduleStatus {
    let overdue = prossimo_km.is_some_and(|km| km_attuali >= km)
        || prossima_data.is_some_and(|date| today > date);
    if overdue {
        return ScheduleStatus::Scaduto;
    }

    let due = prossimo_km.is_some_and(|km| km - km_attuali <= km_threshold)
        || prossima_data.is_some_and(|date| (date - today).num_days() <= days_threshold);
    if due {
        ScheduleStatus::InScadenza
    } else {
        ScheduleStatus::Ok
    }
}

/// Next due odometer reading and date after a service at `ultimo_km` / `ultima_data`.
///
/// Month arithmetic clamps to the end of shorter months (31 Jan + 1 = 29 Feb).
pub fn next_due(
    intervallo_km: Option<i32>,
    intervallo_mesi: Option<i32>,
    ultimo_km: Option<i32>,
    ultima_data: Option<NaiveDate>,
) -> (Option<i32>, Option<NaiveDate>) {
    let km = match (ultimo_km, intervallo_km) {
        (Some(last), Some(every)) => last.checked_add(every),
        _ => None,
    };
    let date = match (ultima_data, intervallo_mesi) {
        (Some(last), Some(months)) => u32::try_from(months)
            .ok()
            .and_then(|m| last.checked_add_months(Months::new(m))),
        _ => None,
    };
    (km, date)
}

/// Row of the `vehicle_schedules` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct VehicleSchedule {
    pub id: i64,
    pub vehicle_id: i64,
    pub tipo: String,
    pub descrizione: Option<String>,
    pub intervallo_km: Option<i32>,
    pub intervallo_mesi: Option<i32>,
    pub ultimo_km: Option<i32>,
    pub ultima_data: Option<NaiveDate>,
    pub prossimo_km: Option<i32>,
    pub prossima_data: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: VehicleSchedule,
    pub stato: ScheduleStatus,
}

/// A schedule joined with its vehicle, for cross-fleet lists.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FleetScheduleRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub schedule: VehicleSchedule,
    pub targa: String,
    pub km_attuali: i32,
}

#[derive(Debug, Serialize)]
pub struct DueSchedule {
    #[serde(flatten)]
    pub row: FleetScheduleRow,
    pub stato: ScheduleStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub tipo: String,
    pub descrizione: Option<String>,
    pub intervallo_km: Option<i32>,
    pub intervallo_mesi: Option<i32>,
    pub ultimo_km: Option<i32>,
    pub ultima_data: Option<NaiveDate>,
}

impl CreateScheduleRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if !SCHEDULE_TYPES.contains(&self.tipo.as_str()) {
            return Err(AppError::invalid(format!(
                "tipo must be one of: {}",
                SCHEDULE_TYPES.join(", ")
            )));
        }
        if self.intervallo_km.is_none() && self.intervallo_mesi.is_none() {
            return Err(AppError::invalid(
                "at least one of intervallo_km and intervallo_mesi is required",
            ));
        }
        if self.intervallo_km.is_some_and(|km| km <= 0) {
            return Err(AppError::invalid("intervallo_km must be positive"));
        }
        if self.intervallo_mesi.is_some_and(|m| m <= 0) {
            return Err(AppError::invalid("intervallo_mesi must be positive"));
        }
        if self.ultimo_km.is_some_and(|km| km < 0) {
            return Err(AppError::invalid("ultimo_km must not be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct CompleteScheduleRequest {
    pub km: i32,
    pub data: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DueQuery {
    pub km_threshold: Option<i32>,
    pub days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn plates_are_normalized() {
        assert_eq!(normalize_targa(" ab 123 cd ").unwrap(), "AB123CD");
        assert_eq!(normalize_targa("x1234").unwrap(), "X1234");
        assert!(normalize_targa("AB12").is_err());
        assert!(normalize_targa("AB-123-CD").is_err());
        assert!(normalize_targa("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn odometer_never_goes_backwards() {
        assert!(validate_km(1000, 1000).is_ok());
        assert!(validate_km(1000, 1500).is_ok());
        assert!(validate_km(1000, 999).is_err());
        assert!(validate_km(0, -1).is_err());
    }

    #[test]
    fn document_states() {
        let today = date(2024, 3, 10);
        assert_eq!(document_status(None, today), DocumentStatus::NessunaScadenza);
        assert_eq!(document_status(Some(date(2024, 3, 9)), today), DocumentStatus::Scaduto);
        assert_eq!(document_status(Some(today), today), DocumentStatus::InScadenza);
        assert_eq!(document_status(Some(date(2024, 4, 9)), today), DocumentStatus::InScadenza);
        assert_eq!(document_status(Some(date(2024, 4, 10)), today), DocumentStatus::Valido);
    }

    #[test]
    fn schedule_states_take_the_worse_of_km_and_date() {
        let today = date(2024, 3, 10);
        let far = Some(date(2025, 1, 1));

        assert_eq!(schedule_status(50_000, Some(50_000), far, today, 1000, 30), ScheduleStatus::Scaduto);
        assert_eq!(schedule_status(49_200, Some(50_000), far, today, 1000, 30), ScheduleStatus::InScadenza);
        assert_eq!(schedule_status(40_000, Some(50_000), far, today, 1000, 30), ScheduleStatus::Ok);

        assert_eq!(
            schedule_status(40_000, Some(50_000), Some(date(2024, 3, 9)), today, 1000, 30),
            ScheduleStatus::Scaduto
        );
        assert_eq!(
            schedule_status(40_000, None, Some(date(2024, 3, 20)), today, 1000, 30),
            ScheduleStatus::InScadenza
        );
        assert_eq!(schedule_status(40_000, None, None, today, 1000, 30), ScheduleStatus::Ok);
    }

    #[test]
    fn next_due_clamps_month_ends() {
        assert_eq!(
            next_due(Some(15_000), Some(1), Some(30_000), Some(date(2024, 1, 31))),
            (Some(45_000), Some(date(2024, 2, 29)))
        );
        assert_eq!(
            next_due(None, Some(12), None, Some(date(2024, 2, 29))),
            (None, Some(date(2025, 2, 28)))
        );
        assert_eq!(next_due(Some(10_000), None, None, None), (None, None));
    }

    #[test]
    fn schedule_requests_need_an_interval() {
        let mut request = CreateScheduleRequest {
            tipo: "tagliando".into(),
            descrizione: None,
            intervallo_km: None,
            intervallo_mesi: None,
            ultimo_km: None,
            ultima_data: None,
        };
        assert!(request.validate().is_err());

        request.intervallo_mesi = Some(12);
        assert!(request.validate().is_ok());

        request.intervallo_km = Some(0);
        assert!(request.validate().is_err());

        request.intervallo_km = Some(20_000);
        request.tipo = "carrozzeria".into();
        assert!(request.validate().is_err());
    }

    #[test]
    fn document_uploads_are_validated() {
        let mut upload = NewDocument {
            tipo: "bollo".into(),
            descrizione: None,
            data_scadenza: None,
            file_name: "bollo.pdf".into(),
            mime_type: "application/pdf".into(),
            bytes: b"%PDF".to_vec(),
        };
        assert!(upload.validate().is_ok());

        upload.tipo = "multa".into();
        assert!(upload.validate().is_err());

        upload.tipo = "bollo".into();
        upload.bytes.clear();
        assert!(upload.validate().is_err());
    }
}
