//! Excel import models.
//!
//! This module defines:
//! - `DeliveryRecord`: one converted spreadsheet row, ready to insert into `fatt_delivery`
//! - `ImportReport` / `ImportSummary`: per-import counters and row errors
//! - `ImportHistory`: the `import_history` ledger row

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Maximum number of row errors kept in a report; the counters stay exact.
pub const MAX_REPORTED_ERRORS: usize = 100;

/// A spreadsheet row converted to `fatt_delivery` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRecord {
    pub data_consegna: NaiveDate,
    pub bu: Option<String>,
    pub divisione: Option<String>,
    pub deposito: Option<String>,
    pub vettore: Option<String>,
    /// Filled in by the loader from the carrier lookup cache.
    pub vettore_id: Option<i64>,
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

/// A row that could not be imported, with its 1-based spreadsheet row number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// Running counters of an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub total_rows: u64,
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, row: usize, message: impl Into<String>) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(RowError {
                row,
                message: format!("Riga {row}: {}", message.into()),
            });
        }
    }

    /// An import fails as a whole only when rows were attempted and none landed.
    pub fn final_status(&self) -> &'static str {
        if self.imported == 0 && self.failed > 0 {
            "failed"
        } else {
            "completed"
        }
    }
}

/// Response body of `POST /api/import/delivery`.
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub import_id: i64,
    pub file_name: String,
    pub status: &'static str,
    pub total_rows: u64,
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub errors: Vec<RowError>,
    pub duration_ms: u128,
}

/// Row of the `import_history` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ImportHistory {
    pub id: i64,
    pub file_name: String,
    pub file_hash: String,
    pub total_rows: i32,
    pub imported: i32,
    pub skipped: i32,
    pub failed: i32,
    pub status: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

/// Response body of `DELETE /api/import/{id}`.
#[derive(Debug, Serialize)]
pub struct ImportDeleted {
    pub deleted_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_list_is_capped_but_counter_is_exact() {
        let mut report = ImportReport::default();
        for row in 0..(MAX_REPORTED_ERRORS + 20) {
            report.record_failure(row + 2, "importo non valido");
        }
        assert_eq!(report.failed as usize, MAX_REPORTED_ERRORS + 20);
        assert_eq!(report.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(report.errors[0].message, "Riga 2: importo non valido");
    }

    #[test]
    fn status_is_failed_only_when_nothing_landed() {
        let mut report = ImportReport::default();
        assert_eq!(report.final_status(), "completed");

        report.record_failure(2, "x");
        assert_eq!(report.final_status(), "failed");

        report.imported = 1;
        assert_eq!(report.final_status(), "completed");
    }
}
