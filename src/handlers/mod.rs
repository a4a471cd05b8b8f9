//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Extracts path, query, JSON or multipart input
//! 2. Calls into `services`
//! 3. Returns JSON (or a file) and a status code
//!
//! Errors are `AppError`, rendered as `{ "error": "..." }`.

use chrono::{Local, NaiveDate};

/// Delivery analytics, export and POD updates
pub mod analytics;
/// Backup monitoring endpoints
pub mod backup;
/// Home dashboard
pub mod dashboard;
/// `Json`, `Query` and `Path` with JSON rejections
pub mod extract;
/// Health check endpoint
pub mod health;
/// Excel import endpoints
pub mod imports;
/// Vehicles, documents and maintenance schedules
pub mod vehicles;

/// Business dates (delivery days, expiries) follow the server's local calendar.
pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}
