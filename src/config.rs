//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): MySQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DB_MAX_CONNECTIONS` (optional): pool size, defaults to 10
/// - `RUN_MIGRATIONS` (optional): apply embedded migrations at startup, defaults to true
/// - `UPLOAD_DIR` (optional): where vehicle documents are stored, defaults to `./uploads`
/// - `MAX_UPLOAD_MB` (optional): request body limit, defaults to 25
/// - `IMPORT_BATCH_SIZE` (optional): rows per multi-row INSERT, defaults to 1000
/// - `EXPORT_TIMEOUT_SECS` (optional): Excel export deadline, defaults to 60
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_true")]
    pub run_migrations: bool,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    #[serde(default = "default_import_batch_size")]
    pub import_batch_size: usize,

    #[serde(default = "default_export_timeout_secs")]
    pub export_timeout_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_upload_mb() -> usize {
    25
}

fn default_import_batch_size() -> usize {
    1000
}

fn default_export_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Body limit in bytes for uploads (documents and workbooks).
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    /// Batch size actually used by the importer. Zero would stall the loader.
    pub fn effective_batch_size(&self) -> usize {
        self.import_batch_size.max(1)
    }
}
