//! Business logic services.
//!
//! Services hold the SQL and the rules; handlers only extract, call and wrap.

pub mod analytics_service;
pub mod backup_service;
pub mod cron;
pub mod dashboard_service;
pub mod export_service;
pub mod fleet_service;
pub mod import_service;
pub mod storage;
