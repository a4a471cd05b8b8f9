//! Home dashboard endpoints.

use axum::extract::State;

use super::{
    extract::{Json, Query},
    today,
};
use crate::{
    db::DbPool,
    error::AppError,
    models::dashboard::{DashboardSummary, PodMissing, PodMissingQuery},
    services::dashboard_service,
};

/// Headline numbers from every module.
///
/// # Endpoint
///
/// `GET /api/dashboard/summary`
///
/// # Response (200 OK)
///
/// Month-to-date deliveries and importo, PODs missing after 7 days, expired and
/// expiring documents, overdue and due maintenance, active backup alerts and
/// the most recent backup run.
pub async fn summary(State(pool): State<DbPool>) -> Result<Json<DashboardSummary>, AppError> {
    Ok(Json(dashboard_service::summary(&pool, today()).await?))
}

/// Deliveries still without a POD after 7 days, oldest first (`?limit=`, max 500).
pub async fn pod_missing(
    State(pool): State<DbPool>,
    Query(query): Query<PodMissingQuery>,
) -> Result<Json<Vec<PodMissing>>, AppError> {
    Ok(Json(
        dashboard_service::pod_missing(&pool, query.limit, today()).await?,
    ))
}
