//! Delivery and handling analytics endpoints.
//!
//! - GET /api/analytics/delivery - KPIs, trend and breakdowns for deliveries
//! - GET /api/analytics/handling - same for warehouse movements
//! - GET /api/analytics/filters - distinct values for the filter dropdowns
//! - GET /api/analytics/delivery/export - detail rows as `.xlsx`
//! - PATCH /api/deliveries/{id}/pod - mark a POD as received or missing

use std::time::Duration;

use axum::{
    extract::State,
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
    models::analytics::{
        AnalyticsQuery, DeliveryAnalytics, FilterOptions, HandlingAnalytics, PodUpdateRequest,
    },
    routes::AppState,
    services::{analytics_service, export_service},
};

/// Delivery analytics for a period.
///
/// # Endpoint
///
/// `GET /api/analytics/delivery?from=2024-03-01&to=2024-03-31&bu=&divisione=&deposito=&vettore=`
///
/// `to` defaults to today and `from` to the 30 days ending at `to`. The trend
/// is bucketed daily up to 31 days, weekly up to 180, monthly beyond.
///
/// # Response
///
/// - **Success (200 OK)**: totals, previous period with variations, trend,
///   breakdowns by BU/divisione/deposito/tipologia, top carriers and provinces
/// - **Error (400)**: malformed date, or `from` after `to`
pub async fn delivery(
    State(pool): State<DbPool>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<DeliveryAnalytics>, AppError> {
    let filters = analytics_service::resolve_filters(query, today())?;
    Ok(Json(analytics_service::delivery_analytics(&pool, &filters).await?))
}

/// Handling analytics for a period. Same filters as [`delivery`], without `vettore`.
pub async fn handling(
    State(pool): State<DbPool>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<HandlingAnalytics>, AppError> {
    let filters = analytics_service::resolve_filters(query, today())?;
    Ok(Json(analytics_service::handling_analytics(&pool, &filters).await?))
}

/// Distinct BU, divisione, deposito and vettore values.
pub async fn filters(State(pool): State<DbPool>) -> Result<Json<FilterOptions>, AppError> {
    Ok(Json(analytics_service::filter_options(&pool).await?))
}

/// Download delivery detail rows as an Excel workbook.
///
/// # Endpoint
///
/// `GET /api/analytics/delivery/export` with the same query as [`delivery`].
///
/// # Response
///
/// - **Success (200 OK)**: `consegne_<from>_<to>.xlsx` as an attachment,
///   at most 100 000 rows plus a totals row
/// - **Error (400)**: invalid filters
/// - **Error (500)**: generation failed or ran past `EXPORT_TIMEOUT_SECS`
pub async fn export_delivery(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Response, AppError> {
    let filters = analytics_service::resolve_filters(query, today())?;
    let deadline = Duration::from_secs(state.config.export_timeout_secs);

    let bytes = export_service::export_deliveries(&state.pool, &filters, deadline).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_service::export_file_name(&filters)
    );

    Ok((
        [
            (header::CONTENT_TYPE, export_service::XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Set the POD flag of one delivery.
///
/// # Endpoint
///
/// `PATCH /api/deliveries/{id}/pod` with body `{ "ricevuto": true }`
///
/// # Response
///
/// - **Success (204 No Content)**
/// - **Error (404)**: no delivery with that id
pub async fn set_pod(
    State(pool): State<DbPool>,
    Path(delivery_id): Path<i64>,
    Json(request): Json<PodUpdateRequest>,
) -> Result<StatusCode, AppError> {
    analytics_service::set_pod(&pool, delivery_id, request.ricevuto).await?;
    Ok(StatusCode::NO_CONTENT)
}
