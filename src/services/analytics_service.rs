//! Delivery and handling analytics.
//!
//! Every endpoint here follows the same shape: resolve the query-string
//! filters into a [`ResolvedFilters`], build one `WHERE` clause from them and
//! run a handful of aggregate queries that share it.
//!
//! Trend series use adaptive time buckets: short ranges are grouped per day,
//! medium ranges per ISO week and long ranges per month, so a chart never
//! ends up with hundreds of points or a single one.

use chrono::{Datelike, NaiveDate};
use sqlx::{MySql, QueryBuilder};

use crate::{
    db::DbPool,
    error::AppError,
    models::analytics::{
        AnalyticsQuery, Breakdown, DeliveryAnalytics, DeliveryBucketRow, DeliveryTotals,
        DeliveryTrendPoint, DimensionFilters, FilterOptions, Granularity, HandlingAnalytics,
        HandlingBreakdown, HandlingBucketRow, HandlingTotals, HandlingTrendPoint, Period,
        ResolvedFilters, Variation,
    },
};

/// Ranges up to this many days are bucketed per day.
pub const DAILY_MAX_DAYS: i64 = 31;

/// Ranges up to this many days are bucketed per ISO week; longer ones per month.
pub const WEEKLY_MAX_DAYS: i64 = 180;

/// Length of the default range when `from` is omitted.
pub const DEFAULT_RANGE_DAYS: i64 = 30;

const TOP_LIMIT: u32 = 10;

const MONTHS_IT: [&str; 12] = [
    "Gen", "Feb", "Mar", "Apr", "Mag", "Giu", "Lug", "Ago", "Set", "Ott", "Nov", "Dic",
];

/// The fact table an analytics query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Delivery,
    Handling,
}

impl Dataset {
    pub fn table(self) -> &'static str {
        match self {
            Dataset::Delivery => "fatt_delivery",
            Dataset::Handling => "fatt_handling",
        }
    }

    pub fn date_column(self) -> &'static str {
        match self {
            Dataset::Delivery => "data_consegna",
            Dataset::Handling => "data_mov",
        }
    }

    /// Handling movements are not tied to a carrier.
    fn has_vettore(self) -> bool {
        matches!(self, Dataset::Delivery)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Years a MySQL `DATE` column can hold.
const DATE_YEARS: std::ops::RangeInclusive<i32> = 1000..=9999;

/// Parse a `YYYY-MM-DD` query parameter.
///
/// chrono's `%Y` also takes signed and five-digit years, so the shape and the
/// year are checked separately.
pub fn parse_date_param(name: &str, value: Option<String>) -> Result<Option<NaiveDate>, AppError> {
    let Some(raw) = non_empty(value) else {
        return Ok(None);
    };
    let invalid = || AppError::invalid(format!("{name} must be a date in YYYY-MM-DD format"));

    if raw.len() != 10 || !raw.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| invalid())?;
    if !DATE_YEARS.contains(&date.year()) {
        return Err(invalid());
    }
    Ok(Some(date))
}

/// Turn raw query parameters into a validated period and dimension filters.
///
/// Missing `to` means today; missing `from` means the 30 days ending at `to`.
pub fn resolve_filters(query: AnalyticsQuery, today: NaiveDate) -> Result<ResolvedFilters, AppError> {
    let to = parse_date_param("to", query.to)?.unwrap_or(today);
    let from = parse_date_param("from", query.from)?
        .unwrap_or_else(|| to - chrono::Duration::days(DEFAULT_RANGE_DAYS - 1));

    if from > to {
        return Err(AppError::invalid("from must not be after to"));
    }

    Ok(ResolvedFilters {
        period: Period { from, to },
        dimensions: DimensionFilters {
            bu: non_empty(query.bu),
            divisione: non_empty(query.divisione),
            deposito: non_empty(query.deposito),
            vettore: non_empty(query.vettore),
        },
    })
}

/// Pick the trend bucket size for a period.
pub fn granularity_for(period: &Period) -> Granularity {
    match period.days() {
        d if d <= DAILY_MAX_DAYS => Granularity::Daily,
        d if d <= WEEKLY_MAX_DAYS => Granularity::Weekly,
        _ => Granularity::Monthly,
    }
}

/// SQL expression producing the bucket key of a row.
///
/// Keys sort chronologically as strings: `2024-03-05`, `202410` (ISO year and
/// week), `2024-03`.
pub fn bucket_expr(granularity: Granularity, date_column: &str) -> String {
    match granularity {
        Granularity::Daily => format!("DATE_FORMAT({date_column}, '%Y-%m-%d')"),
        Granularity::Weekly => format!("CAST(YEARWEEK({date_column}, 3) AS CHAR)"),
        Granularity::Monthly => format!("DATE_FORMAT({date_column}, '%Y-%m')"),
    }
}

/// Human label for a bucket key. Unrecognised keys are returned unchanged.
pub fn format_bucket_label(granularity: Granularity, key: &str) -> String {
    match granularity {
        Granularity::Daily => NaiveDate::parse_from_str(key, "%Y-%m-%d")
            .map(|d| d.format("%d/%m").to_string())
            .unwrap_or_else(|_| key.to_string()),
        Granularity::Weekly => {
            let valid = key.len() == 6 && key.bytes().all(|b| b.is_ascii_digit());
            if valid {
                format!("Sett. {}/{}", &key[4..], &key[..4])
            } else {
                key.to_string()
            }
        }
        Granularity::Monthly => match key.split_once('-') {
            Some((year, month)) => match month.parse::<usize>() {
                Ok(m) if (1..=12).contains(&m) && year.len() == 4 => {
                    format!("{} {year}", MONTHS_IT[m - 1])
                }
                _ => key.to_string(),
            },
            None => key.to_string(),
        },
    }
}

/// Percentage change from `previous` to `current`, rounded to one decimal.
pub fn variation_pct(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some(((current - previous) / previous * 1000.0).round() / 10.0)
}

/// Start a query with `select`, then append the shared `WHERE` clause.
///
/// Column names come from [`Dataset`] and fixed literals; every filter value is bound.
pub fn filtered_query<'a>(
    select: &str,
    dataset: Dataset,
    period: Period,
    dimensions: &DimensionFilters,
) -> QueryBuilder<'a, MySql> {
    let mut qb = QueryBuilder::<MySql>::new(select);
    qb.push(" FROM ")
        .push(dataset.table())
        .push(" WHERE ")
        .push(dataset.date_column())
        .push(" BETWEEN ")
        .push_bind(period.from)
        .push(" AND ")
        .push_bind(period.to);

    let mut dims: Vec<(&str, &Option<String>)> = vec![
        ("bu", &dimensions.bu),
        ("divisione", &dimensions.divisione),
        ("deposito", &dimensions.deposito),
    ];
    if dataset.has_vettore() {
        dims.push(("vettore", &dimensions.vettore));
    }

    for (column, value) in dims {
        if let Some(value) = value {
            qb.push(" AND ")
                .push(column)
                .push(" = ")
                .push_bind(value.clone());
        }
    }

    qb
}

const DELIVERY_TOTALS_SELECT: &str = "SELECT COUNT(*) AS consegne, \
     CAST(COALESCE(SUM(colli), 0) AS SIGNED) AS colli, \
     CAST(COALESCE(SUM(peso_kg), 0) AS DOUBLE) AS peso_kg, \
     CAST(COALESCE(SUM(importo), 0) AS DOUBLE) AS importo, \
     CAST(COALESCE(SUM(pod_ricevuto), 0) AS SIGNED) AS pod_ricevuti";

fn breakdown_select(column: &str) -> String {
    format!(
        "SELECT COALESCE(NULLIF(TRIM({column}), ''), 'N/D') AS name, COUNT(*) AS consegne, \
         CAST(COALESCE(SUM(colli), 0) AS SIGNED) AS colli, \
         CAST(COALESCE(SUM(importo), 0) AS DOUBLE) AS importo"
    )
}

async fn delivery_totals(
    pool: &DbPool,
    period: Period,
    dimensions: &DimensionFilters,
) -> Result<DeliveryTotals, AppError> {
    let mut qb = filtered_query(DELIVERY_TOTALS_SELECT, Dataset::Delivery, period, dimensions);
    Ok(qb.build_query_as::<DeliveryTotals>().fetch_one(pool).await?)
}

/// `order_by` is a 1-based select-list position; `limit` caps "top N" lists.
async fn delivery_breakdown(
    pool: &DbPool,
    filters: &ResolvedFilters,
    column: &str,
    order_by: u8,
    limit: Option<u32>,
) -> Result<Vec<Breakdown>, AppError> {
    let mut qb = filtered_query(
        &breakdown_select(column),
        Dataset::Delivery,
        filters.period,
        &filters.dimensions,
    );
    qb.push(" GROUP BY name ORDER BY ")
        .push(order_by.to_string())
        .push(" DESC");
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    Ok(qb.build_query_as::<Breakdown>().fetch_all(pool).await?)
}

/// Build the full delivery dashboard for the given filters.
///
/// Runs the totals for this and the previous period, the trend series and six
/// breakdowns, one query after the other on pooled connections.
pub async fn delivery_analytics(
    pool: &DbPool,
    filters: &ResolvedFilters,
) -> Result<DeliveryAnalytics, AppError> {
    let period = filters.period;
    let granularity = granularity_for(&period);

    let totals = delivery_totals(pool, period, &filters.dimensions).await?;
    let previous_period = period
        .previous()
        .ok_or_else(|| AppError::invalid("period is out of range"))?;
    let previous_totals = delivery_totals(pool, previous_period, &filters.dimensions).await?;

    let trend_select = format!(
        "SELECT {} AS bucket, COUNT(*) AS consegne, \
         CAST(COALESCE(SUM(colli), 0) AS SIGNED) AS colli, \
         CAST(COALESCE(SUM(importo), 0) AS DOUBLE) AS importo",
        bucket_expr(granularity, Dataset::Delivery.date_column())
    );
    let mut qb = filtered_query(&trend_select, Dataset::Delivery, period, &filters.dimensions);
    qb.push(" GROUP BY bucket ORDER BY bucket");
    let trend = qb
        .build_query_as::<DeliveryBucketRow>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| DeliveryTrendPoint {
            label: format_bucket_label(granularity, &row.bucket),
            key: row.bucket,
            consegne: row.consegne,
            colli: row.colli,
            importo: row.importo,
        })
        .collect();

    let by_bu = delivery_breakdown(pool, filters, "bu", 4, None).await?;
    let by_divisione = delivery_breakdown(pool, filters, "divisione", 4, None).await?;
    let by_deposito = delivery_breakdown(pool, filters, "deposito", 4, None).await?;
    let top_vettori = delivery_breakdown(pool, filters, "vettore", 4, Some(TOP_LIMIT)).await?;
    let by_tipologia = delivery_breakdown(pool, filters, "tipologia", 4, None).await?;
    let top_province = delivery_breakdown(pool, filters, "provincia", 2, Some(TOP_LIMIT)).await?;

    let importo_medio = if totals.consegne > 0 {
        (totals.importo / totals.consegne as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };

    let variation = Variation {
        consegne: variation_pct(totals.consegne as f64, previous_totals.consegne as f64),
        colli: variation_pct(totals.colli as f64, previous_totals.colli as f64),
        importo: variation_pct(totals.importo, previous_totals.importo),
    };

    tracing::debug!(
        from = %period.from,
        to = %period.to,
        ?granularity,
        consegne = totals.consegne,
        "delivery analytics computed"
    );

    Ok(DeliveryAnalytics {
        period,
        granularity,
        totals,
        importo_medio,
        previous_period,
        previous_totals,
        variation,
        trend,
        by_bu,
        by_divisione,
        by_deposito,
        top_vettori,
        by_tipologia,
        top_province,
    })
}

fn handling_breakdown_select(column: &str) -> String {
    format!(
        "SELECT COALESCE(NULLIF(TRIM({column}), ''), 'N/D') AS name, COUNT(*) AS movimenti, \
         CAST(COALESCE(SUM(pallet), 0) AS SIGNED) AS pallet, \
         CAST(COALESCE(SUM(importo), 0) AS DOUBLE) AS importo"
    )
}

/// Build the handling (warehouse movements) summary for the given filters.
pub async fn handling_analytics(
    pool: &DbPool,
    filters: &ResolvedFilters,
) -> Result<HandlingAnalytics, AppError> {
    let period = filters.period;
    let granularity = granularity_for(&period);
    let dims = &filters.dimensions;

    let mut qb = filtered_query(
        "SELECT COUNT(*) AS movimenti, \
         CAST(COALESCE(SUM(colli), 0) AS SIGNED) AS colli, \
         CAST(COALESCE(SUM(pallet), 0) AS SIGNED) AS pallet, \
         CAST(COALESCE(SUM(importo), 0) AS DOUBLE) AS importo",
        Dataset::Handling,
        period,
        dims,
    );
    let totals = qb.build_query_as::<HandlingTotals>().fetch_one(pool).await?;

    let mut by_tipo_movimento = Vec::new();
    let mut by_deposito = Vec::new();
    for (column, target) in [
        ("tipo_movimento", &mut by_tipo_movimento),
        ("deposito", &mut by_deposito),
    ] {
        let mut qb = filtered_query(&handling_breakdown_select(column), Dataset::Handling, period, dims);
        qb.push(" GROUP BY name ORDER BY 4 DESC");
        *target = qb.build_query_as::<HandlingBreakdown>().fetch_all(pool).await?;
    }

    let trend_select = format!(
        "SELECT {} AS bucket, COUNT(*) AS movimenti, \
         CAST(COALESCE(SUM(pallet), 0) AS SIGNED) AS pallet, \
         CAST(COALESCE(SUM(importo), 0) AS DOUBLE) AS importo",
        bucket_expr(granularity, Dataset::Handling.date_column())
    );
    let mut qb = filtered_query(&trend_select, Dataset::Handling, period, dims);
    qb.push(" GROUP BY bucket ORDER BY bucket");
    let trend = qb
        .build_query_as::<HandlingBucketRow>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| HandlingTrendPoint {
            label: format_bucket_label(granularity, &row.bucket),
            key: row.bucket,
            movimenti: row.movimenti,
            pallet: row.pallet,
            importo: row.importo,
        })
        .collect();

    Ok(HandlingAnalytics {
        period,
        granularity,
        totals,
        by_tipo_movimento,
        by_deposito,
        trend,
    })
}

async fn distinct_values(pool: &DbPool, column: &str) -> Result<Vec<String>, AppError> {
    let sql = format!(
        "SELECT DISTINCT TRIM({column}) FROM fatt_delivery \
         WHERE {column} IS NOT NULL AND TRIM({column}) <> '' ORDER BY 1"
    );
    Ok(sqlx::query_scalar::<_, String>(&sql).fetch_all(pool).await?)
}

/// Distinct values of every filter dimension, for the dropdowns.
pub async fn filter_options(pool: &DbPool) -> Result<FilterOptions, AppError> {
    Ok(FilterOptions {
        bu: distinct_values(pool, "bu").await?,
        divisione: distinct_values(pool, "divisione").await?,
        deposito: distinct_values(pool, "deposito").await?,
        vettore: distinct_values(pool, "vettore").await?,
    })
}

/// Mark a delivery's proof of delivery as received or missing.
pub async fn set_pod(pool: &DbPool, delivery_id: i64, ricevuto: bool) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE fatt_delivery SET pod_ricevuto = ? WHERE id = ?")
        .bind(ricevuto)
        .bind(delivery_id)
        .execute(pool)
        .await?;

    // MySQL reports matched-but-unchanged rows as 0 affected
    if result.rows_affected() == 0 {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fatt_delivery WHERE id = ?")
            .bind(delivery_id)
            .fetch_one(pool)
            .await?;
        if found == 0 {
            return Err(AppError::NotFound("Delivery"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn period(from: NaiveDate, to: NaiveDate) -> Period {
        Period { from, to }
    }

    #[test]
    fn defaults_to_the_last_thirty_days() {
        let today = date(2024, 6, 30);
        let filters = resolve_filters(AnalyticsQuery::default(), today).unwrap();
        assert_eq!(filters.period.to, today);
        assert_eq!(filters.period.from, date(2024, 6, 1));
        assert_eq!(filters.dimensions, DimensionFilters::default());
    }

    #[test]
    fn blank_dimension_filters_are_ignored() {
        let query = AnalyticsQuery {
            bu: Some("  ".into()),
            deposito: Some(" Milano ".into()),
            ..Default::default()
        };
        let filters = resolve_filters(query, date(2024, 6, 30)).unwrap();
        assert_eq!(filters.dimensions.bu, None);
        assert_eq!(filters.dimensions.deposito.as_deref(), Some("Milano"));
    }

    #[test]
    fn inverted_or_malformed_dates_are_rejected() {
        let inverted = AnalyticsQuery {
            from: Some("2024-05-10".into()),
            to: Some("2024-05-01".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_filters(inverted, date(2024, 6, 30)),
            Err(AppError::InvalidRequest(_))
        ));

        let malformed = AnalyticsQuery {
            from: Some("10/05/2024".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_filters(malformed, date(2024, 6, 30)),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn dates_outside_four_digit_years_are_rejected() {
        for raw in ["-262143-01-01", "-9999-01-01", "+262142-01-01", "0999-12-31", "12024-01-01"] {
            assert!(
                matches!(
                    parse_date_param("from", Some(raw.into())),
                    Err(AppError::InvalidRequest(_))
                ),
                "{raw}"
            );
        }
        assert_eq!(
            parse_date_param("from", Some("1000-01-01".into())).unwrap(),
            Some(date(1000, 1, 1))
        );
        assert_eq!(
            parse_date_param("to", Some("9999-12-31".into())).unwrap(),
            Some(date(9999, 12, 31))
        );
    }

    #[test]
    fn granularity_follows_range_length() {
        let start = date(2024, 1, 1);
        assert_eq!(granularity_for(&period(start, start)), Granularity::Daily);
        assert_eq!(
            granularity_for(&period(start, date(2024, 1, 31))),
            Granularity::Daily
        );
        assert_eq!(
            granularity_for(&period(start, date(2024, 2, 1))),
            Granularity::Weekly
        );
        // 2024 is a leap year: Jan 1 .. Jun 28 is exactly 180 days
        assert_eq!(
            granularity_for(&period(start, date(2024, 6, 28))),
            Granularity::Weekly
        );
        assert_eq!(
            granularity_for(&period(start, date(2024, 6, 29))),
            Granularity::Monthly
        );
    }

    #[test]
    fn bucket_labels() {
        assert_eq!(format_bucket_label(Granularity::Daily, "2024-03-05"), "05/03");
        assert_eq!(
            format_bucket_label(Granularity::Weekly, "202410"),
            "Sett. 10/2024"
        );
        assert_eq!(
            format_bucket_label(Granularity::Weekly, "202501"),
            "Sett. 01/2025"
        );
        assert_eq!(format_bucket_label(Granularity::Weekly, "2024-10"), "2024-10");
        assert_eq!(format_bucket_label(Granularity::Monthly, "2024-03"), "Mar 2024");
        assert_eq!(format_bucket_label(Granularity::Monthly, "2024-12"), "Dic 2024");
        assert_eq!(format_bucket_label(Granularity::Monthly, "2024-13"), "2024-13");
        assert_eq!(format_bucket_label(Granularity::Daily, "garbage"), "garbage");
    }

    #[test]
    fn bucket_expressions_use_the_dataset_date_column() {
        assert_eq!(
            bucket_expr(Granularity::Weekly, "data_mov"),
            "CAST(YEARWEEK(data_mov, 3) AS CHAR)"
        );
        assert_eq!(
            bucket_expr(Granularity::Monthly, "data_consegna"),
            "DATE_FORMAT(data_consegna, '%Y-%m')"
        );
    }

    #[test]
    fn variation_is_none_without_a_baseline() {
        assert_eq!(variation_pct(10.0, 0.0), None);
        assert_eq!(variation_pct(150.0, 100.0), Some(50.0));
        assert_eq!(variation_pct(2.0, 3.0), Some(-33.3));
    }

    #[test]
    fn where_clause_binds_only_present_filters() {
        let dims = DimensionFilters {
            bu: Some("BU1".into()),
            vettore: Some("Rossi".into()),
            ..Default::default()
        };
        let p = period(date(2024, 1, 1), date(2024, 1, 31));

        let qb = filtered_query("SELECT COUNT(*)", Dataset::Delivery, p, &dims);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM fatt_delivery WHERE data_consegna BETWEEN ? AND ? \
             AND bu = ? AND vettore = ?"
        );
    }

    #[test]
    fn handling_queries_ignore_the_carrier_filter() {
        let dims = DimensionFilters {
            vettore: Some("Rossi".into()),
            deposito: Some("Bologna".into()),
            ..Default::default()
        };
        let p = period(date(2024, 1, 1), date(2024, 1, 31));

        let qb = filtered_query("SELECT 1", Dataset::Handling, p, &dims);
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM fatt_handling WHERE data_mov BETWEEN ? AND ? AND deposito = ?"
        );
    }
}
