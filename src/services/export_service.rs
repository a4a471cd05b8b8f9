//! Excel export of delivery detail rows.
//!
//! Fetching is async; the workbook itself is written on the blocking pool and
//! the whole operation is bounded by a deadline so a huge export cannot hold a
//! request open indefinitely.

use std::time::Duration;

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::{
    db::DbPool,
    error::AppError,
    models::analytics::{DeliveryExportRow, ResolvedFilters},
    services::analytics_service::{Dataset, filtered_query},
};

/// Hard cap on exported rows.
pub const EXPORT_ROW_LIMIT: u32 = 100_000;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const HEADERS: [&str; 14] = [
    "Data",
    "BU",
    "Divisione",
    "Deposito",
    "Vettore",
    "Cliente",
    "Località",
    "Provincia",
    "N. Documento",
    "Tipologia",
    "Colli",
    "Peso (kg)",
    "Importo (€)",
    "POD",
];

fn xlsx_err(e: XlsxError) -> AppError {
    AppError::Export(e.to_string())
}

/// Attachment file name for an export of `filters`.
pub fn export_file_name(filters: &ResolvedFilters) -> String {
    format!(
        "consegne_{}_{}.xlsx",
        filters.period.from.format("%Y%m%d"),
        filters.period.to.format("%Y%m%d")
    )
}

async fn fetch_rows(
    pool: &DbPool,
    filters: &ResolvedFilters,
) -> Result<Vec<DeliveryExportRow>, AppError> {
    let mut qb = filtered_query(
        "SELECT data_consegna, bu, divisione, deposito, vettore, cliente, localita, \
         provincia, num_documento, tipologia, colli, \
         CAST(peso_kg AS DOUBLE) AS peso_kg, CAST(importo AS DOUBLE) AS importo, pod_ricevuto",
        Dataset::Delivery,
        filters.period,
        &filters.dimensions,
    );
    qb.push(" ORDER BY data_consegna, id LIMIT ")
        .push_bind(EXPORT_ROW_LIMIT);
    Ok(qb.build_query_as::<DeliveryExportRow>().fetch_all(pool).await?)
}

fn write_opt(sheet: &mut Worksheet, row: u32, col: u16, value: &Option<String>) -> Result<(), XlsxError> {
    if let Some(value) = value {
        sheet.write_string(row, col, value)?;
    }
    Ok(())
}

/// Render rows into an in-memory `.xlsx`, with a bold header and a totals row.
pub fn build_workbook(rows: &[DeliveryExportRow]) -> Result<Vec<u8>, AppError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Consegne").map_err(xlsx_err)?;

    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("#,##0.00");

    for (col, header) in HEADERS.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *header, &bold)
            .map_err(xlsx_err)?;
    }

    let (mut colli, mut peso, mut importo) = (0i64, 0f64, 0f64);

    for (idx, r) in rows.iter().enumerate() {
        let row = idx as u32 + 1;
        let write = |sheet: &mut Worksheet| -> Result<(), XlsxError> {
            sheet.write_string(row, 0, r.data_consegna.format("%d/%m/%Y").to_string())?;
            write_opt(sheet, row, 1, &r.bu)?;
            write_opt(sheet, row, 2, &r.divisione)?;
            write_opt(sheet, row, 3, &r.deposito)?;
            write_opt(sheet, row, 4, &r.vettore)?;
            write_opt(sheet, row, 5, &r.cliente)?;
            write_opt(sheet, row, 6, &r.localita)?;
            write_opt(sheet, row, 7, &r.provincia)?;
            write_opt(sheet, row, 8, &r.num_documento)?;
            write_opt(sheet, row, 9, &r.tipologia)?;
            sheet.write_number(row, 10, r.colli)?;
            sheet.write_number_with_format(row, 11, r.peso_kg, &money)?;
            sheet.write_number_with_format(row, 12, r.importo, &money)?;
            sheet.write_string(row, 13, if r.pod_ricevuto { "Sì" } else { "No" })?;
            Ok(())
        };
        write(sheet).map_err(xlsx_err)?;

        colli += i64::from(r.colli);
        peso += r.peso_kg;
        importo += r.importo;
    }

    let total_row = rows.len() as u32 + 1;
    sheet
        .write_string_with_format(total_row, 0, "Totale", &bold)
        .map_err(xlsx_err)?;
    sheet
        .write_number_with_format(total_row, 10, colli as f64, &bold)
        .map_err(xlsx_err)?;
    sheet
        .write_number_with_format(total_row, 11, peso, &bold)
        .map_err(xlsx_err)?;
    sheet
        .write_number_with_format(total_row, 12, importo, &bold)
        .map_err(xlsx_err)?;

    for (col, width) in [(0u16, 12), (4, 24), (5, 30), (6, 20), (8, 16)] {
        sheet.set_column_width(col, width).map_err(xlsx_err)?;
    }

    workbook.save_to_buffer().map_err(xlsx_err)
}

/// Query and render the export, failing with [`AppError::Timeout`] past `deadline`.
pub async fn export_deliveries(
    pool: &DbPool,
    filters: &ResolvedFilters,
    deadline: Duration,
) -> Result<Vec<u8>, AppError> {
    let work = async {
        let rows = fetch_rows(pool, filters).await?;
        let count = rows.len();
        let bytes = tokio::task::spawn_blocking(move || build_workbook(&rows))
            .await
            .map_err(|e| AppError::Export(e.to_string()))??;
        tracing::info!(rows = count, bytes = bytes.len(), "delivery export generated");
        Ok::<_, AppError>(bytes)
    };

    tokio::time::timeout(deadline, work)
        .await
        .map_err(|_| AppError::Timeout("Export"))?
}
