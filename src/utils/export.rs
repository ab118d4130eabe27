use crate::error::ApiError;
use actix_web::HttpResponse;
use actix_web::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;
use utoipa::ToSchema;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
    Xlsx,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Money(Decimal),
    Date(NaiveDate),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Int(n) => write!(f, "{n}"),
            Cell::Money(d) => write!(f, "{d:.2}"),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<Decimal> for Cell {
    fn from(value: Decimal) -> Self {
        Cell::Money(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

/// A row type that can be written as a spreadsheet line.
pub trait Tabular {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<Cell>;
}

pub fn to_csv<T: Tabular>(rows: &[T]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(T::HEADERS)?;

    for row in rows {
        wtr.write_record(row.cells().iter().map(Cell::to_string))?;
    }

    wtr.into_inner().map_err(|e| e.into_error().into())
}

pub fn to_xlsx<T: Tabular>(sheet_name: &str, rows: &[T]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x4472C4))
        .set_font_color(Color::White)
        .set_border(FormatBorder::Thin);
    let money_format = Format::new().set_num_format("#,##0.00");

    for (col, header) in T::HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        worksheet.set_column_width(col as u16, (header.len() + 6).max(12) as f64)?;
    }

    for (idx, record) in rows.iter().enumerate() {
        let row = (idx + 1) as u32;
        for (col, cell) in record.cells().into_iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(s) => worksheet.write_string(row, col, s)?,
                Cell::Int(n) => worksheet.write_number(row, col, n as f64)?,
                Cell::Money(d) => worksheet.write_number_with_format(
                    row,
                    col,
                    d.to_f64().unwrap_or_default(),
                    &money_format,
                )?,
                Cell::Date(d) => worksheet.write_string(row, col, d.format("%Y-%m-%d").to_string())?,
            };
        }
    }

    if !rows.is_empty() && !T::HEADERS.is_empty() {
        worksheet.autofilter(0, 0, rows.len() as u32, (T::HEADERS.len() - 1) as u16)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    workbook.save_to_buffer()
}

/// Renders report rows in the requested format. `json_body` is the JSON
/// response, which may carry more than the rows themselves.
pub fn render<T, J>(
    format: ReportFormat,
    file_stem: &str,
    rows: &[T],
    json_body: J,
) -> Result<HttpResponse, ApiError>
where
    T: Tabular,
    J: Serialize,
{
    match format {
        ReportFormat::Json => Ok(HttpResponse::Ok().json(json_body)),
        ReportFormat::Csv => {
            let bytes = to_csv(rows).map_err(|e| {
                error!(error = %e, file_stem, "CSV export failed");
                ApiError::Internal
            })?;
            Ok(attachment("text/csv; charset=utf-8", &format!("{file_stem}.csv"), bytes))
        }
        ReportFormat::Xlsx => {
            let bytes = to_xlsx(file_stem, rows).map_err(|e| {
                error!(error = %e, file_stem, "XLSX export failed");
                ApiError::Internal
            })?;
            Ok(attachment(XLSX_CONTENT_TYPE, &format!("{file_stem}.xlsx"), bytes))
        }
    }
}

fn attachment(content_type: &str, file_name: &str, bytes: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, content_type.to_string()))
        .insert_header((
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        ))
        .body(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use rust_decimal_macros::dec;

    struct Line {
        name: &'static str,
        days: i64,
        amount: Decimal,
    }

    impl Tabular for Line {
        const HEADERS: &'static [&'static str] = &["Name", "Days", "Amount"];

        fn cells(&self) -> Vec<Cell> {
            vec![self.name.into(), self.days.into(), self.amount.into()]
        }
    }

    fn lines() -> Vec<Line> {
        vec![
            Line {
                name: "Rahim, Uddin",
                days: 3,
                amount: dec!(1500),
            },
            Line {
                name: "Karim",
                days: 0,
                amount: dec!(99.5),
            },
        ]
    }

    #[test]
    fn csv_has_header_and_quoted_fields() {
        let bytes = to_csv(&lines()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut it = text.lines();
        assert_eq!(it.next(), Some("Name,Days,Amount"));
        assert_eq!(it.next(), Some("\"Rahim, Uddin\",3,1500.00"));
        assert_eq!(it.next(), Some("Karim,0,99.50"));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = to_xlsx("Report", &lines()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn empty_report_still_renders() {
        let bytes = to_xlsx::<Line>("Empty", &[]).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(to_csv::<Line>(&[]).unwrap(), b"Name,Days,Amount\n");
    }

    #[test]
    fn render_sets_download_headers() {
        let resp = render(ReportFormat::Csv, "salaries", &lines(), ()).unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"salaries.csv\""
        );

        let resp = render(ReportFormat::Xlsx, "salaries", &lines(), ()).unwrap();
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), XLSX_CONTENT_TYPE);
    }

    #[test]
    fn format_defaults_to_json() {
        assert_eq!(ReportFormat::default(), ReportFormat::Json);
        let parsed: ReportFormat = serde_json::from_str("\"xlsx\"").unwrap();
        assert_eq!(parsed, ReportFormat::Xlsx);
    }
}
