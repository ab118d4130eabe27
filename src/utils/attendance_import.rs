use crate::utils::db_utils::{parse_date, parse_time};
use crate::utils::export::{Cell, Tabular};
use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use chrono::{NaiveDate, NaiveTime};
use std::io::Cursor;
use tracing::warn;

/// Header of the bulk attendance sheet. The status column is informational.
pub const TEMPLATE_HEADERS: &[&str] = &["EmpId", "Date", "InTime", "OutTime", "Status"];

const DATE_COLUMN: usize = 1;

/// XLSX files are zip archives.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub emp_id: u64,
    pub dt_date: NaiveDate,
    pub in_time: Option<NaiveTime>,
    pub out_time: Option<NaiveTime>,
}

#[derive(Debug, Default)]
pub struct ParsedSheet {
    pub rows: Vec<ImportRow>,
    pub skipped: usize,
}

/// Parses an uploaded sheet, XLSX when the body is a zip archive and CSV
/// otherwise. Lines with a missing or malformed employee id, date or time
/// are counted as skipped. Empty time cells stay `None`.
pub fn parse_sheet(data: &[u8]) -> ParsedSheet {
    if data.starts_with(ZIP_MAGIC) {
        parse_xlsx(data)
    } else {
        parse_csv(data)
    }
}

fn parse_csv(data: &[u8]) -> ParsedSheet {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut sheet = ParsedSheet::default();

    for record in reader.records() {
        match record.ok().and_then(|r| parse_record(&r)) {
            Some(row) => sheet.rows.push(row),
            None => sheet.skipped += 1,
        }
    }

    sheet
}

/// Reads the first worksheet; its first row is the header.
fn parse_xlsx(data: &[u8]) -> ParsedSheet {
    let mut workbook: Xlsx<_> = match open_workbook_from_rs(Cursor::new(data)) {
        Ok(workbook) => workbook,
        Err(e) => {
            warn!(error = %e, "Unreadable XLSX upload");
            return ParsedSheet::default();
        }
    };
    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => {
            warn!(error = %e, "Unreadable XLSX worksheet");
            return ParsedSheet::default();
        }
        None => return ParsedSheet::default(),
    };

    let mut sheet = ParsedSheet::default();

    for cells in range.rows().skip(1) {
        if cells.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let record: csv::StringRecord = cells
            .iter()
            .enumerate()
            .map(|(col, cell)| cell_text(col, cell))
            .collect();
        match parse_record(&record) {
            Some(row) => sheet.rows.push(row),
            None => sheet.skipped += 1,
        }
    }

    sheet
}

/// Text form of a cell as the CSV parser expects it. Excel date and time
/// cells become `YYYY-MM-DD` in the date column and `HH:MM:SS` elsewhere.
fn cell_text(col: usize, cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(value) => match value.as_datetime() {
            Some(dt) if col == DATE_COLUMN => dt.date().format("%Y-%m-%d").to_string(),
            Some(dt) => dt.time().format("%H:%M:%S").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string().trim().to_string(),
    }
}

fn parse_record(record: &csv::StringRecord) -> Option<ImportRow> {
    let emp_id = record.get(0)?.parse::<u64>().ok().filter(|id| *id > 0)?;
    let dt_date = parse_date(record.get(1)?)?;

    Some(ImportRow {
        emp_id,
        dt_date,
        in_time: optional_time(record.get(2))?,
        out_time: optional_time(record.get(3))?,
    })
}

/// `Some(None)` for an empty cell, `None` for garbage.
fn optional_time(cell: Option<&str>) -> Option<Option<NaiveTime>> {
    match cell.map(str::trim) {
        None | Some("") => Some(None),
        Some(value) => parse_time(value).map(Some),
    }
}

/// One pre-filled line of the download template.
pub struct TemplateRow {
    pub emp_id: u64,
    pub dt_date: NaiveDate,
}

impl Tabular for TemplateRow {
    const HEADERS: &'static [&'static str] = TEMPLATE_HEADERS;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.emp_id.to_string()),
            self.dt_date.into(),
            "08:00".into(),
            "18:00".into(),
            "P".into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::export::{to_csv, to_xlsx};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_valid_lines_and_counts_bad_ones() {
        let data = b"EmpId,Date,InTime,OutTime,Status\n\
            7,2025-09-01,08:05,17:00,P\n\
            ,2025-09-01,08:00,17:00,P\n\
            abc,2025-09-01,08:00,17:00,P\n\
            7,01/09/2025,08:00,17:00,P\n\
            8,2025-09-02,8am,17:00,P\n\
            9,2025-09-02,,,A\n";

        let sheet = parse_sheet(data);
        assert_eq!(sheet.skipped, 4);
        assert_eq!(
            sheet.rows,
            vec![
                ImportRow {
                    emp_id: 7,
                    dt_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
                    in_time: Some(t(8, 5)),
                    out_time: Some(t(17, 0)),
                },
                ImportRow {
                    emp_id: 9,
                    dt_date: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
                    in_time: None,
                    out_time: None,
                },
            ]
        );
    }

    #[test]
    fn short_lines_are_accepted() {
        let sheet = parse_sheet(b"EmpId,Date\n3,2025-09-03\n");
        assert_eq!(sheet.skipped, 0);
        assert_eq!(sheet.rows[0].in_time, None);
    }

    #[test]
    fn header_only_sheet_is_empty() {
        let sheet = parse_sheet(b"EmpId,Date,InTime,OutTime,Status\n");
        assert!(sheet.rows.is_empty());
        assert_eq!(sheet.skipped, 0);
    }

    #[test]
    fn template_round_trips_through_the_parser() {
        let rows = [TemplateRow {
            emp_id: 12,
            dt_date: NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
        }];
        let bytes = to_csv(&rows).unwrap();
        let sheet = parse_sheet(&bytes);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].emp_id, 12);
        assert_eq!(sheet.rows[0].in_time, Some(t(8, 0)));
        assert_eq!(sheet.rows[0].out_time, Some(t(18, 0)));
    }

    #[test]
    fn downloaded_xlsx_template_uploads_cleanly() {
        let rows = [TemplateRow {
            emp_id: 12,
            dt_date: NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
        }];
        let bytes = to_xlsx("AttendanceTemplate", &rows).unwrap();
        let sheet = parse_sheet(&bytes);
        assert_eq!(sheet.skipped, 0);
        assert_eq!(
            sheet.rows,
            vec![ImportRow {
                emp_id: 12,
                dt_date: NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
                in_time: Some(t(8, 0)),
                out_time: Some(t(18, 0)),
            }]
        );
    }

    struct NumericIdRow(i64);

    impl Tabular for NumericIdRow {
        const HEADERS: &'static [&'static str] = TEMPLATE_HEADERS;

        fn cells(&self) -> Vec<Cell> {
            vec![
                Cell::Int(self.0),
                Cell::Text("2025-09-16".into()),
                Cell::Text("09:30".into()),
                Cell::Text(String::new()),
            ]
        }
    }

    #[test]
    fn xlsx_numeric_ids_and_blank_times_are_read() {
        let bytes = to_xlsx("Sheet1", &[NumericIdRow(5), NumericIdRow(0)]).unwrap();
        let sheet = parse_sheet(&bytes);
        assert_eq!(sheet.skipped, 1);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].emp_id, 5);
        assert_eq!(sheet.rows[0].in_time, Some(t(9, 30)));
        assert_eq!(sheet.rows[0].out_time, None);
    }

    #[test]
    fn corrupt_xlsx_yields_no_rows() {
        let sheet = parse_sheet(b"PK\x03\x04not really a zip");
        assert!(sheet.rows.is_empty());
    }
}
