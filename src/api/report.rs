use crate::{
    api::{company::require_company, employee::EMPLOYEE_VIEW_SELECT, salary::SALARY_VIEW_SELECT},
    auth::auth::AuthUser,
    error::{ApiError, db_error},
    model::{employee::EmployeeView, salary::SalaryView},
    utils::export::{Cell, ReportFormat, Tabular, render},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

const NOT_ASSIGNED: &str = "N/A";

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeReportQuery {
    pub com_id: u64,
    pub dept_id: Option<u64>,
    /// `json` (default), `csv` or `xlsx`
    pub format: Option<ReportFormat>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceReportQuery {
    pub com_id: u64,
    pub dept_id: Option<u64>,
    #[param(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[param(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub format: Option<ReportFormat>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SalaryReportQuery {
    pub com_id: u64,
    pub year: i32,
    pub month: i32,
    pub dept_id: Option<u64>,
    pub is_paid: Option<bool>,
    pub format: Option<ReportFormat>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeReportRow {
    pub emp_name: String,
    pub emp_code: String,
    #[schema(value_type = String, format = "date")]
    pub dt_join: NaiveDate,
    /// Days from joining until today
    pub service_days: i64,
    pub dept_name: String,
    pub desig_name: String,
    pub shift_name: String,
}

impl EmployeeReportRow {
    fn from_view(view: EmployeeView, today: NaiveDate) -> Self {
        let or_na = |name: Option<String>| name.unwrap_or_else(|| NOT_ASSIGNED.to_string());
        Self {
            service_days: (today - view.dt_join).num_days(),
            emp_name: view.emp_name,
            emp_code: view.emp_code,
            dt_join: view.dt_join,
            dept_name: or_na(view.dept_name),
            desig_name: or_na(view.desig_name),
            shift_name: or_na(view.shift_name),
        }
    }
}

impl Tabular for EmployeeReportRow {
    const HEADERS: &'static [&'static str] = &[
        "Name",
        "Code",
        "Join Date",
        "Service Days",
        "Department",
        "Designation",
        "Shift",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.emp_name.clone().into(),
            self.emp_code.clone().into(),
            self.dt_join.into(),
            self.service_days.into(),
            self.dept_name.clone().into(),
            self.desig_name.clone().into(),
            self.shift_name.clone().into(),
        ]
    }
}

/// Raw per-employee counts over a date range.
#[derive(Debug, sqlx::FromRow)]
struct AttendanceCounts {
    emp_code: String,
    emp_name: String,
    dept_name: Option<String>,
    attended: i64,
    late: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceReportRow {
    pub emp_code: String,
    pub emp_name: String,
    pub dept_name: String,
    /// Present and late days together
    pub present: i64,
    pub late: i64,
    pub absent: i64,
}

impl AttendanceReportRow {
    fn from_counts(counts: AttendanceCounts, total_days: i64) -> Self {
        Self {
            absent: (total_days - counts.attended).max(0),
            present: counts.attended,
            late: counts.late,
            emp_code: counts.emp_code,
            emp_name: counts.emp_name,
            dept_name: counts.dept_name.unwrap_or_else(|| NOT_ASSIGNED.to_string()),
        }
    }
}

impl Tabular for AttendanceReportRow {
    const HEADERS: &'static [&'static str] =
        &["Code", "Name", "Department", "Present", "Late", "Absent"];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.emp_code.clone().into(),
            self.emp_name.clone().into(),
            self.dept_name.clone().into(),
            self.present.into(),
            self.late.into(),
            self.absent.into(),
        ]
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceReport {
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub total_days: i64,
    pub rows: Vec<AttendanceReportRow>,
}

impl Tabular for SalaryView {
    const HEADERS: &'static [&'static str] = &[
        "Code",
        "Name",
        "Department",
        "Gross",
        "Basic",
        "House Rent",
        "Medical",
        "Absent Days",
        "Absent Amount",
        "Payable",
        "Paid",
        "Paid Amount",
    ];

    fn cells(&self) -> Vec<Cell> {
        let text = |value: &Option<String>| Cell::from(value.clone().unwrap_or_default());
        vec![
            text(&self.emp_code),
            text(&self.emp_name),
            text(&self.dept_name),
            self.gross.into(),
            self.basic.into(),
            self.hrent.into(),
            self.medical.into(),
            i64::from(self.absent_days).into(),
            self.absent_amount.into(),
            self.payable_amount.into(),
            Cell::from(if self.is_paid { "Yes" } else { "No" }),
            self.paid_amount.into(),
        ]
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalaryReport {
    pub rows: Vec<SalaryView>,
    #[schema(value_type = String)]
    pub total_payable: Decimal,
    #[schema(value_type = String)]
    pub total_paid: Decimal,
}

/// Inclusive number of days in `from..=to`.
fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days() + 1
}

#[utoipa::path(
    get,
    path = "/api/reports/employees",
    params(EmployeeReportQuery),
    responses(
        (status = 200, description = "Employee list as JSON, CSV or XLSX", body = [EmployeeReportRow]),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn employee_report(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeReportQuery>,
) -> actix_web::Result<impl Responder> {
    require_company(pool.get_ref(), query.com_id).await?;

    let mut qb = QueryBuilder::<MySql>::new(EMPLOYEE_VIEW_SELECT);
    qb.push(" WHERE e.com_id = ").push_bind(query.com_id);
    if let Some(dept_id) = query.dept_id {
        qb.push(" AND e.dept_id = ").push_bind(dept_id);
    }
    qb.push(" ORDER BY e.emp_name");

    let views = qb
        .build_query_as::<EmployeeView>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to load employee report"))?;

    let today = Local::now().date_naive();
    let rows: Vec<EmployeeReportRow> = views
        .into_iter()
        .map(|view| EmployeeReportRow::from_view(view, today))
        .collect();

    debug!(com_id = query.com_id, rows = rows.len(), "Employee report built");
    Ok(render(query.format.unwrap_or_default(), "EmployeeList", &rows, &rows)?)
}

#[utoipa::path(
    get,
    path = "/api/reports/attendance",
    params(AttendanceReportQuery),
    responses(
        (status = 200, description = "Attendance counts per employee", body = AttendanceReport),
        (status = 400, description = "from is after to"),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn attendance_report(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceReportQuery>,
) -> actix_web::Result<impl Responder> {
    if query.from > query.to {
        return Err(ApiError::bad_request("'from' must not be after 'to'").into());
    }
    require_company(pool.get_ref(), query.com_id).await?;

    let mut qb = QueryBuilder::<MySql>::new(
        r#"
        SELECT e.emp_code, e.emp_name, d.dept_name,
               CAST(COALESCE(SUM(a.att_status IN ('P', 'L')), 0) AS SIGNED) AS attended,
               CAST(COALESCE(SUM(a.att_status = 'L'), 0) AS SIGNED) AS late
        FROM employees e
        LEFT JOIN departments d ON d.id = e.dept_id
        LEFT JOIN attendances a ON a.emp_id = e.id AND a.dt_date BETWEEN
        "#,
    );
    qb.push_bind(query.from)
        .push(" AND ")
        .push_bind(query.to)
        .push(" WHERE e.com_id = ")
        .push_bind(query.com_id);
    if let Some(dept_id) = query.dept_id {
        qb.push(" AND e.dept_id = ").push_bind(dept_id);
    }
    qb.push(" GROUP BY e.id, e.emp_code, e.emp_name, d.dept_name ORDER BY e.emp_name");

    let counts = qb
        .build_query_as::<AttendanceCounts>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to load attendance report"))?;

    let total_days = days_between(query.from, query.to);
    let rows: Vec<AttendanceReportRow> = counts
        .into_iter()
        .map(|c| AttendanceReportRow::from_counts(c, total_days))
        .collect();

    let format = query.format.unwrap_or_default();
    if format != ReportFormat::Json {
        return Ok(render(format, "AttendanceReport", &rows, ())?);
    }

    Ok(HttpResponse::Ok().json(AttendanceReport {
        from: query.from,
        to: query.to,
        total_days,
        rows,
    }))
}

#[utoipa::path(
    get,
    path = "/api/reports/salary",
    params(SalaryReportQuery),
    responses(
        (status = 200, description = "Salary sheet for a month", body = SalaryReport),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn salary_report(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SalaryReportQuery>,
) -> actix_web::Result<impl Responder> {
    require_company(pool.get_ref(), query.com_id).await?;

    let mut qb = QueryBuilder::<MySql>::new(SALARY_VIEW_SELECT);
    qb.push(" WHERE s.com_id = ")
        .push_bind(query.com_id)
        .push(" AND s.dt_year = ")
        .push_bind(query.year)
        .push(" AND s.dt_month = ")
        .push_bind(query.month);
    if let Some(dept_id) = query.dept_id {
        qb.push(" AND e.dept_id = ").push_bind(dept_id);
    }
    if let Some(is_paid) = query.is_paid {
        qb.push(" AND s.is_paid = ").push_bind(is_paid);
    }
    qb.push(" ORDER BY e.emp_name");

    let rows = qb
        .build_query_as::<SalaryView>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to load salary report"))?;

    let format = query.format.unwrap_or_default();
    if format != ReportFormat::Json {
        return Ok(render(format, "SalarySheet", &rows, ())?);
    }

    let total_payable = rows.iter().map(|r| r.payable_amount).sum();
    let total_paid = rows.iter().map(|r| r.paid_amount).sum();
    Ok(HttpResponse::Ok().json(SalaryReport {
        rows,
        total_payable,
        total_paid,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn range_is_inclusive() {
        assert_eq!(days_between(date(2025, 9, 1), date(2025, 9, 30)), 30);
        assert_eq!(days_between(date(2025, 9, 1), date(2025, 9, 1)), 1);
    }

    #[test]
    fn absent_is_range_minus_attended() {
        let counts = AttendanceCounts {
            emp_code: "E1".into(),
            emp_name: "Rahim".into(),
            dept_name: None,
            attended: 18,
            late: 3,
        };
        let row = AttendanceReportRow::from_counts(counts, 22);
        assert_eq!((row.present, row.late, row.absent), (18, 3, 4));
        assert_eq!(row.dept_name, NOT_ASSIGNED);
    }

    #[test]
    fn employee_row_fills_missing_names() {
        let view = EmployeeView {
            id: 1,
            com_id: 1,
            emp_code: "E1".into(),
            emp_name: "Karim".into(),
            com_name: Some("Acme".into()),
            shift_id: 1,
            shift_name: None,
            dept_id: 1,
            dept_name: Some("Sewing".into()),
            desig_id: 1,
            desig_name: Some("Operator".into()),
            gender: "male".into(),
            gross: dec!(20000),
            basic: dec!(10000),
            hrent: dec!(6000),
            medical: dec!(3000),
            others: dec!(1000),
            dt_join: date(2025, 1, 1),
        };

        let row = EmployeeReportRow::from_view(view, date(2025, 1, 31));
        assert_eq!(row.service_days, 30);
        assert_eq!(row.shift_name, NOT_ASSIGNED);
        assert_eq!(row.dept_name, "Sewing");
        assert_eq!(row.cells().len(), EmployeeReportRow::HEADERS.len());
    }

    #[test]
    fn salary_sheet_columns_line_up() {
        let view = SalaryView {
            id: 1,
            com_id: 1,
            com_name: None,
            emp_id: 2,
            emp_code: Some("E2".into()),
            emp_name: None,
            dept_name: None,
            dt_year: 2025,
            dt_month: 9,
            gross: dec!(30000),
            basic: dec!(15000),
            hrent: dec!(9000),
            medical: dec!(4500),
            absent_days: 1,
            absent_amount: dec!(1000),
            payable_amount: dec!(29000),
            is_paid: true,
            paid_amount: dec!(29000),
        };
        let cells = view.cells();
        assert_eq!(cells.len(), SalaryView::HEADERS.len());
        assert_eq!(cells[1], Cell::Text(String::new()));
        assert_eq!(cells[10], Cell::Text("Yes".into()));
    }
}
