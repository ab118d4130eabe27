use crate::{
    api::company::require_company,
    auth::auth::AuthUser,
    config::Config,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::{
        attendance::{AttStatus, Attendance, AttendanceView},
        shift::Shift,
    },
    utils::{
        attendance_import::{TemplateRow, parse_sheet},
        db_utils::{page_window, parse_time},
        export::{ReportFormat, render},
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlExecutor, MySqlPool, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

const ATTENDANCE_VIEW_SELECT: &str = r#"
    SELECT a.id, a.com_id, a.emp_id, e.emp_code, e.emp_name,
           a.dt_date, a.att_status, a.in_time, a.out_time
    FROM attendances a
    LEFT JOIN employees e ON e.id = a.emp_id
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateAttendance {
    #[schema(example = 1)]
    pub com_id: u64,
    #[schema(example = 7)]
    pub emp_id: u64,
    #[schema(example = "2025-09-01", format = "date", value_type = String)]
    pub dt_date: NaiveDate,
    /// `HH:MM[:SS]`; empty or missing means no punch
    #[schema(example = "08:05")]
    pub in_time: Option<String>,
    #[schema(example = "17:00")]
    pub out_time: Option<String>,
}

/// Omitted fields keep their stored value; an empty time clears it.
#[derive(Deserialize, ToSchema)]
pub struct EditAttendance {
    pub emp_id: Option<u64>,
    #[schema(format = "date", value_type = Option<String>)]
    pub dt_date: Option<NaiveDate>,
    pub in_time: Option<String>,
    pub out_time: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    pub com_id: u64,
    /// Inclusive lower bound
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceView>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UploadQuery {
    /// Company the uploaded rows are recorded for
    pub com_id: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TemplateQuery {
    pub com_id: u64,
    /// `xlsx` (default) or `csv`
    pub format: Option<ReportFormat>,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResult {
    pub inserted: u64,
    pub skipped: u64,
}

/// Shift of an employee plus the company the employee belongs to.
#[derive(Debug, sqlx::FromRow)]
struct EmployeeShift {
    emp_id: u64,
    emp_com_id: u64,
    #[sqlx(flatten)]
    shift: Shift,
}

async fn employee_shift<'c, E>(executor: E, emp_id: u64) -> Result<EmployeeShift, ApiError>
where
    E: MySqlExecutor<'c>,
{
    sqlx::query_as::<_, EmployeeShift>(
        r#"
        SELECT e.id AS emp_id, e.com_id AS emp_com_id,
               s.id, s.com_id, s.shift_name, s.in_time, s.out_time, s.late_time
        FROM employees e
        JOIN shifts s ON s.id = e.shift_id
        WHERE e.id = ?
        "#,
    )
    .bind(emp_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| db_error(e, "Failed to load employee shift"))?
    .ok_or_else(|| ApiError::not_found("Employee not found"))
}

fn optional_time(value: Option<&str>, field: &str) -> Result<Option<NaiveTime>, ApiError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_time(raw)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("'{field}' must be HH:MM or HH:MM:SS"))),
    }
}

fn duplicate_day_or(e: sqlx::Error, context: &'static str) -> ApiError {
    if is_constraint_violation(&e) {
        return ApiError::conflict("Attendance already recorded for this employee and day");
    }
    db_error(e, context)
}

fn now_to_the_second() -> (NaiveDate, NaiveTime) {
    let now = Local::now().naive_local();
    let time = now.time();
    (now.date(), time.with_nanosecond(0).unwrap_or(time))
}

#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = CreateAttendance,
    responses(
        (status = 201, description = "Attendance recorded; status derived from the shift", body = Object,
            example = json!({"id": 10, "att_status": "P"})),
        (status = 400, description = "Employee of another company or malformed time"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Already recorded for that day")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_create", skip(auth, pool, config, payload), fields(emp_id = payload.emp_id))]
pub async fn create_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateAttendance>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let in_time = optional_time(payload.in_time.as_deref(), "in_time")?;
    let out_time = optional_time(payload.out_time.as_deref(), "out_time")?;

    let EmployeeShift { emp_com_id, shift, .. } = employee_shift(pool.get_ref(), payload.emp_id).await?;
    if emp_com_id != payload.com_id {
        return Err(ApiError::bad_request("Employee does not belong to this company").into());
    }

    let status = AttStatus::derive(&shift, config.grace_minutes, in_time, out_time);

    let id = sqlx::query(
        r#"
        INSERT INTO attendances (com_id, emp_id, dt_date, att_status, in_time, out_time)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.com_id)
    .bind(payload.emp_id)
    .bind(payload.dt_date)
    .bind(status.as_ref())
    .bind(in_time)
    .bind(out_time)
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_day_or(e, "Failed to create attendance"))?
    .last_insert_id();

    info!(attendance_id = id, status = %status, "Attendance recorded");
    Ok(HttpResponse::Created().json(json!({ "id": id, "att_status": status })))
}

#[utoipa::path(
    put,
    path = "/api/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance id")),
    request_body = EditAttendance,
    responses(
        (status = 200, description = "Attendance updated and status re-derived", body = Object,
            example = json!({"id": 10, "att_status": "L"})),
        (status = 404, description = "Attendance or employee not found"),
        (status = 409, description = "Employee already has a record for that day")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_edit", skip(auth, pool, config, payload))]
pub async fn edit_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: web::Json<EditAttendance>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let current = sqlx::query_as::<_, Attendance>("SELECT * FROM attendances WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch attendance"))?
        .ok_or_else(|| ApiError::not_found("Attendance not found"))?;

    let emp_id = payload.emp_id.unwrap_or(current.emp_id);
    let dt_date = payload.dt_date.unwrap_or(current.dt_date);
    let in_time = match &payload.in_time {
        Some(raw) => optional_time(Some(raw), "in_time")?,
        None => current.in_time,
    };
    let out_time = match &payload.out_time {
        Some(raw) => optional_time(Some(raw), "out_time")?,
        None => current.out_time,
    };

    // company always follows the employee
    let EmployeeShift { emp_com_id, shift, .. } = employee_shift(pool.get_ref(), emp_id).await?;
    let status = AttStatus::derive(&shift, config.grace_minutes, in_time, out_time);

    sqlx::query(
        r#"
        UPDATE attendances
        SET com_id = ?, emp_id = ?, dt_date = ?, att_status = ?, in_time = ?, out_time = ?
        WHERE id = ?
        "#,
    )
    .bind(emp_com_id)
    .bind(emp_id)
    .bind(dt_date)
    .bind(status.as_ref())
    .bind(in_time)
    .bind(out_time)
    .bind(id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_day_or(e, "Failed to update attendance"))?;

    Ok(HttpResponse::Ok().json(json!({ "id": id, "att_status": status })))
}

#[utoipa::path(
    get,
    path = "/api/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance id")),
    responses(
        (status = 200, description = "Attendance", body = AttendanceView),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_attendance(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let sql = format!("{ATTENDANCE_VIEW_SELECT} WHERE a.id = ?");
    let row = sqlx::query_as::<_, AttendanceView>(&sql)
        .bind(path.into_inner())
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch attendance"))?
        .ok_or_else(|| ApiError::not_found("Attendance not found"))?;

    Ok(HttpResponse::Ok().json(row))
}

#[utoipa::path(
    delete,
    path = "/api/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance id")),
    responses(
        (status = 204, description = "Attendance deleted"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn delete_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let result = sqlx::query("DELETE FROM attendances WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to delete attendance"))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Attendance not found").into());
    }
    Ok(HttpResponse::NoContent().finish())
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, query: &AttendanceQuery) {
    qb.push(" WHERE a.com_id = ").push_bind(query.com_id);
    if let Some(from) = query.from {
        qb.push(" AND a.dt_date >= ").push_bind(from);
    }
    if let Some(to) = query.to {
        qb.push(" AND a.dt_date <= ").push_bind(to);
    }
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Attendance of a company, newest first", body = AttendanceListResponse),
        (status = 400, description = "from is after to")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<impl Responder> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::bad_request("'from' must not be after 'to'").into());
        }
    }
    let (page, per_page, offset) = page_window(query.page, query.per_page);

    let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM attendances a");
    push_filters(&mut count_qb, &query);
    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to count attendance"))?;

    let mut data_qb = QueryBuilder::<MySql>::new(ATTENDANCE_VIEW_SELECT);
    push_filters(&mut data_qb, &query);
    data_qb
        .push(" ORDER BY a.dt_date DESC, e.emp_name LIMIT ")
        .push_bind(per_page as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);
    debug!(sql = %data_qb.sql(), page, per_page, "Fetching attendance");

    let data = data_qb
        .build_query_as::<AttendanceView>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch attendance"))?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    responses(
        (status = 200, description = "Checked in successfully", body = Object, example = json!({
            "message": "Checked in successfully"
        })),
        (status = 403, description = "No employee profile"),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "message": "Attendance already recorded for this employee and day"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let EmployeeShift { emp_com_id, shift, .. } = employee_shift(pool.get_ref(), employee_id).await?;

    let (today, now) = now_to_the_second();
    // absent until the check-out completes the day
    let status = AttStatus::derive(&shift, config.grace_minutes, Some(now), None);

    sqlx::query(
        r#"
        INSERT INTO attendances (com_id, emp_id, dt_date, att_status, in_time)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(emp_com_id)
    .bind(employee_id)
    .bind(today)
    .bind(status.as_ref())
    .bind(now)
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_day_or(e, "Check-in failed"))?;

    info!(employee_id, in_time = %now, "Checked in");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Checked in successfully"
    })))
}

/// Check-out endpoint
#[utoipa::path(
    put,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = Object, example = json!({
            "message": "Checked out successfully",
            "att_status": "P"
        })),
        (status = 400, description = "No active check-in found for today", body = Object, example = json!({
            "message": "No active check-in found for today"
        })),
        (status = 403, description = "No employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let EmployeeShift { shift, .. } = employee_shift(pool.get_ref(), employee_id).await?;
    let (today, now) = now_to_the_second();

    let open = sqlx::query_as::<_, (u64, Option<NaiveTime>)>(
        r#"
        SELECT id, in_time
        FROM attendances
        WHERE emp_id = ? AND dt_date = ? AND out_time IS NULL
        "#,
    )
    .bind(employee_id)
    .bind(today)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| db_error(e, "Check-out lookup failed"))?;

    let Some((attendance_id, in_time)) = open else {
        return Err(ApiError::bad_request("No active check-in found for today").into());
    };

    let status = AttStatus::derive(&shift, config.grace_minutes, in_time, Some(now));

    sqlx::query("UPDATE attendances SET out_time = ?, att_status = ? WHERE id = ?")
        .bind(now)
        .bind(status.as_ref())
        .bind(attendance_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Check-out failed"))?;

    info!(employee_id, out_time = %now, status = %status, "Checked out");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Checked out successfully",
        "att_status": status
    })))
}

/// Bulk upload of `EmpId,Date,InTime,OutTime,Status` lines as CSV or as the
/// XLSX template
#[utoipa::path(
    post,
    path = "/api/attendance/upload",
    params(UploadQuery),
    request_body(content = String, description = "CSV text or an XLSX workbook",
        content_type = "text/csv",
        example = "EmpId,Date,InTime,OutTime,Status\n7,2025-09-01,08:00,18:00,P\n"),
    responses(
        (status = 200, description = "Rows recorded", body = UploadResult),
        (status = 400, description = "No valid rows in the upload"),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(name = "attendance_upload", skip(auth, pool, config, body), fields(bytes = body.len()))]
pub async fn upload_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    if body.is_empty() {
        return Err(ApiError::bad_request("Please upload a non-empty attendance file").into());
    }
    require_company(pool.get_ref(), query.com_id).await?;

    let sheet = parse_sheet(&body);

    let shifts: HashMap<u64, Shift> = sqlx::query_as::<_, EmployeeShift>(
        r#"
        SELECT e.id AS emp_id, e.com_id AS emp_com_id,
               s.id, s.com_id, s.shift_name, s.in_time, s.out_time, s.late_time
        FROM employees e
        JOIN shifts s ON s.id = e.shift_id
        WHERE e.com_id = ?
        "#,
    )
    .bind(query.com_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| db_error(e, "Failed to load employee shifts"))?
    .into_iter()
    .map(|row| (row.emp_id, row.shift))
    .collect();

    let (known, unknown): (Vec<_>, Vec<_>) = sheet
        .rows
        .into_iter()
        .partition(|row| shifts.contains_key(&row.emp_id));

    if known.is_empty() {
        return Err(ApiError::bad_request("No valid attendance rows found in the upload").into());
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| db_error(e, "Failed to start transaction"))?;

    let mut inserted = 0u64;
    for row in &known {
        let Some(shift) = shifts.get(&row.emp_id) else {
            continue;
        };
        let status = AttStatus::derive(shift, config.grace_minutes, row.in_time, row.out_time);

        // an existing (employee, day) record wins
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO attendances (com_id, emp_id, dt_date, att_status, in_time, out_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(query.com_id)
        .bind(row.emp_id)
        .bind(row.dt_date)
        .bind(status.as_ref())
        .bind(row.in_time)
        .bind(row.out_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(e, "Failed to insert uploaded attendance"))?;

        inserted += result.rows_affected();
    }

    tx.commit()
        .await
        .map_err(|e| db_error(e, "Failed to commit attendance upload"))?;

    let skipped = (sheet.skipped + unknown.len()) as u64 + (known.len() as u64 - inserted);
    if skipped > 0 {
        warn!(skipped, "Some uploaded attendance rows were skipped");
    }
    info!(inserted, com_id = query.com_id, "Attendance upload complete");

    Ok(HttpResponse::Ok().json(UploadResult { inserted, skipped }))
}

#[utoipa::path(
    get,
    path = "/api/attendance/template",
    params(TemplateQuery),
    responses(
        (status = 200, description = "Pre-filled upload sheet, one line per employee"),
        (status = 400, description = "Company has no employees")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn download_template(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TemplateQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_ids: Vec<u64> =
        sqlx::query_scalar("SELECT id FROM employees WHERE com_id = ? ORDER BY id")
            .bind(query.com_id)
            .fetch_all(pool.get_ref())
            .await
            .map_err(|e| db_error(e, "Failed to list employees for template"))?;

    if employee_ids.is_empty() {
        return Err(ApiError::bad_request("No employees found for this company.").into());
    }

    let today = Local::now().date_naive();
    let rows: Vec<TemplateRow> = employee_ids
        .into_iter()
        .map(|emp_id| TemplateRow {
            emp_id,
            dt_date: today,
        })
        .collect();

    let format = match query.format {
        Some(ReportFormat::Csv) => ReportFormat::Csv,
        _ => ReportFormat::Xlsx,
    };

    Ok(render(format, "AttendanceTemplate", &rows, ())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_time_treats_blank_as_missing() {
        assert_eq!(optional_time(None, "in_time").unwrap(), None);
        assert_eq!(optional_time(Some("  "), "in_time").unwrap(), None);
        assert_eq!(
            optional_time(Some("08:10"), "in_time").unwrap(),
            NaiveTime::from_hms_opt(8, 10, 0)
        );
    }

    #[test]
    fn optional_time_names_bad_field() {
        let err = optional_time(Some("noon"), "out_time").unwrap_err();
        assert!(err.to_string().contains("out_time"));
    }

    #[test]
    fn clock_is_truncated_to_seconds() {
        let (_, now) = now_to_the_second();
        assert_eq!(now.nanosecond(), 0);
    }
}
