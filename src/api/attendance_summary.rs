use crate::{
    api::company::require_company,
    auth::auth::AuthUser,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::{
        attendance::AttStatus,
        attendance_summary::{AttendanceSummaryView, MonthPeriod, summarize_month},
    },
    utils::db_utils::{Column, ColumnKind, UpdatableTable, build_update_sql, execute_update},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use std::str::FromStr;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

const SUMMARY_UPDATE: UpdatableTable = UpdatableTable {
    table: "attendance_summaries",
    columns: &[
        Column::new("present", ColumnKind::Count),
        Column::new("late", ColumnKind::Count),
        Column::new("absent", ColumnKind::Count),
    ],
};

const SUMMARY_VIEW_SELECT: &str = r#"
    SELECT s.id, s.com_id, s.emp_id, e.emp_code, e.emp_name,
           s.dt_year, s.dt_month, s.present, s.late, s.absent
    FROM attendance_summaries s
    LEFT JOIN employees e ON e.id = s.emp_id
"#;

const SUMMARY_EXISTS: &str = "Summary already exists for the selected company and month.";

fn duplicate_month_or(e: sqlx::Error, context: &'static str) -> ApiError {
    if is_constraint_violation(&e) {
        return ApiError::conflict(SUMMARY_EXISTS);
    }
    db_error(e, context)
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateSummary {
    #[schema(example = 1)]
    pub com_id: u64,
    /// Month picker value
    #[schema(example = "2025-09")]
    pub month: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SummaryQuery {
    pub com_id: u64,
    pub year: Option<i32>,
    pub month: Option<i32>,
}

#[utoipa::path(
    post,
    path = "/api/attendance-summary/generate",
    request_body = GenerateSummary,
    responses(
        (status = 201, description = "Summaries written", body = Object, example = json!({"generated": 42})),
        (status = 400, description = "Bad month or no employees joined by month end"),
        (status = 404, description = "Company not found"),
        (status = 409, description = "Summary already exists for the company and month")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Summary"
)]
#[instrument(name = "summary_generate", skip(auth, pool, payload), fields(com_id = payload.com_id, month = %payload.month))]
pub async fn generate_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<GenerateSummary>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    require_company(pool.get_ref(), payload.com_id).await?;
    let period = MonthPeriod::parse(&payload.month)
        .ok_or_else(|| ApiError::bad_request("Invalid month format, expected YYYY-MM"))?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| db_error(e, "Failed to start transaction"))?;

    let existing: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM attendance_summaries
        WHERE com_id = ? AND dt_year = ? AND dt_month = ?
        "#,
    )
    .bind(payload.com_id)
    .bind(period.year())
    .bind(period.month() as i32)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| db_error(e, "Failed to check existing summaries"))?;

    if existing > 0 {
        return Err(ApiError::conflict(SUMMARY_EXISTS).into());
    }

    let employees: Vec<(u64, NaiveDate)> = sqlx::query_as(
        "SELECT id, dt_join FROM employees WHERE com_id = ? AND dt_join <= ? ORDER BY id",
    )
    .bind(payload.com_id)
    .bind(period.last_day())
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| db_error(e, "Failed to load employees"))?;

    if employees.is_empty() {
        return Err(ApiError::bad_request("No employees joined by the end of this month").into());
    }

    let raw: Vec<(u64, String)> = sqlx::query_as(
        r#"
        SELECT a.emp_id, a.att_status
        FROM attendances a
        JOIN employees e ON e.id = a.emp_id
        WHERE e.com_id = ? AND a.dt_date BETWEEN ? AND ?
        "#,
    )
    .bind(payload.com_id)
    .bind(period.first_day())
    .bind(period.last_day())
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| db_error(e, "Failed to load attendance"))?;

    let records: Vec<(u64, AttStatus)> = raw
        .into_iter()
        .filter_map(|(emp_id, code)| match AttStatus::from_str(&code) {
            Ok(status) => Some((emp_id, status)),
            Err(_) => {
                warn!(emp_id, code = %code, "Ignoring unknown attendance code");
                None
            }
        })
        .collect();

    let tallies = summarize_month(&period, &employees, &records);

    for (emp_id, tally) in &tallies {
        sqlx::query(
            r#"
            INSERT INTO attendance_summaries
            (com_id, emp_id, dt_year, dt_month, present, late, absent)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payload.com_id)
        .bind(emp_id)
        .bind(period.year())
        .bind(period.month() as i32)
        .bind(tally.present as i32)
        .bind(tally.late as i32)
        .bind(tally.absent as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_month_or(e, "Failed to insert attendance summary"))?;
    }

    tx.commit()
        .await
        .map_err(|e| db_error(e, "Failed to commit attendance summaries"))?;

    info!(generated = tallies.len(), "Attendance summaries generated");
    Ok(HttpResponse::Created().json(json!({ "generated": tallies.len() })))
}

#[utoipa::path(
    get,
    path = "/api/attendance-summary",
    params(SummaryQuery),
    responses((status = 200, description = "Summaries of a company", body = [AttendanceSummaryView])),
    security(("bearer_auth" = [])),
    tag = "Attendance Summary"
)]
pub async fn list_summaries(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SummaryQuery>,
) -> actix_web::Result<impl Responder> {
    let mut qb = QueryBuilder::<MySql>::new(SUMMARY_VIEW_SELECT);
    qb.push(" WHERE s.com_id = ").push_bind(query.com_id);
    if let Some(year) = query.year {
        qb.push(" AND s.dt_year = ").push_bind(year);
    }
    if let Some(month) = query.month {
        qb.push(" AND s.dt_month = ").push_bind(month);
    }
    qb.push(" ORDER BY s.dt_year DESC, s.dt_month DESC, e.emp_name");

    let rows = qb
        .build_query_as::<AttendanceSummaryView>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to list attendance summaries"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/attendance-summary/{id}",
    params(("id" = u64, Path, description = "Summary id")),
    responses(
        (status = 200, description = "Summary", body = AttendanceSummaryView),
        (status = 404, description = "Attendance summary not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Summary"
)]
pub async fn get_summary(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let sql = format!("{SUMMARY_VIEW_SELECT} WHERE s.id = ?");
    let row = sqlx::query_as::<_, AttendanceSummaryView>(&sql)
        .bind(path.into_inner())
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch attendance summary"))?
        .ok_or_else(|| ApiError::not_found("Attendance summary not found"))?;

    Ok(HttpResponse::Ok().json(row))
}

#[utoipa::path(
    put,
    path = "/api/attendance-summary/{id}",
    params(("id" = u64, Path, description = "Summary id")),
    request_body(content = Object, example = json!({"present": 20, "late": 2, "absent": 8})),
    responses(
        (status = 200, description = "Summary updated"),
        (status = 400, description = "Unknown field or negative count"),
        (status = 404, description = "Attendance summary not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Summary"
)]
pub async fn edit_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let update = build_update_sql(&SUMMARY_UPDATE, &payload, id)?;

    let found: Option<u64> = sqlx::query_scalar("SELECT id FROM attendance_summaries WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to look up attendance summary"))?;
    if found.is_none() {
        return Err(ApiError::not_found("Attendance summary not found").into());
    }

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| db_error(e, "Failed to update attendance summary"))?;

    info!(summary_id = id, "Attendance summary updated");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Attendance summary updated successfully!"
    })))
}

#[utoipa::path(
    delete,
    path = "/api/attendance-summary/{id}",
    params(("id" = u64, Path, description = "Summary id")),
    responses(
        (status = 204, description = "Summary deleted"),
        (status = 404, description = "Attendance summary not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Summary"
)]
pub async fn delete_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let result = sqlx::query("DELETE FROM attendance_summaries WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to delete attendance summary"))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Attendance summary not found").into());
    }
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::duplicate_key;

    #[test]
    fn concurrent_duplicate_insert_is_a_conflict() {
        let err = duplicate_month_or(duplicate_key(), "insert");
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(err.to_string(), SUMMARY_EXISTS);

        let err = duplicate_month_or(sqlx::Error::RowNotFound, "insert");
        assert!(matches!(err, ApiError::Internal));
    }

    #[test]
    fn summary_edit_accepts_only_counts() {
        assert!(build_update_sql(&SUMMARY_UPDATE, &json!({"present": 20}), 1).is_ok());
        assert!(build_update_sql(&SUMMARY_UPDATE, &json!({"present": -1}), 1).is_err());
        assert!(build_update_sql(&SUMMARY_UPDATE, &json!({"emp_id": 3}), 1).is_err());
    }
}
