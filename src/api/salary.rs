use crate::{
    api::company::require_company,
    auth::auth::AuthUser,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::{
        attendance_summary::MonthPeriod,
        salary::{PayCalculation, SalaryView, paid_amount_for},
    },
};
use actix_web::{HttpResponse, Responder, web};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

pub(crate) const SALARY_VIEW_SELECT: &str = r#"
    SELECT s.id, s.com_id, c.com_name, s.emp_id, e.emp_code, e.emp_name, d.dept_name,
           s.dt_year, s.dt_month, s.gross, s.basic, s.hrent, s.medical,
           s.absent_days, s.absent_amount, s.payable_amount, s.is_paid, s.paid_amount
    FROM salaries s
    LEFT JOIN companies c ON c.id = s.com_id
    LEFT JOIN employees e ON e.id = s.emp_id
    LEFT JOIN departments d ON d.id = e.dept_id
"#;

fn duplicate_month_or(e: sqlx::Error, context: &'static str) -> ApiError {
    if is_constraint_violation(&e) {
        return ApiError::conflict("Salary already generated for this month");
    }
    db_error(e, context)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateSalary {
    #[schema(example = 1)]
    pub com_id: u64,
    #[schema(example = 2025)]
    pub year: i32,
    #[schema(example = 9)]
    pub month: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResult {
    pub inserted: usize,
    /// Eligible employees without an attendance summary for the month
    pub skipped: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SalaryQuery {
    pub com_id: u64,
    pub year: i32,
    pub month: i32,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MonthQuery {
    pub year: i32,
    pub month: i32,
}

/// One employee's inputs for salary generation.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PayInput {
    emp_id: u64,
    gross: Decimal,
    basic: Decimal,
    hrent: Decimal,
    medical: Decimal,
}

#[derive(Debug, PartialEq)]
struct SalaryLine {
    emp_id: u64,
    gross: Decimal,
    basic: Decimal,
    hrent: Decimal,
    medical: Decimal,
    absent_days: u32,
    calc: PayCalculation,
}

/// Pairs employees with their absent days; those without a summary are
/// returned separately.
fn plan_salaries(
    employees: &[PayInput],
    absent_days: &HashMap<u64, u32>,
    days_in_month: u32,
) -> (Vec<SalaryLine>, Vec<u64>) {
    let mut lines = Vec::with_capacity(employees.len());
    let mut missing = Vec::new();

    for emp in employees {
        let Some(&absent) = absent_days.get(&emp.emp_id) else {
            missing.push(emp.emp_id);
            continue;
        };
        lines.push(SalaryLine {
            emp_id: emp.emp_id,
            gross: emp.gross,
            basic: emp.basic,
            hrent: emp.hrent,
            medical: emp.medical,
            absent_days: absent,
            calc: PayCalculation::compute(emp.gross, absent, days_in_month),
        });
    }

    (lines, missing)
}

#[utoipa::path(
    post,
    path = "/api/salary/generate",
    request_body = GenerateSalary,
    responses(
        (status = 201, description = "Salaries generated", body = GenerateResult),
        (status = 400, description = "Bad month, no salaried employees, no summary or nothing inserted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Company not found"),
        (status = 409, description = "Salaries already generated for the month")
    ),
    security(("bearer_auth" = [])),
    tag = "Salary"
)]
#[instrument(name = "salary_generate", skip(auth, pool, payload), fields(com_id = payload.com_id, year = payload.year, month = payload.month))]
pub async fn generate_salary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<GenerateSalary>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let period = MonthPeriod::new(payload.year, payload.month)
        .ok_or_else(|| ApiError::bad_request("Invalid year or month"))?;
    require_company(pool.get_ref(), payload.com_id).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| db_error(e, "Failed to start transaction"))?;

    let employees: Vec<PayInput> = sqlx::query_as(
        r#"
        SELECT id AS emp_id, gross, basic, hrent, medical
        FROM employees
        WHERE com_id = ? AND basic > 0
        ORDER BY id
        "#,
    )
    .bind(payload.com_id)
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| db_error(e, "Failed to load employees"))?;

    if employees.is_empty() {
        return Err(ApiError::bad_request("No employees with a basic salary found").into());
    }

    let summaries: Vec<(u64, i32)> = sqlx::query_as(
        r#"
        SELECT emp_id, absent FROM attendance_summaries
        WHERE com_id = ? AND dt_year = ? AND dt_month = ?
        "#,
    )
    .bind(payload.com_id)
    .bind(period.year())
    .bind(period.month() as i32)
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| db_error(e, "Failed to load attendance summaries"))?;

    if summaries.is_empty() {
        return Err(ApiError::bad_request(
            "Attendance summary must be generated before salaries for this month",
        )
        .into());
    }

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM salaries WHERE com_id = ? AND dt_year = ? AND dt_month = ?",
    )
    .bind(payload.com_id)
    .bind(period.year())
    .bind(period.month() as i32)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| db_error(e, "Failed to check existing salaries"))?;

    if existing > 0 {
        return Err(ApiError::conflict(format!(
            "Salary already generated for this month ({existing} records)"
        ))
        .into());
    }

    let absent_days: HashMap<u64, u32> = summaries
        .into_iter()
        .map(|(emp_id, absent)| (emp_id, absent.max(0) as u32))
        .collect();

    let (lines, missing) = plan_salaries(&employees, &absent_days, period.days());
    if !missing.is_empty() {
        warn!(count = missing.len(), ?missing, "Employees without attendance summary skipped");
    }
    if lines.is_empty() {
        return Err(ApiError::bad_request("No salary rows were generated").into());
    }

    for line in &lines {
        debug!(emp_id = line.emp_id, rate = %line.calc.per_day_rate, absent = line.absent_days, "Salary line");
        sqlx::query(
            r#"
            INSERT INTO salaries
            (com_id, emp_id, dt_year, dt_month, gross, basic, hrent, medical,
             absent_days, absent_amount, payable_amount, is_paid, paid_amount)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE, 0)
            "#,
        )
        .bind(payload.com_id)
        .bind(line.emp_id)
        .bind(period.year())
        .bind(period.month() as i32)
        .bind(line.gross)
        .bind(line.basic)
        .bind(line.hrent)
        .bind(line.medical)
        .bind(line.absent_days as i32)
        .bind(line.calc.absent_amount)
        .bind(line.calc.payable_amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_month_or(e, "Failed to insert salary"))?;
    }

    tx.commit()
        .await
        .map_err(|e| db_error(e, "Failed to commit salaries"))?;

    info!(inserted = lines.len(), skipped = missing.len(), "Salaries generated");
    Ok(HttpResponse::Created().json(GenerateResult {
        inserted: lines.len(),
        skipped: missing.len(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/salary",
    params(SalaryQuery),
    responses((status = 200, description = "Salaries of a company for a month", body = [SalaryView])),
    security(("bearer_auth" = [])),
    tag = "Salary"
)]
pub async fn list_salaries(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SalaryQuery>,
) -> actix_web::Result<impl Responder> {
    let mut qb = QueryBuilder::<MySql>::new(SALARY_VIEW_SELECT);
    qb.push(" WHERE s.com_id = ")
        .push_bind(query.com_id)
        .push(" AND s.dt_year = ")
        .push_bind(query.year)
        .push(" AND s.dt_month = ")
        .push_bind(query.month)
        .push(" ORDER BY e.emp_name");

    let rows = qb
        .build_query_as::<SalaryView>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to list salaries"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/salary/all",
    params(MonthQuery),
    responses((status = 200, description = "Salaries of every company for a month", body = [SalaryView])),
    security(("bearer_auth" = [])),
    tag = "Salary"
)]
pub async fn list_all_salaries(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MonthQuery>,
) -> actix_web::Result<impl Responder> {
    let sql = format!(
        "{SALARY_VIEW_SELECT} WHERE s.dt_year = ? AND s.dt_month = ? ORDER BY c.com_name, e.emp_name"
    );
    let rows = sqlx::query_as::<_, SalaryView>(&sql)
        .bind(query.year)
        .bind(query.month)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to list salaries"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/salary/{id}",
    params(("id" = u64, Path, description = "Salary id")),
    responses(
        (status = 200, description = "Salary", body = SalaryView),
        (status = 404, description = "Salary not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Salary"
)]
pub async fn get_salary(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let sql = format!("{SALARY_VIEW_SELECT} WHERE s.id = ?");
    let row = sqlx::query_as::<_, SalaryView>(&sql)
        .bind(path.into_inner())
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch salary"))?
        .ok_or_else(|| ApiError::not_found("Salary not found"))?;

    Ok(HttpResponse::Ok().json(row))
}

#[utoipa::path(
    put,
    path = "/api/salary/{id}/toggle-payment",
    params(("id" = u64, Path, description = "Salary id")),
    responses(
        (status = 200, description = "Payment flag flipped", body = Object,
         example = json!({"is_paid": true, "paid_amount": "28000.00"})),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Salary not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Salary"
)]
#[instrument(name = "salary_toggle_payment", skip(auth, pool), fields(user_id = auth.user_id))]
pub async fn toggle_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| db_error(e, "Failed to start transaction"))?;

    let (is_paid, payable): (bool, Decimal) =
        sqlx::query_as("SELECT is_paid, payable_amount FROM salaries WHERE id = ? FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error(e, "Failed to fetch salary"))?
            .ok_or_else(|| ApiError::not_found("Salary not found"))?;

    let is_paid = !is_paid;
    let paid_amount = paid_amount_for(is_paid, payable);

    sqlx::query("UPDATE salaries SET is_paid = ?, paid_amount = ? WHERE id = ?")
        .bind(is_paid)
        .bind(paid_amount)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(e, "Failed to update payment"))?;

    tx.commit()
        .await
        .map_err(|e| db_error(e, "Failed to commit payment"))?;

    info!(salary_id = id, is_paid, "Salary payment toggled");
    Ok(HttpResponse::Ok().json(json!({
        "is_paid": is_paid,
        "paid_amount": paid_amount,
    })))
}

#[utoipa::path(
    delete,
    path = "/api/salary/{id}",
    params(("id" = u64, Path, description = "Salary id")),
    responses(
        (status = 204, description = "Salary deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Salary not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Salary"
)]
pub async fn delete_salary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM salaries WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to delete salary"))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Salary not found").into());
    }

    info!(salary_id = id, "Salary deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::duplicate_key;
    use rust_decimal_macros::dec;

    #[test]
    fn losing_a_generate_race_is_a_conflict() {
        let err = duplicate_month_or(duplicate_key(), "insert");
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(err.to_string(), "Salary already generated for this month");
        assert!(matches!(duplicate_month_or(sqlx::Error::PoolClosed, "insert"), ApiError::Internal));
    }

    fn employee(emp_id: u64, gross: Decimal) -> PayInput {
        PayInput {
            emp_id,
            gross,
            basic: gross / dec!(2),
            hrent: gross * dec!(0.3),
            medical: gross * dec!(0.15),
        }
    }

    #[test]
    fn employees_without_summary_are_skipped() {
        let employees = [employee(1, dec!(30000)), employee(2, dec!(15000))];
        let absent = HashMap::from([(1, 3)]);

        let (lines, missing) = plan_salaries(&employees, &absent, 30);
        assert_eq!(missing, vec![2]);
        assert_eq!(lines.len(), 1);

        let line = &lines[0];
        assert_eq!(line.emp_id, 1);
        assert_eq!(line.absent_days, 3);
        assert_eq!(line.basic, dec!(15000));
        assert_eq!(line.calc.absent_amount, dec!(3000));
        assert_eq!(line.calc.payable_amount, dec!(27000));
    }

    #[test]
    fn nothing_to_pay_without_summaries() {
        let (lines, missing) = plan_salaries(&[employee(5, dec!(1000))], &HashMap::new(), 31);
        assert!(lines.is_empty());
        assert_eq!(missing, vec![5]);
    }
}
