use crate::{
    auth::auth::AuthUser,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::{
        company::{PayRules, SalaryBreakdown},
        employee::{Employee, EmployeeView, Gender},
    },
    utils::{company_cache, db_utils::page_window},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use std::str::FromStr;
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};

/// Employee row joined with the names of its company, shift, department and
/// designation.
pub(crate) const EMPLOYEE_VIEW_SELECT: &str = r#"
    SELECT
        e.id, e.com_id, e.emp_code, e.emp_name, c.com_name,
        e.shift_id, s.shift_name, e.dept_id, d.dept_name,
        e.desig_id, g.desig_name, e.gender,
        e.gross, e.basic, e.hrent, e.medical, e.others, e.dt_join
    FROM employees e
    LEFT JOIN companies c ON c.id = e.com_id
    LEFT JOIN shifts s ON s.id = e.shift_id
    LEFT JOIN departments d ON d.id = e.dept_id
    LEFT JOIN designations g ON g.id = e.desig_id
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = 1)]
    pub com_id: u64,
    #[schema(example = "EMP-001")]
    pub emp_code: String,
    #[schema(example = "Rahim Uddin")]
    pub emp_name: String,
    #[schema(example = 1)]
    pub shift_id: u64,
    #[schema(example = 2)]
    pub dept_id: u64,
    #[schema(example = 3)]
    pub desig_id: u64,
    #[schema(example = "male")]
    pub gender: String,
    #[schema(value_type = String, example = "20000")]
    pub gross: Decimal,
    /// Omitted components are derived from gross with the company's pay rules
    #[schema(value_type = Option<String>)]
    pub basic: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub hrent: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub medical: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub others: Option<Decimal>,
    #[schema(example = "2024-01-01", format = "date", value_type = String)]
    pub dt_join: NaiveDate,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateEmployee {
    pub emp_code: Option<String>,
    pub emp_name: Option<String>,
    pub shift_id: Option<u64>,
    pub dept_id: Option<u64>,
    pub desig_id: Option<u64>,
    pub gender: Option<String>,
    #[schema(value_type = Option<String>)]
    pub gross: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub basic: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub hrent: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub medical: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub others: Option<Decimal>,
    #[schema(example = "2024-01-01", format = "date", value_type = Option<String>)]
    pub dt_join: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub com_id: Option<u64>,
    pub dept_id: Option<u64>,
    pub desig_id: Option<u64>,
    pub shift_id: Option<u64>,
    /// Matches name or code
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<EmployeeView>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 57)]
    pub total: i64,
}

/// Salary components as sent by the client, each optional.
#[derive(Debug, Default, Clone, Copy)]
struct Components {
    basic: Option<Decimal>,
    hrent: Option<Decimal>,
    medical: Option<Decimal>,
    others: Option<Decimal>,
}

impl Components {

    /// Fills each missing component from the company split of `gross`.
    fn resolve(self, gross: Decimal, rules: &PayRules) -> SalaryBreakdown {
        let split = rules.split(gross);
        SalaryBreakdown {
            basic: self.basic.unwrap_or(split.basic),
            hrent: self.hrent.unwrap_or(split.hrent),
            medical: self.medical.unwrap_or(split.medical),
            others: self.others.unwrap_or(split.others),
        }
    }

    /// Components after an update. A new gross re-derives every omitted
    /// component from the company split; without one they keep `stored`.
    fn updated(
        self,
        stored: SalaryBreakdown,
        new_gross: Option<(Decimal, &PayRules)>,
    ) -> SalaryBreakdown {
        match new_gross {
            Some((gross, rules)) => self.resolve(gross, rules),
            None => SalaryBreakdown {
                basic: self.basic.unwrap_or(stored.basic),
                hrent: self.hrent.unwrap_or(stored.hrent),
                medical: self.medical.unwrap_or(stored.medical),
                others: self.others.unwrap_or(stored.others),
            },
        }
    }

    fn validate(&self) -> Result<(), ApiError> {
        let negative = [self.basic, self.hrent, self.medical, self.others]
            .into_iter()
            .flatten()
            .any(|v| v < Decimal::ZERO);
        if negative {
            return Err(ApiError::bad_request("Salary components cannot be negative"));
        }
        Ok(())
    }
}

fn parse_gender(value: &str) -> Result<Gender, ApiError> {
    Gender::from_str(value.trim())
        .map_err(|_| ApiError::bad_request("Gender must be male, female or other"))
}

fn required_text<'a>(value: &'a str, field: &str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("'{field}' is required")));
    }
    Ok(value)
}

fn validate_gross(gross: Decimal) -> Result<(), ApiError> {
    if gross < Decimal::ZERO {
        return Err(ApiError::bad_request("Gross salary cannot be negative"));
    }
    Ok(())
}

/// Owning company of each reference, `None` when the row is missing.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
struct ReferenceOwners {
    shift_com: Option<u64>,
    dept_com: Option<u64>,
    desig_com: Option<u64>,
}

impl ReferenceOwners {
    fn check(&self, com_id: u64) -> Result<(), ApiError> {
        let checks = [
            (self.shift_com, "Shift"),
            (self.dept_com, "Department"),
            (self.desig_com, "Designation"),
        ];

        for (owner, what) in checks {
            match owner {
                None => return Err(ApiError::bad_request(format!("{what} not found"))),
                Some(owner) if owner != com_id => {
                    return Err(ApiError::bad_request(format!(
                        "{what} belongs to another company"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

async fn check_references(
    pool: &MySqlPool,
    com_id: u64,
    shift_id: u64,
    dept_id: u64,
    desig_id: u64,
) -> Result<(), ApiError> {
    let owners = sqlx::query_as::<_, ReferenceOwners>(
        r#"
        SELECT
            (SELECT com_id FROM shifts WHERE id = ?) AS shift_com,
            (SELECT com_id FROM departments WHERE id = ?) AS dept_com,
            (SELECT com_id FROM designations WHERE id = ?) AS desig_com
        "#,
    )
    .bind(shift_id)
    .bind(dept_id)
    .bind(desig_id)
    .fetch_one(pool)
    .await
    .map_err(|e| db_error(e, "Failed to check employee references"))?;

    owners.check(com_id)
}

async fn pay_rules_for(pool: &MySqlPool, com_id: u64) -> Result<PayRules, ApiError> {
    company_cache::get_or_load(pool, com_id)
        .await
        .map_err(|e| db_error(e, "Failed to load pay rules"))?
        .ok_or_else(|| ApiError::not_found("Company not found"))
}

fn duplicate_code_or(e: sqlx::Error, context: &'static str) -> ApiError {
    if is_constraint_violation(&e) {
        return ApiError::conflict("Employee code already exists for this company");
    }
    db_error(e, context)
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employee",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Object, example = json!({"id": 1})),
        (status = 400, description = "Validation failed, e.g. shift of another company"),
        (status = 404, description = "Company not found"),
        (status = 409, description = "Employee code already used in this company")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
#[instrument(name = "employee_create", skip(auth, pool, payload), fields(com_id = payload.com_id))]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let emp_code = required_text(&payload.emp_code, "emp_code")?;
    let emp_name = required_text(&payload.emp_name, "emp_name")?;
    let gender = parse_gender(&payload.gender)?;
    validate_gross(payload.gross)?;

    let components = Components {
        basic: payload.basic,
        hrent: payload.hrent,
        medical: payload.medical,
        others: payload.others,
    };
    components.validate()?;

    let rules = pay_rules_for(pool.get_ref(), payload.com_id).await?;
    check_references(
        pool.get_ref(),
        payload.com_id,
        payload.shift_id,
        payload.dept_id,
        payload.desig_id,
    )
    .await?;

    let salary = components.resolve(payload.gross, &rules);

    let id = sqlx::query(
        r#"
        INSERT INTO employees
        (com_id, emp_code, emp_name, shift_id, dept_id, desig_id, gender,
         gross, basic, hrent, medical, others, dt_join)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.com_id)
    .bind(emp_code)
    .bind(emp_name)
    .bind(payload.shift_id)
    .bind(payload.dept_id)
    .bind(payload.desig_id)
    .bind(gender.as_ref())
    .bind(payload.gross)
    .bind(salary.basic)
    .bind(salary.hrent)
    .bind(salary.medical)
    .bind(salary.others)
    .bind(payload.dt_join)
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_code_or(e, "Failed to create employee"))?
    .last_insert_id();

    info!(emp_id = id, "Employee created");
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, query: &EmployeeQuery) {
    qb.push(" WHERE 1 = 1");

    if let Some(com_id) = query.com_id {
        qb.push(" AND e.com_id = ").push_bind(com_id);
    }
    if let Some(dept_id) = query.dept_id {
        qb.push(" AND e.dept_id = ").push_bind(dept_id);
    }
    if let Some(desig_id) = query.desig_id {
        qb.push(" AND e.desig_id = ").push_bind(desig_id);
    }
    if let Some(shift_id) = query.shift_id {
        qb.push(" AND e.shift_id = ").push_bind(shift_id);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let like = format!("%{search}%");
        qb.push(" AND (e.emp_name LIKE ")
            .push_bind(like.clone())
            .push(" OR e.emp_code LIKE ")
            .push_bind(like)
            .push(")");
    }
}

#[utoipa::path(
    get,
    path = "/api/employee",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    let (page, per_page, offset) = page_window(query.page, query.per_page);

    let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM employees e");
    push_filters(&mut count_qb, &query);
    debug!(sql = %count_qb.sql(), "Counting employees");

    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to count employees"))?;

    let mut data_qb = QueryBuilder::<MySql>::new(EMPLOYEE_VIEW_SELECT);
    push_filters(&mut data_qb, &query);
    data_qb
        .push(" ORDER BY e.emp_name, e.id LIMIT ")
        .push_bind(per_page as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);
    debug!(sql = %data_qb.sql(), page, per_page, "Fetching employees");

    let employees = data_qb
        .build_query_as::<EmployeeView>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch employees"))?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data: employees,
        page,
        per_page,
        total,
    }))
}

/// Get Employee by ID, with the names of everything it references
#[utoipa::path(
    get,
    path = "/api/employee/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = EmployeeView),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();

    let sql = format!("{EMPLOYEE_VIEW_SELECT} WHERE e.id = ?");
    let employee = sqlx::query_as::<_, EmployeeView>(&sql)
        .bind(employee_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch employee"))?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    Ok(HttpResponse::Ok().json(employee))
}

/// Update Employee. A new gross without explicit components re-derives them.
#[utoipa::path(
    put,
    path = "/api/employee/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Object, example = json!({
            "message": "Employee updated successfully"
        })),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee code already used in this company")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
#[instrument(name = "employee_update", skip(auth, pool, body))]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateEmployee>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();

    let current = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch employee"))?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    let emp_code = match &body.emp_code {
        Some(code) => required_text(code, "emp_code")?.to_string(),
        None => current.emp_code.clone(),
    };
    let emp_name = match &body.emp_name {
        Some(name) => required_text(name, "emp_name")?.to_string(),
        None => current.emp_name.clone(),
    };
    let gender = match &body.gender {
        Some(g) => parse_gender(g)?.as_ref().to_string(),
        None => current.gender.clone(),
    };
    let shift_id = body.shift_id.unwrap_or(current.shift_id);
    let dept_id = body.dept_id.unwrap_or(current.dept_id);
    let desig_id = body.desig_id.unwrap_or(current.desig_id);
    let gross = body.gross.unwrap_or(current.gross);
    validate_gross(gross)?;

    let requested = Components {
        basic: body.basic,
        hrent: body.hrent,
        medical: body.medical,
        others: body.others,
    };
    requested.validate()?;

    let rules = match body.gross {
        Some(_) => Some(pay_rules_for(pool.get_ref(), current.com_id).await?),
        None => None,
    };
    let stored = SalaryBreakdown {
        basic: current.basic,
        hrent: current.hrent,
        medical: current.medical,
        others: current.others,
    };
    let salary = requested.updated(stored, body.gross.zip(rules.as_ref()));

    check_references(pool.get_ref(), current.com_id, shift_id, dept_id, desig_id).await?;

    sqlx::query(
        r#"
        UPDATE employees
        SET emp_code = ?, emp_name = ?, shift_id = ?, dept_id = ?, desig_id = ?, gender = ?,
            gross = ?, basic = ?, hrent = ?, medical = ?, others = ?, dt_join = ?
        WHERE id = ?
        "#,
    )
    .bind(emp_code)
    .bind(emp_name)
    .bind(shift_id)
    .bind(dept_id)
    .bind(desig_id)
    .bind(gender)
    .bind(gross)
    .bind(salary.basic)
    .bind(salary.hrent)
    .bind(salary.medical)
    .bind(salary.others)
    .bind(body.dt_join.unwrap_or(current.dt_join))
    .bind(employee_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_code_or(e, "Failed to update employee"))?;

    info!(emp_id = employee_id, "Employee updated");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Employee updated successfully"
    })))
}

/// Delete Employee together with its attendance, summaries and salaries
#[utoipa::path(
    delete,
    path = "/api/employee/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to delete employee"))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee not found").into());
    }

    info!(emp_id = employee_id, "Employee deleted");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn omitted_components_follow_company_rules() {
        let rules = PayRules::new(dec!(60), dec!(20), dec!(10));
        let salary = Components::default().resolve(dec!(10000), &rules);
        assert_eq!(salary.basic, dec!(6000));
        assert_eq!(salary.hrent, dec!(2000));
        assert_eq!(salary.medical, dec!(1000));
        assert_eq!(salary.others, dec!(500));
    }

    #[test]
    fn explicit_components_are_kept() {
        let parts = Components {
            basic: Some(dec!(7000)),
            ..Components::default()
        };
        let salary = parts.resolve(dec!(10000), &PayRules::default());
        assert_eq!(salary.basic, dec!(7000));
        assert_eq!(salary.hrent, dec!(3000));
    }

    #[test]
    fn new_gross_rederives_components_left_out() {
        let stored = SalaryBreakdown {
            basic: dec!(5000),
            hrent: dec!(3000),
            medical: dec!(1500),
            others: dec!(500),
        };
        let parts = Components {
            basic: Some(dec!(9000)),
            ..Components::default()
        };
        let rules = PayRules::default();
        let salary = parts.updated(stored, Some((dec!(20000), &rules)));
        assert_eq!(salary.basic, dec!(9000));
        assert_eq!(salary.hrent, dec!(6000));
        assert_eq!(salary.medical, dec!(3000));
        assert_eq!(salary.others, dec!(1000));
    }

    #[test]
    fn without_new_gross_omitted_components_are_kept() {
        let stored = SalaryBreakdown {
            basic: dec!(5000),
            hrent: dec!(3000),
            medical: dec!(1500),
            others: dec!(500),
        };
        let parts = Components {
            medical: Some(dec!(1200)),
            ..Components::default()
        };
        let salary = parts.updated(stored, None);
        assert_eq!(salary.basic, dec!(5000));
        assert_eq!(salary.medical, dec!(1200));
        assert_eq!(salary.others, dec!(500));
    }

    #[test]
    fn negative_components_are_rejected() {
        let parts = Components {
            others: Some(dec!(-1)),
            ..Components::default()
        };
        assert!(parts.validate().is_err());
        assert!(validate_gross(dec!(-0.01)).is_err());
        assert!(validate_gross(Decimal::ZERO).is_ok());
    }

    #[test]
    fn references_must_share_the_company() {
        let owners = ReferenceOwners {
            shift_com: Some(1),
            dept_com: Some(1),
            desig_com: Some(1),
        };
        assert!(owners.check(1).is_ok());

        let err = owners.check(2).unwrap_err();
        assert_eq!(err.to_string(), "Shift belongs to another company");

        let missing = ReferenceOwners {
            dept_com: None,
            ..owners
        };
        assert_eq!(missing.check(1).unwrap_err().to_string(), "Department not found");
    }

    #[test]
    fn text_fields_are_trimmed_and_required() {
        assert_eq!(required_text("  EMP-9 ", "emp_code").unwrap(), "EMP-9");
        assert!(required_text("   ", "emp_name").is_err());
        assert_eq!(parse_gender(" Female ").unwrap(), Gender::Female);
        assert!(parse_gender("n/a").is_err());
    }
}
