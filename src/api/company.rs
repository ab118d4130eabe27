use crate::{
    auth::auth::AuthUser,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::company::{Company, PayRules},
    utils::{
        company_cache,
        db_utils::{Column, ColumnKind, UpdatableTable, build_update_sql, execute_update},
    },
};
use actix_web::{HttpResponse, Responder, web};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

const COMPANY_UPDATE: UpdatableTable = UpdatableTable {
    table: "companies",
    columns: &[
        Column::new("com_name", ColumnKind::Name),
        Column::new("basic", ColumnKind::Percent),
        Column::new("hrent", ColumnKind::Percent),
        Column::new("medical", ColumnKind::Percent),
        Column::new("is_inactive", ColumnKind::Bool),
    ],
};

#[derive(Deserialize, ToSchema)]
pub struct CreateCompany {
    #[schema(example = "Acme Garments Ltd.")]
    pub com_name: String,
    /// Whole percentages of gross; 0 or omitted means the default split
    #[schema(value_type = Option<String>, example = "50")]
    pub basic: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "30")]
    pub hrent: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "15")]
    pub medical: Option<Decimal>,
    #[serde(default)]
    pub is_inactive: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CompanyQuery {
    /// Only companies not marked inactive
    pub active_only: Option<bool>,
}

/// 404 unless the company exists.
pub async fn require_company(pool: &MySqlPool, com_id: u64) -> Result<(), ApiError> {
    let found: Option<u64> = sqlx::query_scalar("SELECT id FROM companies WHERE id = ?")
        .bind(com_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_error(e, "Failed to look up company"))?;

    found
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Company not found"))
}

fn valid_percent(value: Option<Decimal>, field: &str) -> Result<Decimal, ApiError> {
    let value = value.unwrap_or(Decimal::ZERO);
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(ApiError::bad_request(format!(
            "'{field}' must be between 0 and 100"
        )));
    }
    Ok(value)
}

#[utoipa::path(
    post,
    path = "/api/company",
    request_body = CreateCompany,
    responses(
        (status = 201, description = "Company created", body = Object, example = json!({"id": 1})),
        (status = 400, description = "Invalid name or rates"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Company"
)]
#[instrument(name = "company_create", skip(auth, pool, payload), fields(user_id = auth.user_id))]
pub async fn create_company(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCompany>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let name = payload.com_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Company name is required").into());
    }

    let basic = valid_percent(payload.basic, "basic")?;
    let hrent = valid_percent(payload.hrent, "hrent")?;
    let medical = valid_percent(payload.medical, "medical")?;

    let result = sqlx::query(
        r#"
        INSERT INTO companies (com_name, basic, hrent, medical, is_inactive)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(basic)
    .bind(hrent)
    .bind(medical)
    .bind(payload.is_inactive)
    .execute(pool.get_ref())
    .await
    .map_err(|e| db_error(e, "Failed to create company"))?;

    let id = result.last_insert_id();
    info!(com_id = id, "Company created");

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/company",
    params(CompanyQuery),
    responses((status = 200, description = "Companies ordered by name", body = [Company])),
    security(("bearer_auth" = [])),
    tag = "Company"
)]
pub async fn list_companies(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CompanyQuery>,
) -> actix_web::Result<impl Responder> {
    let sql = if query.active_only.unwrap_or(false) {
        "SELECT * FROM companies WHERE is_inactive = FALSE ORDER BY com_name"
    } else {
        "SELECT * FROM companies ORDER BY com_name"
    };

    let companies = sqlx::query_as::<_, Company>(sql)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to list companies"))?;

    Ok(HttpResponse::Ok().json(companies))
}

#[utoipa::path(
    get,
    path = "/api/company/{id}",
    params(("id" = u64, Path, description = "Company id")),
    responses(
        (status = 200, description = "Company", body = Company),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Company"
)]
pub async fn get_company(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch company"))?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(HttpResponse::Ok().json(company))
}

#[utoipa::path(
    put,
    path = "/api/company/{id}",
    params(("id" = u64, Path, description = "Company id")),
    request_body(content = Object, example = json!({"basic": "55", "is_inactive": false})),
    responses(
        (status = 200, description = "Company updated"),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Company"
)]
#[instrument(name = "company_update", skip(auth, pool, payload), fields(user_id = auth.user_id))]
pub async fn update_company(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let update = build_update_sql(&COMPANY_UPDATE, &payload, id)?;
    require_company(pool.get_ref(), id).await?;

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| db_error(e, "Failed to update company"))?;

    company_cache::invalidate(id).await;
    info!(com_id = id, "Company updated");

    Ok(HttpResponse::Ok().json(json!({ "message": "Company updated" })))
}

#[utoipa::path(
    delete,
    path = "/api/company/{id}",
    params(("id" = u64, Path, description = "Company id")),
    responses(
        (status = 204, description = "Company and everything it owns deleted"),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Company"
)]
#[instrument(name = "company_delete", skip(auth, pool), fields(user_id = auth.user_id))]
pub async fn delete_company(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| db_error(e, "Failed to start transaction"))?;

    // employees first: shifts, departments and designations refuse to go while referenced
    sqlx::query("DELETE FROM employees WHERE com_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error(e, "Failed to delete company employees"))?;

    let result = sqlx::query("DELETE FROM companies WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return ApiError::conflict("Company is still referenced");
            }
            db_error(e, "Failed to delete company")
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Company not found").into());
    }

    tx.commit()
        .await
        .map_err(|e| db_error(e, "Failed to commit company delete"))?;

    company_cache::invalidate(id).await;
    info!(com_id = id, "Company deleted");

    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/company/{id}/pay-rules",
    params(("id" = u64, Path, description = "Company id")),
    responses(
        (status = 200, description = "Effective salary percentages", body = PayRules),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Company"
)]
pub async fn pay_rules(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let rules = company_cache::get_or_load(pool.get_ref(), path.into_inner())
        .await
        .map_err(|e| db_error(e, "Failed to load pay rules"))?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(HttpResponse::Ok().json(rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percent_bounds() {
        assert_eq!(valid_percent(None, "basic").unwrap(), Decimal::ZERO);
        assert_eq!(valid_percent(Some(dec!(100)), "basic").unwrap(), dec!(100));
        assert!(valid_percent(Some(dec!(100.01)), "basic").is_err());
        assert!(valid_percent(Some(dec!(-1)), "hrent").is_err());
    }

    #[test]
    fn update_whitelist_excludes_id() {
        assert!(build_update_sql(&COMPANY_UPDATE, &json!({"id": 3}), 1).is_err());
        assert!(build_update_sql(&COMPANY_UPDATE, &json!({"com_name": "New"}), 1).is_ok());
    }
}
