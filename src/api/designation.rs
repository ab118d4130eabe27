use crate::{
    api::{ByCompany, company::require_company},
    auth::auth::AuthUser,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::designation::Designation,
    utils::db_utils::{Column, ColumnKind, UpdatableTable, build_update_sql, execute_update},
};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

const DESIGNATION_UPDATE: UpdatableTable = UpdatableTable {
    table: "designations",
    columns: &[Column::new("desig_name", ColumnKind::Name)],
};

#[derive(Deserialize, ToSchema)]
pub struct CreateDesignation {
    #[schema(example = 1)]
    pub com_id: u64,
    #[schema(example = "Sewing Operator")]
    pub desig_name: String,
}

#[utoipa::path(
    post,
    path = "/api/designation",
    request_body = CreateDesignation,
    responses(
        (status = 201, description = "Designation created", body = Object, example = json!({"id": 1})),
        (status = 400, description = "Name required"),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Designation"
)]
pub async fn create_designation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDesignation>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let name = payload.desig_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Designation name is required").into());
    }
    require_company(pool.get_ref(), payload.com_id).await?;

    let id = sqlx::query("INSERT INTO designations (com_id, desig_name) VALUES (?, ?)")
        .bind(payload.com_id)
        .bind(name)
        .execute(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to create designation"))?
        .last_insert_id();

    info!(desig_id = id, com_id = payload.com_id, "Designation created");
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/designation",
    params(ByCompany),
    responses((status = 200, description = "Designations ordered by name", body = [Designation])),
    security(("bearer_auth" = [])),
    tag = "Designation"
)]
pub async fn list_designations(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ByCompany>,
) -> actix_web::Result<impl Responder> {
    let rows = match query.com_id {
        Some(com_id) => {
            sqlx::query_as::<_, Designation>(
                "SELECT * FROM designations WHERE com_id = ? ORDER BY desig_name",
            )
            .bind(com_id)
            .fetch_all(pool.get_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, Designation>("SELECT * FROM designations ORDER BY desig_name")
                .fetch_all(pool.get_ref())
                .await
        }
    }
    .map_err(|e| db_error(e, "Failed to list designations"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/designation/{id}",
    params(("id" = u64, Path, description = "Designation id")),
    responses(
        (status = 200, description = "Designation", body = Designation),
        (status = 404, description = "Designation not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Designation"
)]
pub async fn get_designation(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let row = sqlx::query_as::<_, Designation>("SELECT * FROM designations WHERE id = ?")
        .bind(path.into_inner())
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch designation"))?
        .ok_or_else(|| ApiError::not_found("Designation not found"))?;

    Ok(HttpResponse::Ok().json(row))
}

#[utoipa::path(
    put,
    path = "/api/designation/{id}",
    params(("id" = u64, Path, description = "Designation id")),
    request_body(content = Object, example = json!({"desig_name": "Line Supervisor"})),
    responses(
        (status = 200, description = "Designation updated"),
        (status = 404, description = "Designation not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Designation"
)]
pub async fn update_designation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let update = build_update_sql(&DESIGNATION_UPDATE, &payload, id)?;
    let exists: Option<u64> = sqlx::query_scalar("SELECT id FROM designations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to look up designation"))?;
    if exists.is_none() {
        return Err(ApiError::not_found("Designation not found").into());
    }

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| db_error(e, "Failed to update designation"))?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Designation updated" })))
}

#[utoipa::path(
    delete,
    path = "/api/designation/{id}",
    params(("id" = u64, Path, description = "Designation id")),
    responses(
        (status = 204, description = "Designation deleted"),
        (status = 409, description = "Employees still assigned"),
        (status = 404, description = "Designation not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Designation"
)]
pub async fn delete_designation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM designations WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return ApiError::conflict("Designation still has employees");
            }
            db_error(e, "Failed to delete designation")
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Designation not found").into());
    }

    info!(desig_id = id, "Designation deleted");
    Ok(HttpResponse::NoContent().finish())
}
