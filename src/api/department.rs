use crate::{
    api::{ByCompany, company::require_company},
    auth::auth::AuthUser,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::department::Department,
    utils::db_utils::{Column, ColumnKind, UpdatableTable, build_update_sql, execute_update},
};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

const DEPARTMENT_UPDATE: UpdatableTable = UpdatableTable {
    table: "departments",
    columns: &[Column::new("dept_name", ColumnKind::Name)],
};

#[derive(Deserialize, ToSchema)]
pub struct CreateDepartment {
    #[schema(example = 1)]
    pub com_id: u64,
    #[schema(example = "Production")]
    pub dept_name: String,
}

#[utoipa::path(
    post,
    path = "/api/department",
    request_body = CreateDepartment,
    responses(
        (status = 201, description = "Department created", body = Object, example = json!({"id": 1})),
        (status = 400, description = "Name required"),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDepartment>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let name = payload.dept_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Department name is required").into());
    }
    require_company(pool.get_ref(), payload.com_id).await?;

    let id = sqlx::query("INSERT INTO departments (com_id, dept_name) VALUES (?, ?)")
        .bind(payload.com_id)
        .bind(name)
        .execute(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to create department"))?
        .last_insert_id();

    info!(dept_id = id, com_id = payload.com_id, "Department created");
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/department",
    params(ByCompany),
    responses((status = 200, description = "Departments ordered by name", body = [Department])),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn list_departments(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ByCompany>,
) -> actix_web::Result<impl Responder> {
    let rows = match query.com_id {
        Some(com_id) => {
            sqlx::query_as::<_, Department>(
                "SELECT * FROM departments WHERE com_id = ? ORDER BY dept_name",
            )
            .bind(com_id)
            .fetch_all(pool.get_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, Department>("SELECT * FROM departments ORDER BY dept_name")
                .fetch_all(pool.get_ref())
                .await
        }
    }
    .map_err(|e| db_error(e, "Failed to list departments"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/department/{id}",
    params(("id" = u64, Path, description = "Department id")),
    responses(
        (status = 200, description = "Department", body = Department),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn get_department(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let row = sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE id = ?")
        .bind(path.into_inner())
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch department"))?
        .ok_or_else(|| ApiError::not_found("Department not found"))?;

    Ok(HttpResponse::Ok().json(row))
}

#[utoipa::path(
    put,
    path = "/api/department/{id}",
    params(("id" = u64, Path, description = "Department id")),
    request_body(content = Object, example = json!({"dept_name": "Finishing"})),
    responses(
        (status = 200, description = "Department updated"),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let update = build_update_sql(&DEPARTMENT_UPDATE, &payload, id)?;
    let exists: Option<u64> = sqlx::query_scalar("SELECT id FROM departments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to look up department"))?;
    if exists.is_none() {
        return Err(ApiError::not_found("Department not found").into());
    }

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| db_error(e, "Failed to update department"))?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Department updated" })))
}

#[utoipa::path(
    delete,
    path = "/api/department/{id}",
    params(("id" = u64, Path, description = "Department id")),
    responses(
        (status = 204, description = "Department deleted"),
        (status = 409, description = "Employees still assigned"),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Department"
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return ApiError::conflict("Department still has employees");
            }
            db_error(e, "Failed to delete department")
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Department not found").into());
    }

    info!(dept_id = id, "Department deleted");
    Ok(HttpResponse::NoContent().finish())
}
