use crate::{
    api::{ByCompany, company::require_company},
    auth::auth::AuthUser,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::shift::Shift,
    utils::db_utils::{
        Column, ColumnKind, UpdatableTable, build_update_sql, execute_update, parse_time,
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveTime;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

const SHIFT_UPDATE: UpdatableTable = UpdatableTable {
    table: "shifts",
    columns: &[
        Column::new("shift_name", ColumnKind::Name),
        Column::new("in_time", ColumnKind::Time),
        Column::new("out_time", ColumnKind::Time),
        Column::nullable("late_time", ColumnKind::Time),
    ],
};

#[derive(Deserialize, ToSchema)]
pub struct CreateShift {
    #[schema(example = 1)]
    pub com_id: u64,
    #[schema(example = "Day")]
    pub shift_name: String,
    #[schema(example = "08:00")]
    pub in_time: String,
    #[schema(example = "17:00")]
    pub out_time: String,
    /// Check-ins after this time are late; defaults to start + grace
    #[schema(example = "08:30", nullable = true)]
    pub late_time: Option<String>,
}

#[derive(Debug)]
struct ShiftTimes {
    in_time: NaiveTime,
    out_time: NaiveTime,
    late_time: Option<NaiveTime>,
}

impl CreateShift {
    fn times(&self) -> Result<ShiftTimes, ApiError> {
        let field = |name: &str, value: &str| {
            parse_time(value)
                .ok_or_else(|| ApiError::bad_request(format!("'{name}' must be HH:MM or HH:MM:SS")))
        };

        let late_time = match self.late_time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(field("late_time", value)?),
        };

        Ok(ShiftTimes {
            in_time: field("in_time", &self.in_time)?,
            out_time: field("out_time", &self.out_time)?,
            late_time,
        })
    }
}

#[utoipa::path(
    post,
    path = "/api/shift",
    request_body = CreateShift,
    responses(
        (status = 201, description = "Shift created", body = Object, example = json!({"id": 1})),
        (status = 400, description = "Missing name or malformed time"),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn create_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateShift>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let name = payload.shift_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Shift name is required").into());
    }
    let times = payload.times()?;
    require_company(pool.get_ref(), payload.com_id).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO shifts (com_id, shift_name, in_time, out_time, late_time)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.com_id)
    .bind(name)
    .bind(times.in_time)
    .bind(times.out_time)
    .bind(times.late_time)
    .execute(pool.get_ref())
    .await
    .map_err(|e| db_error(e, "Failed to create shift"))?
    .last_insert_id();

    info!(shift_id = id, com_id = payload.com_id, "Shift created");
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/shift",
    params(ByCompany),
    responses((status = 200, description = "Shifts ordered by name", body = [Shift])),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn list_shifts(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ByCompany>,
) -> actix_web::Result<impl Responder> {
    let mut qb = sqlx::QueryBuilder::<sqlx::MySql>::new("SELECT * FROM shifts");
    if let Some(com_id) = query.com_id {
        qb.push(" WHERE com_id = ").push_bind(com_id);
    }
    qb.push(" ORDER BY shift_name");

    let shifts = qb
        .build_query_as::<Shift>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to list shifts"))?;

    Ok(HttpResponse::Ok().json(shifts))
}

#[utoipa::path(
    get,
    path = "/api/shift/{id}",
    params(("id" = u64, Path, description = "Shift id")),
    responses(
        (status = 200, description = "Shift", body = Shift),
        (status = 404, description = "Shift not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn get_shift(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let shift = sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE id = ?")
        .bind(path.into_inner())
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch shift"))?
        .ok_or_else(|| ApiError::not_found("Shift not found"))?;

    Ok(HttpResponse::Ok().json(shift))
}

#[utoipa::path(
    put,
    path = "/api/shift/{id}",
    params(("id" = u64, Path, description = "Shift id")),
    request_body(content = Object, example = json!({"in_time": "09:00", "late_time": null})),
    responses(
        (status = 200, description = "Shift updated"),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Shift not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn update_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let update = build_update_sql(&SHIFT_UPDATE, &payload, id)?;

    let exists: Option<u64> = sqlx::query_scalar("SELECT id FROM shifts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to look up shift"))?;
    if exists.is_none() {
        return Err(ApiError::not_found("Shift not found").into());
    }

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| db_error(e, "Failed to update shift"))?;

    info!(shift_id = id, "Shift updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "Shift updated" })))
}

#[utoipa::path(
    delete,
    path = "/api/shift/{id}",
    params(("id" = u64, Path, description = "Shift id")),
    responses(
        (status = 204, description = "Shift deleted"),
        (status = 404, description = "Shift not found"),
        (status = 409, description = "Employees still assigned")
    ),
    security(("bearer_auth" = [])),
    tag = "Shift"
)]
pub async fn delete_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let result = sqlx::query("DELETE FROM shifts WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return ApiError::conflict("Shift still has employees");
            }
            db_error(e, "Failed to delete shift")
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Shift not found").into());
    }

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(late_time: Option<&str>) -> CreateShift {
        CreateShift {
            com_id: 1,
            shift_name: "Night".into(),
            in_time: "22:00".into(),
            out_time: "06:00:00".into(),
            late_time: late_time.map(str::to_string),
        }
    }

    #[test]
    fn parses_shift_times() {
        let times = payload(Some("22:20")).times().unwrap();
        assert_eq!(times.in_time, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert_eq!(times.out_time, NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert_eq!(times.late_time, NaiveTime::from_hms_opt(22, 20, 0));
    }

    #[test]
    fn blank_late_time_means_none() {
        assert_eq!(payload(Some(" ")).times().unwrap().late_time, None);
        assert_eq!(payload(None).times().unwrap().late_time, None);
    }

    #[test]
    fn bad_time_names_the_field() {
        let err = payload(Some("late")).times().unwrap_err();
        assert!(err.to_string().contains("late_time"));
    }
}
