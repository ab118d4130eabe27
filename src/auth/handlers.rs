use crate::{
    auth::{
        auth::AuthUser,
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    db::is_constraint_violation,
    error::{ApiError, db_error},
    model::{role::Role, user::User},
    models::{LinkEmployeeReq, LoginReqDto, TokenPair, TokenType, UserReq},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};

const USER_SELECT: &str = r#"
    SELECT id, username, password, role_id, employee_id, is_active
    FROM users
"#;

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Issues an access/refresh pair and records the refresh token's `jti`.
async fn issue_token_pair(
    subject: &TokenSubject,
    pool: &MySqlPool,
    config: &Config,
) -> Result<TokenPair, HttpResponse> {
    let access_token = generate_access_token(subject, &config.jwt_secret, config.access_token_ttl)
        .map_err(|e| {
            error!(error = %e, "Failed to sign access token");
            HttpResponse::InternalServerError().finish()
        })?;

    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl).map_err(
            |e| {
                error!(error = %e, "Failed to sign refresh token");
                HttpResponse::InternalServerError().finish()
            },
        )?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        HttpResponse::InternalServerError().finish()
    })?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Inserts a user row; duplicate usernames map to 409.
async fn insert_user(
    username: &str,
    password: &str,
    role: Role,
    pool: &MySqlPool,
) -> Result<(), HttpResponse> {
    let hashed = hash_password(password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        HttpResponse::InternalServerError().finish()
    })?;

    sqlx::query(
        r#"INSERT INTO users (username, password, role_id) VALUES (?, ?, ?)"#,
    )
    .bind(username)
    .bind(hashed)
    .bind(role.id())
    .execute(pool)
    .await
    .map(|_| ())
    .map_err(|e| {
        if is_constraint_violation(&e) {
            return HttpResponse::Conflict().json(json!({
                "error": "Username already exists"
            }));
        }
        error!(error = %e, "Failed to insert user");
        HttpResponse::InternalServerError().json(json!({
            "error": "Failed to register user"
        }))
    })
}

/// Creates the configured admin login when no users exist yet.
pub async fn bootstrap_admin(pool: &MySqlPool, config: &Config) -> anyhow::Result<()> {
    let Some((username, password)) = &config.bootstrap_admin else {
        return Ok(());
    };

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if users > 0 {
        debug!("Users present, skipping admin bootstrap");
        return Ok(());
    }

    insert_user(username, password, Role::Admin, pool)
        .await
        .map_err(|resp| anyhow::anyhow!("admin bootstrap failed with {}", resp.status()))?;

    info!(username = %username, "Bootstrap admin created");
    Ok(())
}

/// User registration. New accounts always get the Employee role and no
/// employee link; HR or Admin attach one through `link_employee`.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = UserReq,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Empty username or password"),
        (status = 409, description = "Username taken")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(pool, user), fields(username = %user.username))]
pub async fn register(user: web::Json<UserReq>, pool: web::Data<MySqlPool>) -> impl Responder {
    let username = user.username.trim().to_lowercase();

    if username.is_empty() || user.password.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Username and password must not be empty"
        }));
    }

    match insert_user(&username, &user.password, Role::Employee, pool.get_ref()).await {
        Ok(_) => {
            info!("User registered");
            HttpResponse::Created().json(json!({
                "message": "User registered successfully"
            }))
        }
        Err(err_resp) => err_resp,
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    let username = user.username.trim().to_lowercase();
    if username.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return HttpResponse::BadRequest().body("Username or password required");
    }

    let db_user = match sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE username = ?"))
        .bind(&username)
        .fetch_optional(pool.get_ref())
        .await
    {
        Ok(Some(user)) if user.is_active => user,
        Ok(Some(_)) => {
            info!("Login refused: user inactive");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    let pair = match issue_token_pair(&TokenSubject::from(&db_user), pool.get_ref(), &config).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        warn!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");
    HttpResponse::Ok().json(pair)
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::Unauthorized().body("No token");
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::Unauthorized().finish(),
    };

    let record = sqlx::query_as::<_, (u64, bool)>(
        r#"
        SELECT id, revoked
        FROM refresh_tokens
        WHERE jti = ?
        "#,
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await;

    let token_id = match record {
        Ok(Some((id, false))) => id,
        Ok(_) => {
            warn!(user_id = claims.user_id, "Refresh with unknown or revoked token");
            return HttpResponse::Unauthorized().finish();
        }
        Err(e) => {
            error!(error = %e, "Failed to look up refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // rotate: the presented token is single use
    let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ? AND revoked = FALSE")
        .bind(token_id)
        .execute(pool.get_ref())
        .await;

    match revoked {
        Ok(res) if res.rows_affected() == 1 => {}
        Ok(_) => return HttpResponse::Unauthorized().finish(),
        Err(e) => {
            error!(error = %e, "Failed to revoke refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    }

    // role, employee link and active flag come from the current row, not the old claims
    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE id = ?"))
        .bind(claims.user_id)
        .fetch_optional(pool.get_ref())
        .await;

    let subject = match user {
        Ok(user) => match active_subject(user) {
            Some(subject) => subject,
            None => {
                info!(user_id = claims.user_id, "Refresh refused: user missing or inactive");
                return HttpResponse::Unauthorized().finish();
            }
        },
        Err(e) => {
            error!(error = %e, "Failed to fetch user for refresh");
            return HttpResponse::InternalServerError().finish();
        }
    };

    match issue_token_pair(&subject, pool.get_ref(), &config).await {
        Ok(pair) => HttpResponse::Ok().json(pair),
        Err(resp) => resp,
    }
}

/// Subject for a new token pair; `None` for deleted or deactivated logins.
fn active_subject(user: Option<User>) -> Option<TokenSubject> {
    user.filter(|u| u.is_active).map(|u| TokenSubject::from(&u))
}

/// Revokes the presented refresh token. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        warn!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

fn link_conflict_or(e: sqlx::Error) -> ApiError {
    if is_constraint_violation(&e) {
        return ApiError::conflict("Employee already linked to another login");
    }
    db_error(e, "Failed to link employee")
}

/// Links a login to an employee record, or unlinks it with `null`.
/// The link takes effect in tokens issued from the next login or refresh.
#[utoipa::path(
    put,
    path = "/api/users/{user_id}/employee",
    params(("user_id", Path, description = "User ID")),
    request_body = LinkEmployeeReq,
    responses(
        (status = 200, description = "Link updated", body = Object, example = json!({
            "message": "Employee link updated"
        })),
        (status = 403, description = "HR or Admin role required"),
        (status = 404, description = "User or employee not found"),
        (status = 409, description = "Employee already linked to another login")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
#[instrument(name = "auth_link_employee", skip(auth, pool, body))]
pub async fn link_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<LinkEmployeeReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let user_id = path.into_inner();

    let user: Option<u64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| db_error(e, "Failed to fetch user"))?;
    if user.is_none() {
        return Err(ApiError::not_found("User not found").into());
    }

    if let Some(employee_id) = body.employee_id {
        let employee: Option<u64> = sqlx::query_scalar("SELECT id FROM employees WHERE id = ?")
            .bind(employee_id)
            .fetch_optional(pool.get_ref())
            .await
            .map_err(|e| db_error(e, "Failed to fetch employee"))?;
        if employee.is_none() {
            return Err(ApiError::not_found("Employee not found").into());
        }
    }

    sqlx::query("UPDATE users SET employee_id = ? WHERE id = ?")
        .bind(body.employee_id)
        .bind(user_id)
        .execute(pool.get_ref())
        .await
        .map_err(link_conflict_or)?;

    info!(user_id, employee_id = ?body.employee_id, "Employee link updated");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Employee link updated"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::duplicate_key;
    use actix_web::test::TestRequest;

    #[test]
    fn bearer_requires_prefix() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer(&req), Some("abc.def"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic abc"))
            .to_http_request();
        assert_eq!(bearer(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(bearer(&req), None);
    }

    fn user(role_id: u8, employee_id: Option<u64>, is_active: bool) -> User {
        User {
            id: 9,
            username: "clerk".into(),
            password: String::new(),
            role_id,
            employee_id,
            is_active,
        }
    }

    #[test]
    fn refresh_uses_the_current_user_row() {
        let subject = active_subject(Some(user(2, Some(31), true))).unwrap();
        assert_eq!(subject.user_id, 9);
        assert_eq!(subject.role, 2);
        assert_eq!(subject.employee_id, Some(31));
    }

    #[test]
    fn refresh_is_refused_for_inactive_or_deleted_users() {
        assert!(active_subject(Some(user(4, None, false))).is_none());
        assert!(active_subject(None).is_none());
    }

    #[test]
    fn employee_taken_by_another_login_is_a_conflict() {
        let err = link_conflict_or(duplicate_key());
        assert!(matches!(err, ApiError::Conflict(_)));
        assert!(matches!(link_conflict_or(sqlx::Error::RowNotFound), ApiError::Internal));
    }
}
