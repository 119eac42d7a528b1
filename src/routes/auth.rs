use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{hash_password, reject_unknown_user, session, validate_password_strength, verify_password},
    errors::{AppError, AppResult, StoreViolation},
    extract::AppJson,
    middleware::auth_guard::AuthUser,
    state::AppState,
};

// ── Request / response types ──────────────────────────────────

#[derive(Deserialize, Validate)]
struct RegisterRequest {
    #[validate(length(min = 3, max = 64, message = "Username must be 3-64 characters"))]
    username: String,
    #[validate(email(message = "Invalid email address"))]
    email:    String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct UserResponse {
    id:       String,
    username: String,
    email:    String,
    role:     String,
}

#[derive(Serialize)]
struct AuthResponse {
    access_token: String,
    token_type:   &'static str,
    user:         UserResponse,
}

// ── Database row types ────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct UserRow {
    id:            String,
    username:      String,
    email:         String,
    password_hash: String,
    role:          String,
}

// ── Router ────────────────────────────────────────────────────

/// Routes reachable without a session.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login",    post(login))
        .route("/auth/logout",   post(logout))
}

/// Routes behind the auth guard.
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}

// ── Handlers ──────────────────────────────────────────────────

/// POST /auth/register — create a `user` account and log it in.
async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let pool   = &state.pool;
    let config = &state.config;

    let body = RegisterRequest {
        username: body.username.trim().to_owned(),
        email:    body.email.trim().to_owned(),
        password: body.password,
    };
    body.validate()?;

    // DEV: password strength is disabled in development for easy testing.
    if !config.is_development() {
        validate_password_strength(&body.password)?;
    }

    let hash = hash_password(&body.password)?;
    let id   = Uuid::new_v4().to_string();

    // Account and first session commit together.
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role)
         VALUES (?, ?, ?, ?, 'user')",
    )
    .bind(&id)
    .bind(&body.username)
    .bind(&body.email)
    .bind(hash)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        AppError::from_store(e, |violation| match violation {
            StoreViolation::Unique => AppError::Conflict("Username or email is already taken".into()),
            _ => AppError::BadRequest("Username or email does not meet the requirements".into()),
        })
    })?;

    let token = session::issue(&mut tx, &id, config.session_days).await?;
    tx.commit().await?;

    tracing::info!(user_id = %id, username = %body.username, "User registered");
    session::set_cookie(&cookies, &token, config.session_days);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token: token,
            token_type:   "bearer",
            user: UserResponse { id, username: body.username, email: body.email, role: "user".into() },
        }),
    ))
}

/// POST /auth/login — username + password.
async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let pool   = &state.pool;
    let config = &state.config;

    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, password_hash, role FROM users WHERE username = ? LIMIT 1",
    )
    .bind(body.username.trim())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| reject_unknown_user(&body.password))?;

    verify_password(&body.password, &row.password_hash)?;

    let mut conn = pool.acquire().await?;
    let token = session::issue(&mut conn, &row.id, config.session_days).await?;
    session::set_cookie(&cookies, &token, config.session_days);
    tracing::info!(user_id = %row.id, "User logged in");

    Ok(Json(AuthResponse {
        access_token: token,
        token_type:   "bearer",
        user: UserResponse { id: row.id, username: row.username, email: row.email, role: row.role },
    }))
}

/// POST /auth/logout — delete the current session.
async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    if let Some(token) = session::extract_token(&cookies, &headers) {
        session::revoke(&state.pool, &token).await?;
    }
    session::clear_cookie(&cookies);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/me — return the currently logged-in user.
async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<impl IntoResponse> {
    let email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
        .bind(&user.user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(UserResponse {
        id:       user.user_id,
        username: user.username,
        email,
        role:     user.role.to_string(),
    }))
}
