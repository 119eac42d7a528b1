//! Authentication guard middleware.
//!
//! Reads the session token (cookie or bearer header), validates it against
//! `user_sessions`, and injects an `AuthUser` extension into the request for
//! downstream handlers.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    auth::session,
    errors::AppError,
    state::AppState,
};

pub use crate::auth::session::AuthUser;

/// Middleware: require any valid session.
/// On success, inserts `AuthUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session::extract_token(&cookies, req.headers())
        .ok_or(AppError::Unauthorized)?;

    let user = session::verify(&state.pool, &token).await?;
    tracing::debug!(user_id = %user.user_id, role = %user.role, "Authenticated request");

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
