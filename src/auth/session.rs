//! Session tokens: issued at login/registration, stored in `user_sessions`,
//! presented either as the `session` cookie or as a bearer token.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::MySqlConnection;
use tower_cookies::{
    cookie::{time::Duration as CookieDuration, SameSite},
    Cookie, Cookies,
};
use uuid::Uuid;

use crate::{
    auth::generate_token,
    db::Db,
    errors::{AppError, AppResult},
    models::UserRole,
};

pub const SESSION_COOKIE: &str = "session";

/// Authenticated caller resolved from a valid session. Injected into request
/// extensions by the auth guard; handlers use `Extension<AuthUser>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id:  String,
    pub username: String,
    pub role:     UserRole,
}

/// Expiry of a session issued at `now`.
fn expires_at(now: DateTime<Utc>, days: i64) -> NaiveDateTime {
    (now + chrono::Duration::days(days)).naive_utc()
}

/// Create a session for `user_id` valid for `days` and return its token.
/// Runs on the caller's connection so it can share a transaction with the
/// account write.
pub async fn issue(conn: &mut MySqlConnection, user_id: &str, days: i64) -> AppResult<String> {
    let token = generate_token();
    let id    = Uuid::new_v4().to_string();
    let expires_at = expires_at(Utc::now(), days);

    sqlx::query(
        "INSERT INTO user_sessions (id, user_id, token, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(user_id)
    .bind(&token)
    .bind(expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(token)
}

/// Resolve a token to its user. Unknown or expired tokens are `Unauthorized`.
pub async fn verify(pool: &Db, token: &str) -> AppResult<AuthUser> {
    #[derive(sqlx::FromRow)]
    struct SessionRow {
        id:       String,
        username: String,
        role:     String,
    }

    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT u.id, u.username, u.role
         FROM user_sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = ?
           AND s.expires_at > UTC_TIMESTAMP()
         LIMIT 1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    Ok(AuthUser {
        user_id:  row.id,
        username: row.username,
        role:     UserRole::parse(&row.role),
    })
}

pub async fn revoke(pool: &Db, token: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Cookie first, then `Authorization: Bearer <token>`.
pub fn extract_token(cookies: &Cookies, headers: &HeaderMap) -> Option<String> {
    cookies
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_owned())
        .or_else(|| bearer_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

pub fn set_cookie(cookies: &Cookies, token: &str, days: i64) {
    let cookie = Cookie::build((SESSION_COOKIE, token.to_owned()))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(CookieDuration::days(days))
        .build();
    cookies.add(cookie);
}

pub fn clear_cookie(cookies: &Cookies) {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .path("/")
        .max_age(CookieDuration::ZERO)
        .build();
    cookies.add(cookie);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn sessions_expire_after_configured_days() {
        let now = DateTime::parse_from_rfc3339("2025-06-01T10:30:00Z").unwrap().with_timezone(&Utc);
        let expiry = expires_at(now, 30);
        assert_eq!(expiry.to_string(), "2025-07-01 10:30:00");
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(bearer_token(&headers_with("Bearer abc123")).as_deref(), Some("abc123"));
        assert_eq!(bearer_token(&headers_with("bearer  abc123 ")).as_deref(), Some("abc123"));
    }

    #[test]
    fn other_schemes_and_blank_tokens_are_ignored() {
        assert_eq!(bearer_token(&headers_with("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&headers_with("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
