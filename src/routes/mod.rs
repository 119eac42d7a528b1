use axum::{middleware, Router};
use crate::{
    middleware::auth_guard::require_auth,
    state::AppState,
};

mod auth;
mod challenges;
mod friends;
mod progress;

/// Build the full `/api/v1` router.
///
/// Register, login and logout are left unprotected; every other route is
/// wrapped in the session-based [`require_auth`] middleware.
pub fn all_routes(state: AppState) -> Router<AppState> {
    let auth_mw = middleware::from_fn_with_state(state, require_auth);
    Router::new()
        .merge(auth::router())
        .merge(
            Router::new()
                .merge(auth::protected_router())
                .merge(friends::router())
                .merge(challenges::router())
                .merge(progress::router())
                .route_layer(auth_mw),
        )
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sqlx::mysql::MySqlPoolOptions;
    use tower::ServiceExt;
    use tower_cookies::CookieManagerLayer;

    use super::*;
    use crate::config::test_config;

    /// Router with a pool that never connects unless a query actually runs.
    fn app() -> Router {
        let config = test_config();
        let pool = MySqlPoolOptions::new()
            .connect_lazy(&config.database_url())
            .unwrap();
        let state = AppState { pool, config };
        Router::new()
            .nest("/api/v1", all_routes(state.clone()))
            .layer(CookieManagerLayer::new())
            .with_state(state)
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app().oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        for (method, uri) in [
            ("GET",    "/api/v1/auth/me"),
            ("GET",    "/api/v1/friends"),
            ("GET",    "/api/v1/friends/search?q=al"),
            ("POST",   "/api/v1/friends/requests/abc/accept"),
            ("GET",    "/api/v1/challenges"),
            ("DELETE", "/api/v1/challenges/abc"),
            ("GET",    "/api/v1/challenges/invitations/received"),
            ("POST",   "/api/v1/progress/subtasks/abc?completed=true"),
            ("GET",    "/api/v1/progress/tasks/abc/history"),
        ] {
            assert_eq!(status_of(method, uri).await, StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn logout_without_session_still_clears_cookie() {
        assert_eq!(status_of("POST", "/api/v1/auth/logout").await, StatusCode::NO_CONTENT);
    }

    async fn post_json(uri: &str, body: &'static str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_json_error_shape() {
        for (uri, body) in [
            ("/api/v1/auth/register", "{not json"),
            ("/api/v1/auth/register", r#"{"username":"abc"}"#),
            ("/api/v1/auth/login",    r#"{"username":"abc"}"#),
        ] {
            let (status, json) = post_json(uri, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
            assert_eq!(json["status"], "error");
            assert!(json["message"].as_str().is_some_and(|m| !m.is_empty()));
        }
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        assert_eq!(status_of("GET", "/api/v1/nothing-here").await, StatusCode::NOT_FOUND);
    }
}
