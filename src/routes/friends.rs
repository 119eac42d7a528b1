//! `/friends` routes — friend requests, friend lists and candidate search.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    errors::AppResult,
    extract::{AppJson, AppQuery},
    middleware::auth_guard::AuthUser,
    models::{FriendRelation, UserSummary},
    services::friends::{self, Decision, FriendStats, PendingRequest},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/friends",                         get(list_friends))
        .route("/friends/stats",                   get(stats))
        .route("/friends/search",                  get(search))
        .route("/friends/pending/sent",            get(pending_sent))
        .route("/friends/pending/received",        get(pending_received))
        .route("/friends/requests",                post(send_request))
        .route("/friends/requests/{id}/accept",    post(accept_request))
        .route("/friends/requests/{id}/reject",    post(reject_request))
}

// ── Request bodies ───────────────────────────────────────────

#[derive(Deserialize)]
struct SendRequestBody {
    addressee_id: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

// ── Handlers ─────────────────────────────────────────────────

async fn list_friends(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<UserSummary>>> {
    Ok(Json(friends::list_friends(&state.pool, &user.user_id).await?))
}

async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<FriendStats>> {
    Ok(Json(friends::stats(&state.pool, &user.user_id).await?))
}

async fn search(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<Vec<UserSummary>>> {
    Ok(Json(friends::search_candidates(&state.pool, &query.q, &user.user_id).await?))
}

async fn pending_sent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<PendingRequest>>> {
    Ok(Json(friends::list_pending_sent(&state.pool, &user.user_id).await?))
}

async fn pending_received(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<PendingRequest>>> {
    Ok(Json(friends::list_pending_received(&state.pool, &user.user_id).await?))
}

async fn send_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(body): AppJson<SendRequestBody>,
) -> AppResult<(StatusCode, Json<FriendRelation>)> {
    let relation =
        friends::create_request(&state.pool, &user.user_id, body.addressee_id.trim()).await?;
    Ok((StatusCode::CREATED, Json(relation)))
}

async fn accept_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(relation_id): Path<String>,
) -> AppResult<Json<FriendRelation>> {
    Ok(Json(friends::respond(&state.pool, &relation_id, &user.user_id, Decision::Accept).await?))
}

async fn reject_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(relation_id): Path<String>,
) -> AppResult<Json<FriendRelation>> {
    Ok(Json(friends::respond(&state.pool, &relation_id, &user.user_id, Decision::Reject).await?))
}
