//! `/challenges` routes — challenge CRUD and the invitation inbox/outbox.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    errors::AppResult,
    extract::AppJson,
    middleware::auth_guard::AuthUser,
    models::Challenge,
    services::{
        challenges::{self, ChallengeTree, DeleteOutcome, NewChallenge},
        invitations::{self, ReceivedInvitation, SentInvitation},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/challenges",                            get(list).post(create))
        .route("/challenges/invitations/received",       get(invitations_received))
        .route("/challenges/invitations/sent",           get(invitations_sent))
        .route("/challenges/invitations/{id}/accept",    post(accept_invitation))
        .route("/challenges/invitations/{id}/reject",    post(reject_invitation))
        .route("/challenges/{id}",                       get(get_one).delete(delete))
}

#[derive(Serialize)]
struct InvitationAnswer {
    status:           &'static str,
    participation_id: String,
}

// ── Challenges ───────────────────────────────────────────────

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Challenge>>> {
    Ok(Json(challenges::list_for_user(&state.pool, &user).await?))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(body): AppJson<NewChallenge>,
) -> AppResult<(StatusCode, Json<ChallengeTree>)> {
    let tree = challenges::create_challenge(&state.pool, &user.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(tree)))
}

async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(challenge_id): Path<String>,
) -> AppResult<Json<ChallengeTree>> {
    Ok(Json(challenges::get_challenge(&state.pool, &challenge_id, &user).await?))
}

/// Always 200: failures are reported in the body's `status` field.
async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(challenge_id): Path<String>,
) -> AppResult<Json<DeleteOutcome>> {
    Ok(Json(challenges::delete_challenge(&state.pool, &challenge_id, &user).await?))
}

// ── Invitations ──────────────────────────────────────────────

async fn invitations_received(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<ReceivedInvitation>>> {
    Ok(Json(invitations::list_received(&state.pool, &user.user_id).await?))
}

async fn invitations_sent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<SentInvitation>>> {
    Ok(Json(invitations::list_sent(&state.pool, &user.user_id).await?))
}

async fn accept_invitation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(participation_id): Path<String>,
) -> AppResult<Json<InvitationAnswer>> {
    invitations::accept(&state.pool, &participation_id, &user.user_id).await?;
    Ok(Json(InvitationAnswer { status: "accepted", participation_id }))
}

async fn reject_invitation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(participation_id): Path<String>,
) -> AppResult<Json<InvitationAnswer>> {
    invitations::reject(&state.pool, &participation_id, &user.user_id).await?;
    Ok(Json(InvitationAnswer { status: "rejected", participation_id }))
}
