//! `/progress` routes — per-day completion of subtasks and daily tasks.

use axum::{
    extract::{Extension, Path, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    errors::AppResult,
    extract::AppQuery,
    middleware::auth_guard::AuthUser,
    services::progress::{self, DailyProgress, ParticipantHistory, RecordOutcome, Target},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/progress/subtasks/{id}",      get(get_subtask).post(record_subtask))
        .route("/progress/tasks/{id}",         get(get_task).post(record_task))
        .route("/progress/tasks/{id}/history", get(history))
}

// ── Query / response types ───────────────────────────────────

#[derive(Deserialize)]
struct RecordQuery {
    completed: bool,
    date:      Option<NaiveDate>,
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<NaiveDate>,
}

#[derive(Serialize)]
struct RecordResponse {
    status:    &'static str,
    date:      NaiveDate,
    completed: bool,
}

impl RecordResponse {
    fn new(outcome: RecordOutcome, date: NaiveDate, completed: bool) -> Self {
        let status = match outcome {
            RecordOutcome::Recorded      => "success",
            RecordOutcome::AdminReadOnly => "admin_readonly",
        };
        Self { status, date, completed }
    }
}

#[derive(Serialize)]
struct SubtaskProgressResponse {
    subtask_id: String,
    date:       NaiveDate,
    completed:  bool,
}

#[derive(Serialize)]
struct TaskProgressResponse {
    daily_task_id: String,
    date:          NaiveDate,
    #[serde(flatten)]
    progress:      DailyProgress,
}

// ── Handlers ─────────────────────────────────────────────────

async fn record_subtask(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(subtask_id): Path<String>,
    AppQuery(query): AppQuery<RecordQuery>,
) -> AppResult<Json<RecordResponse>> {
    let date = query.date.unwrap_or_else(progress::today);
    let outcome = progress::record_progress(
        &state.pool, &user, &Target::Subtask(subtask_id), date, query.completed,
    )
    .await?;
    Ok(Json(RecordResponse::new(outcome, date, query.completed)))
}

async fn record_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<String>,
    AppQuery(query): AppQuery<RecordQuery>,
) -> AppResult<Json<RecordResponse>> {
    let date = query.date.unwrap_or_else(progress::today);
    let outcome = progress::record_progress(
        &state.pool, &user, &Target::Task(task_id), date, query.completed,
    )
    .await?;
    Ok(Json(RecordResponse::new(outcome, date, query.completed)))
}

async fn get_subtask(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(subtask_id): Path<String>,
    AppQuery(query): AppQuery<DateQuery>,
) -> AppResult<Json<SubtaskProgressResponse>> {
    let date = query.date.unwrap_or_else(progress::today);
    let completed = progress::get_subtask_progress(&state.pool, &user, &subtask_id, date).await?;
    Ok(Json(SubtaskProgressResponse { subtask_id, date, completed }))
}

async fn get_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<String>,
    AppQuery(query): AppQuery<DateQuery>,
) -> AppResult<Json<TaskProgressResponse>> {
    let date = query.date.unwrap_or_else(progress::today);
    let daily = progress::get_daily_percent(&state.pool, &user, &task_id, date).await?;
    Ok(Json(TaskProgressResponse { daily_task_id: task_id, date, progress: daily }))
}

async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<String>,
) -> AppResult<Json<Vec<ParticipantHistory>>> {
    let history =
        progress::get_progress_history(&state.pool, &user, &task_id, progress::today()).await?;
    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_readonly_outcome_is_reported_in_status() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(RecordResponse::new(RecordOutcome::Recorded, date, true).status, "success");
        assert_eq!(
            RecordResponse::new(RecordOutcome::AdminReadOnly, date, true).status,
            "admin_readonly"
        );
    }
}
