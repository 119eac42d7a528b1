//! Challenge registry: creation of the full challenge tree in one transaction,
//! visibility-checked reads, and admin deletion.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlConnection;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::Db,
    errors::{AppError, AppResult, StoreViolation},
    middleware::auth_guard::AuthUser,
    models::{Challenge, DailyTaskRow, Participant, Subtask},
    policy::{self, Access, Operation, Resource},
};

const CHALLENGE_COLUMNS: &str =
    "c.id, c.name, c.description, c.is_timed, c.start_date, c.end_date, c.author_id";

// ── Input ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewChallenge {
    #[validate(length(min = 1, max = 255))]
    pub name:            String,
    pub description:     Option<String>,
    #[serde(default)]
    pub is_timed:        bool,
    pub start_date:      Option<NaiveDate>,
    pub end_date:        Option<NaiveDate>,
    #[serde(default)]
    pub participant_ids: Vec<String>,
    #[serde(default)]
    #[validate(nested)]
    pub daily_tasks:     Vec<NewDailyTask>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewDailyTask {
    #[validate(length(min = 1, max = 255))]
    pub name:        String,
    pub description: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub subtasks:    Vec<NewSubtask>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSubtask {
    #[validate(length(min = 1, max = 255))]
    pub name:     String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default = "default_weight")]
    #[validate(range(exclusive_min = 0.0))]
    pub weight:   f64,
}

fn default_required() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl NewChallenge {
    /// Everything that can be rejected without touching the store.
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;

        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Challenge name cannot be blank".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(AppError::BadRequest("end_date cannot be before start_date".into()));
            }
        }
        for task in &self.daily_tasks {
            if task.name.trim().is_empty() {
                return Err(AppError::BadRequest("Daily task name cannot be blank".into()));
            }
            for subtask in &task.subtasks {
                if subtask.name.trim().is_empty() {
                    return Err(AppError::BadRequest("Subtask name cannot be blank".into()));
                }
                if !subtask.weight.is_finite() || subtask.weight <= 0.0 {
                    return Err(AppError::BadRequest("Subtask weight must be a positive number".into()));
                }
            }
        }
        Ok(())
    }
}

// ── Output ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ChallengeTree {
    #[serde(flatten)]
    pub challenge:    Challenge,
    pub participants: Vec<Participant>,
    pub daily_tasks:  Vec<DailyTaskTree>,
}

#[derive(Debug, Serialize)]
pub struct DailyTaskTree {
    pub id:          String,
    pub name:        String,
    pub description: Option<String>,
    pub subtasks:    Vec<Subtask>,
}

/// `delete_challenge` never fails at the HTTP level; the outcome says how it went.
#[derive(Debug, Serialize, PartialEq)]
pub struct DeleteOutcome {
    pub status:       &'static str,
    pub message:      String,
    pub challenge_id: String,
}

impl DeleteOutcome {
    fn success(challenge_id: &str) -> Self {
        Self { status: "success", message: "Challenge deleted".into(), challenge_id: challenge_id.into() }
    }

    fn error(challenge_id: &str, message: &str) -> Self {
        Self { status: "error", message: message.into(), challenge_id: challenge_id.into() }
    }
}

// ── Row helpers ──────────────────────────────────────────────

/// Invitee ids in first-seen order, without blanks, duplicates or the author.
pub fn normalize_invitees(author_id: &str, ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && *id != author_id)
        .filter(|id| seen.insert(id.to_string()))
        .map(ToString::to_string)
        .collect()
}

/// Build the nested view. `tasks` and `subtasks` must already be in display
/// order; subtasks are grouped under their task keeping that order.
pub fn assemble(
    challenge: Challenge,
    participants: Vec<Participant>,
    tasks: Vec<DailyTaskRow>,
    subtasks: Vec<Subtask>,
) -> ChallengeTree {
    let mut by_task: HashMap<String, Vec<Subtask>> = HashMap::new();
    for subtask in subtasks {
        by_task.entry(subtask.daily_task_id.clone()).or_default().push(subtask);
    }

    let daily_tasks = tasks
        .into_iter()
        .map(|task| DailyTaskTree {
            subtasks:    by_task.remove(&task.id).unwrap_or_default(),
            id:          task.id,
            name:        task.name,
            description: task.description,
        })
        .collect();

    ChallengeTree { challenge, participants, daily_tasks }
}

/// The caller's standing towards a challenge, for the policy check.
pub fn resource_for(challenge: &Challenge, user_id: &str, accepted: Option<bool>) -> Resource {
    Resource {
        is_author:     challenge.author_id == user_id,
        participation: accepted,
    }
}

// ── Store operations ─────────────────────────────────────────

pub async fn create_challenge(
    pool: &Db,
    author_id: &str,
    new: NewChallenge,
) -> AppResult<ChallengeTree> {
    new.check()?;
    let invitees = normalize_invitees(author_id, &new.participant_ids);

    let mut tx = pool.begin().await?;

    let challenge_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO challenges (id, name, description, is_timed, start_date, end_date, author_id)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&challenge_id)
    .bind(new.name.trim())
    .bind(&new.description)
    .bind(new.is_timed)
    .bind(new.start_date)
    .bind(new.end_date)
    .bind(author_id)
    .execute(&mut *tx)
    .await?;

    // Author participates from the start; invitees must accept first.
    insert_participation(&mut tx, &challenge_id, author_id, true).await?;
    for user_id in &invitees {
        insert_participation(&mut tx, &challenge_id, user_id, false).await?;
    }

    for (task_pos, task) in new.daily_tasks.iter().enumerate() {
        let task_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO daily_tasks (id, challenge_id, name, description, position)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&task_id)
        .bind(&challenge_id)
        .bind(task.name.trim())
        .bind(&task.description)
        .bind(task_pos as i32)
        .execute(&mut *tx)
        .await?;

        for (sub_pos, subtask) in task.subtasks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO subtasks (id, daily_task_id, name, required, weight, position)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&task_id)
            .bind(subtask.name.trim())
            .bind(subtask.required)
            .bind(subtask.weight)
            .bind(sub_pos as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::from_store(e, |_| {
                    AppError::BadRequest("Subtask weight must be a positive number".into())
                })
            })?;
        }
    }

    let challenge = fetch_challenge(&mut tx, &challenge_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let tree = load_tree(&mut tx, challenge).await?;

    tx.commit().await?;
    tracing::info!(
        %challenge_id,
        %author_id,
        invitees = invitees.len(),
        daily_tasks = tree.daily_tasks.len(),
        "Challenge created"
    );
    Ok(tree)
}

pub async fn get_challenge(pool: &Db, challenge_id: &str, caller: &AuthUser) -> AppResult<ChallengeTree> {
    let mut conn = pool.acquire().await?;

    let challenge = fetch_challenge(&mut conn, challenge_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let accepted = participation_of(&mut conn, challenge_id, &caller.user_id).await?;
    let resource = resource_for(&challenge, &caller.user_id, accepted);
    if !policy::check(caller.role, Operation::ViewChallenge, &resource).can_read() {
        // Existence is not confirmed to outsiders.
        return Err(AppError::NotFound);
    }

    load_tree(&mut conn, challenge).await
}

pub async fn list_for_user(pool: &Db, caller: &AuthUser) -> AppResult<Vec<Challenge>> {
    let sees_everything =
        policy::check(caller.role, Operation::ViewChallenge, &Resource::outsider()).can_read();

    let rows = if sees_everything {
        sqlx::query_as::<_, Challenge>(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges c ORDER BY c.created_at DESC"
        ))
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Challenge>(&format!(
            "SELECT {CHALLENGE_COLUMNS}
             FROM challenges c
             LEFT JOIN challenge_participants p
                    ON p.challenge_id = c.id AND p.user_id = ?
             WHERE c.author_id = ? OR p.accepted = 1
             ORDER BY c.created_at DESC"
        ))
        .bind(&caller.user_id)
        .bind(&caller.user_id)
        .fetch_all(pool)
        .await?
    };

    Ok(rows)
}

pub async fn delete_challenge(pool: &Db, challenge_id: &str, caller: &AuthUser) -> AppResult<DeleteOutcome> {
    if policy::check(caller.role, Operation::DeleteChallenge, &Resource::outsider()) != Access::Allow {
        tracing::warn!(%challenge_id, user_id = %caller.user_id, "Non-admin attempted challenge deletion");
        return Ok(DeleteOutcome::error(
            challenge_id,
            "Only an administrator can delete challenges",
        ));
    }

    // Participations, tasks, subtasks and progress go with it (ON DELETE CASCADE).
    let result = sqlx::query("DELETE FROM challenges WHERE id = ?")
        .bind(challenge_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(DeleteOutcome::error(challenge_id, "Challenge does not exist"));
    }

    tracing::info!(%challenge_id, admin_id = %caller.user_id, "Challenge deleted");
    Ok(DeleteOutcome::success(challenge_id))
}

// ── Shared loaders ───────────────────────────────────────────

pub(crate) async fn fetch_challenge(
    conn: &mut MySqlConnection,
    challenge_id: &str,
) -> AppResult<Option<Challenge>> {
    let row = sqlx::query_as::<_, Challenge>(&format!(
        "SELECT {CHALLENGE_COLUMNS} FROM challenges c WHERE c.id = ?"
    ))
    .bind(challenge_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// `Some(accepted)` if the user has a participation row in the challenge.
pub(crate) async fn participation_of(
    conn: &mut MySqlConnection,
    challenge_id: &str,
    user_id: &str,
) -> AppResult<Option<bool>> {
    let accepted: Option<bool> = sqlx::query_scalar(
        "SELECT accepted FROM challenge_participants WHERE challenge_id = ? AND user_id = ?",
    )
    .bind(challenge_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(accepted)
}

pub(crate) async fn load_participants(
    conn: &mut MySqlConnection,
    challenge_id: &str,
) -> AppResult<Vec<Participant>> {
    let rows = sqlx::query_as::<_, Participant>(
        "SELECT p.id AS participation_id, p.user_id, u.username, p.accepted
         FROM challenge_participants p
         JOIN users u      ON u.id = p.user_id
         JOIN challenges c ON c.id = p.challenge_id
         WHERE p.challenge_id = ?
         ORDER BY (p.user_id = c.author_id) DESC, u.username",
    )
    .bind(challenge_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn load_tree(conn: &mut MySqlConnection, challenge: Challenge) -> AppResult<ChallengeTree> {
    let participants = load_participants(conn, &challenge.id).await?;

    let tasks = sqlx::query_as::<_, DailyTaskRow>(
        "SELECT id, name, description FROM daily_tasks WHERE challenge_id = ? ORDER BY position",
    )
    .bind(&challenge.id)
    .fetch_all(&mut *conn)
    .await?;

    let subtasks = sqlx::query_as::<_, Subtask>(
        "SELECT s.id, s.daily_task_id, s.name, s.required, s.weight
         FROM subtasks s
         JOIN daily_tasks t ON t.id = s.daily_task_id
         WHERE t.challenge_id = ?
         ORDER BY t.position, s.position",
    )
    .bind(&challenge.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(assemble(challenge, participants, tasks, subtasks))
}

async fn insert_participation(
    conn: &mut MySqlConnection,
    challenge_id: &str,
    user_id: &str,
    accepted: bool,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO challenge_participants (id, challenge_id, user_id, accepted)
         VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(challenge_id)
    .bind(user_id)
    .bind(accepted)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        AppError::from_store(e, |violation| match violation {
            StoreViolation::ForeignKey => AppError::BadRequest(format!("Unknown participant: {user_id}")),
            StoreViolation::Unique     => AppError::BadRequest(format!("Duplicate participant: {user_id}")),
            StoreViolation::Check      => AppError::BadRequest("Invalid participant".into()),
        })
    })?;
    Ok(())
}
