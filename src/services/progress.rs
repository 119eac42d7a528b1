//! Daily progress: per participant, per subtask (or per subtask-less task),
//! per day. Weighted aggregation and the history time series are computed
//! here from plain rows.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::MySqlConnection;

use crate::{
    db::Db,
    errors::{AppError, AppResult, StoreViolation},
    middleware::auth_guard::AuthUser,
    models::{Participant, ProgressEntry, Subtask, UserRole},
    policy::{self, Access, Operation, Resource},
    services::challenges::{fetch_challenge, load_participants, participation_of, resource_for},
};

const NOT_A_PARTICIPANT: &str = "User is not a participant of this challenge";
const NOT_ACCEPTED: &str = "Accept the challenge invitation before recording progress";

/// What a progress write is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Subtask(String),
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Admin without a participation: acknowledged, nothing written.
    AdminReadOnly,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DailyProgress {
    pub percent:   i64,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryPoint {
    pub date:    NaiveDate,
    pub percent: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParticipantHistory {
    pub participation_id: String,
    pub user_id:          String,
    pub username:         String,
    pub points:           Vec<HistoryPoint>,
}

#[derive(sqlx::FromRow)]
struct ParticipationRow {
    id:       String,
    accepted: bool,
}

/// A target resolved to its challenge. `subtask_count` is only meaningful for
/// tasks.
struct ResolvedTarget {
    challenge_id:  String,
    subtask_count: i64,
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// ── Aggregation ──────────────────────────────────────────────

/// `percent = round(100 * completed weight / total weight)`. The task counts
/// as completed once every required subtask is done, or every subtask when
/// none is marked required.
pub fn weighted_progress(subtasks: &[Subtask], done: &HashSet<&str>) -> DailyProgress {
    let total: f64 = subtasks.iter().map(|s| s.weight).sum();
    if subtasks.is_empty() || total <= 0.0 {
        return DailyProgress { percent: 0, completed: false };
    }

    let completed_weight: f64 = subtasks
        .iter()
        .filter(|s| done.contains(s.id.as_str()))
        .map(|s| s.weight)
        .sum();
    let percent = ((completed_weight / total) * 100.0).round().clamp(0.0, 100.0) as i64;

    let any_required = subtasks.iter().any(|s| s.required);
    let completed = subtasks
        .iter()
        .filter(|s| s.required || !any_required)
        .all(|s| done.contains(s.id.as_str()));

    DailyProgress { percent, completed }
}

/// Subtask-less tasks are all or nothing.
pub fn task_progress(completed: bool) -> DailyProgress {
    DailyProgress { percent: if completed { 100 } else { 0 }, completed }
}

/// Every date with any recorded entry plus `today`, ascending, deduplicated.
pub fn date_axis(entries: &[ProgressEntry], today: NaiveDate) -> Vec<NaiveDate> {
    entries
        .iter()
        .map(|e| e.progress_date)
        .chain(std::iter::once(today))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One point per participant per axis date; missing entries count as not done.
///
/// `entries` hold subtask-level rows when `subtasks` is non-empty, otherwise
/// task-level rows whose target is `daily_task_id`.
pub fn build_history(
    participants: Vec<Participant>,
    daily_task_id: &str,
    subtasks: &[Subtask],
    entries: &[ProgressEntry],
    today: NaiveDate,
) -> Vec<ParticipantHistory> {
    let axis = date_axis(entries, today);

    let mut done: HashMap<(&str, NaiveDate), HashSet<&str>> = HashMap::new();
    for entry in entries.iter().filter(|e| e.completed) {
        done.entry((entry.participation_id.as_str(), entry.progress_date))
            .or_default()
            .insert(entry.target_id.as_str());
    }
    let nothing = HashSet::new();

    participants
        .into_iter()
        .map(|participant| {
            let points = axis
                .iter()
                .map(|&date| {
                    let completed = done
                        .get(&(participant.participation_id.as_str(), date))
                        .unwrap_or(&nothing);
                    let progress = if subtasks.is_empty() {
                        task_progress(completed.contains(daily_task_id))
                    } else {
                        weighted_progress(subtasks, completed)
                    };
                    HistoryPoint { date, percent: progress.percent }
                })
                .collect();

            ParticipantHistory {
                participation_id: participant.participation_id,
                user_id:          participant.user_id,
                username:         participant.username,
                points,
            }
        })
        .collect()
}

// ── Write rules ──────────────────────────────────────────────

/// Tasks with subtasks only take progress through their subtasks.
fn check_write_level(target: &Target, subtask_count: i64) -> AppResult<()> {
    if matches!(target, Target::Task(_)) && subtask_count > 0 {
        return Err(AppError::BadRequest(
            "This task has subtasks; record progress on its subtasks".into(),
        ));
    }
    Ok(())
}

/// Participation a write lands on. `None` is the admin read-only bypass:
/// acknowledged, nothing written.
fn write_target(role: UserRole, participation: Option<ParticipationRow>) -> AppResult<Option<String>> {
    let resource = participation
        .as_ref()
        .map_or_else(Resource::outsider, |p| Resource::participant(p.accepted));

    match policy::check(role, Operation::WriteProgress, &resource) {
        Access::Allow => participation
            .map(|p| Some(p.id))
            .ok_or_else(|| AppError::BadRequest(NOT_A_PARTICIPANT.into())),
        Access::ReadOnly => Ok(None),
        Access::Deny => {
            let message = if participation.is_some() { NOT_ACCEPTED } else { NOT_A_PARTICIPANT };
            Err(AppError::BadRequest(message.into()))
        }
    }
}

// ── Store operations ─────────────────────────────────────────

pub async fn record_progress(
    pool: &Db,
    caller: &AuthUser,
    target: &Target,
    date: NaiveDate,
    completed: bool,
) -> AppResult<RecordOutcome> {
    let mut tx = pool.begin().await?;

    let resolved = resolve_target(&mut tx, target).await?;
    check_write_level(target, resolved.subtask_count)?;

    let participation = find_participation(&mut tx, &resolved.challenge_id, &caller.user_id).await?;
    let Some(participation_id) = write_target(caller.role, participation)? else {
        tracing::debug!(user_id = %caller.user_id, ?target, "Admin progress write acknowledged read-only");
        return Ok(RecordOutcome::AdminReadOnly);
    };

    let sql = match target {
        Target::Subtask(_) => {
            "INSERT INTO subtask_progress (participation_id, subtask_id, progress_date, completed)
             VALUES (?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE completed = VALUES(completed)"
        }
        Target::Task(_) => {
            "INSERT INTO task_progress (participation_id, daily_task_id, progress_date, completed)
             VALUES (?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE completed = VALUES(completed)"
        }
    };
    let target_id = match target {
        Target::Subtask(id) | Target::Task(id) => id,
    };

    sqlx::query(sql)
        .bind(&participation_id)
        .bind(target_id)
        .bind(date)
        .bind(completed)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_store(e, |violation| match violation {
                StoreViolation::ForeignKey => AppError::BadRequest(NOT_A_PARTICIPANT.into()),
                _                          => AppError::BadRequest("Invalid progress entry".into()),
            })
        })?;

    tx.commit().await?;
    tracing::info!(%participation_id, %target_id, %date, completed, "Progress recorded");
    Ok(RecordOutcome::Recorded)
}

pub async fn get_subtask_progress(
    pool: &Db,
    caller: &AuthUser,
    subtask_id: &str,
    date: NaiveDate,
) -> AppResult<bool> {
    let mut conn = pool.acquire().await?;

    let resolved = resolve_target(&mut conn, &Target::Subtask(subtask_id.to_owned())).await?;
    let Some(participation_id) = readable_participation(&mut conn, caller, &resolved.challenge_id).await? else {
        return Ok(false);
    };

    let completed: Option<bool> = sqlx::query_scalar(
        "SELECT completed FROM subtask_progress
         WHERE participation_id = ? AND subtask_id = ? AND progress_date = ?",
    )
    .bind(&participation_id)
    .bind(subtask_id)
    .bind(date)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(completed.unwrap_or(false))
}

pub async fn get_daily_percent(
    pool: &Db,
    caller: &AuthUser,
    daily_task_id: &str,
    date: NaiveDate,
) -> AppResult<DailyProgress> {
    let mut conn = pool.acquire().await?;

    let resolved = resolve_target(&mut conn, &Target::Task(daily_task_id.to_owned())).await?;
    let Some(participation_id) = readable_participation(&mut conn, caller, &resolved.challenge_id).await? else {
        return Ok(task_progress(false));
    };

    let subtasks = load_subtasks(&mut conn, daily_task_id).await?;
    if subtasks.is_empty() {
        let completed: Option<bool> = sqlx::query_scalar(
            "SELECT completed FROM task_progress
             WHERE participation_id = ? AND daily_task_id = ? AND progress_date = ?",
        )
        .bind(&participation_id)
        .bind(daily_task_id)
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;
        return Ok(task_progress(completed.unwrap_or(false)));
    }

    let done_ids: Vec<String> = sqlx::query_scalar(
        "SELECT sp.subtask_id
         FROM subtask_progress sp
         JOIN subtasks s ON s.id = sp.subtask_id
         WHERE sp.participation_id = ? AND s.daily_task_id = ?
           AND sp.progress_date = ? AND sp.completed = 1",
    )
    .bind(&participation_id)
    .bind(daily_task_id)
    .bind(date)
    .fetch_all(&mut *conn)
    .await?;

    let done: HashSet<&str> = done_ids.iter().map(String::as_str).collect();
    Ok(weighted_progress(&subtasks, &done))
}

pub async fn get_progress_history(
    pool: &Db,
    caller: &AuthUser,
    daily_task_id: &str,
    today: NaiveDate,
) -> AppResult<Vec<ParticipantHistory>> {
    let mut conn = pool.acquire().await?;

    let resolved = resolve_target(&mut conn, &Target::Task(daily_task_id.to_owned())).await?;
    let challenge = fetch_challenge(&mut conn, &resolved.challenge_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let accepted = participation_of(&mut conn, &challenge.id, &caller.user_id).await?;
    let resource = resource_for(&challenge, &caller.user_id, accepted);
    if !policy::check(caller.role, Operation::ViewChallenge, &resource).can_read() {
        return Err(AppError::NotFound);
    }

    let participants = load_participants(&mut conn, &challenge.id).await?;
    let subtasks = load_subtasks(&mut conn, daily_task_id).await?;

    let entries = if subtasks.is_empty() {
        sqlx::query_as::<_, ProgressEntry>(
            "SELECT participation_id, daily_task_id AS target_id, progress_date, completed
             FROM task_progress
             WHERE daily_task_id = ?",
        )
        .bind(daily_task_id)
        .fetch_all(&mut *conn)
        .await?
    } else {
        sqlx::query_as::<_, ProgressEntry>(
            "SELECT sp.participation_id, sp.subtask_id AS target_id, sp.progress_date, sp.completed
             FROM subtask_progress sp
             JOIN subtasks s ON s.id = sp.subtask_id
             WHERE s.daily_task_id = ?",
        )
        .bind(daily_task_id)
        .fetch_all(&mut *conn)
        .await?
    };

    Ok(build_history(participants, daily_task_id, &subtasks, &entries, today))
}

// ── Helpers ──────────────────────────────────────────────────

/// Participation id the caller may read progress for. `None` means the admin
/// bypass applies and reads default to "not done".
async fn readable_participation(
    conn: &mut MySqlConnection,
    caller: &AuthUser,
    challenge_id: &str,
) -> AppResult<Option<String>> {
    let participation = find_participation(conn, challenge_id, &caller.user_id).await?;
    let resource = Resource::outsider();
    let resource = participation
        .as_ref()
        .map_or(resource, |p| Resource::participant(p.accepted));

    match policy::check(caller.role, Operation::ReadProgress, &resource) {
        Access::Allow    => Ok(participation.map(|p| p.id)),
        Access::ReadOnly => Ok(None),
        Access::Deny     => Err(AppError::BadRequest(NOT_A_PARTICIPANT.into())),
    }
}

async fn resolve_target(conn: &mut MySqlConnection, target: &Target) -> AppResult<ResolvedTarget> {
    #[derive(sqlx::FromRow)]
    struct Row {
        challenge_id:  String,
        subtask_count: i64,
    }

    let row = match target {
        Target::Subtask(id) => {
            sqlx::query_as::<_, Row>(
                "SELECT t.challenge_id, CAST(0 AS SIGNED) AS subtask_count
                 FROM subtasks s
                 JOIN daily_tasks t ON t.id = s.daily_task_id
                 WHERE s.id = ?",
            )
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        }
        Target::Task(id) => {
            sqlx::query_as::<_, Row>(
                "SELECT t.challenge_id,
                        (SELECT COUNT(*) FROM subtasks s WHERE s.daily_task_id = t.id) AS subtask_count
                 FROM daily_tasks t
                 WHERE t.id = ?",
            )
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        }
    }
    .ok_or(AppError::NotFound)?;

    Ok(ResolvedTarget {
        challenge_id:  row.challenge_id,
        subtask_count: row.subtask_count,
    })
}

async fn find_participation(
    conn: &mut MySqlConnection,
    challenge_id: &str,
    user_id: &str,
) -> AppResult<Option<ParticipationRow>> {
    let row = sqlx::query_as::<_, ParticipationRow>(
        "SELECT id, accepted FROM challenge_participants WHERE challenge_id = ? AND user_id = ?",
    )
    .bind(challenge_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

async fn load_subtasks(conn: &mut MySqlConnection, daily_task_id: &str) -> AppResult<Vec<Subtask>> {
    let rows = sqlx::query_as::<_, Subtask>(
        "SELECT id, daily_task_id, name, required, weight
         FROM subtasks WHERE daily_task_id = ? ORDER BY position",
    )
    .bind(daily_task_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn sub(id: &str, weight: f64, required: bool) -> Subtask {
        Subtask { id: id.into(), daily_task_id: "t1".into(), name: id.into(), required, weight }
    }

    fn entry(participation: &str, target: &str, date: NaiveDate, completed: bool) -> ProgressEntry {
        ProgressEntry {
            participation_id: participation.into(),
            target_id:        target.into(),
            progress_date:    date,
            completed,
        }
    }

    fn participant(id: &str, name: &str) -> Participant {
        Participant {
            participation_id: id.into(),
            user_id:          format!("user-{name}"),
            username:         name.into(),
            accepted:         true,
        }
    }

    fn joined(accepted: bool) -> Option<ParticipationRow> {
        Some(ParticipationRow { id: "p1".into(), accepted })
    }

    fn message_of(result: AppResult<Option<String>>) -> String {
        match result {
            Err(AppError::BadRequest(message)) => message,
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn accepted_participants_write_to_their_participation() {
        assert_eq!(write_target(UserRole::User, joined(true)).unwrap(), Some("p1".to_string()));
        assert_eq!(write_target(UserRole::Admin, joined(true)).unwrap(), Some("p1".to_string()));
    }

    #[test]
    fn admin_outsiders_write_nothing() {
        assert_eq!(write_target(UserRole::Admin, None).unwrap(), None);
    }

    #[test]
    fn outsiders_are_not_participants() {
        assert_eq!(message_of(write_target(UserRole::User, None)), NOT_A_PARTICIPANT);
    }

    #[test]
    fn pending_invitees_must_accept_first() {
        assert_eq!(message_of(write_target(UserRole::User, joined(false))), NOT_ACCEPTED);
    }

    #[test]
    fn task_level_writes_need_a_subtaskless_task() {
        let task = Target::Task("t1".into());
        assert!(matches!(check_write_level(&task, 2), Err(AppError::BadRequest(_))));
        assert!(check_write_level(&task, 0).is_ok());
        assert!(check_write_level(&Target::Subtask("s1".into()), 0).is_ok());
    }

    #[test]
    fn heavier_subtask_alone_gives_75_percent() {
        let subtasks = [sub("light", 1.0, true), sub("heavy", 3.0, true)];
        let done = HashSet::from(["heavy"]);
        let progress = weighted_progress(&subtasks, &done);
        assert_eq!(progress.percent, 75);
        assert!(!progress.completed);
    }

    #[test]
    fn percent_rounds_to_nearest() {
        let subtasks = [sub("a", 1.0, true), sub("b", 1.0, true), sub("c", 1.0, true)];
        assert_eq!(weighted_progress(&subtasks, &HashSet::from(["a"])).percent, 33);
        assert_eq!(weighted_progress(&subtasks, &HashSet::from(["a", "b"])).percent, 67);
    }

    #[test]
    fn completing_more_never_lowers_percent() {
        let subtasks = [sub("a", 0.5, true), sub("b", 2.0, false), sub("c", 1.25, true), sub("d", 4.0, true)];
        let order = ["c", "a", "d", "b"];
        let mut done = HashSet::new();
        let mut last = weighted_progress(&subtasks, &done).percent;
        assert_eq!(last, 0);
        for id in order {
            done.insert(id);
            let now = weighted_progress(&subtasks, &done).percent;
            assert!(now >= last, "{now} < {last} after {id}");
            last = now;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn completion_follows_required_subtasks() {
        let subtasks = [sub("must", 1.0, true), sub("bonus", 1.0, false)];
        let progress = weighted_progress(&subtasks, &HashSet::from(["must"]));
        assert_eq!(progress.percent, 50);
        assert!(progress.completed);

        let optional_only = [sub("x", 1.0, false), sub("y", 1.0, false)];
        assert!(!weighted_progress(&optional_only, &HashSet::from(["x"])).completed);
        assert!(weighted_progress(&optional_only, &HashSet::from(["x", "y"])).completed);
    }

    #[test]
    fn ids_outside_the_task_are_ignored() {
        let subtasks = [sub("a", 1.0, true)];
        assert_eq!(weighted_progress(&subtasks, &HashSet::from(["other"])).percent, 0);
    }

    #[test]
    fn subtaskless_tasks_are_all_or_nothing() {
        assert_eq!(task_progress(true), DailyProgress { percent: 100, completed: true });
        assert_eq!(task_progress(false), DailyProgress { percent: 0, completed: false });
        assert_eq!(weighted_progress(&[], &HashSet::new()).percent, 0);
    }

    #[test]
    fn axis_contains_today_when_nothing_recorded() {
        assert_eq!(date_axis(&[], day(10)), vec![day(10)]);
    }

    #[test]
    fn axis_is_sorted_and_deduplicated() {
        let entries = [
            entry("p1", "a", day(5), true),
            entry("p2", "a", day(3), false),
            entry("p1", "b", day(5), true),
            entry("p2", "b", day(10), true),
        ];
        assert_eq!(date_axis(&entries, day(10)), vec![day(3), day(5), day(10)]);
        assert_eq!(date_axis(&entries, day(7)), vec![day(3), day(5), day(7), day(10)]);
    }

    #[test]
    fn history_fills_gaps_for_every_participant() {
        let subtasks = [sub("light", 1.0, true), sub("heavy", 3.0, true)];
        let entries = [
            entry("p1", "heavy", day(1), true),
            entry("p1", "light", day(1), true),
            entry("p2", "heavy", day(2), true),
            entry("p2", "light", day(2), false),
        ];
        let history = build_history(
            vec![participant("p1", "alice"), participant("p2", "bob")],
            "t1",
            &subtasks,
            &entries,
            day(3),
        );

        assert_eq!(history.len(), 2);
        let alice: Vec<(NaiveDate, i64)> = history[0].points.iter().map(|p| (p.date, p.percent)).collect();
        let bob: Vec<(NaiveDate, i64)> = history[1].points.iter().map(|p| (p.date, p.percent)).collect();
        assert_eq!(alice, vec![(day(1), 100), (day(2), 0), (day(3), 0)]);
        assert_eq!(bob, vec![(day(1), 0), (day(2), 75), (day(3), 0)]);
        assert_eq!(history[1].username, "bob");
    }

    #[test]
    fn history_for_subtaskless_task_uses_task_entries() {
        let entries = [entry("p1", "t1", day(2), true), entry("p1", "t1", day(4), false)];
        let history = build_history(vec![participant("p1", "alice")], "t1", &[], &entries, day(4));
        let points: Vec<i64> = history[0].points.iter().map(|p| p.percent).collect();
        assert_eq!(points, vec![100, 0]);
    }

    #[test]
    fn history_without_participants_is_empty() {
        assert!(build_history(vec![], "t1", &[], &[], day(1)).is_empty());
    }
}
