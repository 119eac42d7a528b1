//! Relationship ledger: friend requests and their pending → accepted/rejected
//! lifecycle. One relation exists per unordered pair of users, ever.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::Db,
    errors::{AppError, AppResult, StoreViolation},
    models::{FriendRelation, FriendStatus, UserSummary},
};

const SEARCH_LIMIT: i64 = 20;

const RELATION_COLUMNS: &str =
    "id, requester_id, addressee_id, status, are_friends, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

#[derive(Debug, Serialize)]
pub struct PendingRequest {
    pub relation_id: String,
    pub user:        UserSummary,
}

#[derive(Debug, Serialize)]
pub struct FriendStats {
    pub friend_count:           i64,
    pub pending_received_count: i64,
}

/// Accepted relation with both parties' public details.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Friendship {
    pub requester_id:       String,
    pub requester_username: String,
    pub requester_email:    String,
    pub addressee_id:       String,
    pub addressee_username: String,
    pub addressee_email:    String,
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    relation_id: String,
    id:          String,
    username:    String,
    email:       String,
}

// ── Rules ────────────────────────────────────────────────────

/// A new request is refused for self-requests and whenever the pair already
/// has a relation in either direction, whatever its status.
pub fn check_new_request(
    requester_id: &str,
    addressee_id: &str,
    existing: Option<&FriendRelation>,
) -> AppResult<()> {
    if requester_id == addressee_id {
        return Err(AppError::Conflict("You cannot send a friend request to yourself".into()));
    }
    if let Some(relation) = existing {
        let message = match relation.status {
            FriendStatus::Pending  => "A friend request between you is already pending",
            FriendStatus::Accepted => "You are already friends",
            FriendStatus::Rejected => "This friend request was already rejected",
        };
        return Err(AppError::Conflict(message.into()));
    }
    Ok(())
}

/// Resolve a pending relation. Only the addressee may respond, and only once;
/// anything else looks like a missing relation.
pub fn apply_decision(
    relation: &FriendRelation,
    responder_id: &str,
    decision: Decision,
) -> AppResult<FriendRelation> {
    if relation.addressee_id != responder_id || relation.status != FriendStatus::Pending {
        return Err(AppError::NotFound);
    }
    let (status, are_friends) = match decision {
        Decision::Accept => (FriendStatus::Accepted, true),
        Decision::Reject => (FriendStatus::Rejected, false),
    };
    Ok(FriendRelation { status, are_friends, ..relation.clone() })
}

/// The party of each friendship that is not `user_id`.
pub fn resolve_friends(user_id: &str, friendships: Vec<Friendship>) -> Vec<UserSummary> {
    friendships
        .into_iter()
        .map(|f| {
            if f.requester_id == user_id {
                UserSummary { id: f.addressee_id, username: f.addressee_username, email: f.addressee_email }
            } else {
                UserSummary { id: f.requester_id, username: f.requester_username, email: f.requester_email }
            }
        })
        .collect()
}

// ── Store operations ─────────────────────────────────────────

/// Store-level refusal of a new request. The unordered-pair unique key makes a
/// concurrent request for the same pair (either direction) lose with
/// `Conflict`.
fn request_violation(violation: StoreViolation) -> AppError {
    match violation {
        StoreViolation::Unique     => AppError::Conflict("A relation between you already exists".into()),
        StoreViolation::ForeignKey => AppError::BadRequest("Unknown user".into()),
        StoreViolation::Check      => AppError::BadRequest("Invalid friend request".into()),
    }
}

/// Existing relations are found through the pair key; no row locks are taken,
/// the unique key settles races.
pub async fn create_request(
    pool: &Db,
    requester_id: &str,
    addressee_id: &str,
) -> AppResult<FriendRelation> {
    check_new_request(requester_id, addressee_id, None)?;

    let existing = sqlx::query_as::<_, FriendRelation>(&format!(
        "SELECT {RELATION_COLUMNS} FROM friend_relations
         WHERE pair_low = LEAST(?, ?) AND pair_high = GREATEST(?, ?)"
    ))
    .bind(requester_id)
    .bind(addressee_id)
    .bind(requester_id)
    .bind(addressee_id)
    .fetch_optional(pool)
    .await?;

    check_new_request(requester_id, addressee_id, existing.as_ref())?;

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO friend_relations (id, requester_id, addressee_id, status, are_friends)
         VALUES (?, ?, ?, 'pending', 0)",
    )
    .bind(&id)
    .bind(requester_id)
    .bind(addressee_id)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_store(e, request_violation))?;

    let relation = sqlx::query_as::<_, FriendRelation>(&format!(
        "SELECT {RELATION_COLUMNS} FROM friend_relations WHERE id = ?"
    ))
    .bind(&id)
    .fetch_one(pool)
    .await?;

    tracing::info!(relation_id = %id, %requester_id, %addressee_id, "Friend request sent");
    Ok(relation)
}

pub async fn respond(
    pool: &Db,
    relation_id: &str,
    responder_id: &str,
    decision: Decision,
) -> AppResult<FriendRelation> {
    let mut tx = pool.begin().await?;

    let relation = sqlx::query_as::<_, FriendRelation>(&format!(
        "SELECT {RELATION_COLUMNS} FROM friend_relations WHERE id = ? FOR UPDATE"
    ))
    .bind(relation_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound)?;

    let updated = apply_decision(&relation, responder_id, decision)?;

    sqlx::query(
        "UPDATE friend_relations SET status = ?, are_friends = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(updated.status.to_string())
    .bind(updated.are_friends)
    .bind(relation_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(%relation_id, status = %updated.status, "Friend request resolved");
    Ok(updated)
}

pub async fn list_friends(pool: &Db, user_id: &str) -> AppResult<Vec<UserSummary>> {
    let rows = sqlx::query_as::<_, Friendship>(
        "SELECT r.requester_id,
                req.username AS requester_username,
                req.email    AS requester_email,
                r.addressee_id,
                adr.username AS addressee_username,
                adr.email    AS addressee_email
         FROM friend_relations r
         JOIN users req ON req.id = r.requester_id
         JOIN users adr ON adr.id = r.addressee_id
         WHERE (r.requester_id = ? OR r.addressee_id = ?)
           AND r.are_friends = 1
         ORDER BY r.created_at",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(resolve_friends(user_id, rows))
}

/// Substring search over username and email. Skips the caller and anyone with
/// a pending or accepted relation to them.
pub async fn search_candidates(pool: &Db, query: &str, user_id: &str) -> AppResult<Vec<UserSummary>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest("Query cannot be empty".into()));
    }

    let rows = sqlx::query_as::<_, UserSummary>(
        "SELECT u.id, u.username, u.email
         FROM users u
         WHERE u.id <> ?
           AND (LOCATE(?, u.username) > 0 OR LOCATE(?, u.email) > 0)
           AND NOT EXISTS (
               SELECT 1 FROM friend_relations r
               WHERE r.status <> 'rejected'
                 AND ((r.requester_id = ? AND r.addressee_id = u.id)
                   OR (r.addressee_id = ? AND r.requester_id = u.id))
           )
         ORDER BY u.username
         LIMIT ?",
    )
    .bind(user_id)
    .bind(query)
    .bind(query)
    .bind(user_id)
    .bind(user_id)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_pending_sent(pool: &Db, user_id: &str) -> AppResult<Vec<PendingRequest>> {
    let rows = sqlx::query_as::<_, PendingRow>(
        "SELECT r.id AS relation_id, u.id, u.username, u.email
         FROM friend_relations r
         JOIN users u ON u.id = r.addressee_id
         WHERE r.requester_id = ? AND r.status = 'pending'
         ORDER BY r.created_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PendingRow::into_request).collect())
}

pub async fn list_pending_received(pool: &Db, user_id: &str) -> AppResult<Vec<PendingRequest>> {
    let rows = sqlx::query_as::<_, PendingRow>(
        "SELECT r.id AS relation_id, u.id, u.username, u.email
         FROM friend_relations r
         JOIN users u ON u.id = r.requester_id
         WHERE r.addressee_id = ? AND r.status = 'pending'
         ORDER BY r.created_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(PendingRow::into_request).collect())
}

pub async fn stats(pool: &Db, user_id: &str) -> AppResult<FriendStats> {
    let friend_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM friend_relations
         WHERE (requester_id = ? OR addressee_id = ?) AND are_friends = 1",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let pending_received_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM friend_relations WHERE addressee_id = ? AND status = 'pending'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(FriendStats { friend_count, pending_received_count })
}

impl PendingRow {
    fn into_request(self) -> PendingRequest {
        PendingRequest {
            relation_id: self.relation_id,
            user: UserSummary { id: self.id, username: self.username, email: self.email },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn relation(requester: &str, addressee: &str, status: FriendStatus) -> FriendRelation {
        FriendRelation {
            id:           "rel-1".into(),
            requester_id: requester.into(),
            addressee_id: addressee.into(),
            status,
            are_friends:  status == FriendStatus::Accepted,
            created_at:   NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn self_requests_conflict() {
        assert!(matches!(check_new_request("a", "a", None), Err(AppError::Conflict(_))));
    }

    #[test]
    fn any_existing_relation_conflicts_in_either_direction() {
        for status in [FriendStatus::Pending, FriendStatus::Accepted, FriendStatus::Rejected] {
            let forward = relation("a", "b", status);
            let backward = relation("b", "a", status);
            assert!(matches!(check_new_request("a", "b", Some(&forward)), Err(AppError::Conflict(_))));
            assert!(matches!(check_new_request("a", "b", Some(&backward)), Err(AppError::Conflict(_))));
        }
        assert!(check_new_request("a", "b", None).is_ok());
    }

    #[test]
    fn losing_a_concurrent_request_race_is_a_conflict() {
        assert!(matches!(request_violation(StoreViolation::Unique), AppError::Conflict(_)));
        assert!(matches!(request_violation(StoreViolation::ForeignKey), AppError::BadRequest(_)));
    }

    #[test]
    fn addressee_accepts_pending_request() {
        let pending = relation("a", "b", FriendStatus::Pending);
        let accepted = apply_decision(&pending, "b", Decision::Accept).unwrap();
        assert_eq!(accepted.status, FriendStatus::Accepted);
        assert!(accepted.are_friends);
        assert_eq!(accepted.id, pending.id);
        assert_eq!(accepted.created_at, pending.created_at);
    }

    #[test]
    fn addressee_rejects_pending_request() {
        let pending = relation("a", "b", FriendStatus::Pending);
        let rejected = apply_decision(&pending, "b", Decision::Reject).unwrap();
        assert_eq!(rejected.status, FriendStatus::Rejected);
        assert!(!rejected.are_friends);
    }

    #[test]
    fn requester_cannot_answer_own_request() {
        let pending = relation("a", "b", FriendStatus::Pending);
        assert!(matches!(apply_decision(&pending, "a", Decision::Accept), Err(AppError::NotFound)));
        assert!(matches!(apply_decision(&pending, "c", Decision::Accept), Err(AppError::NotFound)));
    }

    #[test]
    fn resolved_requests_cannot_be_answered_again() {
        for status in [FriendStatus::Accepted, FriendStatus::Rejected] {
            let resolved = relation("a", "b", status);
            assert!(matches!(apply_decision(&resolved, "b", Decision::Accept), Err(AppError::NotFound)));
            assert!(matches!(apply_decision(&resolved, "b", Decision::Reject), Err(AppError::NotFound)));
        }
    }

    #[test]
    fn friends_resolve_to_the_other_party() {
        let friendships = vec![
            Friendship {
                requester_id: "a".into(), requester_username: "alice".into(), requester_email: "alice@x.io".into(),
                addressee_id: "b".into(), addressee_username: "bob".into(),   addressee_email: "bob@x.io".into(),
            },
            Friendship {
                requester_id: "c".into(), requester_username: "carol".into(), requester_email: "carol@x.io".into(),
                addressee_id: "a".into(), addressee_username: "alice".into(), addressee_email: "alice@x.io".into(),
            },
        ];

        let names: Vec<String> = resolve_friends("a", friendships.clone())
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["bob", "carol"]);

        let for_bob = resolve_friends("b", friendships[..1].to_vec());
        assert_eq!(for_bob[0].id, "a");
    }

    #[test]
    fn decisions_deserialize_lowercase() {
        let d: Decision = serde_json::from_str("\"accept\"").unwrap();
        assert_eq!(d, Decision::Accept);
        let d: Decision = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(d, Decision::Reject);
    }
}
