use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ── Users ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    /// Unknown role strings fall back to the least privileged role.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "admin" => UserRole::Admin,
            _       => UserRole::User,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self { UserRole::Admin => "admin", UserRole::User => "user" };
        write!(f, "{s}")
    }
}

/// Public view of another user (friends lists, search results, participants).
#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq)]
pub struct UserSummary {
    pub id:       String,
    pub username: String,
    pub email:    String,
}

// ── Friend relations ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
    Rejected,
}

impl std::fmt::Display for FriendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FriendStatus::Pending  => "pending",
            FriendStatus::Accepted => "accepted",
            FriendStatus::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown friend status: {0}")]
pub struct UnknownStatus(String);

impl TryFrom<String> for FriendStatus {
    type Error = UnknownStatus;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.as_str() {
            "pending"  => Ok(FriendStatus::Pending),
            "accepted" => Ok(FriendStatus::Accepted),
            "rejected" => Ok(FriendStatus::Rejected),
            _          => Err(UnknownStatus(raw)),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq)]
pub struct FriendRelation {
    pub id:           String,
    pub requester_id: String,
    pub addressee_id: String,
    #[sqlx(try_from = "String")]
    pub status:       FriendStatus,
    pub are_friends:  bool,
    pub created_at:   NaiveDateTime,
}

// ── Challenges ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq)]
pub struct Challenge {
    pub id:          String,
    pub name:        String,
    pub description: Option<String>,
    pub is_timed:    bool,
    pub start_date:  Option<NaiveDate>,
    pub end_date:    Option<NaiveDate>,
    pub author_id:   String,
}

/// Participation row joined with the participant's username.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq)]
pub struct Participant {
    pub participation_id: String,
    pub user_id:          String,
    pub username:         String,
    pub accepted:         bool,
}

#[derive(Debug, Clone, sqlx::FromRow, PartialEq)]
pub struct DailyTaskRow {
    pub id:          String,
    pub name:        String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq)]
pub struct Subtask {
    pub id:            String,
    #[serde(skip)]
    pub daily_task_id: String,
    pub name:          String,
    pub required:      bool,
    pub weight:        f64,
}

// ── Progress ─────────────────────────────────────────────────

/// One stored completion flag for a participant, target and day. The target
/// is a subtask or a subtask-less daily task depending on the table read.
#[derive(Debug, Clone, sqlx::FromRow, PartialEq)]
pub struct ProgressEntry {
    pub participation_id: String,
    pub target_id:        String,
    pub progress_date:    NaiveDate,
    pub completed:        bool,
}
