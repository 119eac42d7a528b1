//! Challenge invitations: an invited participation is either accepted (flag
//! flipped) or rejected (row removed), and only by the invited user.
//!
//! Both transitions are single conditional statements, so two concurrent
//! answers to the same invitation cannot both succeed; the loser sees
//! `NotFound`.

use serde::Serialize;

use crate::{
    db::Db,
    errors::{AppError, AppResult},
};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ReceivedInvitation {
    pub participation_id: String,
    pub challenge_id:     String,
    pub name:             String,
    pub description:      Option<String>,
    pub author_id:        String,
    pub author_username:  String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SentInvitation {
    pub participation_id:   String,
    pub challenge_id:       String,
    pub challenge_name:     String,
    pub recipient_id:       String,
    pub recipient_username: String,
}

/// Zero affected rows means there was no pending invitation for this user.
fn expect_one(rows_affected: u64) -> AppResult<()> {
    if rows_affected == 0 {
        Err(AppError::NotFound)
    } else {
        Ok(())
    }
}

pub async fn accept(pool: &Db, participation_id: &str, user_id: &str) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE challenge_participants SET accepted = 1
         WHERE id = ? AND user_id = ? AND accepted = 0",
    )
    .bind(participation_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    expect_one(result.rows_affected())?;
    tracing::info!(%participation_id, %user_id, "Challenge invitation accepted");
    Ok(())
}

pub async fn reject(pool: &Db, participation_id: &str, user_id: &str) -> AppResult<()> {
    let result = sqlx::query(
        "DELETE FROM challenge_participants
         WHERE id = ? AND user_id = ? AND accepted = 0",
    )
    .bind(participation_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    expect_one(result.rows_affected())?;
    tracing::info!(%participation_id, %user_id, "Challenge invitation rejected");
    Ok(())
}

pub async fn list_received(pool: &Db, user_id: &str) -> AppResult<Vec<ReceivedInvitation>> {
    let rows = sqlx::query_as::<_, ReceivedInvitation>(
        "SELECT p.id AS participation_id,
                c.id AS challenge_id,
                c.name,
                c.description,
                c.author_id,
                a.username AS author_username
         FROM challenge_participants p
         JOIN challenges c ON c.id = p.challenge_id
         JOIN users a      ON a.id = c.author_id
         WHERE p.user_id = ? AND p.accepted = 0
         ORDER BY c.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_sent(pool: &Db, author_id: &str) -> AppResult<Vec<SentInvitation>> {
    let rows = sqlx::query_as::<_, SentInvitation>(
        "SELECT p.id AS participation_id,
                c.id AS challenge_id,
                c.name AS challenge_name,
                p.user_id AS recipient_id,
                u.username AS recipient_username
         FROM challenge_participants p
         JOIN challenges c ON c.id = p.challenge_id
         JOIN users u      ON u.id = p.user_id
         WHERE c.author_id = ? AND p.accepted = 0
         ORDER BY c.created_at DESC, u.username",
    )
    .bind(author_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_affected_rows_is_not_found() {
        assert!(matches!(expect_one(0), Err(AppError::NotFound)));
        assert!(expect_one(1).is_ok());
    }
}
