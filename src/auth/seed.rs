use uuid::Uuid;

use crate::auth::hash_password;
use crate::config::Config;
use crate::db::Db;

const DEV_ADMIN_PASSWORD: &str = "admin";

/// Seeds the admin account from `ADMIN_USERNAME` / `ADMIN_EMAIL` / `ADMIN_PASSWORD`.
/// Without a configured password the account is only seeded in development,
/// with a well-known password. Safe to call on every startup.
pub async fn seed_accounts(pool: &Db, config: &Config) -> anyhow::Result<()> {
    let password = match (&config.admin_password, config.is_development()) {
        (Some(password), _) => password.as_str(),
        (None, true)        => DEV_ADMIN_PASSWORD,
        (None, false)       => {
            tracing::info!("ADMIN_PASSWORD not set, skipping admin seed");
            return Ok(());
        }
    };

    seed_admin(pool, &config.admin_username, &config.admin_email, password).await
}

async fn seed_admin(pool: &Db, username: &str, email: &str, password: &str) -> anyhow::Result<()> {
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM users WHERE username = ? LIMIT 1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    let hash = hash_password(password)?;

    match existing {
        Some(id) => {
            sqlx::query("UPDATE users SET email = ?, password_hash = ?, role = 'admin' WHERE id = ?")
                .bind(email)
                .bind(hash)
                .bind(&id)
                .execute(pool)
                .await?;
            tracing::info!(%username, "Refreshed admin credentials");
        }

        None => {
            sqlx::query(
                "INSERT INTO users (id, username, email, password_hash, role)
                 VALUES (?, ?, ?, ?, 'admin')",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(username)
            .bind(email)
            .bind(hash)
            .execute(pool)
            .await?;
            tracing::info!(%username, %email, "Seeded admin account");
        }
    }

    Ok(())
}
