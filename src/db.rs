//! MySQL-backed durable store.
//!
//! One `Users` table holds credentials plus a single session slot per user
//! (`Session_id` / `Session_exp`), so session invalidation is an `UPDATE`
//! writing the expiry sentinel, never a row deletion.

use async_trait::async_trait;
use sqlx::MySqlPool;

use crate::error::AuthError;
use crate::repository::{AuthRepository, Credentials, DurableSession};

const QRY_CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS `Users` (
    `PK_USER` VARCHAR(64) NOT NULL PRIMARY KEY,
    `Password` TEXT NOT NULL,
    `Email` TEXT,
    `Salt` TEXT NOT NULL,
    `Session_id` VARCHAR(128),
    `Session_exp` BIGINT NOT NULL DEFAULT 0,
    `Auth_level` INT NOT NULL DEFAULT 0
)";

/// [`AuthRepository`] over a `sqlx` MySQL pool.
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl AuthRepository for MySqlRepository {
    async fn init_schema(&self) -> Result<(), AuthError> {
        sqlx::query(QRY_CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(
        &self,
        user: &str,
        password_digest: &str,
        email: &str,
        salt: &str,
        auth_level: i32,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO `Users` (`PK_USER`, `Password`, `Email`, `Salt`, `Auth_level`)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user)
        .bind(password_digest)
        .bind(email)
        .bind(salt)
        .bind(auth_level)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_user(&self, user: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM `Users` WHERE `PK_USER` = ?")
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        user: &str,
        password_digest: &str,
        salt: &str,
    ) -> Result<(), AuthError> {
        sqlx::query("UPDATE `Users` SET `Password` = ?, `Salt` = ? WHERE `PK_USER` = ?")
            .bind(password_digest)
            .bind(salt)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_email(&self, user: &str, email: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE `Users` SET `Email` = ? WHERE `PK_USER` = ?")
            .bind(email)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_credentials(&self, user: &str) -> Result<Option<Credentials>, AuthError> {
        let row: Option<(String, Option<String>, String, i32)> = sqlx::query_as(
            "SELECT `Password`, `Email`, `Salt`, `Auth_level` FROM `Users` WHERE `PK_USER` = ?",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(password_digest, email, salt, auth_level)| Credentials {
            password_digest,
            salt,
            email: email.unwrap_or_default(),
            auth_level,
        }))
    }

    async fn email_for(&self, user: &str) -> Result<Option<String>, AuthError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT `Email` FROM `Users` WHERE `PK_USER` = ?")
                .bind(user)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(email,)| email))
    }

    async fn persist_session(
        &self,
        user: &str,
        token: &str,
        expires_at: i64,
    ) -> Result<(), AuthError> {
        sqlx::query("UPDATE `Users` SET `Session_id` = ?, `Session_exp` = ? WHERE `PK_USER` = ?")
            .bind(token)
            .bind(expires_at)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn session_by_token(&self, token: &str) -> Result<Option<DurableSession>, AuthError> {
        let row: Option<(String, i64, i32)> = sqlx::query_as(
            "SELECT `PK_USER`, `Session_exp`, `Auth_level` FROM `Users` WHERE `Session_id` = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id, expires_at, auth_level)| DurableSession {
            user_id,
            expires_at,
            auth_level,
        }))
    }

    async fn invalidate_session(&self, user: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE `Users` SET `Session_exp` = 0 WHERE `PK_USER` = ?")
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // DB integration tests require a live DATABASE_URL; the repository
    // contract is covered against MemoryRepository in src/repository.rs.
}
