//! User management and credential checks over the durable store.

use std::sync::Arc;
use std::time::Duration;

use crate::error::AuthError;
use crate::hasher::{generate_salt, CredentialHasher};
use crate::repository::AuthRepository;

/// User lifecycle operations and login verification.
///
/// Everything here is I/O against the durable store plus hashing; no
/// in-process state is kept.
pub struct Users {
    repo: Arc<dyn AuthRepository>,
    hasher: Arc<dyn CredentialHasher>,
}

impl Users {
    pub fn new(repo: Arc<dyn AuthRepository>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { repo, hasher }
    }

    /// Creates a user with a fresh salt and peppered digest.
    ///
    /// `email` may be empty; it is only needed for verification codes.
    pub async fn new_user(
        &self,
        user: &str,
        password: &str,
        email: &str,
        auth_level: i32,
    ) -> Result<(), AuthError> {
        if user.is_empty() {
            return Err(AuthError::InvalidInput("empty user"));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidInput("empty password"));
        }
        let salt = generate_salt();
        let digest = self.hasher.hash(password, &salt)?;
        self.repo
            .create_user(user, &digest, email, &salt, auth_level)
            .await?;
        tracing::info!("[users] [created] user={} auth_level={}", user, auth_level);
        Ok(())
    }

    pub async fn delete_user(&self, user: &str) -> Result<(), AuthError> {
        if user.is_empty() {
            return Err(AuthError::InvalidInput("empty user"));
        }
        self.repo.delete_user(user).await?;
        tracing::info!("[users] [deleted] user={}", user);
        Ok(())
    }

    /// Replaces the password, rotating the salt.
    pub async fn update_password(&self, user: &str, password: &str) -> Result<(), AuthError> {
        if password.is_empty() {
            return Err(AuthError::InvalidInput("empty password"));
        }
        let salt = generate_salt();
        let digest = self.hasher.hash(password, &salt)?;
        self.repo.update_password(user, &digest, &salt).await
    }

    pub async fn update_email(&self, user: &str, email: &str) -> Result<(), AuthError> {
        self.repo.update_email(user, email).await
    }

    /// Verifies credentials.
    ///
    /// `Ok(Some(auth_level))` on success; `Ok(None)` for a wrong password or
    /// an unknown user — the two are deliberately indistinguishable. Errors
    /// are infrastructure failures only.
    pub async fn check_login(&self, user: &str, password: &str) -> Result<Option<i32>, AuthError> {
        if user.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput("empty user or password"));
        }
        let Some(creds) = self.repo.get_credentials(user).await? else {
            return Ok(None);
        };
        if self
            .hasher
            .verify(password, &creds.salt, &creds.password_digest)
        {
            Ok(Some(creds.auth_level))
        } else {
            Ok(None)
        }
    }

    /// `check_login` that answers only after `delay`, win or lose. A blunt
    /// damper on online brute forcing alongside the throttle.
    pub async fn check_login_delayed(
        &self,
        user: &str,
        password: &str,
        delay: Duration,
    ) -> Result<Option<i32>, AuthError> {
        tokio::time::sleep(delay).await;
        self.check_login(user, password).await
    }
}
