//! Durable store capability.
//!
//! The core never talks to a database directly; it goes through this narrow
//! repository trait. The production implementation is
//! [`crate::db::MySqlRepository`]; [`MemoryRepository`] backs tests and
//! demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AuthError;

/// Stored credential material for one user.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub password_digest: String,
    pub salt: String,
    pub email: String,
    pub auth_level: i32,
}

/// A session row as persisted in the durable store.
#[derive(Debug, Clone)]
pub struct DurableSession {
    pub user_id: String,
    pub expires_at: i64,
    pub auth_level: i32,
}

/// Narrow repository interface over the durable user/session store.
///
/// The schema keeps one session slot per user, so `invalidate_session` writes
/// an expiry sentinel rather than deleting anything.
#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn init_schema(&self) -> Result<(), AuthError>;

    async fn create_user(
        &self,
        user: &str,
        password_digest: &str,
        email: &str,
        salt: &str,
        auth_level: i32,
    ) -> Result<(), AuthError>;

    async fn delete_user(&self, user: &str) -> Result<(), AuthError>;

    async fn update_password(
        &self,
        user: &str,
        password_digest: &str,
        salt: &str,
    ) -> Result<(), AuthError>;

    async fn update_email(&self, user: &str, email: &str) -> Result<(), AuthError>;

    async fn get_credentials(&self, user: &str) -> Result<Option<Credentials>, AuthError>;

    async fn email_for(&self, user: &str) -> Result<Option<String>, AuthError>;

    async fn persist_session(
        &self,
        user: &str,
        token: &str,
        expires_at: i64,
    ) -> Result<(), AuthError>;

    async fn session_by_token(&self, token: &str) -> Result<Option<DurableSession>, AuthError>;

    async fn invalidate_session(&self, user: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, Default)]
struct UserRow {
    password_digest: String,
    email: String,
    salt: String,
    auth_level: i32,
    session_id: Option<String>,
    session_exp: i64,
}

/// In-memory [`AuthRepository`] for tests and demos.
///
/// `set_fail_writes(true)` makes every write return
/// [`AuthError::Persistence`], which is how the fail-open session-creation
/// path is exercised.
#[derive(Default)]
pub struct MemoryRepository {
    users: Mutex<HashMap<String, UserRow>>,
    fail_writes: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), AuthError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuthError::Persistence("simulated write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthRepository for MemoryRepository {
    async fn init_schema(&self) -> Result<(), AuthError> {
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
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        if users.contains_key(user) {
            return Err(AuthError::Persistence(format!("user {user} already exists")));
        }
        users.insert(
            user.to_string(),
            UserRow {
                password_digest: password_digest.to_string(),
                email: email.to_string(),
                salt: salt.to_string(),
                auth_level,
                session_id: None,
                session_exp: 0,
            },
        );
        Ok(())
    }

    async fn delete_user(&self, user: &str) -> Result<(), AuthError> {
        self.check_write()?;
        self.users.lock().unwrap().remove(user);
        Ok(())
    }

    async fn update_password(
        &self,
        user: &str,
        password_digest: &str,
        salt: &str,
    ) -> Result<(), AuthError> {
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        let row = users
            .get_mut(user)
            .ok_or_else(|| AuthError::Persistence(format!("unknown user {user}")))?;
        row.password_digest = password_digest.to_string();
        row.salt = salt.to_string();
        Ok(())
    }

    async fn update_email(&self, user: &str, email: &str) -> Result<(), AuthError> {
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        let row = users
            .get_mut(user)
            .ok_or_else(|| AuthError::Persistence(format!("unknown user {user}")))?;
        row.email = email.to_string();
        Ok(())
    }

    async fn get_credentials(&self, user: &str) -> Result<Option<Credentials>, AuthError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(user).map(|row| Credentials {
            password_digest: row.password_digest.clone(),
            salt: row.salt.clone(),
            email: row.email.clone(),
            auth_level: row.auth_level,
        }))
    }

    async fn email_for(&self, user: &str) -> Result<Option<String>, AuthError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(user).map(|row| row.email.clone()))
    }

    async fn persist_session(
        &self,
        user: &str,
        token: &str,
        expires_at: i64,
    ) -> Result<(), AuthError> {
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        let row = users
            .get_mut(user)
            .ok_or_else(|| AuthError::Persistence(format!("unknown user {user}")))?;
        row.session_id = Some(token.to_string());
        row.session_exp = expires_at;
        Ok(())
    }

    async fn session_by_token(&self, token: &str) -> Result<Option<DurableSession>, AuthError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find_map(|(user, row)| {
            (row.session_id.as_deref() == Some(token)).then(|| DurableSession {
                user_id: user.clone(),
                expires_at: row.session_exp,
                auth_level: row.auth_level,
            })
        }))
    }

    async fn invalidate_session(&self, user: &str) -> Result<(), AuthError> {
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        if let Some(row) = users.get_mut(user) {
            row.session_exp = 0;
        }
        Ok(())
    }
}
