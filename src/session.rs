//! Session registry: token → live session cache over the durable store.
//!
//! The cache is the fast path; the durable store is the source of truth
//! across process restarts. Durable calls always happen outside the store
//! lock.

use std::sync::Arc;

use rand::RngExt;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::repository::AuthRepository;
use crate::store::{Expiring, ExpiringStore};

/// Cached session state for one token.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    pub expires_at: i64,
    pub auth_level: i32,
}

impl Expiring for SessionRecord {
    fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

/// Successful validation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    pub user_id: String,
    pub auth_level: i32,
}

/// Outcome of `new_session`.
///
/// Session creation is fail-open: if the durable write fails the session is
/// still cached and usable, and the failure is carried here as a warning.
/// Deployments that want fail-closed behavior call [`IssuedSession::strict`].
#[derive(Debug)]
pub struct IssuedSession {
    pub token: String,
    pub persist_error: Option<AuthError>,
}

impl IssuedSession {
    /// Treats a persistence warning as fatal.
    pub fn strict(self) -> Result<String, AuthError> {
        match self.persist_error {
            Some(err) => Err(err),
            None => Ok(self.token),
        }
    }
}

/// Unguessable session token: CSPRNG bytes plus a microsecond timestamp so
/// two tokens are distinct even on a random-source collision.
fn mint_token() -> String {
    let mut bytes = [0u8; 12];
    rand::rng().fill(&mut bytes[..]);
    format!(
        "{}{}",
        hex::encode(bytes),
        chrono::Utc::now().timestamp_micros()
    )
}

/// Token-keyed session cache with durable write-through and read-through.
pub struct SessionRegistry {
    store: Arc<ExpiringStore<SessionRecord>>,
    repo: Arc<dyn AuthRepository>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(repo: Arc<dyn AuthRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(ExpiringStore::new()),
            repo,
            clock,
        }
    }

    /// The underlying cache, shared with the reaper.
    pub(crate) fn store(&self) -> Arc<ExpiringStore<SessionRecord>> {
        Arc::clone(&self.store)
    }

    /// Creates a session for `user` expiring in `duration_secs` seconds.
    ///
    /// The durable store is written first (source of truth across restarts),
    /// then the cache. A durable write failure does not abort: see
    /// [`IssuedSession`].
    pub async fn new_session(
        &self,
        user: &str,
        duration_secs: i64,
        auth_level: i32,
    ) -> Result<IssuedSession, AuthError> {
        if user.is_empty() {
            return Err(AuthError::InvalidInput("empty user"));
        }
        if duration_secs <= 0 {
            return Err(AuthError::InvalidInput("non-positive session duration"));
        }

        let token = mint_token();
        let expires_at = self.clock.now() + duration_secs;

        let persist_error = match self.repo.persist_session(user, &token, expires_at).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!("[session] [persist_failed] user={} err={}", user, err);
                Some(err)
            }
        };

        self.store.put(
            &token,
            SessionRecord {
                user_id: user.to_string(),
                expires_at,
                auth_level,
            },
        );
        tracing::debug!("[session] [issued] user={} expires_at={}", user, expires_at);

        Ok(IssuedSession {
            token,
            persist_error,
        })
    }

    /// Validates a token against the cache, falling back to the durable
    /// store and repopulating the cache on a durable hit.
    ///
    /// `NotFound` if the token exists nowhere; `Expired` if it exists but
    /// its expiry has passed in either location.
    pub async fn validate(&self, token: &str) -> Result<ValidatedSession, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidInput("empty token"));
        }
        let now = self.clock.now();

        if let Some(record) = self.store.get(token) {
            if record.expires_at > now {
                return Ok(ValidatedSession {
                    user_id: record.user_id,
                    auth_level: record.auth_level,
                });
            }
            // Passive expiry: reading a dead record destroys it.
            self.store.delete(token);
            return Err(AuthError::Expired {
                expired_at: record.expires_at,
            });
        }

        let durable = self
            .repo
            .session_by_token(token)
            .await?
            .ok_or(AuthError::NotFound)?;
        if durable.expires_at <= now {
            return Err(AuthError::Expired {
                expired_at: durable.expires_at,
            });
        }

        // Repopulate so the rest of the session's lifetime is served from
        // the cache.
        let record = SessionRecord {
            user_id: durable.user_id,
            expires_at: durable.expires_at,
            auth_level: durable.auth_level,
        };
        self.store.put(token, record.clone());
        tracing::debug!("[session] [cache_repopulated] user={}", record.user_id);

        Ok(ValidatedSession {
            user_id: record.user_id,
            auth_level: record.auth_level,
        })
    }

    /// Removes the cache entry and writes the durable expiry sentinel.
    ///
    /// `NotFound` if the token is unknown everywhere.
    pub async fn invalidate(&self, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidInput("empty token"));
        }

        let user = match self.store.get(token) {
            Some(record) => record.user_id,
            None => match self.repo.session_by_token(token).await? {
                Some(durable) => durable.user_id,
                None => return Err(AuthError::NotFound),
            },
        };

        self.store.delete(token);
        self.repo.invalidate_session(&user).await?;
        tracing::debug!("[session] [invalidated] user={}", user);
        Ok(())
    }

    /// Authorization level for a cached, live token; 0 otherwise.
    ///
    /// A convenience read for authorization-level comparisons on requests
    /// that already passed `validate`. Not an existence check: 0 means
    /// "nothing usable cached", not "no such user".
    pub fn auth_level(&self, token: &str) -> i32 {
        match self.store.get(token) {
            Some(record) if record.expires_at > self.clock.now() => record.auth_level,
            _ => 0,
        }
    }
}
