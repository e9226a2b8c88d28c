//! Emailed verification codes.
//!
//! A short-lived, single-use second factor: the code's digest lives in its
//! own expiring store keyed by user; only the digest is retained, the
//! plaintext code exists solely in the outbound message.

use std::sync::Arc;

use rand::distr::{Alphanumeric, SampleString};

use crate::clock::Clock;
use crate::error::AuthError;
use crate::hasher::CredentialHasher;
use crate::notifier::Notifier;
use crate::repository::AuthRepository;
use crate::store::{Expiring, ExpiringStore};
use crate::users::Users;

pub const CODE_LEN: usize = 6;

/// Digest of an outstanding verification code.
#[derive(Debug, Clone)]
pub struct CodeRecord {
    pub digest: String,
    pub expires_at: i64,
}

impl Expiring for CodeRecord {
    fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

/// Verification-code issue/verify flow.
pub struct TwoFactor {
    store: Arc<ExpiringStore<CodeRecord>>,
    users: Arc<Users>,
    repo: Arc<dyn AuthRepository>,
    hasher: Arc<dyn CredentialHasher>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl TwoFactor {
    pub fn new(
        users: Arc<Users>,
        repo: Arc<dyn AuthRepository>,
        hasher: Arc<dyn CredentialHasher>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: Arc::new(ExpiringStore::new()),
            users,
            repo,
            hasher,
            notifier,
            clock,
        }
    }

    /// The underlying store, shared with the reaper.
    pub(crate) fn store(&self) -> Arc<ExpiringStore<CodeRecord>> {
        Arc::clone(&self.store)
    }

    /// Checks the password and, if it holds, emails the user a fresh code
    /// valid for `duration_secs` seconds.
    ///
    /// `Ok(false)` when the credentials are rejected (no code is sent);
    /// `Ok(true)` once the code is on its way. A user without an email
    /// address cannot receive codes, which surfaces as `Notify`.
    pub async fn issue_code(
        &self,
        user: &str,
        password: &str,
        duration_secs: i64,
    ) -> Result<bool, AuthError> {
        if duration_secs <= 0 {
            return Err(AuthError::InvalidInput("non-positive code duration"));
        }
        if self.users.check_login(user, password).await?.is_none() {
            return Ok(false);
        }

        let email = self
            .repo
            .email_for(user)
            .await?
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthError::Notify(format!("user {user} has no email address")))?;

        let code = Alphanumeric.sample_string(&mut rand::rng(), CODE_LEN);
        let digest = self.hasher.hash(&code, "")?;
        self.store.put(
            user,
            CodeRecord {
                digest,
                expires_at: self.clock.now() + duration_secs,
            },
        );

        self.notifier
            .send(&email, "Verification code", &code)
            .await?;
        tracing::info!("[twofa] [code_issued] user={}", user);
        Ok(true)
    }

    /// Checks a code. True exactly once: a matching code is consumed.
    /// Absent or expired codes are false; an expired record is removed on
    /// the spot.
    pub async fn verify_code(&self, user: &str, code: &str) -> Result<bool, AuthError> {
        if user.is_empty() || code.is_empty() {
            return Err(AuthError::InvalidInput("empty user or code"));
        }

        let Some(record) = self.store.get(user) else {
            return Ok(false);
        };
        if record.expires_at <= self.clock.now() {
            self.store.delete(user);
            return Ok(false);
        }
        if !self.hasher.verify(code, "", &record.digest) {
            return Ok(false);
        }

        self.store.delete(user);
        tracing::info!("[twofa] [code_verified] user={}", user);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hasher::BcryptHasher;
    use crate::repository::MemoryRepository;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingNotifier {
        fn last_body(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, _, b)| b.clone())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), AuthError> {
            self.sent.lock().unwrap().push((
                address.to_string(),
                subject.to_string(),
                body.to_string(),
            ));
            Ok(())
        }
    }

    struct Fixture {
        twofa: TwoFactor,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let hasher = Arc::new(BcryptHasher::with_cost("pepper", 4));
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(1_000));
        let users = Arc::new(Users::new(
            Arc::clone(&repo) as Arc<dyn AuthRepository>,
            Arc::clone(&hasher) as Arc<dyn CredentialHasher>,
        ));
        users
            .new_user("alice", "hunter2", "a@example.com", 1)
            .await
            .unwrap();
        users.new_user("noemail", "hunter2", "", 1).await.unwrap();

        let twofa = TwoFactor::new(
            users,
            repo as Arc<dyn AuthRepository>,
            hasher as Arc<dyn CredentialHasher>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Fixture {
            twofa,
            notifier,
            clock,
        }
    }

    #[tokio::test]
    async fn test_issue_then_verify_consumes_code() {
        let f = fixture().await;
        assert!(f.twofa.issue_code("alice", "hunter2", 60).await.unwrap());

        let code = f.notifier.last_body().unwrap();
        assert_eq!(code.len(), CODE_LEN);

        assert!(f.twofa.verify_code("alice", &code).await.unwrap());
        // single use
        assert!(!f.twofa.verify_code("alice", &code).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_rejects_bad_credentials() {
        let f = fixture().await;
        assert!(!f.twofa.issue_code("alice", "wrong", 60).await.unwrap());
        assert!(f.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_issue_without_email_fails() {
        let f = fixture().await;
        assert!(matches!(
            f.twofa.issue_code("noemail", "hunter2", 60).await,
            Err(AuthError::Notify(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_code_is_not_consumed() {
        let f = fixture().await;
        f.twofa.issue_code("alice", "hunter2", 60).await.unwrap();
        let code = f.notifier.last_body().unwrap();

        assert!(!f.twofa.verify_code("alice", "AAAAAA").await.unwrap());
        // the real code still works after a bad guess
        assert!(f.twofa.verify_code("alice", &code).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_code_rejected_and_removed() {
        let f = fixture().await;
        f.twofa.issue_code("alice", "hunter2", 60).await.unwrap();
        let code = f.notifier.last_body().unwrap();

        f.clock.advance(60);
        assert!(!f.twofa.verify_code("alice", &code).await.unwrap());
        assert!(f.twofa.store.get("alice").is_none());
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous_code() {
        let f = fixture().await;
        f.twofa.issue_code("alice", "hunter2", 60).await.unwrap();
        let first = f.notifier.last_body().unwrap();
        f.twofa.issue_code("alice", "hunter2", 60).await.unwrap();
        let second = f.notifier.last_body().unwrap();

        if first != second {
            assert!(!f.twofa.verify_code("alice", &first).await.unwrap());
        }
        assert!(f.twofa.verify_code("alice", &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_unknown_user_false() {
        let f = fixture().await;
        assert!(!f.twofa.verify_code("ghost", "ABC123").await.unwrap());
    }
}
