//! Facade wiring the stores, throttle, reaper and collaborators together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::mysql::MySqlPoolOptions;

use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::db::MySqlRepository;
use crate::error::AuthError;
use crate::hasher::{BcryptHasher, CredentialHasher};
use crate::notifier::{DisabledNotifier, Notifier, SmtpNotifier};
use crate::reaper::Reaper;
use crate::repository::AuthRepository;
use crate::session::{IssuedSession, SessionRegistry, ValidatedSession};
use crate::throttle::LoginThrottle;
use crate::twofa::TwoFactor;
use crate::users::Users;

/// Session authentication and login throttling, fully wired.
///
/// One instance per process; request handlers share it behind an `Arc`.
/// Every exposed operation takes and returns plain values — cookie and
/// transport concerns belong to the embedding application.
pub struct Auth {
    sessions: SessionRegistry,
    throttle: LoginThrottle,
    users: Arc<Users>,
    twofa: TwoFactor,
    reaper: Arc<Reaper>,
    repo: Arc<dyn AuthRepository>,
    sweep_period: u64,
}

impl Auth {
    /// Wires the core from explicit collaborators. Tests inject
    /// `MemoryRepository` and `ManualClock` here; production deployments
    /// usually go through [`Auth::connect`].
    pub fn new(
        config: &AuthConfig,
        repo: Arc<dyn AuthRepository>,
        hasher: Arc<dyn CredentialHasher>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = SessionRegistry::new(Arc::clone(&repo), Arc::clone(&clock));
        let throttle = LoginThrottle::with_tunables(
            Arc::clone(&clock),
            config.max_attempts,
            config.ban_duration,
        );
        let users = Arc::new(Users::new(Arc::clone(&repo), Arc::clone(&hasher)));
        let twofa = TwoFactor::new(
            Arc::clone(&users),
            Arc::clone(&repo),
            hasher,
            notifier,
            Arc::clone(&clock),
        );

        let mut reaper = Reaper::new(clock, config.sweep_after_writes);
        reaper.watch("sessions", sessions.store());
        reaper.watch("throttle", throttle.store());
        reaper.watch("twofa", twofa.store());

        Self {
            sessions,
            throttle,
            users,
            twofa,
            reaper: Arc::new(reaper),
            repo,
            sweep_period: config.sweep_period,
        }
    }

    /// Connects to MySQL and builds the production wiring: bcrypt hashing
    /// with the configured pepper, SMTP delivery when configured, system
    /// clock.
    pub async fn connect(config: AuthConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url())
            .await
            .with_context(|| format!("Cannot connect to DB: {}", config.sql_ip))?;

        let repo: Arc<dyn AuthRepository> = Arc::new(MySqlRepository::new(pool));
        let hasher: Arc<dyn CredentialHasher> = Arc::new(BcryptHasher::new(&config.secret));
        let notifier: Arc<dyn Notifier> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpNotifier::new(
                &smtp.host,
                smtp.port,
                &smtp.from,
                &smtp.password,
                &smtp.from,
            )?),
            None => Arc::new(DisabledNotifier),
        };
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let auth = Self::new(&config, repo, hasher, notifier, clock);
        auth.init_schema().await?;
        tracing::info!("[auth] [initialized] db={}", config.sql_db);
        Ok(auth)
    }

    /// Creates the durable schema if it does not exist yet.
    pub async fn init_schema(&self) -> Result<(), AuthError> {
        self.repo.init_schema().await
    }

    // ============================================
    // Sessions
    // ============================================

    pub async fn new_session(
        &self,
        user: &str,
        duration_secs: i64,
        auth_level: i32,
    ) -> Result<IssuedSession, AuthError> {
        self.sessions.new_session(user, duration_secs, auth_level).await
    }

    pub async fn validate(&self, token: &str) -> Result<ValidatedSession, AuthError> {
        self.sessions.validate(token).await
    }

    pub async fn invalidate(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.invalidate(token).await
    }

    pub fn auth_level(&self, token: &str) -> i32 {
        self.sessions.auth_level(token)
    }

    // ============================================
    // Login throttle
    // ============================================

    /// Records a failed login and bumps the reaper's write counter. The
    /// sweep, if one becomes due, runs detached — never inside this call.
    pub fn record_failure(&self, user: &str, origin: &str) -> Result<(), AuthError> {
        self.throttle.record_failure(user, origin)?;
        self.reaper.note_write();
        Ok(())
    }

    pub fn is_blocked(&self, user: &str, origin: &str) -> Result<bool, AuthError> {
        self.throttle.is_blocked(user, origin)
    }

    /// Guard form of `is_blocked` for handlers that propagate errors.
    pub fn ensure_allowed(&self, user: &str, origin: &str) -> Result<(), AuthError> {
        self.throttle.ensure_allowed(user, origin)
    }

    pub fn failure_count(&self, user: &str, origin: &str) -> Result<u32, AuthError> {
        self.throttle.failure_count(user, origin)
    }

    pub fn set_max_attempts(&self, max_attempts: u32) {
        self.throttle.set_max_attempts(max_attempts);
    }

    pub fn set_ban_duration_secs(&self, ban_duration_secs: i64) {
        self.throttle.set_ban_duration_secs(ban_duration_secs);
    }

    // ============================================
    // Users
    // ============================================

    pub async fn new_user(
        &self,
        user: &str,
        password: &str,
        email: &str,
        auth_level: i32,
    ) -> Result<(), AuthError> {
        self.users.new_user(user, password, email, auth_level).await
    }

    pub async fn delete_user(&self, user: &str) -> Result<(), AuthError> {
        self.users.delete_user(user).await
    }

    pub async fn update_password(&self, user: &str, password: &str) -> Result<(), AuthError> {
        self.users.update_password(user, password).await
    }

    pub async fn update_email(&self, user: &str, email: &str) -> Result<(), AuthError> {
        self.users.update_email(user, email).await
    }

    pub async fn check_login(&self, user: &str, password: &str) -> Result<Option<i32>, AuthError> {
        self.users.check_login(user, password).await
    }

    pub async fn check_login_delayed(
        &self,
        user: &str,
        password: &str,
        delay: Duration,
    ) -> Result<Option<i32>, AuthError> {
        self.users.check_login_delayed(user, password, delay).await
    }

    // ============================================
    // Verification codes
    // ============================================

    pub async fn issue_code(
        &self,
        user: &str,
        password: &str,
        duration_secs: i64,
    ) -> Result<bool, AuthError> {
        self.twofa.issue_code(user, password, duration_secs).await
    }

    pub async fn verify_code(&self, user: &str, code: &str) -> Result<bool, AuthError> {
        self.twofa.verify_code(user, code).await
    }

    // ============================================
    // Reaper
    // ============================================

    /// Immediate synchronous sweep; returns the number of records removed.
    pub fn sweep_now(&self) -> usize {
        self.reaper.sweep_now()
    }

    /// Starts the configured periodic sweep. `None` when `sweep_period` is
    /// 0 (write-triggered sweeps still run).
    pub fn spawn_periodic_sweep(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.sweep_period == 0 {
            return None;
        }
        Some(
            Arc::clone(&self.reaper)
                .spawn_periodic(Duration::from_secs(self.sweep_period)),
        )
    }
}
