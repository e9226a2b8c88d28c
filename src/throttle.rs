//! Failed-login throttle.
//!
//! Tracks failed attempts per user+origin and temporarily bans combinations
//! that reach the attempt threshold. A failure against one origin never
//! affects the same user's standing from another origin.
//!
//! State machine per key: Clean (no record) → Accumulating (`count <
//! max_attempts`, no ban) → Banned (`count >= max_attempts`, ban expiry set)
//! → Clean again once the ban elapses. The lapse reset clears the counter and
//! the ban in one step; there is no incremental decay.

use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::error::AuthError;
use crate::store::{Expiring, ExpiringStore, NO_EXPIRY};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BAN_DURATION_SECS: i64 = 900;

/// Failure state for one user+origin combination.
///
/// Invariant: `ban_expires_at > 0` implies `failure_count >= max_attempts`
/// at the time the ban was set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleRecord {
    pub failure_count: u32,
    pub ban_expires_at: i64,
}

impl Expiring for ThrottleRecord {
    fn expires_at(&self) -> i64 {
        self.ban_expires_at
    }
}

#[derive(Debug, Clone, Copy)]
struct Tunables {
    max_attempts: u32,
    ban_duration_secs: i64,
}

/// Strips the port suffix from a `host:port` origin.
///
/// Handles the bracketed IPv6 form (`[::1]:8080` → `::1`). A bare IPv6
/// address (multiple colons, no brackets) is used whole.
pub fn normalize_origin(origin: &str) -> &str {
    if let Some(rest) = origin.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match (origin.find(':'), origin.rfind(':')) {
        (Some(first), Some(last)) if first == last => &origin[..first],
        _ => origin,
    }
}

/// Per user+origin failed-login accounting with threshold-activated bans.
pub struct LoginThrottle {
    store: Arc<ExpiringStore<ThrottleRecord>>,
    tunables: Mutex<Tunables>,
    clock: Arc<dyn Clock>,
}

impl LoginThrottle {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_tunables(clock, DEFAULT_MAX_ATTEMPTS, DEFAULT_BAN_DURATION_SECS)
    }

    pub fn with_tunables(
        clock: Arc<dyn Clock>,
        max_attempts: u32,
        ban_duration_secs: i64,
    ) -> Self {
        Self {
            store: Arc::new(ExpiringStore::new()),
            tunables: Mutex::new(Tunables {
                max_attempts,
                ban_duration_secs,
            }),
            clock,
        }
    }

    /// The underlying store, shared with the reaper.
    pub(crate) fn store(&self) -> Arc<ExpiringStore<ThrottleRecord>> {
        Arc::clone(&self.store)
    }

    fn key(user: &str, origin: &str) -> Result<String, AuthError> {
        if user.is_empty() {
            return Err(AuthError::InvalidInput("empty user"));
        }
        let origin = normalize_origin(origin);
        if origin.is_empty() {
            return Err(AuthError::InvalidInput("empty origin"));
        }
        Ok(format!("{user}@{origin}"))
    }

    /// Records a failed login for `user` from `origin`.
    ///
    /// Pure in-memory: one critical section, no I/O. When the incremented
    /// count reaches `max_attempts` the ban window opens (and every further
    /// failure while at or above the threshold pushes it out again).
    pub fn record_failure(&self, user: &str, origin: &str) -> Result<(), AuthError> {
        let key = Self::key(user, origin)?;
        let tunables = *self.tunables.lock().unwrap();
        let now = self.clock.now();

        let (count, banned) = self.store.update(&key, |cur| {
            let count = cur.map(|r| r.failure_count).unwrap_or(0).saturating_add(1);
            let ban_expires_at = if count >= tunables.max_attempts {
                now + tunables.ban_duration_secs
            } else {
                NO_EXPIRY
            };
            (
                Some(ThrottleRecord {
                    failure_count: count,
                    ban_expires_at,
                }),
                (count, ban_expires_at != NO_EXPIRY),
            )
        });

        if banned {
            tracing::info!(
                "[throttle] [banned] user={} origin={} failures={}",
                user,
                normalize_origin(origin),
                count
            );
        } else {
            tracing::debug!(
                "[throttle] [failure] user={} origin={} failures={}",
                user,
                normalize_origin(origin),
                count
            );
        }
        Ok(())
    }

    /// Guard form of the ban check: `Err(Banned { until })` while the ban
    /// holds, `Ok(())` otherwise.
    ///
    /// A lapsed ban is reset here: the record is deleted and the counter
    /// restarts from zero, so a single later failure cannot immediately
    /// re-ban. Accumulating records (no ban set) are left untouched — only
    /// an elapsed ban clears history. Callers therefore must consult this
    /// before retrying credentials, not use it for auditing.
    pub fn ensure_allowed(&self, user: &str, origin: &str) -> Result<(), AuthError> {
        let key = Self::key(user, origin)?;
        let now = self.clock.now();

        self.store.update(&key, |cur| match cur {
            None => (None, Ok(())),
            Some(record) => {
                if record.ban_expires_at > now {
                    (
                        Some(record.clone()),
                        Err(AuthError::Banned {
                            until: record.ban_expires_at,
                        }),
                    )
                } else if record.ban_expires_at != NO_EXPIRY {
                    // Ban elapsed: combined reset back to Clean.
                    (None, Ok(()))
                } else {
                    (Some(record.clone()), Ok(()))
                }
            }
        })
    }

    /// Whether the user+origin combination is currently banned. Same reset
    /// semantics as [`LoginThrottle::ensure_allowed`].
    pub fn is_blocked(&self, user: &str, origin: &str) -> Result<bool, AuthError> {
        match self.ensure_allowed(user, origin) {
            Ok(()) => Ok(false),
            Err(AuthError::Banned { .. }) => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Current failure count for the combination. Diagnostic read only.
    pub fn failure_count(&self, user: &str, origin: &str) -> Result<u32, AuthError> {
        let key = Self::key(user, origin)?;
        Ok(self
            .store
            .get(&key)
            .map(|r| r.failure_count)
            .unwrap_or(0))
    }

    /// Sets the attempt threshold. Applies to future failure recordings;
    /// existing records are not restructured.
    pub fn set_max_attempts(&self, max_attempts: u32) {
        self.tunables.lock().unwrap().max_attempts = max_attempts;
    }

    /// Sets the ban duration in seconds for bans activated from now on.
    pub fn set_ban_duration_secs(&self, ban_duration_secs: i64) {
        self.tunables.lock().unwrap().ban_duration_secs = ban_duration_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn throttle(max_attempts: u32, ban_secs: i64) -> (LoginThrottle, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let throttle =
            LoginThrottle::with_tunables(Arc::clone(&clock) as Arc<dyn Clock>, max_attempts, ban_secs);
        (throttle, clock)
    }

    #[test]
    fn test_normalize_origin() {
        assert_eq!(normalize_origin("1.2.3.4:5678"), "1.2.3.4");
        assert_eq!(normalize_origin("1.2.3.4"), "1.2.3.4");
        assert_eq!(normalize_origin("host.example:443"), "host.example");
        assert_eq!(normalize_origin("[::1]:8080"), "::1");
        assert_eq!(normalize_origin("::1"), "::1");
        assert_eq!(
            normalize_origin("2001:db8::dead:beef"),
            "2001:db8::dead:beef"
        );
    }

    #[test]
    fn test_clean_key_not_blocked() {
        let (throttle, _) = throttle(3, 900);
        assert!(!throttle.is_blocked("alice", "1.2.3.4").unwrap());
        assert_eq!(throttle.failure_count("alice", "1.2.3.4").unwrap(), 0);
    }

    #[test]
    fn test_ban_activates_at_threshold() {
        let (throttle, _) = throttle(3, 900);
        for _ in 0..2 {
            throttle.record_failure("alice", "1.2.3.4:5000").unwrap();
            assert!(!throttle.is_blocked("alice", "1.2.3.4:5000").unwrap());
        }
        throttle.record_failure("alice", "1.2.3.4:5000").unwrap();
        assert!(throttle.is_blocked("alice", "1.2.3.4:5000").unwrap());
    }

    #[test]
    fn test_is_blocked_does_not_reset_accumulating_count() {
        let (throttle, _) = throttle(3, 900);
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        // status checks between attempts must not erase history
        assert!(!throttle.is_blocked("alice", "1.2.3.4").unwrap());
        assert_eq!(throttle.failure_count("alice", "1.2.3.4").unwrap(), 2);
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        assert!(throttle.is_blocked("alice", "1.2.3.4").unwrap());
    }

    #[test]
    fn test_ban_lapse_resets_to_clean() {
        let (throttle, clock) = throttle(3, 900);
        for _ in 0..3 {
            throttle.record_failure("alice", "1.2.3.4").unwrap();
        }
        assert!(throttle.is_blocked("alice", "1.2.3.4").unwrap());

        clock.advance(901);
        assert!(!throttle.is_blocked("alice", "1.2.3.4").unwrap());
        assert_eq!(throttle.failure_count("alice", "1.2.3.4").unwrap(), 0);

        // a single failure after the reset must not re-ban
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        assert!(!throttle.is_blocked("alice", "1.2.3.4").unwrap());
        assert_eq!(throttle.failure_count("alice", "1.2.3.4").unwrap(), 1);
    }

    #[test]
    fn test_ensure_allowed_reports_ban_expiry() {
        let (throttle, _) = throttle(2, 100);
        assert!(throttle.ensure_allowed("alice", "1.2.3.4").is_ok());
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        assert!(matches!(
            throttle.ensure_allowed("alice", "1.2.3.4"),
            Err(AuthError::Banned { until: 1_100 })
        ));
    }

    #[test]
    fn test_ban_holds_for_duration() {
        let (throttle, clock) = throttle(2, 100);
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        throttle.record_failure("alice", "1.2.3.4").unwrap();

        clock.advance(99);
        assert!(throttle.is_blocked("alice", "1.2.3.4").unwrap());
        clock.advance(1);
        // ban_expires_at == now is no longer banned
        assert!(!throttle.is_blocked("alice", "1.2.3.4").unwrap());
    }

    #[test]
    fn test_cross_origin_isolation() {
        let (throttle, _) = throttle(3, 900);
        for _ in 0..3 {
            throttle.record_failure("alice", "10.0.0.1:1111").unwrap();
        }
        assert!(throttle.is_blocked("alice", "10.0.0.1:2222").unwrap());
        // same user, different origin: unaffected
        assert!(!throttle.is_blocked("alice", "10.0.0.2:1111").unwrap());
        throttle.record_failure("alice", "10.0.0.2").unwrap();
        assert!(throttle.is_blocked("alice", "10.0.0.1").unwrap());
    }

    #[test]
    fn test_port_is_ignored_in_key() {
        let (throttle, _) = throttle(2, 900);
        throttle.record_failure("alice", "1.2.3.4:1000").unwrap();
        throttle.record_failure("alice", "1.2.3.4:2000").unwrap();
        assert!(throttle.is_blocked("alice", "1.2.3.4:3000").unwrap());
    }

    #[test]
    fn test_failures_above_threshold_extend_ban() {
        let (throttle, clock) = throttle(2, 100);
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        clock.advance(50);
        // a further failure while banned re-opens the full window
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        clock.advance(99);
        assert!(throttle.is_blocked("alice", "1.2.3.4").unwrap());
    }

    #[test]
    fn test_setters_apply_to_future_failures() {
        let (throttle, _) = throttle(5, 900);
        throttle.set_max_attempts(2);
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        throttle.record_failure("alice", "1.2.3.4").unwrap();
        assert!(throttle.is_blocked("alice", "1.2.3.4").unwrap());

        let (throttle, clock) = self::throttle(1, 900);
        throttle.set_ban_duration_secs(10);
        throttle.record_failure("bob", "1.2.3.4").unwrap();
        clock.advance(11);
        assert!(!throttle.is_blocked("bob", "1.2.3.4").unwrap());
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let (throttle, _) = throttle(3, 900);
        assert!(matches!(
            throttle.record_failure("", "1.2.3.4"),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            throttle.record_failure("alice", ""),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            throttle.is_blocked("alice", ":80"),
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_concurrent_failures_all_counted() {
        let (throttle, _) = throttle(10_000, 900);
        let throttle = Arc::new(throttle);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let throttle = Arc::clone(&throttle);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    throttle.record_failure("alice", "1.2.3.4:80").unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(throttle.failure_count("alice", "1.2.3.4").unwrap(), 800);
    }
}
