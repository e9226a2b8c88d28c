//! Concurrency-safe expiring record store.
//!
//! One `ExpiringStore` instance backs each logical map in the crate (session
//! cache, login throttle, verification codes). Each instance owns its own
//! exclusive lock; unrelated stores never contend with each other.

use std::collections::HashMap;
use std::sync::Mutex;

/// Sentinel expiry meaning "never expires". Records carrying it survive any
/// number of sweeps.
pub const NO_EXPIRY: i64 = 0;

/// A record with an absolute expiry instant (Unix seconds).
///
/// `NO_EXPIRY` (0) disables automatic expiry for the record.
pub trait Expiring {
    fn expires_at(&self) -> i64;
}

/// Mutex-guarded map from string key to an expiring record.
///
/// All operations are atomic with respect to each other: every method takes
/// the store lock once and releases it before returning. Callers receive
/// clones, never references into the map, so records cannot be mutated
/// outside the store's critical section.
///
/// `get` returns expired records verbatim; interpreting `expires_at <= now`
/// is the caller's job, because policy differs per store (the throttle only
/// resets a lapsed entry if it had reached the ban threshold).
pub struct ExpiringStore<R> {
    records: Mutex<HashMap<String, R>>,
}

impl<R: Expiring + Clone> ExpiringStore<R> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Unconditional upsert.
    pub fn put(&self, key: &str, record: R) {
        let mut records = self.records.lock().unwrap();
        records.insert(key.to_string(), record);
    }

    /// Returns a clone of the record, expired or not. `None` if absent.
    pub fn get(&self, key: &str) -> Option<R> {
        let records = self.records.lock().unwrap();
        records.get(key).cloned()
    }

    /// Removes a key. No-op if absent.
    pub fn delete(&self, key: &str) {
        let mut records = self.records.lock().unwrap();
        records.remove(key);
    }

    /// Read-modify-write under a single critical section.
    ///
    /// `f` observes the current record (or `None`) and returns the record to
    /// write back, or `None` to delete the key. The second element of the
    /// tuple is forwarded to the caller. Concurrent `update`s on the same key
    /// serialize on the store lock, so increments are never lost.
    pub fn update<T>(&self, key: &str, f: impl FnOnce(Option<&R>) -> (Option<R>, T)) -> T {
        let mut records = self.records.lock().unwrap();
        let (next, out) = f(records.get(key));
        match next {
            Some(record) => {
                records.insert(key.to_string(), record);
            }
            None => {
                records.remove(key);
            }
        }
        out
    }

    /// Removes every record with `0 < expires_at <= now`. Returns the number
    /// of records removed.
    pub fn sweep(&self, now: i64) -> usize {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| {
            let exp = r.expires_at();
            exp == NO_EXPIRY || exp > now
        });
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Expiring + Clone> Default for ExpiringStore<R> {
    fn default() -> Self {
        Self::new()
    }
}
