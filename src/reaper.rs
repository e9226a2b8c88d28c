//! Background sweep of expired records.
//!
//! The reaper bounds store memory under sustained traffic without putting
//! cleanup work on any request path. It fires either after a volume of
//! writes (a saturating counter the facade bumps after throttle writes) or
//! on a fixed period. Sweeps always run as detached tasks and take each
//! store's own lock internally; they are never invoked from inside another
//! critical section.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::store::{Expiring, ExpiringStore};

pub const DEFAULT_SWEEP_AFTER_WRITES: u32 = 64;

/// Object-safe view of a store the reaper can purge.
pub trait Sweepable: Send + Sync {
    fn sweep_expired(&self, now: i64) -> usize;
    fn live_len(&self) -> usize;
}

impl<R: Expiring + Clone + Send> Sweepable for ExpiringStore<R> {
    fn sweep_expired(&self, now: i64) -> usize {
        self.sweep(now)
    }

    fn live_len(&self) -> usize {
        self.len()
    }
}

/// Write-volume and period triggered sweeper over a set of stores.
pub struct Reaper {
    stores: Vec<(&'static str, Arc<dyn Sweepable>)>,
    clock: Arc<dyn Clock>,
    writes: AtomicU32,
    threshold: u32,
}

impl Reaper {
    pub fn new(clock: Arc<dyn Clock>, threshold: u32) -> Self {
        Self {
            stores: Vec::new(),
            clock,
            writes: AtomicU32::new(0),
            threshold: threshold.max(1),
        }
    }

    /// Registers a store for sweeping. Called during wiring, before the
    /// reaper is shared.
    pub fn watch(&mut self, name: &'static str, store: Arc<dyn Sweepable>) {
        self.stores.push((name, store));
    }

    /// Notes one write against the volume threshold. When the threshold is
    /// reached the counter resets and a detached sweep is dispatched.
    /// Returns whether a sweep was triggered.
    pub fn note_write(self: &Arc<Self>) -> bool {
        let n = self.writes.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if n >= self.threshold {
            self.writes.store(0, Ordering::SeqCst);
            self.trigger();
            return true;
        }
        false
    }

    /// Dispatches a sweep on a detached task.
    pub fn trigger(self: &Arc<Self>) {
        let reaper = Arc::clone(self);
        tokio::spawn(async move {
            reaper.sweep_now();
        });
    }

    /// Sweeps every watched store immediately on the calling thread.
    /// Returns the total number of records removed.
    pub fn sweep_now(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for (name, store) in &self.stores {
            let n = store.sweep_expired(now);
            removed += n;
            if n > 0 {
                tracing::debug!(
                    "[reaper] [swept] store={} removed={} remaining={}",
                    name,
                    n,
                    store.live_len()
                );
            }
        }
        removed
    }

    /// Runs `sweep_now` every `period` until the returned handle is aborted.
    pub fn spawn_periodic(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_now();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Debug, Clone)]
    struct Rec {
        exp: i64,
    }

    impl Expiring for Rec {
        fn expires_at(&self) -> i64 {
            self.exp
        }
    }

    fn reaper_with_store(threshold: u32) -> (Arc<Reaper>, Arc<ExpiringStore<Rec>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(ExpiringStore::new());
        let mut reaper = Reaper::new(Arc::clone(&clock) as Arc<dyn Clock>, threshold);
        reaper.watch("test", Arc::clone(&store) as Arc<dyn Sweepable>);
        (Arc::new(reaper), store, clock)
    }

    #[test]
    fn test_sweep_now_purges_only_expired() {
        let (reaper, store, _) = reaper_with_store(8);
        store.put("dead", Rec { exp: 900 });
        store.put("live", Rec { exp: 2_000 });
        store.put("pinned", Rec { exp: 0 });

        assert_eq!(reaper.sweep_now(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_note_write_triggers_at_threshold() {
        let (reaper, store, _) = reaper_with_store(3);
        store.put("dead", Rec { exp: 900 });

        assert!(!reaper.note_write());
        assert!(!reaper.note_write());
        assert!(reaper.note_write());

        // the sweep runs detached
        for _ in 0..20 {
            if store.len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.len(), 0);

        // counter was reset by the trigger
        assert!(!reaper.note_write());
    }

    #[tokio::test]
    async fn test_periodic_sweep() {
        let (reaper, store, _) = reaper_with_store(u32::MAX);
        store.put("dead", Rec { exp: 900 });

        let handle = Arc::clone(&reaper).spawn_periodic(Duration::from_millis(5));
        for _ in 0..40 {
            if store.len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_threshold_floor_is_one() {
        let clock = Arc::new(ManualClock::new(0));
        let reaper = Reaper::new(clock as Arc<dyn Clock>, 0);
        assert_eq!(reaper.threshold, 1);
    }
}
