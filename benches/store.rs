use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use warden::clock::{Clock, ManualClock};
use warden::store::{Expiring, ExpiringStore};
use warden::throttle::LoginThrottle;

#[derive(Debug, Clone)]
struct Rec {
    expires_at: i64,
}

impl Expiring for Rec {
    fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

fn bench_store(c: &mut Criterion) {
    let store: ExpiringStore<Rec> = ExpiringStore::new();
    for i in 0..10_000 {
        store.put(&format!("key-{i}"), Rec { expires_at: 0 });
    }

    c.bench_function("store_get_hit", |b| {
        b.iter(|| std::hint::black_box(store.get("key-5000")))
    });

    c.bench_function("store_get_miss", |b| {
        b.iter(|| std::hint::black_box(store.get("absent")))
    });

    c.bench_function("store_put_overwrite", |b| {
        b.iter(|| store.put("key-5000", Rec { expires_at: 0 }))
    });

    c.bench_function("store_sweep_nothing_expired", |b| {
        b.iter(|| std::hint::black_box(store.sweep(1)))
    });
}

fn bench_throttle(c: &mut Criterion) {
    let clock = Arc::new(ManualClock::new(1_000));
    let throttle = LoginThrottle::new(clock as Arc<dyn Clock>);
    throttle.set_max_attempts(u32::MAX);

    c.bench_function("throttle_record_failure", |b| {
        b.iter(|| throttle.record_failure("user", "10.0.0.1").unwrap())
    });

    c.bench_function("throttle_is_blocked_clean", |b| {
        b.iter(|| std::hint::black_box(throttle.is_blocked("other", "10.0.0.1").unwrap()))
    });
}

criterion_group!(benches, bench_store, bench_throttle);
criterion_main!(benches);
