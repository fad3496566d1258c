//! Property-based invariant tests for the subscription cache.
//!
//! For any interleaving of subscribes and detaches over a small set of paths:
//!
//! 1. There is never more than one cache entry per path.
//! 2. The remote client sees exactly one open subscription per cached path.
//! 3. Listener counts match the guards still alive.
//! 4. An entry awaits teardown exactly when it has no listeners.
//! 5. Every live listener received every push, in order.

use parking_lot::Mutex;
use proptest::prelude::*;
use snapcache::memory::MemoryDatabase;
use snapcache::{CacheConfig, SharedRef, Snapshot, SubscriptionCache, SubscriptionGuard};
use std::sync::Arc;

const PATHS: [&str; 3] = ["items/a", "items/b", "items/c"];

#[derive(Debug, Clone)]
enum Op {
    Subscribe(usize),
    Detach(usize),
    Push(usize, u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..PATHS.len()).prop_map(Op::Subscribe),
        (0..16usize).prop_map(Op::Detach),
        ((0..PATHS.len()), any::<u32>()).prop_map(|(p, v)| Op::Push(p, v)),
    ]
}

struct Live {
    path: usize,
    guard: SubscriptionGuard<u32>,
    seen: Arc<Mutex<Vec<u32>>>,
    expected: Vec<u32>,
}

proptest! {
    #[test]
    fn registry_invariants_hold(ops in proptest::collection::vec(op_strategy(), 1..64)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let db: MemoryDatabase<u32> = MemoryDatabase::new();
        let cache = SubscriptionCache::new(CacheConfig::default()).unwrap();
        let mut live: Vec<Live> = Vec::new();
        let reference = |p: usize| -> SharedRef<u32> { Arc::new(db.doc(PATHS[p])) };

        for op in ops {
            match op {
                Op::Subscribe(p) => {
                    let seen = Arc::new(Mutex::new(Vec::new()));
                    let seen_clone = seen.clone();
                    let guard = cache.subscribe(
                        reference(p),
                        move |snapshot: Arc<Snapshot<u32>>, _| {
                            if let Snapshot::Document(record) = &*snapshot {
                                seen_clone.lock().push(record.data);
                            }
                        },
                        |_| {},
                        None,
                    );
                    // Whatever was replayed on attach is the starting point.
                    let expected = seen.lock().clone();
                    live.push(Live { path: p, guard, seen, expected });
                }
                Op::Detach(i) => {
                    if !live.is_empty() {
                        let mut removed = live.remove(i % live.len());
                        removed.guard.detach();
                    }
                }
                Op::Push(p, v) => {
                    db.set(PATHS[p], v);
                    for listener in live.iter_mut().filter(|l| l.path == p) {
                        listener.expected.push(v);
                    }
                }
            }

            for (p, path) in PATHS.iter().enumerate() {
                let alive = live.iter().filter(|l| l.path == p).count();
                let cached = cache.contains(&reference(p));
                prop_assert_eq!(db.open_listeners(path), usize::from(cached));
                match cache.listener_count(&reference(p)) {
                    Some(count) => {
                        prop_assert_eq!(count, alive);
                        prop_assert_eq!(cache.is_pending_teardown(&reference(p)), alive == 0);
                    }
                    None => prop_assert_eq!(alive, 0),
                }
            }
            prop_assert!(cache.len() <= PATHS.len());
        }

        for listener in &live {
            let seen = listener.seen.lock().clone();
            prop_assert_eq!(seen, listener.expected.clone());
        }
    }
}
