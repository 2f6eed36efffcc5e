//! Tests for the lock coordinator.

use super::*;
use crate::events::RecordingSink;
use crate::liveness::{AssumeAlive, RegistryProber, StaticRegistry};
use crate::store::MemoryStore;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const RESOURCE: &str = "changelog";

fn holder() -> OwnerIdentity {
    OwnerIdentity::new("42", "2024-01-01T00:00:00Z")
}

fn me() -> OwnerIdentity {
    OwnerIdentity::new("7", "2024-02-02T00:00:00Z")
}

/// Shared fixtures for a coordinator over an in-memory store.
struct Harness {
    store: Arc<MemoryStore>,
    registry: Arc<StaticRegistry>,
    sink: Arc<RecordingSink>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.bootstrap(RESOURCE);
        Self {
            store,
            registry: Arc::new(StaticRegistry::new()),
            sink: Arc::new(RecordingSink::new()),
        }
    }

    fn coordinator(&self, identity: OwnerIdentity, max_attempts: u32) -> LockCoordinator {
        let record_store = LockRecordStore::new(self.store.clone(), RESOURCE, self.sink.clone());
        let prober = RegistryProber::new(self.registry.clone(), self.sink.clone());
        LockCoordinator::new(
            record_store,
            Box::new(prober),
            identity,
            RetryPolicy::fixed(max_attempts, Duration::ZERO),
            self.sink.clone(),
        )
    }

    fn record(&self) -> LockRecord {
        self.store.snapshot(RESOURCE).unwrap()
    }

    fn lock_as(&self, raw_owner: &str) -> LockRecord {
        let record = LockRecord {
            locked: true,
            owner: raw_owner.to_string(),
            granted_at: Some(Utc::now()),
        };
        self.store.put(RESOURCE, record.clone());
        record
    }
}

#[test]
fn test_acquire_unlocked_resource() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(holder(), 3);

    let guard = coordinator.acquire().unwrap();

    let record = harness.record();
    assert!(record.locked);
    assert_eq!(record.owner, "42@@2024-01-01T00:00:00Z");
    assert!(record.granted_at.is_some());
    assert_eq!(guard.resource(), RESOURCE);

    let events = harness.sink.events();
    assert_eq!(
        events[0],
        LockEvent::Acquired {
            resource: RESOURCE.to_string(),
            owner: "42@@2024-01-01T00:00:00Z".to_string(),
            attempt: 1,
        }
    );
    assert_eq!(harness.sink.count("waiting"), 0);
}

#[test]
fn test_active_owner_is_never_reclaimed() {
    let harness = Harness::new();
    harness.registry.insert(holder());
    let before = harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 3);

    let err = coordinator.acquire().err().unwrap();

    assert!(matches!(
        err,
        WardenError::LockTimeout { ref resource, attempts: 3 } if resource == RESOURCE
    ));
    assert_eq!(harness.record(), before);
    assert_eq!(harness.sink.count("held_by_active_owner"), 3);
    assert_eq!(harness.sink.count("reclaimed"), 0);
    assert_eq!(harness.sink.count("waiting"), 2);
    assert_eq!(harness.sink.count("timed_out"), 1);
}

#[test]
fn test_inactive_owner_is_reclaimed_then_acquired() {
    let harness = Harness::new();
    harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 3);

    assert_eq!(coordinator.try_acquire(1).unwrap(), Attempt::Reclaimed);
    assert_eq!(harness.record(), LockRecord::unlocked());
    assert_eq!(coordinator.try_acquire(2).unwrap(), Attempt::Acquired);
    assert!(harness.record().is_held_by(&me()));
}

#[test]
fn test_acquire_reclaims_without_waiting() {
    let harness = Harness::new();
    harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 2);

    let _guard = coordinator.acquire().unwrap();

    assert!(harness.record().is_held_by(&me()));
    assert_eq!(harness.sink.count("reclaimed"), 1);
    assert_eq!(harness.sink.count("waiting"), 0);
    assert!(harness.sink.events().contains(&LockEvent::Reclaimed {
        resource: RESOURCE.to_string(),
        owner: holder(),
    }));
}

#[test]
fn test_single_attempt_budget_still_takes_stale_lock() {
    let harness = Harness::new();
    harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 1);

    let _guard = coordinator.acquire().unwrap();

    assert!(harness.record().is_held_by(&me()));
    assert_eq!(harness.sink.count("reclaimed"), 1);
    assert_eq!(harness.sink.count("timed_out"), 0);
    assert!(harness.sink.events().contains(&LockEvent::Acquired {
        resource: RESOURCE.to_string(),
        owner: me().encode(),
        attempt: 2,
    }));
}

#[test]
fn test_extra_attempt_after_reclaim_is_granted_once() {
    let harness = Harness::new();
    harness.lock_as("42@@2024-01-01T00:00:00Z");
    // The extra attempt sees a live owner that took the lock in between.
    let late = OwnerIdentity::new("43", "2024-03-03T00:00:00Z");
    harness.registry.insert(late.clone());
    let store = harness.store.clone();
    let sink = harness.sink.clone();
    let coordinator = harness.coordinator(me(), 1);
    let reclaims = sink.clone();
    let stealer = move || {
        let unlocked = store.snapshot(RESOURCE).is_some_and(|r| !r.locked);
        if reclaims.count("reclaimed") == 1 && unlocked {
            store.put(RESOURCE, LockRecord::held_by(&late, Utc::now()));
        }
        false
    };

    let err = coordinator.acquire_until(stealer).err().unwrap();

    assert!(matches!(err, WardenError::LockTimeout { attempts: 2, .. }));
    assert_eq!(sink.count("reclaimed"), 1);
    assert_eq!(sink.count("held_by_active_owner"), 1);
}

#[test]
fn test_recycled_pid_is_treated_as_gone() {
    let harness = Harness::new();
    // Same pid, started later: an unrelated process reusing the id.
    harness
        .registry
        .insert(OwnerIdentity::new("42", "2024-05-05T12:00:00Z"));
    harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 2);

    let _guard = coordinator.acquire().unwrap();
    assert_eq!(harness.sink.count("reclaimed"), 1);
}

#[test]
fn test_unparseable_owner_is_never_reclaimed() {
    let harness = Harness::new();
    let before = harness.lock_as("garbage");
    let coordinator = harness.coordinator(me(), 4);

    let err = coordinator.acquire().err().unwrap();

    assert!(matches!(err, WardenError::LockTimeout { attempts: 4, .. }));
    assert_eq!(harness.record(), before);
    assert_eq!(harness.sink.count("owner_unparseable"), 4);
    assert_eq!(harness.sink.count("reclaimed"), 0);
    assert!(harness.sink.events().contains(&LockEvent::OwnerUnparseable {
        resource: RESOURCE.to_string(),
        raw: "garbage".to_string(),
    }));
}

#[test]
fn test_missing_owner_is_never_reclaimed() {
    let harness = Harness::new();
    let before = harness.lock_as("");
    let coordinator = harness.coordinator(me(), 2);

    assert_eq!(coordinator.try_acquire(1).unwrap(), Attempt::Unverified);
    assert_eq!(harness.record(), before);
    assert_eq!(harness.sink.count("owner_missing"), 1);
}

#[test]
fn test_probe_failure_is_never_reclaimed() {
    let harness = Harness::new();
    harness.registry.set_unavailable(true);
    let before = harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 2);

    let err = coordinator.acquire().err().unwrap();

    assert!(matches!(err, WardenError::LockTimeout { .. }));
    assert_eq!(harness.record(), before);
    assert_eq!(harness.sink.count("probe_failed"), 2);
    assert_eq!(harness.sink.count("owner_unverified"), 2);
    assert_eq!(harness.sink.count("reclaimed"), 0);
}

#[test]
fn test_assume_alive_prober_disables_reclamation() {
    let harness = Harness::new();
    let before = harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = LockCoordinator::new(
        LockRecordStore::new(harness.store.clone(), RESOURCE, harness.sink.clone()),
        Box::new(AssumeAlive),
        me(),
        RetryPolicy::fixed(2, Duration::ZERO),
        harness.sink.clone(),
    );

    assert!(coordinator.acquire().is_err());
    assert_eq!(harness.record(), before);
}

#[test]
fn test_store_failure_propagates() {
    let harness = Harness::new();
    harness.store.set_unavailable(true);
    let coordinator = harness.coordinator(me(), 5);

    let err = coordinator.acquire().err().unwrap();

    assert!(matches!(err, WardenError::Store(_)));
    // One failed read, no retries, no timeout.
    assert_eq!(harness.sink.count("store_failed"), 1);
    assert_eq!(harness.sink.count("timed_out"), 0);
}

#[test]
fn test_lost_race_observes_winner() {
    let harness = Harness::new();
    harness.registry.insert(holder());
    harness.registry.insert(me());
    let first = harness.coordinator(holder(), 1);
    let second = harness.coordinator(me(), 1);

    // Both processes read the same unlocked row.
    let seen = harness.store.snapshot(RESOURCE).unwrap();
    let store = LockRecordStore::new(harness.store.clone(), RESOURCE, harness.sink.clone());
    assert!(
        store
            .write_lock_state(&seen, &LockRecord::held_by(first.identity(), Utc::now()))
            .unwrap()
    );
    assert!(
        !store
            .write_lock_state(&seen, &LockRecord::held_by(second.identity(), Utc::now()))
            .unwrap()
    );

    // The loser's next attempt takes the locked branch.
    assert_eq!(
        second.try_acquire(2).unwrap(),
        Attempt::HeldByActiveOwner(holder())
    );
    assert!(harness.record().is_held_by(&holder()));
}

#[test]
fn test_reclaim_lost_to_faster_process() {
    let harness = Harness::new();
    harness.lock_as("42@@2024-01-01T00:00:00Z");

    // Make the registry answer "gone" while another process re-locks the row
    // between our read and our reclaim.
    struct RelockingProber {
        store: Arc<MemoryStore>,
    }
    impl LivenessProber for RelockingProber {
        fn is_active(&self, _identity: &OwnerIdentity) -> std::result::Result<bool, QueryError> {
            self.store.put(
                RESOURCE,
                LockRecord::held_by(&OwnerIdentity::new("99", "later"), Utc::now()),
            );
            Ok(false)
        }
    }

    let coordinator = LockCoordinator::new(
        LockRecordStore::new(harness.store.clone(), RESOURCE, harness.sink.clone()),
        Box::new(RelockingProber {
            store: harness.store.clone(),
        }),
        me(),
        RetryPolicy::fixed(1, Duration::ZERO),
        harness.sink.clone(),
    );

    assert_eq!(coordinator.try_acquire(1).unwrap(), Attempt::Contended);
    assert_eq!(harness.record().owner, "99@@later");
    assert_eq!(harness.sink.count("reclaim_lost"), 1);
    assert_eq!(harness.sink.count("reclaimed"), 0);
}

#[test]
fn test_release_by_non_owner_is_noop() {
    let harness = Harness::new();
    let before = harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 1);

    assert!(!coordinator.release().unwrap());
    assert_eq!(harness.record(), before);
    assert!(harness.sink.events().contains(&LockEvent::ReleaseSkipped {
        resource: RESOURCE.to_string(),
        caller: "7@@2024-02-02T00:00:00Z".to_string(),
        recorded_owner: "42@@2024-01-01T00:00:00Z".to_string(),
        locked: true,
    }));
}

#[test]
fn test_release_when_unlocked_is_noop() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(me(), 1);

    assert!(!coordinator.release().unwrap());
    assert_eq!(harness.record(), LockRecord::unlocked());
    assert_eq!(harness.sink.count("release_skipped"), 1);
}

#[test]
fn test_guard_release_unlocks() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(me(), 1);

    let guard = coordinator.acquire().unwrap();
    assert!(guard.release().unwrap());

    assert_eq!(harness.record(), LockRecord::unlocked());
    assert_eq!(harness.sink.count("released"), 1);
}

#[test]
fn test_guard_drop_unlocks() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(me(), 1);

    {
        let _guard = coordinator.acquire().unwrap();
        assert!(harness.record().locked);
    }

    assert_eq!(harness.record(), LockRecord::unlocked());
}

#[test]
fn test_guard_drop_after_reclamation_leaves_new_owner() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(me(), 1);

    let guard = coordinator.acquire().unwrap();
    // Someone wrongly decided we were dead and took over.
    let taken = harness.lock_as("42@@2024-01-01T00:00:00Z");
    drop(guard);

    assert_eq!(harness.record(), taken);
    assert_eq!(harness.sink.count("release_skipped"), 1);
}

#[test]
fn test_guard_drop_reports_store_failure() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(me(), 1);

    let guard = coordinator.acquire().unwrap();
    harness.store.set_unavailable(true);
    drop(guard);

    assert_eq!(harness.sink.count("release_failed"), 1);
}

#[test]
fn test_with_lock_runs_operation_once_and_releases() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(me(), 1);
    let runs = AtomicUsize::new(0);

    let output = coordinator
        .with_lock(|| {
            runs.fetch_add(1, Ordering::SeqCst);
            assert!(harness.record().is_held_by(&me()));
            "migrated"
        })
        .unwrap();

    assert_eq!(output, "migrated");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(harness.record(), LockRecord::unlocked());
}

#[test]
fn test_with_lock_does_not_run_operation_on_timeout() {
    let harness = Harness::new();
    harness.registry.insert(holder());
    harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 2);
    let runs = AtomicUsize::new(0);

    let result = coordinator.with_lock(|| runs.fetch_add(1, Ordering::SeqCst));

    assert!(result.is_err());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_with_lock_releases_on_panic() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(me(), 1);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        coordinator.with_lock(|| -> u32 { panic!("migration blew up") })
    }));

    assert!(outcome.is_err());
    assert_eq!(harness.record(), LockRecord::unlocked());
}

#[test]
fn test_cancelled_acquire_leaves_no_trace() {
    let harness = Harness::new();
    harness.registry.insert(holder());
    let before = harness.lock_as("42@@2024-01-01T00:00:00Z");
    let coordinator = harness.coordinator(me(), 100);
    let checks = AtomicUsize::new(0);

    let err = coordinator
        .acquire_until(|| checks.fetch_add(1, Ordering::SeqCst) >= 2)
        .err()
        .unwrap();

    assert!(matches!(err, WardenError::Cancelled { .. }));
    assert_eq!(harness.sink.count("held_by_active_owner"), 2);
    assert_eq!(harness.record(), before);
}

#[test]
fn test_inspect_classifies_without_side_effects() {
    let harness = Harness::new();
    let coordinator = harness.coordinator(me(), 1);

    assert!(matches!(
        coordinator.inspect().unwrap().owner,
        OwnerState::Unlocked
    ));

    let stale = harness.lock_as("42@@2024-01-01T00:00:00Z");
    let status = coordinator.inspect().unwrap();
    assert!(status.owner.is_reclaimable());
    assert_eq!(status.record, stale);
    assert_eq!(harness.record(), stale);

    harness.registry.insert(holder());
    assert!(matches!(
        coordinator.inspect().unwrap().owner,
        OwnerState::Active(ref owner) if *owner == holder()
    ));

    harness.lock_as("garbage");
    assert!(matches!(
        coordinator.inspect().unwrap().owner,
        OwnerState::Unparseable(_)
    ));

    harness.lock_as("");
    assert!(matches!(
        coordinator.inspect().unwrap().owner,
        OwnerState::Missing
    ));
    assert!(harness.sink.events().is_empty());
}

#[test]
fn test_own_identity_in_row_is_not_reentrant() {
    let harness = Harness::new();
    harness.registry.insert(me());
    let coordinator = harness.coordinator(me(), 1);

    let _guard = coordinator.acquire().unwrap();
    assert_eq!(
        coordinator.try_acquire(2).unwrap(),
        Attempt::HeldByActiveOwner(me())
    );
}

#[test]
fn test_mutual_exclusion_under_contention() {
    let harness = Arc::new(Harness::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let workers = 8;

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let harness = harness.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            let completed = completed.clone();
            thread::spawn(move || {
                let identity = OwnerIdentity::new(format!("{}", 1000 + i), "t0");
                harness.registry.insert(identity.clone());
                let record_store =
                    LockRecordStore::new(harness.store.clone(), RESOURCE, harness.sink.clone());
                let coordinator = LockCoordinator::new(
                    record_store,
                    Box::new(RegistryProber::new(
                        harness.registry.clone(),
                        harness.sink.clone(),
                    )),
                    identity,
                    RetryPolicy::fixed(100_000, Duration::from_micros(100)),
                    harness.sink.clone(),
                );

                for _ in 0..5 {
                    coordinator
                        .with_lock(|| {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(200));
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .unwrap();
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), workers * 5);
    assert_eq!(harness.sink.count("reclaimed"), 0);
    assert_eq!(harness.record(), LockRecord::unlocked());
}
