//! Racing writers against one plan and one grant.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use optionpool_engine::{EngineSettings, OptionPool};
use optionpool_store::PoolStore;
use optionpool_types::{ExerciseStatus, RuleViolation};

use crate::common::{dec, fixture, rule};

#[test]
fn racing_grants_never_overcommit_the_pool() {
    let f = fixture();
    let plan = f.plan(10_000);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let terms = f.terms(&plan, 2_000);
                let pool = Arc::clone(&f.pool);
                let admin = f.admin;
                s.spawn(move || pool.create_grant(terms, admin))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let issued = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(issued, 5);
    for result in results {
        if let Err(err) = result {
            assert!(matches!(rule(err), RuleViolation::PoolExhausted { .. }));
        }
    }
    assert_eq!(f.live_granted(&plan), dec(10_000));
    let stored = f.pool.store().read(|r| r.plan(plan.id)).unwrap().unwrap();
    assert_eq!(stored.total_granted, dec(10_000));
}

#[test]
fn separate_connections_share_the_pool_ceiling() {
    let f = fixture();
    let plan = f.plan(5_000);
    let second = PoolStore::open(f.db_path(), Duration::from_secs(10)).unwrap();
    let other = Arc::new(OptionPool::new(Arc::new(second), EngineSettings::default()));

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let pool = if i % 2 == 0 {
                    Arc::clone(&f.pool)
                } else {
                    Arc::clone(&other)
                };
                let terms = f.terms(&plan, 1_000);
                let admin = f.admin;
                s.spawn(move || pool.create_grant(terms, admin))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    assert_eq!(f.live_granted(&plan), dec(5_000));
}

#[test]
fn only_one_pending_exercise_survives_a_race() {
    let f = fixture();
    let plan = f.plan(10_000);
    let grant = f.grant(&plan, 4_800);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let pool = Arc::clone(&f.pool);
                let grantee = f.grantee;
                s.spawn(move || pool.create_exercise_request(grant.id, dec(100), grantee))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results {
        if let Err(err) = result {
            assert_eq!(rule(err), RuleViolation::PendingExerciseExists);
        }
    }
    let pending = f
        .pool
        .list_exercises(grant.id)
        .unwrap()
        .into_iter()
        .filter(|e| e.status == ExerciseStatus::PendingPayment)
        .count();
    assert_eq!(pending, 1);
}

#[test]
fn confirm_and_cancel_race_has_one_winner() {
    let f = fixture();
    let plan = f.plan(10_000);
    let grant = f.grant(&plan, 4_800);
    let request = f
        .pool
        .create_exercise_request(grant.id, dec(1_000), f.grantee)
        .unwrap();

    let (confirmed, cancelled) = thread::scope(|s| {
        let confirm = {
            let pool = Arc::clone(&f.pool);
            let admin = f.admin;
            s.spawn(move || pool.confirm_exercise_payment(request.id, admin))
        };
        let cancel = {
            let pool = Arc::clone(&f.pool);
            let grantee = f.grantee;
            s.spawn(move || pool.cancel_exercise(request.id, grantee))
        };
        (confirm.join().unwrap(), cancel.join().unwrap())
    });
    assert!(confirmed.is_ok() != cancelled.is_ok());

    let stored = f.pool.find_exercise(request.id).unwrap();
    let grant = f.pool.find_grant(grant.id).unwrap().grant;
    if confirmed.is_ok() {
        assert_eq!(stored.status, ExerciseStatus::Completed);
        assert_eq!(grant.exercised, dec(1_000));
    } else {
        assert_eq!(stored.status, ExerciseStatus::Cancelled);
        assert_eq!(grant.exercised, dec(0));
    }
}
