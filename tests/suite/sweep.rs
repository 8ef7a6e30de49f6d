//! Expiration sweep: releasing expired grants back to their pools.

use optionpool_engine::EngineSettings;
use optionpool_types::{
    ActorType, AuditAction, ExerciseStatus, GrantStatus, NotificationKind, OptionGrant,
    OptionPlan,
};
use rusqlite::Connection;

use crate::common::{Fixture, at, dec, fixture, fixture_with};

fn expiring(f: &Fixture, plan: &OptionPlan, quantity: i64, day: u32) -> OptionGrant {
    let mut terms = f.terms(plan, quantity);
    terms.expiration_date = at(2025, 1, day);
    f.pool.create_grant(terms, f.admin).unwrap()
}

#[test]
fn expired_grant_returns_unexercised_options_and_cancels_pending() {
    let f = fixture();
    f.clock.set(at(2024, 6, 1));
    let plan = f.plan(100_000);
    let grant = expiring(&f, &plan, 10_000, 1);
    f.exercise(&grant, 2_000);
    let pending = f
        .pool
        .create_exercise_request(grant.id, dec(500), f.grantee)
        .unwrap();
    let before = f.pool.store().read(|r| r.plan(plan.id)).unwrap().unwrap();

    f.clock.set(at(2025, 2, 1));
    assert_eq!(f.pool.expire_stale_grants().unwrap(), 1);

    let details = f.pool.find_grant(grant.id).unwrap();
    assert_eq!(details.grant.status, GrantStatus::Expired);
    assert_eq!(details.grant.exercised, dec(2_000));
    assert!(details.grant.vested_at_termination.is_some());
    assert_eq!(details.vesting.vested_quantity, dec(0));

    let after = f.pool.store().read(|r| r.plan(plan.id)).unwrap().unwrap();
    assert_eq!(before.total_granted - after.total_granted, dec(8_000));
    assert_eq!(after.total_exercised, dec(2_000));

    let pending = f.pool.find_exercise(pending.id).unwrap();
    assert_eq!(pending.status, ExerciseStatus::Cancelled);
    assert_eq!(pending.cancelled_at, Some(at(2025, 2, 1)));

    let expired = f.recorder.events(AuditAction::OptionGrantExpired);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].actor_type, ActorType::System);
    assert_eq!(expired[0].actor_id, None);
    assert_eq!(expired[0].metadata["quantityReturned"], "8000");
    assert_eq!(expired[0].metadata["cancelledExercises"], 1);

    let notifications = f.recorder.notifications.lock().unwrap();
    let last = notifications.last().unwrap();
    assert_eq!(last.kind, NotificationKind::OptionGrantExpired);
    assert_eq!(last.user_id, f.grantee);
}

#[test]
fn rerunning_the_sweep_is_a_no_op() {
    let f = fixture();
    f.clock.set(at(2024, 6, 1));
    let plan = f.plan(100_000);
    expiring(&f, &plan, 10_000, 1);
    f.clock.set(at(2025, 2, 1));

    assert_eq!(f.pool.expire_stale_grants().unwrap(), 1);
    let once = f.pool.store().read(|r| r.plan(plan.id)).unwrap().unwrap();
    assert_eq!(f.pool.expire_stale_grants().unwrap(), 0);
    let twice = f.pool.store().read(|r| r.plan(plan.id)).unwrap().unwrap();
    assert_eq!(once.total_granted, twice.total_granted);
    assert_eq!(f.recorder.events(AuditAction::OptionGrantExpired).len(), 1);
}

#[test]
fn grant_expiring_right_now_is_left_alone() {
    let f = fixture();
    f.clock.set(at(2024, 6, 1));
    let plan = f.plan(100_000);
    let grant = expiring(&f, &plan, 10_000, 1);

    f.clock.set(at(2025, 1, 1));
    assert_eq!(f.pool.expire_stale_grants().unwrap(), 0);
    let grant = f.pool.find_grant(grant.id).unwrap().grant;
    assert_eq!(grant.status, GrantStatus::Active);
}

#[test]
fn cancelled_and_exercised_grants_are_not_swept() {
    let f = fixture();
    f.clock.set(at(2024, 6, 1));
    let plan = f.plan(100_000);
    let cancelled = expiring(&f, &plan, 1_000, 1);
    f.pool.cancel_grant(cancelled.id, f.admin).unwrap();
    let exercised = expiring(&f, &plan, 1_000, 2);
    f.clock.set(at(2025, 1, 2));
    f.exercise(&exercised, 1_000);

    f.clock.set(at(2025, 2, 1));
    assert_eq!(f.pool.expire_stale_grants().unwrap(), 0);
}

#[test]
fn one_broken_grant_does_not_stop_the_batch() {
    let f = fixture();
    f.clock.set(at(2024, 6, 1));
    let plan = f.plan(100_000);
    let first = expiring(&f, &plan, 1_000, 1);
    let broken = expiring(&f, &plan, 1_000, 2);
    let last = expiring(&f, &plan, 1_000, 3);

    let conn = Connection::open(f.db_path()).unwrap();
    conn.execute(
        "UPDATE option_grants SET quantity = 'not-a-number' WHERE id = ?1",
        [broken.id.to_string()],
    )
    .unwrap();
    drop(conn);

    f.clock.set(at(2025, 2, 1));
    assert_eq!(f.pool.expire_stale_grants().unwrap(), 2);
    for id in [first.id, last.id] {
        assert_eq!(
            f.pool.find_grant(id).unwrap().grant.status,
            GrantStatus::Expired
        );
    }
    let status: String = Connection::open(f.db_path())
        .unwrap()
        .query_row(
            "SELECT status FROM option_grants WHERE id = ?1",
            [broken.id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "ACTIVE");
}

#[test]
fn sweep_processes_at_most_one_batch() {
    let settings = EngineSettings {
        sweep_batch_size: 2,
        ..EngineSettings::default()
    };
    let f = fixture_with(settings, at(2024, 6, 1));
    let plan = f.plan(100_000);
    for day in 1..=3 {
        expiring(&f, &plan, 1_000, day);
    }

    f.clock.set(at(2025, 2, 1));
    assert_eq!(f.pool.expire_stale_grants().unwrap(), 2);
    assert_eq!(f.pool.expire_stale_grants().unwrap(), 1);
    assert_eq!(f.pool.expire_stale_grants().unwrap(), 0);
    let expired = f
        .pool
        .list_grants(plan.id, Some(GrantStatus::Expired))
        .unwrap();
    assert_eq!(expired.len(), 3);
}
