//! End-to-end walks through the plan, grant and exercise lifecycle.

use regex::Regex;
use rust_decimal::Decimal;

use optionpool_types::{
    AuditAction, ExerciseStatus, GrantStatus, NotificationKind, RuleViolation,
};

use crate::common::{at, dec, fixture, rule};

#[test]
fn fully_vested_after_five_years() {
    let f = fixture();
    f.clock.set(at(2026, 1, 1));
    let plan = f.plan(100_000);
    let grant = f.grant(&plan, 48_000);

    let vesting = f.pool.find_grant(grant.id).unwrap().vesting;
    assert_eq!(vesting.vested_quantity.normalize().to_string(), "48000");
    assert_eq!(vesting.vesting_percentage.to_string(), "100.00");
    assert_eq!(vesting.next_vesting_date, None);
    assert_eq!(vesting.exercisable_quantity, dec(48_000));
}

#[test]
fn thirteen_months_in_is_past_the_cliff() {
    let f = fixture();
    f.clock.set(at(2026, 2, 1));
    let plan = f.plan(100_000);
    let mut terms = f.terms(&plan, 48_000);
    terms.grant_date = at(2025, 1, 1);
    terms.expiration_date = at(2035, 1, 1);
    let grant = f.pool.create_grant(terms, f.admin).unwrap();

    let vesting = f.pool.find_grant(grant.id).unwrap().vesting;
    assert!(vesting.cliff_met);
    assert!(vesting.vested_quantity >= dec(12_000));
    assert!(vesting.vested_quantity <= dec(14_000));
    assert_eq!(vesting.cliff_date, at(2026, 1, 1));
}

#[test]
fn exhausted_pool_reports_what_is_left() {
    let f = fixture();
    let plan = f.plan(100_000);
    let cancelled = f.grant(&plan, 20_000);
    f.pool.cancel_grant(cancelled.id, f.admin).unwrap();
    f.grant(&plan, 50_000);
    f.grant(&plan, 45_000);

    let err = f
        .pool
        .create_grant(f.terms(&plan, 10_000), f.admin)
        .unwrap_err();
    let violation = rule(err);
    assert_eq!(
        violation,
        RuleViolation::PoolExhausted {
            available: dec(5_000),
            requested: dec(10_000),
        }
    );
    assert_eq!(violation.details()["optionsAvailable"], "5000");
    assert_eq!(f.live_granted(&plan), dec(95_000));

    // Exactly what is left still fits.
    f.grant(&plan, 5_000);
    let summary = f.pool.find_plan(plan.id).unwrap();
    assert_eq!(summary.options_available, Decimal::ZERO);
    assert_eq!(summary.grant_count, 3);
}

#[test]
fn cancelling_returns_only_the_unexercised_remainder() {
    let f = fixture();
    let plan = f.plan(100_000);
    let grant = f.grant(&plan, 10_000);
    f.exercise(&grant, 8_000);

    let before = f.pool.store().read(|r| r.plan(plan.id)).unwrap().unwrap();
    let cancelled = f.pool.cancel_grant(grant.id, f.admin).unwrap();
    let after = f.pool.store().read(|r| r.plan(plan.id)).unwrap().unwrap();

    assert_eq!(cancelled.status, GrantStatus::Cancelled);
    assert_eq!(before.total_granted - after.total_granted, dec(2_000));
    assert_eq!(after.total_exercised, dec(8_000));

    let err = f.pool.cancel_grant(grant.id, f.admin).unwrap_err();
    assert_eq!(rule(err), RuleViolation::GrantAlreadyCancelled);
}

#[test]
fn exercise_cost_is_exact_and_reference_is_well_formed() {
    let f = fixture();
    let plan = f.plan(100_000);
    let grant = f.grant(&plan, 10_000);

    let request = f
        .pool
        .create_exercise_request(grant.id, dec(2_000), f.grantee)
        .unwrap();
    assert_eq!(request.total_cost.to_string(), "10000");
    assert_eq!(request.status, ExerciseStatus::PendingPayment);
    let shape = Regex::new(r"^EX-\d{4}-[A-F0-9]{6}$").unwrap();
    assert!(
        shape.is_match(&request.payment_reference),
        "unexpected reference {}",
        request.payment_reference
    );
    assert!(request.payment_reference.starts_with("EX-2025-"));

    let err = f
        .pool
        .create_exercise_request(grant.id, dec(1), f.grantee)
        .unwrap_err();
    assert_eq!(rule(err), RuleViolation::PendingExerciseExists);
}

#[test]
fn confirmed_exercise_issues_shares_and_notifies_grantee() {
    let f = fixture();
    let plan = f.plan(100_000);
    let grant = f.grant(&plan, 10_000);
    let request = f
        .pool
        .create_exercise_request(grant.id, dec(2_500), f.grantee)
        .unwrap();
    f.pool
        .confirm_exercise_payment(request.id, f.admin)
        .unwrap();

    let grant = f.pool.find_grant(grant.id).unwrap().grant;
    assert_eq!(grant.exercised, dec(2_500));
    assert_eq!(grant.status, GrantStatus::Active);

    let (holding, class) = f
        .pool
        .store()
        .read(|r| Ok((r.holding(f.shareholder, f.class)?, r.share_class(f.class)?)))
        .unwrap();
    assert_eq!(holding, Some(dec(2_500)));
    assert_eq!(class.unwrap().total_issued, dec(2_500));

    assert_eq!(*f.recorder.recalculations.lock().unwrap(), vec![f.company]);
    let snapshots = f.recorder.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].1, "option_exercise");
    let notifications = f.recorder.notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::OptionExerciseConfirmed);
    assert_eq!(notifications[0].user_id, f.grantee);

    assert_eq!(
        f.recorder.actions(),
        vec![
            AuditAction::OptionPlanCreated,
            AuditAction::OptionGrantCreated,
            AuditAction::OptionExerciseRequested,
            AuditAction::OptionExerciseConfirmed,
        ]
    );
}

#[test]
fn exercising_everything_closes_the_grant() {
    let f = fixture();
    let plan = f.plan(100_000);
    let grant = f.grant(&plan, 4_800);
    f.exercise(&grant, 1_800);
    f.exercise(&grant, 3_000);

    let grant = f.pool.find_grant(grant.id).unwrap().grant;
    assert_eq!(grant.status, GrantStatus::Exercised);
    let history = f.pool.list_exercises(grant.id).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.status == ExerciseStatus::Completed));

    let err = f
        .pool
        .create_exercise_request(grant.id, dec(1), f.grantee)
        .unwrap_err();
    assert_eq!(
        rule(err),
        RuleViolation::GrantNotActive(GrantStatus::Exercised)
    );
}

#[test]
fn cancelled_exercise_frees_the_grant_for_another_request() {
    let f = fixture();
    let plan = f.plan(100_000);
    let grant = f.grant(&plan, 4_800);
    let first = f
        .pool
        .create_exercise_request(grant.id, dec(100), f.grantee)
        .unwrap();
    let cancelled = f.pool.cancel_exercise(first.id, f.grantee).unwrap();
    assert_eq!(cancelled.status, ExerciseStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    let err = f.pool.cancel_exercise(first.id, f.grantee).unwrap_err();
    assert_eq!(rule(err), RuleViolation::ExerciseAlreadyCancelled);
    let err = f
        .pool
        .confirm_exercise_payment(first.id, f.admin)
        .unwrap_err();
    assert_eq!(rule(err), RuleViolation::ExerciseAlreadyCancelled);

    let second = f
        .pool
        .create_exercise_request(grant.id, dec(200), f.grantee)
        .unwrap();
    assert_ne!(second.payment_reference, first.payment_reference);
}

#[test]
fn terminated_grantee_exercises_within_the_window_only() {
    let f = fixture();
    let plan = f.plan(100_000);
    let grant = f.grant(&plan, 4_800);

    let terminated = f
        .pool
        .terminate_grant(grant.id, at(2022, 7, 1), f.admin)
        .unwrap();
    assert_eq!(terminated.terminated_at, Some(at(2022, 7, 1)));

    // 18 months in: 1200 at the cliff plus six monthly 100s.
    f.clock.set(at(2022, 8, 1));
    let vesting = f.pool.find_grant(grant.id).unwrap().vesting;
    assert_eq!(vesting.vested_quantity, dec(1_800));
    let err = f
        .pool
        .create_exercise_request(grant.id, dec(1_801), f.grantee)
        .unwrap_err();
    assert!(matches!(rule(err), RuleViolation::InsufficientVested { .. }));
    f.exercise(&grant, 1_800);

    f.clock.set(at(2022, 10, 1));
    let err = f
        .pool
        .create_exercise_request(grant.id, dec(1), f.grantee)
        .unwrap_err();
    assert!(matches!(
        rule(err),
        RuleViolation::ExerciseWindowClosed { .. }
    ));
}

#[test]
fn plans_and_grants_list_with_live_totals() {
    let f = fixture();
    let plan = f.plan(10_000);
    let keep = f.grant(&plan, 3_000);
    let dropped = f.grant(&plan, 2_000);
    f.pool.cancel_grant(dropped.id, f.admin).unwrap();

    let summaries = f.pool.list_plans(f.company).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].plan.total_granted, dec(3_000));
    assert_eq!(summaries[0].options_available, dec(7_000));
    assert_eq!(summaries[0].grant_count, 1);

    let active = f
        .pool
        .list_grants(plan.id, Some(GrantStatus::Active))
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].grant.id, keep.id);
    assert_eq!(f.pool.list_grants(plan.id, None).unwrap().len(), 2);
}
