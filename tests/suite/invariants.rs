//! Properties that hold for every plan and grant, checked over sweeps of
//! inputs rather than single examples.

use chrono::{Duration, Months};
use rust_decimal::Decimal;

use optionpool_core::{ScheduleEntryKind, calculate_vesting, generate_vesting_schedule};
use optionpool_types::{GrantStatus, OptionGrant, RuleViolation, VestingFrequency};

use crate::common::{Fixture, at, dec, fixture, rule};

fn grant_with(
    f: &Fixture,
    quantity: i64,
    cliff_months: u32,
    duration_months: u32,
    frequency: VestingFrequency,
) -> OptionGrant {
    let plan = f.plan(1_000_000);
    let mut terms = f.terms(&plan, quantity);
    terms.cliff_months = cliff_months;
    terms.vesting_duration_months = duration_months;
    terms.vesting_frequency = frequency;
    f.pool.create_grant(terms, f.admin).unwrap()
}

#[test]
fn granted_never_exceeds_pool_size() {
    let f = fixture();
    let plan = f.plan(10_000);
    let size = dec(10_000);
    let mut issued = Vec::new();

    let requests = [3_000, 4_000, 2_500, 1_000, 600, 500, 4_000, 100];
    for (step, quantity) in requests.into_iter().enumerate() {
        match f.pool.create_grant(f.terms(&plan, quantity), f.admin) {
            Ok(grant) => issued.push(grant),
            Err(err) => assert!(matches!(rule(err), RuleViolation::PoolExhausted { .. })),
        }
        // Every third step hands a grant back to the pool.
        if step % 3 == 2
            && let Some(grant) = issued.pop()
        {
            f.pool.cancel_grant(grant.id, f.admin).unwrap();
        }
        assert!(
            f.live_granted(&plan) <= size,
            "pool overcommitted after step {step}"
        );
    }

    let grants = f.pool.list_grants(plan.id, None).unwrap();
    let live: Decimal = grants
        .iter()
        .filter(|d| d.grant.status != GrantStatus::Cancelled)
        .map(|d| d.grant.quantity)
        .sum();
    assert!(live <= size);
    assert_eq!(live, f.live_granted(&plan));
}

#[test]
fn exercised_stays_within_quantity() {
    let f = fixture();
    let plan = f.plan(10_000);
    let grant = f.grant(&plan, 1_000);
    f.exercise(&grant, 999);

    let err = f
        .pool
        .create_exercise_request(grant.id, dec(2), f.grantee)
        .unwrap_err();
    assert!(matches!(rule(err), RuleViolation::InsufficientVested { .. }));
    f.exercise(&grant, 1);

    let grant = f.pool.find_grant(grant.id).unwrap().grant;
    assert_eq!(grant.exercised, grant.quantity);
    assert!(grant.exercised >= Decimal::ZERO);
}

#[test]
fn vested_quantity_never_decreases() {
    let f = fixture();
    for frequency in [
        VestingFrequency::Monthly,
        VestingFrequency::Quarterly,
        VestingFrequency::Annually,
    ] {
        let grant = grant_with(&f, 10_007, 12, 48, frequency);
        let mut previous = Decimal::ZERO;
        let mut t = grant.grant_date - Duration::days(30);
        let end = grant.grant_date + Duration::days(365 * 5);
        while t <= end {
            let vested = calculate_vesting(&grant, t).vested_quantity;
            assert!(
                vested >= previous,
                "{frequency:?}: vested fell from {previous} to {vested} at {t}"
            );
            assert!(vested <= grant.quantity);
            previous = vested;
            t += Duration::days(5);
        }
        assert_eq!(previous, grant.quantity);
    }
}

#[test]
fn schedule_is_deterministic() {
    let f = fixture();
    let grant = grant_with(&f, 10_007, 12, 48, VestingFrequency::Quarterly);
    let first = generate_vesting_schedule(&grant);
    let second = generate_vesting_schedule(&grant);
    assert_eq!(first, second);
    assert_eq!(f.pool.vesting_schedule(grant.id).unwrap(), first);
}

#[test]
fn schedule_ends_at_full_quantity_with_uneven_division() {
    let f = fixture();
    for (quantity, cliff, duration, frequency) in [
        (10_007, 12, 48, VestingFrequency::Monthly),
        (10_007, 12, 48, VestingFrequency::Quarterly),
        (1_001, 0, 36, VestingFrequency::Monthly),
        (997, 7, 50, VestingFrequency::Quarterly),
        (5, 12, 60, VestingFrequency::Monthly),
        (48_001, 12, 48, VestingFrequency::Annually),
    ] {
        let grant = grant_with(&f, quantity, cliff, duration, frequency);
        let schedule = generate_vesting_schedule(&grant);
        let last = schedule.last().unwrap();
        assert_eq!(
            last.cumulative,
            dec(quantity),
            "{quantity} over {duration} months {frequency:?}"
        );
        let total: Decimal = schedule.iter().map(|e| e.quantity).sum();
        assert_eq!(total, dec(quantity));
        assert!(schedule.windows(2).all(|w| w[0].date < w[1].date));
        assert!(schedule.iter().all(|e| e.quantity.fract().is_zero()));
        if cliff > 0 {
            assert_eq!(schedule[0].kind, ScheduleEntryKind::Cliff);
        }
    }
}

#[test]
fn cliff_and_end_dates_are_exact_boundaries() {
    let f = fixture();
    let grant = grant_with(&f, 48_000, 12, 48, VestingFrequency::Monthly);
    let cliff_date = grant.grant_date + Months::new(12);
    let end_date = grant.grant_date + Months::new(48);

    let before = calculate_vesting(&grant, cliff_date - Duration::seconds(1));
    assert!(!before.cliff_met);
    assert_eq!(before.vested_quantity, Decimal::ZERO);
    assert_eq!(before.next_vesting_date, Some(cliff_date));
    assert_eq!(before.next_vesting_amount, dec(12_000));

    let at_cliff = calculate_vesting(&grant, cliff_date);
    assert!(at_cliff.cliff_met);
    assert_eq!(at_cliff.cliff_date, cliff_date);
    assert_eq!(at_cliff.vested_quantity, dec(12_000));

    let at_end = calculate_vesting(&grant, end_date);
    assert_eq!(at_end.vesting_end_date, end_date);
    assert_eq!(at_end.vested_quantity, dec(48_000));
    assert_eq!(at_end.vesting_percentage.to_string(), "100.00");
    assert_eq!(at_end.next_vesting_date, None);
}

#[test]
fn vesting_before_grant_date_is_zero() {
    let f = fixture();
    let grant = grant_with(&f, 4_800, 12, 48, VestingFrequency::Monthly);
    let snapshot = calculate_vesting(&grant, at(2020, 1, 1));
    assert_eq!(snapshot.vested_quantity, Decimal::ZERO);
    assert_eq!(snapshot.unvested_quantity, dec(4_800));
    assert_eq!(snapshot.vesting_percentage.to_string(), "0.00");
}
