//! Time-based vesting math.
//!
//! Pure functions of a grant and an instant. A grant vests nothing before its
//! cliff, `quantity × cliff / duration` at the cliff, then equal tranches every
//! period until the vesting end date, where it is fully vested. Vested
//! quantities are floored to whole options; the schedule's last entry absorbs
//! whatever the flooring left behind so the schedule always sums to
//! `quantity` exactly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optionpool_types::{GrantStatus, OptionGrant, percentage};

use crate::calendar::{add_months, whole_months_between};

/// Point-in-time view of a grant's vesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingSnapshot {
    pub vested_quantity: Decimal,
    pub unvested_quantity: Decimal,
    pub exercisable_quantity: Decimal,
    pub vesting_percentage: Decimal,
    pub cliff_date: DateTime<Utc>,
    pub cliff_met: bool,
    pub vesting_end_date: DateTime<Utc>,
    pub next_vesting_date: Option<DateTime<Utc>>,
    pub next_vesting_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleEntryKind {
    Cliff,
    Vesting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub date: DateTime<Utc>,
    pub quantity: Decimal,
    pub cumulative: Decimal,
    #[serde(rename = "type")]
    pub kind: ScheduleEntryKind,
}

/// Derived constants of a grant's vesting curve.
#[derive(Debug, Clone, Copy)]
struct Curve {
    quantity: Decimal,
    cliff_months: u32,
    duration_months: u32,
    period_months: u32,
    post_cliff_periods: u32,
    grant_date: DateTime<Utc>,
    cliff_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl Curve {
    fn of(grant: &OptionGrant) -> Self {
        let period_months = grant.vesting_frequency.period_months();
        let duration_months = grant.vesting_duration_months;
        let cliff_months = grant.cliff_months.min(duration_months);
        Self {
            quantity: grant.quantity,
            cliff_months,
            duration_months,
            period_months,
            post_cliff_periods: (duration_months - cliff_months) / period_months,
            grant_date: grant.grant_date,
            cliff_date: add_months(grant.grant_date, cliff_months),
            end_date: add_months(grant.grant_date, duration_months),
        }
    }

    /// Unfloored quantity that vests at the cliff.
    fn cliff_amount(&self) -> Decimal {
        if self.duration_months == 0 {
            return Decimal::ZERO;
        }
        scaled(
            self.quantity,
            u64::from(self.cliff_months),
            u64::from(self.duration_months),
        )
    }

    /// Whole options vested once `periods` post-cliff periods have elapsed.
    ///
    /// Evaluated as one exact fraction,
    /// `q × (c·n + (d − c)·p) / (d·n)`, rather than by accumulating a rounded
    /// per-period amount, so whole-number results never floor one short.
    fn vested_after(&self, periods: u32) -> Decimal {
        if self.duration_months == 0 {
            return self.quantity;
        }
        let periods = periods.min(self.post_cliff_periods);
        let vested = if self.post_cliff_periods == 0 {
            self.cliff_amount()
        } else {
            let n = u64::from(self.post_cliff_periods);
            let c = u64::from(self.cliff_months);
            let d = u64::from(self.duration_months);
            let numerator = c * n + (d - c) * u64::from(periods);
            scaled(self.quantity, numerator, d * n)
        };
        vested.min(self.quantity).floor()
    }

    fn period_date(&self, period: u32) -> DateTime<Utc> {
        add_months(self.cliff_date, period * self.period_months)
    }
}

/// `quantity × numerator / denominator` for `numerator <= denominator`.
///
/// Falls back to dividing first when the product leaves `Decimal`'s range,
/// trading the last few digits of precision for a result instead of a panic.
fn scaled(quantity: Decimal, numerator: u64, denominator: u64) -> Decimal {
    let (numerator, denominator) = (Decimal::from(numerator), Decimal::from(denominator));
    quantity.checked_mul(numerator).map_or_else(
        || quantity / denominator * numerator,
        |product| product / denominator,
    )
}

/// Vesting state of `grant` at `now`.
///
/// Exercised grants report fully vested; cancelled and expired grants report
/// nothing vested. An active grant whose holder was terminated stops vesting
/// at `terminated_at`.
#[must_use]
pub fn calculate_vesting(grant: &OptionGrant, now: DateTime<Utc>) -> VestingSnapshot {
    let curve = Curve::of(grant);
    let quantity = grant.quantity;

    let snapshot = |vested: Decimal, cliff_met: bool, next: Option<(DateTime<Utc>, Decimal)>| {
        VestingSnapshot {
            vested_quantity: vested,
            unvested_quantity: (quantity - vested).max(Decimal::ZERO),
            exercisable_quantity: (vested - grant.exercised).max(Decimal::ZERO),
            vesting_percentage: percentage(vested, quantity),
            cliff_date: curve.cliff_date,
            cliff_met,
            vesting_end_date: curve.end_date,
            next_vesting_date: next.map(|(date, _)| date),
            next_vesting_amount: next.map_or(Decimal::ZERO, |(_, amount)| amount),
        }
    };

    match grant.status {
        GrantStatus::Exercised => return snapshot(quantity, true, None),
        GrantStatus::Cancelled | GrantStatus::Expired => {
            let mut zero = snapshot(Decimal::ZERO, false, None);
            zero.unvested_quantity = Decimal::ZERO;
            return zero;
        }
        GrantStatus::Active => {}
    }

    let frozen = grant.terminated_at.is_some_and(|at| at <= now);
    let as_of = grant.terminated_at.map_or(now, |at| at.min(now));

    if as_of >= curve.end_date {
        return snapshot(quantity, true, None);
    }

    if as_of < curve.cliff_date {
        let next = (!frozen).then(|| {
            let amount = if curve.duration_months == 0 {
                quantity
            } else {
                curve.cliff_amount().floor()
            };
            (curve.cliff_date, amount)
        });
        return snapshot(Decimal::ZERO, false, next);
    }

    let periods = whole_months_between(curve.cliff_date, as_of) / curve.period_months;
    let vested = curve.vested_after(periods);
    let next = if frozen {
        None
    } else {
        let next_date = curve.period_date(periods + 1);
        (next_date <= curve.end_date)
            .then(|| (next_date, curve.vested_after(periods + 1) - vested))
    };
    snapshot(vested, true, next)
}

/// Full ordered vesting timetable for `grant`.
///
/// Deterministic in the grant's terms alone; status, exercises and
/// termination do not change the schedule.
#[must_use]
pub fn generate_vesting_schedule(grant: &OptionGrant) -> Vec<ScheduleEntry> {
    let curve = Curve::of(grant);
    let quantity = grant.quantity;
    let mut entries = Vec::with_capacity(curve.post_cliff_periods as usize + 2);
    let mut cumulative = Decimal::ZERO;

    if curve.duration_months == 0 {
        entries.push(ScheduleEntry {
            date: curve.grant_date,
            quantity,
            cumulative: quantity,
            kind: ScheduleEntryKind::Vesting,
        });
        return entries;
    }

    if curve.cliff_months > 0 {
        cumulative = curve.vested_after(0);
        entries.push(ScheduleEntry {
            date: curve.cliff_date,
            quantity: cumulative,
            cumulative,
            kind: ScheduleEntryKind::Cliff,
        });
    }

    for period in 1..=curve.post_cliff_periods {
        let target = if period == curve.post_cliff_periods {
            quantity
        } else {
            curve.vested_after(period)
        };
        entries.push(ScheduleEntry {
            date: curve.period_date(period),
            quantity: target - cumulative,
            cumulative: target,
            kind: ScheduleEntryKind::Vesting,
        });
        cumulative = target;
    }

    // Durations shorter than one period after the cliff vest the rest at the end date.
    if cumulative < quantity {
        entries.push(ScheduleEntry {
            date: curve.end_date,
            quantity: quantity - cumulative,
            cumulative: quantity,
            kind: ScheduleEntryKind::Vesting,
        });
    }

    entries
}
