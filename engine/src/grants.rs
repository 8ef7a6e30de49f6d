//! Grant issuance and lifecycle.
//!
//! A grant reserves its full quantity against the plan pool when issued.
//! Leaving ACTIVE by cancellation or expiry releases the unexercised
//! remainder; exercised options stay counted.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use optionpool_core::{ScheduleEntry, VestingSnapshot, calculate_vesting, generate_vesting_schedule};
use optionpool_store::{Reader, UnitOfWork};
use optionpool_types::{
    AuditAction, DomainError, Entity, GrantId, GrantStatus, NewGrant, OptionGrant, OptionPlan,
    PlanId, ResourceType, RuleViolation, UserId, is_valid_quantity, is_valid_strike_price,
    percentage,
};

use crate::error::{EngineError, EngineResult};
use crate::plans::load_plan;
use crate::{AuditRecord, OptionPool};

/// A grant together with its vesting evaluated at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantDetails {
    #[serde(flatten)]
    pub grant: OptionGrant,
    pub vesting: VestingSnapshot,
}

pub(crate) fn load_grant(reader: &Reader<'_>, grant_id: GrantId) -> EngineResult<OptionGrant> {
    reader
        .grant(grant_id)?
        .ok_or_else(|| DomainError::not_found(Entity::Grant, grant_id).into())
}

/// Write back a grant read earlier in the same unit of work.
pub(crate) fn save_grant(
    uow: &UnitOfWork<'_>,
    grant: &OptionGrant,
    expected: GrantStatus,
) -> EngineResult<()> {
    if uow.update_grant_if(grant, expected)? {
        Ok(())
    } else {
        Err(EngineError::Storage(anyhow!(
            "option grant {} left {expected} during update",
            grant.id
        )))
    }
}

/// Outcome of moving a grant out of ACTIVE.
pub(crate) struct Release {
    pub before: OptionGrant,
    pub grant: OptionGrant,
    pub plan: OptionPlan,
    pub released: Decimal,
    pub cancelled_exercises: usize,
}

/// Move an ACTIVE grant to `status` (CANCELLED or EXPIRED): snapshot its
/// vesting, return the unexercised remainder to the pool and cancel any
/// exercise awaiting payment.
///
/// `terminated_at` becomes `now`. An earlier employment termination date
/// survives only in `before` and in the audit trail.
pub(crate) fn release_grant(
    uow: &UnitOfWork<'_>,
    mut grant: OptionGrant,
    status: GrantStatus,
    now: DateTime<Utc>,
) -> EngineResult<Release> {
    let before = grant.clone();
    let vested = calculate_vesting(&grant, now).vested_quantity;

    grant.status = status;
    grant.terminated_at = Some(now);
    grant.vested_at_termination = Some(vested);
    save_grant(uow, &grant, GrantStatus::Active)?;

    let released = grant.unexercised();
    let plan = if released > Decimal::ZERO {
        uow.adjust_plan_totals(grant.plan_id, -released, Decimal::ZERO)?
    } else {
        load_plan(uow, grant.plan_id)?
    };
    let cancelled_exercises = uow.cancel_pending_exercises(grant.id, now)?;

    Ok(Release {
        before,
        grant,
        plan,
        released,
        cancelled_exercises,
    })
}

fn validate_terms(input: &NewGrant) -> Result<(), RuleViolation> {
    if !is_valid_quantity(input.quantity) {
        return Err(RuleViolation::InvalidQuantity(input.quantity));
    }
    if !is_valid_strike_price(input.strike_price) {
        return Err(RuleViolation::InvalidStrikePrice(input.strike_price));
    }
    if input.cliff_months > input.vesting_duration_months {
        return Err(RuleViolation::CliffExceedsVesting {
            cliff_months: input.cliff_months,
            vesting_duration_months: input.vesting_duration_months,
        });
    }
    if input.expiration_date <= input.grant_date {
        return Err(RuleViolation::InvalidExpiration);
    }
    Ok(())
}

impl OptionPool {
    pub fn create_grant(&self, input: NewGrant, actor: UserId) -> EngineResult<OptionGrant> {
        let plan = self.store.read(|r| r.plan(input.plan_id))?;
        let plan = plan.ok_or_else(|| DomainError::not_found(Entity::Plan, input.plan_id))?;
        if !plan.is_active() {
            return Err(RuleViolation::PlanClosed.into());
        }
        validate_terms(&input)?;
        if let Some(shareholder_id) = input.shareholder_id {
            match self.directory.shareholder_company(shareholder_id)? {
                None => {
                    return Err(DomainError::not_found(Entity::Shareholder, shareholder_id).into());
                }
                Some(owner) if owner != plan.company_id => {
                    return Err(RuleViolation::ShareholderMismatch.into());
                }
                Some(_) => {}
            }
        }

        let now = self.clock.now();
        let grant = OptionGrant {
            id: GrantId::new(),
            plan_id: input.plan_id,
            shareholder_id: input.shareholder_id,
            employee_name: input.employee_name,
            employee_email: input.employee_email,
            quantity: input.quantity.normalize(),
            strike_price: input.strike_price.normalize(),
            exercised: Decimal::ZERO,
            status: GrantStatus::Active,
            grant_date: input.grant_date,
            expiration_date: input.expiration_date,
            cliff_months: input.cliff_months,
            vesting_duration_months: input.vesting_duration_months,
            vesting_frequency: input.vesting_frequency,
            cliff_percentage: percentage(
                Decimal::from(input.cliff_months),
                Decimal::from(input.vesting_duration_months),
            ),
            acceleration_on_coc: input.acceleration_on_coc,
            terminated_at: None,
            vested_at_termination: None,
            created_at: now,
        };

        // The write lock is held from here to commit, so the availability
        // check below cannot interleave with another issuance.
        self.store.write(|uow| -> EngineResult<()> {
            let plan = load_plan(uow, grant.plan_id)?;
            if !plan.is_active() {
                return Err(RuleViolation::PlanClosed.into());
            }
            let usage = uow.pool_usage(plan.id)?;
            let available = (plan.total_pool_size - usage.granted).max(Decimal::ZERO);
            if grant.quantity > available {
                return Err(RuleViolation::PoolExhausted {
                    available,
                    requested: grant.quantity,
                }
                .into());
            }
            uow.insert_grant(&grant)?;
            uow.adjust_plan_totals(plan.id, grant.quantity, Decimal::ZERO)?;
            Ok(())
        })?;

        info!(
            grant_id = %grant.id,
            plan_id = %grant.plan_id,
            quantity = %grant.quantity,
            "Issued option grant"
        );
        self.audit(
            AuditRecord::new(
                AuditAction::OptionGrantCreated,
                Some(actor),
                plan.company_id,
                ResourceType::OptionGrant,
                grant.id,
            )
            .after(&grant)
            .at(now),
        );
        Ok(grant)
    }

    pub fn cancel_grant(&self, grant_id: GrantId, actor: UserId) -> EngineResult<OptionGrant> {
        let now = self.clock.now();
        let release = self.store.write(|uow| -> EngineResult<Release> {
            let grant = load_grant(uow, grant_id)?;
            match grant.status {
                GrantStatus::Active => {}
                GrantStatus::Cancelled => return Err(RuleViolation::GrantAlreadyCancelled.into()),
                GrantStatus::Exercised => return Err(RuleViolation::GrantAlreadyExercised.into()),
                GrantStatus::Expired => {
                    return Err(RuleViolation::GrantNotActive(GrantStatus::Expired).into());
                }
            }
            release_grant(uow, grant, GrantStatus::Cancelled, now)
        })?;

        info!(
            %grant_id,
            released = %release.released,
            cancelled_exercises = release.cancelled_exercises,
            "Cancelled option grant"
        );
        self.audit(
            AuditRecord::new(
                AuditAction::OptionGrantCancelled,
                Some(actor),
                release.plan.company_id,
                ResourceType::OptionGrant,
                grant_id,
            )
            .before(&json!({
                "status": release.before.status,
                "terminatedAt": release.before.terminated_at,
            }))
            .after(&json!({
                "status": release.grant.status,
                "terminatedAt": release.grant.terminated_at,
            }))
            .metadata(json!({
                "quantityReturned": release.released.normalize().to_string(),
                "vestedAtTermination": release
                    .grant
                    .vested_at_termination
                    .map(|v| v.normalize().to_string()),
                "cancelledExercises": release.cancelled_exercises,
            }))
            .at(now),
        );
        Ok(release.grant)
    }

    /// Record the grantee's employment ending. The grant stays ACTIVE,
    /// vesting freezes at `terminated_at`, and the plan's exercise window
    /// starts running.
    pub fn terminate_grant(
        &self,
        grant_id: GrantId,
        terminated_at: DateTime<Utc>,
        actor: UserId,
    ) -> EngineResult<OptionGrant> {
        let now = self.clock.now();
        let (grant, plan) = self.store.write(|uow| -> EngineResult<_> {
            let mut grant = load_grant(uow, grant_id)?;
            if grant.status != GrantStatus::Active {
                return Err(RuleViolation::GrantNotActive(grant.status).into());
            }
            if grant.terminated_at.is_some() {
                return Err(RuleViolation::GrantAlreadyTerminated.into());
            }
            let plan = load_plan(uow, grant.plan_id)?;
            grant.terminated_at = Some(terminated_at);
            save_grant(uow, &grant, GrantStatus::Active)?;
            Ok((grant, plan))
        })?;

        let window_closes =
            terminated_at + chrono::Duration::days(i64::from(plan.exercise_window_days));
        info!(%grant_id, %terminated_at, %window_closes, "Recorded grantee termination");
        self.audit(
            AuditRecord::new(
                AuditAction::OptionGrantTerminated,
                Some(actor),
                plan.company_id,
                ResourceType::OptionGrant,
                grant_id,
            )
            .after(&json!({ "terminatedAt": terminated_at }))
            .metadata(json!({
                "exerciseWindowClosesAt": window_closes,
                "vestedQuantity": calculate_vesting(&grant, now).vested_quantity.to_string(),
            }))
            .at(now),
        );
        Ok(grant)
    }

    pub fn find_grant(&self, grant_id: GrantId) -> EngineResult<GrantDetails> {
        debug!(%grant_id, "Loading option grant");
        let grant = self.store.read(|r| r.grant(grant_id))?;
        let grant = grant.ok_or_else(|| DomainError::not_found(Entity::Grant, grant_id))?;
        Ok(self.with_vesting(grant))
    }

    pub fn list_grants(
        &self,
        plan_id: PlanId,
        status: Option<GrantStatus>,
    ) -> EngineResult<Vec<GrantDetails>> {
        let grants = self.store.read(|r| {
            if r.plan(plan_id)?.is_none() {
                return Ok(None);
            }
            r.grants_for_plan(plan_id, status).map(Some)
        })?;
        let grants = grants.ok_or_else(|| DomainError::not_found(Entity::Plan, plan_id))?;
        Ok(grants.into_iter().map(|g| self.with_vesting(g)).collect())
    }

    pub fn vesting_schedule(&self, grant_id: GrantId) -> EngineResult<Vec<ScheduleEntry>> {
        let grant = self.store.read(|r| r.grant(grant_id))?;
        let grant = grant.ok_or_else(|| DomainError::not_found(Entity::Grant, grant_id))?;
        Ok(generate_vesting_schedule(&grant))
    }

    fn with_vesting(&self, grant: OptionGrant) -> GrantDetails {
        let vesting = calculate_vesting(&grant, self.clock.now());
        GrantDetails { grant, vesting }
    }
}
