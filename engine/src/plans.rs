//! Plan Registry: owns each plan's pool ceiling.

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info};

use optionpool_store::{PoolUsage, Reader};
use optionpool_types::{
    AuditAction, CompanyId, DomainError, Entity, NewPlan, OptionPlan, PlanId, PlanStatus,
    PlanSummary, PlanUpdate, ResourceType, RuleViolation, UserId, is_valid_quantity,
};

use crate::error::EngineResult;
use crate::{AuditRecord, OptionPool};

/// Plan with totals replaced by live aggregates over non-cancelled grants.
fn summarize(plan: OptionPlan, usage: PoolUsage) -> PlanSummary {
    let options_available = (plan.total_pool_size - usage.granted)
        .max(Decimal::ZERO)
        .normalize();
    PlanSummary {
        plan: OptionPlan {
            total_granted: usage.granted.normalize(),
            total_exercised: usage.exercised.normalize(),
            ..plan
        },
        options_available,
        grant_count: usage.grant_count,
    }
}

pub(crate) fn load_plan(reader: &Reader<'_>, plan_id: PlanId) -> EngineResult<OptionPlan> {
    reader
        .plan(plan_id)?
        .ok_or_else(|| DomainError::not_found(Entity::Plan, plan_id).into())
}

impl OptionPool {
    pub fn create_plan(&self, input: NewPlan, actor: UserId) -> EngineResult<OptionPlan> {
        match self.directory.company_is_active(input.company_id)? {
            None => return Err(DomainError::not_found(Entity::Company, input.company_id).into()),
            Some(false) => return Err(RuleViolation::CompanyNotActive.into()),
            Some(true) => {}
        }
        match self.directory.share_class_company(input.share_class_id)? {
            None => {
                return Err(DomainError::not_found(Entity::ShareClass, input.share_class_id).into());
            }
            Some(owner) if owner != input.company_id => {
                return Err(RuleViolation::ShareClassMismatch.into());
            }
            Some(_) => {}
        }
        if !is_valid_quantity(input.total_pool_size) {
            return Err(RuleViolation::InvalidPoolSize {
                requested: input.total_pool_size,
                granted: Decimal::ZERO,
            }
            .into());
        }

        let now = self.clock.now();
        let plan = OptionPlan {
            id: PlanId::new(),
            company_id: input.company_id,
            share_class_id: input.share_class_id,
            name: input.name,
            total_pool_size: input.total_pool_size.normalize(),
            total_granted: Decimal::ZERO,
            total_exercised: Decimal::ZERO,
            status: PlanStatus::Active,
            termination_policy: input.termination_policy,
            exercise_window_days: input
                .exercise_window_days
                .unwrap_or(self.settings.default_exercise_window_days),
            board_approval_date: input.board_approval_date,
            created_at: now,
            closed_at: None,
        };
        self.store.write(|uow| uow.insert_plan(&plan))?;

        info!(plan_id = %plan.id, pool_size = %plan.total_pool_size, "Created option plan");
        self.audit(
            AuditRecord::new(
                AuditAction::OptionPlanCreated,
                Some(actor),
                plan.company_id,
                ResourceType::OptionPlan,
                plan.id,
            )
            .after(&plan)
            .at(now),
        );
        Ok(plan)
    }

    pub fn update_plan(
        &self,
        plan_id: PlanId,
        update: PlanUpdate,
        actor: UserId,
    ) -> EngineResult<OptionPlan> {
        let now = self.clock.now();
        let (before, after) = self.store.write(|uow| -> EngineResult<_> {
            let before = load_plan(uow, plan_id)?;
            if !before.is_active() {
                return Err(RuleViolation::PlanClosed.into());
            }

            let mut after = before.clone();
            if let Some(size) = update.total_pool_size {
                let granted = uow.pool_usage(plan_id)?.granted;
                if !is_valid_quantity(size) || size < granted {
                    return Err(RuleViolation::InvalidPoolSize {
                        requested: size,
                        granted,
                    }
                    .into());
                }
                after.total_pool_size = size.normalize();
            }
            if let Some(name) = update.name {
                after.name = name;
            }
            if let Some(policy) = update.termination_policy {
                after.termination_policy = policy;
            }
            if let Some(days) = update.exercise_window_days {
                after.exercise_window_days = days;
            }
            if let Some(date) = update.board_approval_date {
                after.board_approval_date = Some(date);
            }
            uow.update_plan(&after)?;
            Ok((before, after))
        })?;

        info!(%plan_id, pool_size = %after.total_pool_size, "Updated option plan");
        self.audit(
            AuditRecord::new(
                AuditAction::OptionPlanUpdated,
                Some(actor),
                after.company_id,
                ResourceType::OptionPlan,
                plan_id,
            )
            .before(&before)
            .after(&after)
            .at(now),
        );
        Ok(after)
    }

    pub fn close_plan(&self, plan_id: PlanId, actor: UserId) -> EngineResult<OptionPlan> {
        let now = self.clock.now();
        let plan = self.store.write(|uow| -> EngineResult<_> {
            let mut plan = load_plan(uow, plan_id)?;
            if plan.status == PlanStatus::Closed {
                return Err(RuleViolation::PlanAlreadyClosed.into());
            }
            plan.status = PlanStatus::Closed;
            plan.closed_at = Some(now);
            uow.update_plan(&plan)?;
            Ok(plan)
        })?;

        info!(%plan_id, "Closed option plan");
        self.audit(
            AuditRecord::new(
                AuditAction::OptionPlanClosed,
                Some(actor),
                plan.company_id,
                ResourceType::OptionPlan,
                plan_id,
            )
            .metadata(json!({ "previousStatus": PlanStatus::Active.as_str() }))
            .after(&plan)
            .at(now),
        );
        Ok(plan)
    }

    /// Plan with totals derived from its live grants.
    pub fn find_plan(&self, plan_id: PlanId) -> EngineResult<PlanSummary> {
        debug!(%plan_id, "Loading option plan");
        self.store.read(|r| {
            let plan = r.plan(plan_id)?;
            let usage = r.pool_usage(plan_id)?;
            Ok(plan.map(|plan| summarize(plan, usage)))
        })?
        .ok_or_else(|| DomainError::not_found(Entity::Plan, plan_id).into())
    }

    pub fn list_plans(&self, company_id: CompanyId) -> EngineResult<Vec<PlanSummary>> {
        if self.directory.company_is_active(company_id)?.is_none() {
            return Err(DomainError::not_found(Entity::Company, company_id).into());
        }
        let summaries = self.store.read(|r| {
            r.plans_for_company(company_id)?
                .into_iter()
                .map(|plan| {
                    let usage = r.pool_usage(plan.id)?;
                    Ok(summarize(plan, usage))
                })
                .collect::<anyhow::Result<Vec<_>>>()
        })?;
        Ok(summaries)
    }
}
