use anyhow::{Context, Result, bail};
use rusqlite::{OptionalExtension, Row, params};
use rust_decimal::Decimal;

use optionpool_types::{CompanyId, GrantStatus, OptionPlan, PlanId};

use crate::sqlite_util::{
    decimal_col, decimal_to_sql, opt_time_col, opt_time_to_sql, parsed_col, time_col, time_to_sql,
};
use crate::store::{Reader, UnitOfWork};

const PLAN_COLUMNS: &str = "id, company_id, share_class_id, name, total_pool_size, total_granted,
    total_exercised, status, termination_policy, exercise_window_days, board_approval_date,
    created_at, closed_at";

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<OptionPlan> {
    Ok(OptionPlan {
        id: parsed_col(row, 0)?,
        company_id: parsed_col(row, 1)?,
        share_class_id: parsed_col(row, 2)?,
        name: row.get(3)?,
        total_pool_size: decimal_col(row, 4)?,
        total_granted: decimal_col(row, 5)?,
        total_exercised: decimal_col(row, 6)?,
        status: parsed_col(row, 7)?,
        termination_policy: parsed_col(row, 8)?,
        exercise_window_days: row.get(9)?,
        board_approval_date: opt_time_col(row, 10)?,
        created_at: time_col(row, 11)?,
        closed_at: opt_time_col(row, 12)?,
    })
}

/// Totals aggregated over a plan's grants that still hold pool capacity
/// (everything but CANCELLED).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolUsage {
    pub granted: Decimal,
    pub exercised: Decimal,
    pub grant_count: u64,
}

impl Reader<'_> {
    pub fn plan(&self, id: PlanId) -> Result<Option<OptionPlan>> {
        self.conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM option_plans WHERE id = ?1"),
                [id.to_string()],
                plan_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load option plan {id}"))
    }

    pub fn plans_for_company(&self, company_id: CompanyId) -> Result<Vec<OptionPlan>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PLAN_COLUMNS} FROM option_plans
                 WHERE company_id = ?1
                 ORDER BY created_at DESC, id ASC"
            ))
            .context("Failed to prepare plans query")?;
        let rows = stmt
            .query_map([company_id.to_string()], plan_from_row)
            .context("Failed to query option plans")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read option plan row")
    }

    /// Live pool usage, recomputed from grant rows rather than trusted from
    /// the plan's running counters.
    pub fn pool_usage(&self, plan_id: PlanId) -> Result<PoolUsage> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT quantity, exercised FROM option_grants
                 WHERE plan_id = ?1 AND status != ?2",
            )
            .context("Failed to prepare pool usage query")?;
        let rows = stmt
            .query_map(
                params![plan_id.to_string(), GrantStatus::Cancelled.as_str()],
                |row| Ok((decimal_col(row, 0)?, decimal_col(row, 1)?)),
            )
            .context("Failed to query pool usage")?;

        let mut usage = PoolUsage::default();
        for row in rows {
            let (quantity, exercised) = row.context("Failed to read pool usage row")?;
            usage.granted += quantity;
            usage.exercised += exercised;
            usage.grant_count += 1;
        }
        Ok(usage)
    }
}

impl UnitOfWork<'_> {
    pub fn insert_plan(&self, plan: &OptionPlan) -> Result<()> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO option_plans ({PLAN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    plan.id.to_string(),
                    plan.company_id.to_string(),
                    plan.share_class_id.to_string(),
                    &plan.name,
                    decimal_to_sql(plan.total_pool_size),
                    decimal_to_sql(plan.total_granted),
                    decimal_to_sql(plan.total_exercised),
                    plan.status.as_str(),
                    plan.termination_policy.as_str(),
                    plan.exercise_window_days,
                    opt_time_to_sql(plan.board_approval_date),
                    time_to_sql(plan.created_at),
                    opt_time_to_sql(plan.closed_at),
                ],
            )
            .with_context(|| format!("Failed to insert option plan {}", plan.id))?;
        Ok(())
    }

    /// Persist every mutable plan field.
    pub fn update_plan(&self, plan: &OptionPlan) -> Result<()> {
        let updated = self
            .conn()
            .execute(
                "UPDATE option_plans
                 SET name = ?2, total_pool_size = ?3, total_granted = ?4, total_exercised = ?5,
                     status = ?6, termination_policy = ?7, exercise_window_days = ?8,
                     board_approval_date = ?9, closed_at = ?10
                 WHERE id = ?1",
                params![
                    plan.id.to_string(),
                    &plan.name,
                    decimal_to_sql(plan.total_pool_size),
                    decimal_to_sql(plan.total_granted),
                    decimal_to_sql(plan.total_exercised),
                    plan.status.as_str(),
                    plan.termination_policy.as_str(),
                    plan.exercise_window_days,
                    opt_time_to_sql(plan.board_approval_date),
                    opt_time_to_sql(plan.closed_at),
                ],
            )
            .with_context(|| format!("Failed to update option plan {}", plan.id))?;
        if updated == 0 {
            bail!("No option plan found for id {}", plan.id);
        }
        Ok(())
    }

    /// Apply deltas to the plan's running counters. Returns the updated plan.
    pub fn adjust_plan_totals(
        &self,
        plan_id: PlanId,
        granted_delta: Decimal,
        exercised_delta: Decimal,
    ) -> Result<OptionPlan> {
        let Some(mut plan) = self.plan(plan_id)? else {
            bail!("No option plan found for id {plan_id}");
        };
        plan.total_granted = (plan.total_granted + granted_delta).max(Decimal::ZERO);
        plan.total_exercised = (plan.total_exercised + exercised_delta).max(Decimal::ZERO);
        self.update_plan(&plan)?;
        Ok(plan)
    }
}
