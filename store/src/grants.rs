use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

use optionpool_types::{GrantId, GrantStatus, OptionGrant, PlanId};

use crate::sqlite_util::{
    decimal_col, decimal_to_sql, opt_decimal_col, opt_parsed_col, opt_time_col, opt_time_to_sql,
    parsed_col, time_col, time_to_sql,
};
use crate::store::{Reader, UnitOfWork};

const GRANT_COLUMNS: &str = "id, plan_id, shareholder_id, employee_name, employee_email,
    quantity, strike_price, exercised, status, grant_date, expiration_date, cliff_months,
    vesting_duration_months, vesting_frequency, cliff_percentage, acceleration_on_coc,
    terminated_at, vested_at_termination, created_at";

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<OptionGrant> {
    Ok(OptionGrant {
        id: parsed_col(row, 0)?,
        plan_id: parsed_col(row, 1)?,
        shareholder_id: opt_parsed_col(row, 2)?,
        employee_name: row.get(3)?,
        employee_email: row.get(4)?,
        quantity: decimal_col(row, 5)?,
        strike_price: decimal_col(row, 6)?,
        exercised: decimal_col(row, 7)?,
        status: parsed_col(row, 8)?,
        grant_date: time_col(row, 9)?,
        expiration_date: time_col(row, 10)?,
        cliff_months: row.get(11)?,
        vesting_duration_months: row.get(12)?,
        vesting_frequency: parsed_col(row, 13)?,
        cliff_percentage: decimal_col(row, 14)?,
        acceleration_on_coc: row.get(15)?,
        terminated_at: opt_time_col(row, 16)?,
        vested_at_termination: opt_decimal_col(row, 17)?,
        created_at: time_col(row, 18)?,
    })
}

impl Reader<'_> {
    pub fn grant(&self, id: GrantId) -> Result<Option<OptionGrant>> {
        self.conn
            .query_row(
                &format!("SELECT {GRANT_COLUMNS} FROM option_grants WHERE id = ?1"),
                [id.to_string()],
                grant_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load option grant {id}"))
    }

    pub fn grants_for_plan(
        &self,
        plan_id: PlanId,
        status: Option<GrantStatus>,
    ) -> Result<Vec<OptionGrant>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {GRANT_COLUMNS} FROM option_grants
                 WHERE plan_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY grant_date ASC, id ASC"
            ))
            .context("Failed to prepare grants query")?;
        let rows = stmt
            .query_map(
                params![plan_id.to_string(), status.map(GrantStatus::as_str)],
                grant_from_row,
            )
            .context("Failed to query option grants")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read option grant row")
    }

    /// ACTIVE grants whose expiration date is strictly before `now`, oldest
    /// first, at most `limit`.
    pub fn stale_active_grants(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<GrantId>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM option_grants
                 WHERE status = ?1 AND expiration_date < ?2
                 ORDER BY expiration_date ASC, id ASC
                 LIMIT ?3",
            )
            .context("Failed to prepare stale grants query")?;
        let rows = stmt
            .query_map(
                params![
                    GrantStatus::Active.as_str(),
                    time_to_sql(now),
                    i64::try_from(limit).unwrap_or(i64::MAX)
                ],
                |row| parsed_col(row, 0),
            )
            .context("Failed to query stale grants")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read stale grant id")
    }
}

impl UnitOfWork<'_> {
    pub fn insert_grant(&self, grant: &OptionGrant) -> Result<()> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO option_grants ({GRANT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
                ),
                params![
                    grant.id.to_string(),
                    grant.plan_id.to_string(),
                    grant.shareholder_id.map(|id| id.to_string()),
                    &grant.employee_name,
                    &grant.employee_email,
                    decimal_to_sql(grant.quantity),
                    decimal_to_sql(grant.strike_price),
                    decimal_to_sql(grant.exercised),
                    grant.status.as_str(),
                    time_to_sql(grant.grant_date),
                    time_to_sql(grant.expiration_date),
                    grant.cliff_months,
                    grant.vesting_duration_months,
                    grant.vesting_frequency.as_str(),
                    decimal_to_sql(grant.cliff_percentage),
                    grant.acceleration_on_coc,
                    opt_time_to_sql(grant.terminated_at),
                    grant.vested_at_termination.map(decimal_to_sql),
                    time_to_sql(grant.created_at),
                ],
            )
            .with_context(|| format!("Failed to insert option grant {}", grant.id))?;
        Ok(())
    }

    /// Persist the grant's mutable state, but only if the stored status is
    /// still `expected`. Returns false when another writer moved it first.
    pub fn update_grant_if(&self, grant: &OptionGrant, expected: GrantStatus) -> Result<bool> {
        let updated = self
            .conn()
            .execute(
                "UPDATE option_grants
                 SET status = ?2, exercised = ?3, terminated_at = ?4, vested_at_termination = ?5
                 WHERE id = ?1 AND status = ?6",
                params![
                    grant.id.to_string(),
                    grant.status.as_str(),
                    decimal_to_sql(grant.exercised),
                    opt_time_to_sql(grant.terminated_at),
                    grant.vested_at_termination.map(decimal_to_sql),
                    expected.as_str(),
                ],
            )
            .with_context(|| format!("Failed to update option grant {}", grant.id))?;
        Ok(updated == 1)
    }
}
