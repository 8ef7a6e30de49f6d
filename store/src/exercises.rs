use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

use optionpool_types::{ExerciseId, ExerciseStatus, GrantId, OptionExerciseRequest};

use crate::sqlite_util::{
    decimal_col, decimal_to_sql, is_unique_violation, opt_parsed_col, opt_time_col,
    opt_time_to_sql, parsed_col, time_col, time_to_sql,
};
use crate::store::{Reader, UnitOfWork};

const EXERCISE_COLUMNS: &str = "id, grant_id, quantity, total_cost, payment_reference, status,
    requested_by, confirmed_by, confirmed_at, cancelled_at, created_at";

fn exercise_from_row(row: &Row<'_>) -> rusqlite::Result<OptionExerciseRequest> {
    Ok(OptionExerciseRequest {
        id: parsed_col(row, 0)?,
        grant_id: parsed_col(row, 1)?,
        quantity: decimal_col(row, 2)?,
        total_cost: decimal_col(row, 3)?,
        payment_reference: row.get(4)?,
        status: parsed_col(row, 5)?,
        requested_by: parsed_col(row, 6)?,
        confirmed_by: opt_parsed_col(row, 7)?,
        confirmed_at: opt_time_col(row, 8)?,
        cancelled_at: opt_time_col(row, 9)?,
        created_at: time_col(row, 10)?,
    })
}

/// Outcome of [`UnitOfWork::insert_exercise`]. The two rejections come from
/// the unique indexes, so they hold even against a concurrent writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseInsert {
    Inserted,
    /// The grant already has an exercise awaiting payment.
    PendingExists,
    /// The payment reference collided with an existing one.
    ReferenceTaken,
}

impl Reader<'_> {
    pub fn exercise(&self, id: ExerciseId) -> Result<Option<OptionExerciseRequest>> {
        self.conn
            .query_row(
                &format!("SELECT {EXERCISE_COLUMNS} FROM option_exercises WHERE id = ?1"),
                [id.to_string()],
                exercise_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load option exercise {id}"))
    }

    /// All exercise requests for a grant, newest first.
    pub fn exercises_for_grant(&self, grant_id: GrantId) -> Result<Vec<OptionExerciseRequest>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {EXERCISE_COLUMNS} FROM option_exercises
                 WHERE grant_id = ?1
                 ORDER BY created_at DESC, id ASC"
            ))
            .context("Failed to prepare exercises query")?;
        let rows = stmt
            .query_map([grant_id.to_string()], exercise_from_row)
            .context("Failed to query option exercises")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read option exercise row")
    }

    pub fn pending_exercise(&self, grant_id: GrantId) -> Result<Option<OptionExerciseRequest>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {EXERCISE_COLUMNS} FROM option_exercises
                     WHERE grant_id = ?1 AND status = ?2"
                ),
                params![grant_id.to_string(), ExerciseStatus::PendingPayment.as_str()],
                exercise_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load pending exercise of grant {grant_id}"))
    }
}

impl UnitOfWork<'_> {
    pub fn insert_exercise(&self, exercise: &OptionExerciseRequest) -> Result<ExerciseInsert> {
        let result = self.conn().execute(
            &format!(
                "INSERT INTO option_exercises ({EXERCISE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                exercise.id.to_string(),
                exercise.grant_id.to_string(),
                decimal_to_sql(exercise.quantity),
                decimal_to_sql(exercise.total_cost),
                &exercise.payment_reference,
                exercise.status.as_str(),
                exercise.requested_by.to_string(),
                exercise.confirmed_by.map(|id| id.to_string()),
                opt_time_to_sql(exercise.confirmed_at),
                opt_time_to_sql(exercise.cancelled_at),
                time_to_sql(exercise.created_at),
            ],
        );
        match result {
            Ok(_) => Ok(ExerciseInsert::Inserted),
            Err(err) if is_unique_violation(&err, "payment_reference") => {
                Ok(ExerciseInsert::ReferenceTaken)
            }
            Err(err) if is_unique_violation(&err, "grant_id") => Ok(ExerciseInsert::PendingExists),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to insert option exercise {}", exercise.id)),
        }
    }

    /// Persist the exercise's mutable state if its stored status is still
    /// `expected`. Returns false when another writer moved it first.
    pub fn update_exercise_if(
        &self,
        exercise: &OptionExerciseRequest,
        expected: ExerciseStatus,
    ) -> Result<bool> {
        let updated = self
            .conn()
            .execute(
                "UPDATE option_exercises
                 SET status = ?2, confirmed_by = ?3, confirmed_at = ?4, cancelled_at = ?5
                 WHERE id = ?1 AND status = ?6",
                params![
                    exercise.id.to_string(),
                    exercise.status.as_str(),
                    exercise.confirmed_by.map(|id| id.to_string()),
                    opt_time_to_sql(exercise.confirmed_at),
                    opt_time_to_sql(exercise.cancelled_at),
                    expected.as_str(),
                ],
            )
            .with_context(|| format!("Failed to update option exercise {}", exercise.id))?;
        Ok(updated == 1)
    }

    /// Cancel every exercise of `grant_id` still awaiting payment. Returns
    /// how many were cancelled.
    pub fn cancel_pending_exercises(&self, grant_id: GrantId, at: DateTime<Utc>) -> Result<usize> {
        self.conn()
            .execute(
                "UPDATE option_exercises SET status = ?2, cancelled_at = ?3
                 WHERE grant_id = ?1 AND status = ?4",
                params![
                    grant_id.to_string(),
                    ExerciseStatus::Cancelled.as_str(),
                    time_to_sql(at),
                    ExerciseStatus::PendingPayment.as_str(),
                ],
            )
            .with_context(|| format!("Failed to cancel pending exercises of grant {grant_id}"))
    }
}
