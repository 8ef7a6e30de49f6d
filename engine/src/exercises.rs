//! Exercise workflow.
//!
//! ```text
//! PENDING_PAYMENT ──confirm──▶ COMPLETED
//!        │
//!        └────────cancel────▶ CANCELLED
//! ```
//!
//! Requesting an exercise reserves nothing; the options were reserved when
//! the grant was issued. Confirmation moves exercise, grant, plan, holding
//! and share-class totals in one unit of work.

use anyhow::anyhow;
use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};

use optionpool_core::calculate_vesting;
use optionpool_store::{ExerciseInsert, Reader};
use optionpool_types::{
    AuditAction, DomainError, Entity, ExerciseId, ExerciseStatus, GrantId, GrantStatus,
    Notification, NotificationKind, OptionExerciseRequest, OptionGrant, OptionPlan, ResourceType,
    RuleViolation, UserId, is_positive_whole,
};

use crate::authorization::authorize_grantee_or_admin;
use crate::error::{EngineError, EngineResult};
use crate::grants::{load_grant, save_grant};
use crate::{AuditRecord, OptionPool};

const SNAPSHOT_REASON: &str = "option_exercise";

/// `EX-{year}-{6 uppercase hex}`.
fn payment_reference(now: DateTime<Utc>) -> String {
    format!("EX-{}-{:06X}", now.year(), rand::random::<u32>() & 0x00FF_FFFF)
}

fn load_exercise(
    reader: &Reader<'_>,
    exercise_id: ExerciseId,
) -> EngineResult<OptionExerciseRequest> {
    reader
        .exercise(exercise_id)?
        .ok_or_else(|| DomainError::not_found(Entity::Exercise, exercise_id).into())
}

/// Checks that depend only on the grant's current state. Run once before
/// the unit of work for a fast answer and again inside it.
fn check_exercisable(
    grant: &OptionGrant,
    plan: &OptionPlan,
    quantity: Decimal,
    now: DateTime<Utc>,
) -> Result<(), RuleViolation> {
    if grant.status != GrantStatus::Active {
        return Err(RuleViolation::GrantNotActive(grant.status));
    }
    if let Some(terminated_at) = grant.terminated_at {
        let closed_at = terminated_at + Duration::days(i64::from(plan.exercise_window_days));
        if now > closed_at {
            return Err(RuleViolation::ExerciseWindowClosed { closed_at });
        }
    }
    if !is_positive_whole(quantity) {
        return Err(RuleViolation::InvalidQuantity(quantity));
    }
    let exercisable = calculate_vesting(grant, now).exercisable_quantity;
    if quantity > exercisable {
        return Err(RuleViolation::InsufficientVested {
            exercisable,
            requested: quantity,
        });
    }
    Ok(())
}

struct Confirmation {
    exercise: OptionExerciseRequest,
    grant: OptionGrant,
    plan: OptionPlan,
    holding: Decimal,
}

impl OptionPool {
    pub fn create_exercise_request(
        &self,
        grant_id: GrantId,
        quantity: Decimal,
        actor: UserId,
    ) -> EngineResult<OptionExerciseRequest> {
        let (grant, plan) = self.store.read(|r| {
            let grant = r.grant(grant_id)?;
            let plan = match &grant {
                Some(grant) => r.plan(grant.plan_id)?,
                None => None,
            };
            Ok(grant.zip(plan))
        })?
        .ok_or_else(|| DomainError::not_found(Entity::Grant, grant_id))?;
        authorize_grantee_or_admin(self.directory.as_ref(), plan.company_id, &grant, actor)?;

        let now = self.clock.now();
        check_exercisable(&grant, &plan, quantity, now)?;
        if self.store.read(|r| r.pending_exercise(grant_id))?.is_some() {
            return Err(RuleViolation::PendingExerciseExists.into());
        }

        let quantity = quantity.normalize();
        let mut request = OptionExerciseRequest {
            id: ExerciseId::new(),
            grant_id,
            quantity,
            total_cost: (quantity * grant.strike_price).normalize(),
            payment_reference: String::new(),
            status: ExerciseStatus::PendingPayment,
            requested_by: actor,
            confirmed_by: None,
            confirmed_at: None,
            cancelled_at: None,
            created_at: now,
        };

        let attempts = self.settings.reference_attempts.max(1);
        for attempt in 1..=attempts {
            request.payment_reference = payment_reference(now);
            let outcome = self.store.write(|uow| -> EngineResult<ExerciseInsert> {
                let grant = load_grant(uow, grant_id)?;
                check_exercisable(&grant, &plan, quantity, now)?;
                Ok(uow.insert_exercise(&request)?)
            })?;
            match outcome {
                ExerciseInsert::Inserted => {
                    info!(
                        exercise_id = %request.id,
                        %grant_id,
                        quantity = %request.quantity,
                        total_cost = %request.total_cost,
                        reference = %request.payment_reference,
                        "Created exercise request"
                    );
                    self.audit(
                        AuditRecord::new(
                            AuditAction::OptionExerciseRequested,
                            Some(actor),
                            plan.company_id,
                            ResourceType::OptionExerciseRequest,
                            request.id,
                        )
                        .after(&request)
                        .at(now),
                    );
                    return Ok(request);
                }
                ExerciseInsert::PendingExists => {
                    return Err(RuleViolation::PendingExerciseExists.into());
                }
                ExerciseInsert::ReferenceTaken => {
                    debug!(attempt, reference = %request.payment_reference, "Payment reference collided");
                }
            }
        }
        Err(EngineError::Storage(anyhow!(
            "no unique payment reference after {attempts} attempts"
        )))
    }

    pub fn confirm_exercise_payment(
        &self,
        exercise_id: ExerciseId,
        actor: UserId,
    ) -> EngineResult<OptionExerciseRequest> {
        let now = self.clock.now();
        let confirmed = self.store.write(|uow| -> EngineResult<Confirmation> {
            let mut exercise = load_exercise(uow, exercise_id)?;
            match exercise.status {
                ExerciseStatus::PendingPayment => {}
                ExerciseStatus::Completed => {
                    return Err(RuleViolation::ExerciseAlreadyConfirmed.into());
                }
                ExerciseStatus::Cancelled => {
                    return Err(RuleViolation::ExerciseAlreadyCancelled.into());
                }
            }
            let mut grant = load_grant(uow, exercise.grant_id)?;
            let Some(shareholder_id) = grant.shareholder_id else {
                return Err(RuleViolation::NoShareholderLinked.into());
            };
            if grant.status != GrantStatus::Active {
                return Err(RuleViolation::GrantNotActive(grant.status).into());
            }
            let vested = calculate_vesting(&grant, now).vested_quantity;
            if grant.exercised + exercise.quantity > vested {
                return Err(RuleViolation::InsufficientVested {
                    exercisable: (vested - grant.exercised).max(Decimal::ZERO),
                    requested: exercise.quantity,
                }
                .into());
            }

            exercise.status = ExerciseStatus::Completed;
            exercise.confirmed_by = Some(actor);
            exercise.confirmed_at = Some(now);
            if !uow.update_exercise_if(&exercise, ExerciseStatus::PendingPayment)? {
                return Err(anyhow!("option exercise {exercise_id} left PENDING_PAYMENT").into());
            }

            grant.exercised = (grant.exercised + exercise.quantity).normalize();
            if grant.exercised >= grant.quantity {
                grant.status = GrantStatus::Exercised;
            }
            save_grant(uow, &grant, GrantStatus::Active)?;

            let plan = uow.adjust_plan_totals(grant.plan_id, Decimal::ZERO, exercise.quantity)?;
            let holding =
                uow.upsert_holding(shareholder_id, plan.share_class_id, exercise.quantity, now)?;
            uow.increment_share_class_issued(plan.share_class_id, exercise.quantity)?;

            Ok(Confirmation {
                exercise,
                grant,
                plan,
                holding,
            })
        })?;

        let Confirmation {
            exercise,
            grant,
            plan,
            holding,
        } = confirmed;
        info!(
            %exercise_id,
            grant_id = %grant.id,
            quantity = %exercise.quantity,
            holding = %holding,
            grant_status = %grant.status,
            "Confirmed exercise payment"
        );

        if let Err(err) = self.cap_table.recalculate_ownership(plan.company_id) {
            warn!(company_id = %plan.company_id, "Ownership recalculation failed: {err:#}");
        }
        let note = format!(
            "Exercise {} of {} options",
            exercise.payment_reference, exercise.quantity
        );
        if let Err(err) = self
            .cap_table
            .create_snapshot(plan.company_id, SNAPSHOT_REASON, &note)
        {
            warn!(company_id = %plan.company_id, "Cap table snapshot failed: {err:#}");
        }
        self.audit(
            AuditRecord::new(
                AuditAction::OptionExerciseConfirmed,
                Some(actor),
                plan.company_id,
                ResourceType::OptionExerciseRequest,
                exercise_id,
            )
            .before(&json!({ "status": ExerciseStatus::PendingPayment }))
            .after(&exercise)
            .metadata(json!({
                "grantId": grant.id,
                "grantExercised": grant.exercised.to_string(),
                "grantStatus": grant.status,
            }))
            .at(now),
        );
        if let Some(shareholder_id) = grant.shareholder_id {
            match self.directory.shareholder_user(shareholder_id) {
                Ok(Some(user_id)) => self.notify(Notification {
                    user_id,
                    kind: NotificationKind::OptionExerciseConfirmed,
                    related_entity_type: ResourceType::OptionExerciseRequest,
                    related_entity_id: exercise_id.to_string(),
                    company_id: plan.company_id,
                }),
                Ok(None) => {}
                Err(err) => warn!(%shareholder_id, "Grantee lookup failed: {err:#}"),
            }
        }
        Ok(exercise)
    }

    pub fn cancel_exercise(
        &self,
        exercise_id: ExerciseId,
        actor: UserId,
    ) -> EngineResult<OptionExerciseRequest> {
        let (grant, plan) = self.store.read(|r| {
            let Some(exercise) = r.exercise(exercise_id)? else {
                return Ok(None);
            };
            let grant = r.grant(exercise.grant_id)?;
            let plan = match &grant {
                Some(grant) => r.plan(grant.plan_id)?,
                None => None,
            };
            Ok(grant.zip(plan))
        })?
        .ok_or_else(|| DomainError::not_found(Entity::Exercise, exercise_id))?;
        authorize_grantee_or_admin(self.directory.as_ref(), plan.company_id, &grant, actor)?;

        let now = self.clock.now();
        let exercise = self.store.write(|uow| -> EngineResult<_> {
            let mut exercise = load_exercise(uow, exercise_id)?;
            match exercise.status {
                ExerciseStatus::PendingPayment => {}
                ExerciseStatus::Cancelled => {
                    return Err(RuleViolation::ExerciseAlreadyCancelled.into());
                }
                status @ ExerciseStatus::Completed => {
                    return Err(RuleViolation::ExerciseNotPending(status).into());
                }
            }
            exercise.status = ExerciseStatus::Cancelled;
            exercise.cancelled_at = Some(now);
            if !uow.update_exercise_if(&exercise, ExerciseStatus::PendingPayment)? {
                return Err(anyhow!("option exercise {exercise_id} left PENDING_PAYMENT").into());
            }
            Ok(exercise)
        })?;

        info!(%exercise_id, grant_id = %grant.id, "Cancelled exercise request");
        self.audit(
            AuditRecord::new(
                AuditAction::OptionExerciseCancelled,
                Some(actor),
                plan.company_id,
                ResourceType::OptionExerciseRequest,
                exercise_id,
            )
            .before(&json!({ "status": ExerciseStatus::PendingPayment }))
            .after(&exercise)
            .at(now),
        );
        Ok(exercise)
    }

    pub fn find_exercise(&self, exercise_id: ExerciseId) -> EngineResult<OptionExerciseRequest> {
        let exercise = self.store.read(|r| r.exercise(exercise_id))?;
        exercise.ok_or_else(|| DomainError::not_found(Entity::Exercise, exercise_id).into())
    }

    /// Exercise requests for a grant, newest first.
    pub fn list_exercises(&self, grant_id: GrantId) -> EngineResult<Vec<OptionExerciseRequest>> {
        let exercises = self.store.read(|r| {
            if r.grant(grant_id)?.is_none() {
                return Ok(None);
            }
            r.exercises_for_grant(grant_id).map(Some)
        })?;
        exercises.ok_or_else(|| DomainError::not_found(Entity::Grant, grant_id).into())
    }
}
