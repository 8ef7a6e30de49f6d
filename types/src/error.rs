//! Error taxonomy surfaced to callers.
//!
//! Every error carries a machine-readable code, a localization key and a
//! details payload. Decimal values in details are rendered as strings so no
//! transport ever sees a binary float.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::{ExerciseStatus, GrantStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Entity {
    Company,
    ShareClass,
    Shareholder,
    Plan,
    Grant,
    Exercise,
}

impl Entity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::ShareClass => "shareClass",
            Self::Shareholder => "shareholder",
            Self::Plan => "plan",
            Self::Grant => "grant",
            Self::Exercise => "exercise",
        }
    }

    const fn code(self) -> &'static str {
        match self {
            Self::Company => "COMPANY_NOT_FOUND",
            Self::ShareClass => "SHARE_CLASS_NOT_FOUND",
            Self::Shareholder => "SHAREHOLDER_NOT_FOUND",
            Self::Plan => "OPTION_PLAN_NOT_FOUND",
            Self::Grant => "OPTION_GRANT_NOT_FOUND",
            Self::Exercise => "OPTION_EXERCISE_NOT_FOUND",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-correctable business rule failures. None of these are retryable by
/// a machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleViolation {
    #[error("company is not active")]
    CompanyNotActive,
    #[error("share class does not belong to the plan's company")]
    ShareClassMismatch,
    #[error("shareholder does not belong to the plan's company")]
    ShareholderMismatch,
    #[error("pool size {requested} is invalid (must be a whole number up to 1000000000000000 and at least {granted} already granted)")]
    InvalidPoolSize { requested: Decimal, granted: Decimal },
    #[error("option pool exhausted: {available} available, {requested} requested")]
    PoolExhausted { available: Decimal, requested: Decimal },
    #[error("option plan is closed")]
    PlanClosed,
    #[error("option plan is already closed")]
    PlanAlreadyClosed,
    #[error("quantity {0} must be a whole number from 1 to 1000000000000000")]
    InvalidQuantity(Decimal),
    #[error("strike price {0} must be positive and at most 1000000000")]
    InvalidStrikePrice(Decimal),
    #[error("cliff of {cliff_months} months exceeds vesting duration of {vesting_duration_months} months")]
    CliffExceedsVesting {
        cliff_months: u32,
        vesting_duration_months: u32,
    },
    #[error("expiration date must be after the grant date")]
    InvalidExpiration,
    #[error("insufficient vested options: {exercisable} exercisable, {requested} requested")]
    InsufficientVested {
        exercisable: Decimal,
        requested: Decimal,
    },
    #[error("a pending exercise already exists for this grant")]
    PendingExerciseExists,
    #[error("post-termination exercise window closed at {closed_at}")]
    ExerciseWindowClosed { closed_at: DateTime<Utc> },
    #[error("grant has no linked shareholder to issue shares to")]
    NoShareholderLinked,
    #[error("caller is neither the grantee nor a company admin")]
    NotGrantee,
    #[error("grant is {0}, expected ACTIVE")]
    GrantNotActive(GrantStatus),
    #[error("grant is already cancelled")]
    GrantAlreadyCancelled,
    #[error("grant is already fully exercised")]
    GrantAlreadyExercised,
    #[error("grantee employment was already terminated")]
    GrantAlreadyTerminated,
    #[error("exercise is already confirmed")]
    ExerciseAlreadyConfirmed,
    #[error("exercise is already cancelled")]
    ExerciseAlreadyCancelled,
    #[error("exercise is {0}, expected PENDING_PAYMENT")]
    ExerciseNotPending(ExerciseStatus),
}

impl RuleViolation {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CompanyNotActive => "COMPANY_NOT_ACTIVE",
            Self::ShareClassMismatch => "SHARE_CLASS_NOT_IN_COMPANY",
            Self::ShareholderMismatch => "SHAREHOLDER_NOT_IN_COMPANY",
            Self::InvalidPoolSize { .. } => "OPT_INVALID_POOL_SIZE",
            Self::PoolExhausted { .. } => "OPT_POOL_EXHAUSTED",
            Self::PlanClosed => "OPT_PLAN_CLOSED",
            Self::PlanAlreadyClosed => "OPT_PLAN_ALREADY_CLOSED",
            Self::InvalidQuantity(_) => "OPT_INVALID_QUANTITY",
            Self::InvalidStrikePrice(_) => "OPT_INVALID_STRIKE_PRICE",
            Self::CliffExceedsVesting { .. } => "OPT_CLIFF_EXCEEDS_VESTING",
            Self::InvalidExpiration => "OPT_INVALID_EXPIRATION",
            Self::InsufficientVested { .. } => "OPT_INSUFFICIENT_VESTED",
            Self::PendingExerciseExists => "OPT_EXERCISE_PENDING",
            Self::ExerciseWindowClosed { .. } => "OPT_EXERCISE_WINDOW_CLOSED",
            Self::NoShareholderLinked => "OPT_NO_SHAREHOLDER_LINKED",
            Self::NotGrantee => "OPT_NOT_GRANTEE",
            Self::GrantNotActive(_) => "OPT_GRANT_NOT_ACTIVE",
            Self::GrantAlreadyCancelled => "OPT_GRANT_ALREADY_CANCELLED",
            Self::GrantAlreadyExercised => "OPT_GRANT_ALREADY_EXERCISED",
            Self::GrantAlreadyTerminated => "OPT_GRANT_ALREADY_TERMINATED",
            Self::ExerciseAlreadyConfirmed => "OPT_EXERCISE_ALREADY_CONFIRMED",
            Self::ExerciseAlreadyCancelled => "OPT_EXERCISE_ALREADY_CANCELLED",
            Self::ExerciseNotPending(_) => "OPT_EXERCISE_NOT_PENDING",
        }
    }

    #[must_use]
    pub const fn message_key(&self) -> &'static str {
        match self {
            Self::CompanyNotActive => "errors.company.notActive",
            Self::ShareClassMismatch => "errors.shareClass.notInCompany",
            Self::ShareholderMismatch => "errors.shareholder.notInCompany",
            Self::InvalidPoolSize { .. } => "errors.option.invalidPoolSize",
            Self::PoolExhausted { .. } => "errors.option.poolExhausted",
            Self::PlanClosed => "errors.option.planClosed",
            Self::PlanAlreadyClosed => "errors.option.planAlreadyClosed",
            Self::InvalidQuantity(_) => "errors.option.invalidQuantity",
            Self::InvalidStrikePrice(_) => "errors.option.invalidStrikePrice",
            Self::CliffExceedsVesting { .. } => "errors.option.cliffExceedsVesting",
            Self::InvalidExpiration => "errors.option.invalidExpiration",
            Self::InsufficientVested { .. } => "errors.option.insufficientVested",
            Self::PendingExerciseExists => "errors.option.exercisePending",
            Self::ExerciseWindowClosed { .. } => "errors.option.exerciseWindowClosed",
            Self::NoShareholderLinked => "errors.option.noShareholderLinked",
            Self::NotGrantee => "errors.option.notGrantee",
            Self::GrantNotActive(_) => "errors.option.grantNotActive",
            Self::GrantAlreadyCancelled => "errors.option.grantAlreadyCancelled",
            Self::GrantAlreadyExercised => "errors.option.grantAlreadyExercised",
            Self::GrantAlreadyTerminated => "errors.option.grantAlreadyTerminated",
            Self::ExerciseAlreadyConfirmed => "errors.option.exerciseAlreadyConfirmed",
            Self::ExerciseAlreadyCancelled => "errors.option.exerciseAlreadyCancelled",
            Self::ExerciseNotPending(_) => "errors.option.exerciseNotPending",
        }
    }

    #[must_use]
    pub fn details(&self) -> Value {
        match self {
            Self::InvalidPoolSize { requested, granted } => json!({
                "totalPoolSize": requested.normalize().to_string(),
                "totalGranted": granted.normalize().to_string(),
            }),
            Self::PoolExhausted {
                available,
                requested,
            } => json!({
                "optionsAvailable": available.normalize().to_string(),
                "quantityRequested": requested.normalize().to_string(),
            }),
            Self::InvalidQuantity(quantity) => json!({ "quantity": quantity.to_string() }),
            Self::InvalidStrikePrice(price) => json!({ "strikePrice": price.to_string() }),
            Self::CliffExceedsVesting {
                cliff_months,
                vesting_duration_months,
            } => json!({
                "cliffMonths": cliff_months,
                "vestingDurationMonths": vesting_duration_months,
            }),
            Self::InsufficientVested {
                exercisable,
                requested,
            } => json!({
                "exercisableQuantity": exercisable.normalize().to_string(),
                "quantityRequested": requested.normalize().to_string(),
            }),
            Self::ExerciseWindowClosed { closed_at } => {
                json!({ "windowClosedAt": closed_at.to_rfc3339() })
            }
            Self::GrantNotActive(status) => json!({ "status": status.as_str() }),
            Self::ExerciseNotPending(status) => json!({ "status": status.as_str() }),
            _ => json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },
    #[error(transparent)]
    Rule(#[from] RuleViolation),
}

impl DomainError {
    pub fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { entity, .. } => entity.code(),
            Self::Rule(rule) => rule.code(),
        }
    }

    #[must_use]
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "errors.notFound",
            Self::Rule(rule) => rule.message_key(),
        }
    }

    #[must_use]
    pub fn details(&self) -> Value {
        match self {
            Self::NotFound { entity, id } => json!({ "entity": entity, "id": id }),
            Self::Rule(rule) => rule.details(),
        }
    }

    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message_key: self.message_key(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Wire shape of a domain error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: &'static str,
    pub message_key: &'static str,
    pub message: String,
    pub details: Value,
}

/// Text column or input held a value outside a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
