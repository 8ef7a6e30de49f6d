//! Core domain types for the option pool back office.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Every quantity, price and cost is a [`rust_decimal::Decimal`] and serializes as a
//! decimal string.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod error;
mod events;
mod exercise;
mod grant;
mod ids;
mod plan;
mod quantity;

pub use error::{DomainError, Entity, ErrorBody, RuleViolation, UnknownVariant};
pub use events::{
    ActorType, AuditAction, AuditEvent, Notification, NotificationKind, ResourceType,
};
pub use exercise::{ExerciseStatus, OptionExerciseRequest};
pub use grant::{GrantStatus, NewGrant, OptionGrant, VestingFrequency};
pub use ids::{CompanyId, ExerciseId, GrantId, PlanId, ShareClassId, ShareholderId, UserId};
pub use plan::{NewPlan, OptionPlan, PlanStatus, PlanSummary, PlanUpdate, TerminationPolicy};
pub use quantity::{
    MAX_QUANTITY, MAX_STRIKE_PRICE, is_positive_whole, is_valid_quantity, is_valid_strike_price,
    percentage,
};

pub use rust_decimal::Decimal;
