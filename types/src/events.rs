//! Payloads handed to the audit and notification sinks after a commit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::{CompanyId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    OptionPlanCreated,
    OptionPlanUpdated,
    OptionPlanClosed,
    OptionGrantCreated,
    OptionGrantCancelled,
    OptionGrantTerminated,
    OptionGrantExpired,
    OptionExerciseRequested,
    OptionExerciseConfirmed,
    OptionExerciseCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceType {
    OptionPlan,
    OptionGrant,
    OptionExerciseRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor_type: ActorType,
    pub actor_id: Option<UserId>,
    pub company_id: CompanyId,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub metadata: Value,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    OptionGrantExpired,
    OptionExerciseConfirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub related_entity_type: ResourceType,
    pub related_entity_id: String,
    pub company_id: CompanyId,
}
