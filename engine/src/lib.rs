//! Option pool engine: plan registry, grant lifecycle, exercise workflow and
//! the expiration sweep.
//!
//! ```text
//! OptionPool
//! ├── store: PoolStore              units of work (BEGIN IMMEDIATE)
//! ├── directory: dyn Directory      company / shareholder scoping, roles
//! ├── cap_table: dyn CapTable       post-commit ownership recalculation
//! ├── audit: dyn AuditSink          post-commit, best-effort
//! ├── notifications: dyn NotificationSink
//! └── clock: dyn Clock
//! ```
//!
//! Every mutation validates first, then commits one unit of work, then runs
//! its side effects. Side effects never fail the operation; their errors
//! are logged and dropped.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use optionpool_store::PoolStore;
use optionpool_types::{
    ActorType, AuditAction, AuditEvent, CompanyId, Notification, ResourceType, UserId,
};

mod authorization;
mod collaborators;
mod error;
mod exercises;
mod grants;
mod plans;
mod sweep;

pub use authorization::authorize_grantee_or_admin;
pub use collaborators::{
    AuditSink, CapTable, Clock, Directory, NotificationSink, SystemClock, TracingAuditSink,
    TracingCapTable, TracingNotificationSink,
};
pub use error::{EngineError, EngineResult};
pub use grants::GrantDetails;
pub use optionpool_core::{ScheduleEntry, ScheduleEntryKind, VestingSnapshot};

/// Tunables read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Grants examined per expiration sweep.
    pub sweep_batch_size: usize,
    /// Payment reference regeneration attempts on collision.
    pub reference_attempts: u32,
    /// Exercise window for plans created without one.
    pub default_exercise_window_days: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sweep_batch_size: 100,
            reference_attempts: 5,
            default_exercise_window_days: 90,
        }
    }
}

pub struct OptionPool {
    store: Arc<PoolStore>,
    directory: Arc<dyn Directory>,
    cap_table: Arc<dyn CapTable>,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl OptionPool {
    /// Engine backed by `store`, which also serves as the directory. Side
    /// effects go to tracing until real sinks are attached.
    pub fn new(store: Arc<PoolStore>, settings: EngineSettings) -> Self {
        Self {
            directory: store.clone(),
            store,
            cap_table: Arc::new(TracingCapTable),
            audit: Arc::new(TracingAuditSink),
            notifications: Arc::new(TracingNotificationSink),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_cap_table(mut self, cap_table: Arc<dyn CapTable>) -> Self {
        self.cap_table = cap_table;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notification_sink(mut self, notifications: Arc<dyn NotificationSink>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    #[must_use]
    pub fn store(&self) -> &PoolStore {
        &self.store
    }

    fn audit(&self, event: AuditEvent) {
        let action = event.action;
        if let Err(err) = self.audit.log(event) {
            warn!(?action, "Audit sink rejected event: {err:#}");
        }
    }

    fn notify(&self, notification: Notification) {
        let kind = notification.kind;
        let user_id = notification.user_id;
        if let Err(err) = self.notifications.notify(notification) {
            warn!(?kind, %user_id, "Notification sink failed: {err:#}");
        }
    }
}

/// Builder for the audit events every mutation emits.
struct AuditRecord {
    action: AuditAction,
    actor: Option<UserId>,
    company_id: CompanyId,
    resource_type: ResourceType,
    resource_id: String,
    before: Option<Value>,
    after: Option<Value>,
    metadata: Value,
}

impl AuditRecord {
    fn new(
        action: AuditAction,
        actor: Option<UserId>,
        company_id: CompanyId,
        resource_type: ResourceType,
        resource_id: impl ToString,
    ) -> Self {
        Self {
            action,
            actor,
            company_id,
            resource_type,
            resource_id: resource_id.to_string(),
            before: None,
            after: None,
            metadata: json!({}),
        }
    }

    fn before(mut self, value: &impl Serialize) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    fn after(mut self, value: &impl Serialize) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }

    fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    fn at(self, occurred_at: chrono::DateTime<chrono::Utc>) -> AuditEvent {
        AuditEvent {
            action: self.action,
            actor_type: if self.actor.is_some() {
                ActorType::User
            } else {
                ActorType::System
            },
            actor_id: self.actor,
            company_id: self.company_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            before: self.before,
            after: self.after,
            metadata: self.metadata,
            occurred_at,
        }
    }
}
