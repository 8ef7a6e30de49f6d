//! Seams to the systems around the option pool.
//!
//! The engine owns plan, grant and exercise state plus the ledger rows an
//! exercise moves. Everything else (who a company is, who may act for it,
//! where audit records and notifications go, how ownership percentages are
//! recomputed) is reached through these traits.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use optionpool_store::{CompanyStatus, MemberRole, PoolStore};
use optionpool_types::{AuditEvent, CompanyId, Notification, ShareClassId, ShareholderId, UserId};

/// Company, share-class and shareholder scoping plus role lookups.
pub trait Directory: Send + Sync {
    /// `None` when the company does not exist.
    fn company_is_active(&self, company_id: CompanyId) -> Result<Option<bool>>;

    /// Owning company of a share class, `None` when it does not exist.
    fn share_class_company(&self, share_class_id: ShareClassId) -> Result<Option<CompanyId>>;

    /// Owning company of a shareholder, `None` when it does not exist.
    fn shareholder_company(&self, shareholder_id: ShareholderId) -> Result<Option<CompanyId>>;

    /// User account linked to a shareholder record, if any.
    fn shareholder_user(&self, shareholder_id: ShareholderId) -> Result<Option<UserId>>;

    fn is_admin(&self, company_id: CompanyId, user_id: UserId) -> Result<bool>;

    fn shareholder_linked_to_user(
        &self,
        shareholder_id: ShareholderId,
        user_id: UserId,
    ) -> Result<bool> {
        Ok(self.shareholder_user(shareholder_id)? == Some(user_id))
    }
}

/// Capitalization-table reporting. Called after an exercise commits.
pub trait CapTable: Send + Sync {
    fn recalculate_ownership(&self, company_id: CompanyId) -> Result<()>;
    fn create_snapshot(&self, company_id: CompanyId, reason: &str, note: &str) -> Result<()>;
}

pub trait AuditSink: Send + Sync {
    fn log(&self, event: AuditEvent) -> Result<()>;
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Directory for PoolStore {
    fn company_is_active(&self, company_id: CompanyId) -> Result<Option<bool>> {
        let company = self.read(|r| r.company(company_id))?;
        Ok(company.map(|c| c.status == CompanyStatus::Active))
    }

    fn share_class_company(&self, share_class_id: ShareClassId) -> Result<Option<CompanyId>> {
        let share_class = self.read(|r| r.share_class(share_class_id))?;
        Ok(share_class.map(|s| s.company_id))
    }

    fn shareholder_company(&self, shareholder_id: ShareholderId) -> Result<Option<CompanyId>> {
        let shareholder = self.read(|r| r.shareholder(shareholder_id))?;
        Ok(shareholder.map(|s| s.company_id))
    }

    fn shareholder_user(&self, shareholder_id: ShareholderId) -> Result<Option<UserId>> {
        let shareholder = self.read(|r| r.shareholder(shareholder_id))?;
        Ok(shareholder.and_then(|s| s.user_id))
    }

    fn is_admin(&self, company_id: CompanyId, user_id: UserId) -> Result<bool> {
        let role = self.read(|r| r.member_role(company_id, user_id))?;
        Ok(role == Some(MemberRole::Admin))
    }
}

/// Writes audit events to the `optionpool::audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log(&self, event: AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)?;
        info!(
            target: "optionpool::audit",
            action = ?event.action,
            resource_id = %event.resource_id,
            %payload,
            "Audit event"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            target: "optionpool::notify",
            user_id = %notification.user_id,
            kind = ?notification.kind,
            related_entity_id = %notification.related_entity_id,
            "Notification queued"
        );
        Ok(())
    }
}

/// Stand-in for the cap-table engine when the pool runs on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCapTable;

impl CapTable for TracingCapTable {
    fn recalculate_ownership(&self, company_id: CompanyId) -> Result<()> {
        info!(target: "optionpool::cap_table", %company_id, "Ownership recalculation requested");
        Ok(())
    }

    fn create_snapshot(&self, company_id: CompanyId, reason: &str, note: &str) -> Result<()> {
        info!(target: "optionpool::cap_table", %company_id, reason, note, "Snapshot requested");
        Ok(())
    }
}
