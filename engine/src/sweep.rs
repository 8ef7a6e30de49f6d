//! Expiration sweep, run once a day by an external scheduler.
//!
//! Each stale grant is expired in its own unit of work, so one bad row
//! cannot hold back the rest of the batch. The ACTIVE to EXPIRED transition
//! is the only guard against double processing: a grant another run already
//! expired is skipped.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use optionpool_types::{
    AuditAction, GrantId, GrantStatus, Notification, NotificationKind, ResourceType,
};

use crate::error::EngineResult;
use crate::grants::{Release, release_grant};
use crate::{AuditRecord, OptionPool};

impl OptionPool {
    /// Expire one batch of ACTIVE grants past their expiration date.
    /// Returns how many were expired and committed.
    pub fn expire_stale_grants(&self) -> EngineResult<usize> {
        let now = self.clock.now();
        let batch = self.settings.sweep_batch_size;
        let stale = self.store.read(|r| r.stale_active_grants(now, batch))?;
        if stale.is_empty() {
            debug!("No stale option grants");
            return Ok(0);
        }

        let mut expired = 0;
        for grant_id in &stale {
            match self.expire_grant(*grant_id, now) {
                Ok(Some(release)) => {
                    expired += 1;
                    self.after_expiry(&release, now);
                }
                Ok(None) => debug!(%grant_id, "Grant no longer stale, skipping"),
                Err(err) => error!(%grant_id, "Failed to expire option grant: {err:#}"),
            }
        }
        info!(expired, examined = stale.len(), "Expiration sweep finished");
        Ok(expired)
    }

    fn expire_grant(&self, grant_id: GrantId, now: DateTime<Utc>) -> EngineResult<Option<Release>> {
        self.store.write(|uow| -> EngineResult<Option<Release>> {
            let Some(grant) = uow.grant(grant_id)? else {
                return Ok(None);
            };
            if grant.status != GrantStatus::Active || grant.expiration_date >= now {
                return Ok(None);
            }
            release_grant(uow, grant, GrantStatus::Expired, now).map(Some)
        })
    }

    fn after_expiry(&self, release: &Release, now: DateTime<Utc>) {
        let grant = &release.grant;
        let company_id = release.plan.company_id;
        info!(
            grant_id = %grant.id,
            released = %release.released,
            cancelled_exercises = release.cancelled_exercises,
            "Expired option grant"
        );

        if let Some(shareholder_id) = grant.shareholder_id {
            match self.directory.shareholder_user(shareholder_id) {
                Ok(Some(user_id)) => self.notify(Notification {
                    user_id,
                    kind: NotificationKind::OptionGrantExpired,
                    related_entity_type: ResourceType::OptionGrant,
                    related_entity_id: grant.id.to_string(),
                    company_id,
                }),
                Ok(None) => {}
                Err(err) => warn!(%shareholder_id, "Grantee lookup failed: {err:#}"),
            }
        }

        self.audit(
            AuditRecord::new(
                AuditAction::OptionGrantExpired,
                None,
                company_id,
                ResourceType::OptionGrant,
                grant.id,
            )
            .before(&json!({
                "status": release.before.status,
                "terminatedAt": release.before.terminated_at,
            }))
            .after(&json!({
                "status": grant.status,
                "terminatedAt": grant.terminated_at,
            }))
            .metadata(json!({
                "quantityReturned": release.released.normalize().to_string(),
                "vestedAtTermination": grant
                    .vested_at_termination
                    .map(|v| v.normalize().to_string()),
                "cancelledExercises": release.cancelled_exercises,
                "expirationDate": grant.expiration_date,
            }))
            .at(now),
        );
    }
}
