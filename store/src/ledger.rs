//! Capitalization-ledger writes made as part of an exercise confirmation.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use rust_decimal::Decimal;

use optionpool_types::{ShareClassId, ShareholderId};

use crate::sqlite_util::{decimal_col, decimal_to_sql, time_to_sql};
use crate::store::{Reader, UnitOfWork};

impl Reader<'_> {
    /// Shares `shareholder_id` holds in `share_class_id`, if any holding exists.
    pub fn holding(
        &self,
        shareholder_id: ShareholderId,
        share_class_id: ShareClassId,
    ) -> Result<Option<Decimal>> {
        self.conn
            .query_row(
                "SELECT quantity FROM holdings WHERE shareholder_id = ?1 AND share_class_id = ?2",
                [shareholder_id.to_string(), share_class_id.to_string()],
                |row| decimal_col(row, 0),
            )
            .optional()
            .with_context(|| {
                format!("Failed to load holding of {shareholder_id} in {share_class_id}")
            })
    }
}

impl UnitOfWork<'_> {
    /// Add `delta` to the holding, creating it when absent. Returns the new quantity.
    pub fn upsert_holding(
        &self,
        shareholder_id: ShareholderId,
        share_class_id: ShareClassId,
        delta: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Decimal> {
        let quantity = self.holding(shareholder_id, share_class_id)?.unwrap_or_default() + delta;
        self.conn()
            .execute(
                "INSERT INTO holdings (shareholder_id, share_class_id, quantity, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(shareholder_id, share_class_id)
                 DO UPDATE SET quantity = ?3, updated_at = ?4",
                params![
                    shareholder_id.to_string(),
                    share_class_id.to_string(),
                    decimal_to_sql(quantity),
                    time_to_sql(at)
                ],
            )
            .with_context(|| {
                format!("Failed to upsert holding of {shareholder_id} in {share_class_id}")
            })?;
        Ok(quantity)
    }

    pub fn increment_share_class_issued(
        &self,
        share_class_id: ShareClassId,
        delta: Decimal,
    ) -> Result<Decimal> {
        let Some(share_class) = self.share_class(share_class_id)? else {
            bail!("Share class {share_class_id} vanished during exercise confirmation");
        };
        let total = share_class.total_issued + delta;
        self.conn()
            .execute(
                "UPDATE share_classes SET total_issued = ?1 WHERE id = ?2",
                params![decimal_to_sql(total), share_class_id.to_string()],
            )
            .with_context(|| format!("Failed to update issued total of {share_class_id}"))?;
        Ok(total)
    }
}
