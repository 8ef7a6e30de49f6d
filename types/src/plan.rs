//! Option plan records: the pool ceiling every grant draws against.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CompanyId, PlanId, ShareClassId, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Active,
    Closed,
}

impl PlanStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "CLOSED" => Ok(Self::Closed),
            other => Err(UnknownVariant::new("plan status", other)),
        }
    }
}

/// What happens to a grantee's unvested options when employment ends.
///
/// Recorded on the plan for display and downstream reporting; vesting itself
/// always freezes at the termination instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationPolicy {
    #[default]
    Forfeiture,
    Acceleration,
    ProRata,
}

impl TerminationPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forfeiture => "FORFEITURE",
            Self::Acceleration => "ACCELERATION",
            Self::ProRata => "PRO_RATA",
        }
    }
}

impl FromStr for TerminationPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FORFEITURE" => Ok(Self::Forfeiture),
            "ACCELERATION" => Ok(Self::Acceleration),
            "PRO_RATA" => Ok(Self::ProRata),
            other => Err(UnknownVariant::new("termination policy", other)),
        }
    }
}

/// Persisted plan row. `total_granted`/`total_exercised` are the running
/// counters maintained by grant and exercise transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionPlan {
    pub id: PlanId,
    pub company_id: CompanyId,
    pub share_class_id: ShareClassId,
    pub name: String,
    pub total_pool_size: Decimal,
    pub total_granted: Decimal,
    pub total_exercised: Decimal,
    pub status: PlanStatus,
    pub termination_policy: TerminationPolicy,
    pub exercise_window_days: u32,
    pub board_approval_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl OptionPlan {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }
}

/// Input for plan creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    pub company_id: CompanyId,
    pub share_class_id: ShareClassId,
    pub name: String,
    pub total_pool_size: Decimal,
    #[serde(default)]
    pub termination_policy: TerminationPolicy,
    /// Falls back to the configured default window when absent.
    pub exercise_window_days: Option<u32>,
    pub board_approval_date: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub total_pool_size: Option<Decimal>,
    pub termination_policy: Option<TerminationPolicy>,
    pub exercise_window_days: Option<u32>,
    pub board_approval_date: Option<DateTime<Utc>>,
}

/// Read model for a plan with totals derived from its live grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    #[serde(flatten)]
    pub plan: OptionPlan,
    pub options_available: Decimal,
    pub grant_count: u64,
}
