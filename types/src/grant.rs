//! Option grant records and their status machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{GrantId, PlanId, ShareholderId, UnknownVariant};

/// Grant lifecycle.
///
/// ```text
/// ACTIVE ──cancel──────────▶ CANCELLED
///   │ ───expire (sweep)────▶ EXPIRED
///   └────exercised == qty──▶ EXERCISED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantStatus {
    Active,
    Exercised,
    Cancelled,
    Expired,
}

impl GrantStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Exercised => "EXERCISED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Cancelled and expired grants no longer vest or exercise.
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired)
    }
}

impl fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "EXERCISED" => Ok(Self::Exercised),
            "CANCELLED" => Ok(Self::Cancelled),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(UnknownVariant::new("grant status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VestingFrequency {
    #[default]
    Monthly,
    Quarterly,
    Annually,
}

impl VestingFrequency {
    #[must_use]
    pub const fn period_months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Annually => 12,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "MONTHLY",
            Self::Quarterly => "QUARTERLY",
            Self::Annually => "ANNUALLY",
        }
    }
}

impl FromStr for VestingFrequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MONTHLY" => Ok(Self::Monthly),
            "QUARTERLY" => Ok(Self::Quarterly),
            "ANNUALLY" => Ok(Self::Annually),
            other => Err(UnknownVariant::new("vesting frequency", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionGrant {
    pub id: GrantId,
    pub plan_id: PlanId,
    pub shareholder_id: Option<ShareholderId>,
    pub employee_name: String,
    pub employee_email: String,
    pub quantity: Decimal,
    pub strike_price: Decimal,
    pub exercised: Decimal,
    pub status: GrantStatus,
    pub grant_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub cliff_months: u32,
    pub vesting_duration_months: u32,
    pub vesting_frequency: VestingFrequency,
    /// Display-only: `cliff_months / vesting_duration_months × 100`.
    pub cliff_percentage: Decimal,
    pub acceleration_on_coc: bool,
    pub terminated_at: Option<DateTime<Utc>>,
    /// Vested quantity captured when the grant left ACTIVE by cancellation
    /// or expiry.
    pub vested_at_termination: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl OptionGrant {
    /// Quantity still reserved against the pool and not yet converted.
    #[must_use]
    pub fn unexercised(&self) -> Decimal {
        (self.quantity - self.exercised).max(Decimal::ZERO)
    }
}

/// Input for grant issuance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGrant {
    pub plan_id: PlanId,
    pub shareholder_id: Option<ShareholderId>,
    pub employee_name: String,
    pub employee_email: String,
    pub quantity: Decimal,
    pub strike_price: Decimal,
    pub grant_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub cliff_months: u32,
    pub vesting_duration_months: u32,
    #[serde(default)]
    pub vesting_frequency: VestingFrequency,
    #[serde(default)]
    pub acceleration_on_coc: bool,
}
