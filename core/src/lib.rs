//! Core domain logic for the option pool.
//!
//! Everything here is pure: no IO, no clock reads. Callers pass the instant
//! they want vesting evaluated at.

pub mod calendar;
mod vesting;

pub use vesting::{
    ScheduleEntry, ScheduleEntryKind, VestingSnapshot, calculate_vesting,
    generate_vesting_schedule,
};
