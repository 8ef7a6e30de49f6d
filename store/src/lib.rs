//! Durable state for the option pool.
//!
//! ```text
//! PoolStore
//! ├── read(|Reader| ..)        deferred transaction, consistent snapshot
//! └── write(|UnitOfWork| ..)   BEGIN IMMEDIATE, all-or-nothing
//!
//! Reader / UnitOfWork methods are grouped by table family:
//! directory (companies, share classes, shareholders, members),
//! plans, grants, exercises, ledger (holdings, issued totals)
//! ```

#![allow(clippy::missing_errors_doc)]

mod directory;
mod exercises;
mod grants;
mod ledger;
mod plans;
mod sqlite_util;
mod store;

pub use directory::{
    CompanyRecord, CompanyStatus, MemberRole, ShareClassRecord, ShareholderRecord,
};
pub use exercises::ExerciseInsert;
pub use plans::PoolUsage;
pub use store::{PoolStore, Reader, UnitOfWork};
