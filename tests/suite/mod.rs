//! Integration test suite modules

mod concurrency;
mod invariants;
mod scenarios;
mod sweep;
