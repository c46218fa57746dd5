//! DRAINER: adaptive batch-submission daemon
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod gas;
pub mod ledger;
pub mod engine;
