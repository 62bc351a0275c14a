//! countysync - a local, queryable replica of county-level rolling averages
//!
//! This crate provides:
//! - Change detection against the upstream repository's commit history
//! - Conditional download and tolerant CSV parsing of tracked files
//! - Idempotent upserts into a SQLite replica, one transaction per file
//! - Region queries that wait for the current sync pass to finish

pub mod commands;
pub mod config;
pub mod error;
pub mod meta;
pub mod models;
pub mod parse;
pub mod progress;
pub mod query;
pub mod sync;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
pub use meta::SyncStore;
pub use query::QueryService;
pub use sync::SyncCoordinator;
