//! # Pipewright Config
//!
//! Environment-aware configuration store for Pipewright.
//!
//! This crate provides:
//! - Durable key/value storage scoped by environment, addressed by
//!   dot-delimited paths
//! - Schema-level and semantic validation, stricter for production
//! - Append-only version history with point-in-time rollback
//! - A write-through-invalidated value cache
//! - Change propagation to watchers and a pluggable change sink

pub mod cache;
pub mod error;
pub mod manager;
pub mod store;
pub mod types;
pub mod validation;
pub mod versioning;

pub use cache::CacheStats;
pub use error::{ConfigError, Result};
pub use manager::{ConfigManager, FnChangeSink, WatchHandler};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
pub use types::{
    ChangeSink, ConfigChange, ConfigHistory, ConfigVersion, Environment, ValidationReport,
};
pub use validation::{validate_document, validate_value};
pub use versioning::VersionManager;
