//! Shared types, errors, and configuration for pgmgr.
//!
//! This crate provides common types used across all other crates:
//! - Migration version identifiers
//! - Application-wide error taxonomy
//! - Layered configuration resolution

pub mod config;
pub mod error;
pub mod types;

pub use config::{ArgSource, Config, ConfigError, StaticArgs, load_config};
pub use error::{PgmgrError, PgmgrResult};
pub use types::Version;
