//! Core logic for pgmgr.
//!
//! This crate contains the migration and snapshot algorithms with ZERO database
//! driver dependencies. Everything that touches a live server sits behind a port
//! trait implemented elsewhere (`pgmgr-db`) or by in-memory fakes in tests.
//!
//! # Modules
//!
//! - `migration` - Migration file discovery, creation, and the apply/rollback executor
//! - `snapshot` - Database create/drop and dump/load through external client utilities

pub mod migration;
pub mod snapshot;
