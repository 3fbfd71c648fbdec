//! Common types used across the application.

pub mod version;

pub use version::Version;
