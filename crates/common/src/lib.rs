//! Stepcast Common Utilities
//!
//! Shared infrastructure for all Stepcast crates:
//! - Error taxonomy and result alias
//! - Finalization and application configuration
//! - Tracing/logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
