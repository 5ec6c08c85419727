//! Utilities
//!
//! Shared helpers used across the core.

pub mod error;

pub use error::{CoreError, CoreResult};
