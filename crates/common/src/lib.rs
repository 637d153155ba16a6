//! Shared types and utilities for the score filesystem crates.
//!
//! This crate provides common functionality used across the workspace:
//! - Transfer and part-division constants
//! - Path precondition errors for mount targets
//! - Human-readable byte and duration formatting
//! - Part digest computation

pub mod constants;
pub mod error;
pub mod format;
pub mod hash;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use format::{format_bytes, format_bytes_units, format_elapsed, format_size};
pub use hash::hash_bytes;
