//! Mount orchestration for the score virtual filesystem.
//!
//! Validates the mount point, indexes storage, applies the manifest, checks
//! access and serves the filesystem until shutdown.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod report;
pub mod target;

pub use config::MountConfig;
pub use error::MountError;
pub use lifecycle::{MountLifecycle, MountOutcome};
pub use report::{report_mount_view, MountSummary, MountView};
pub use target::validate_mount_target;
