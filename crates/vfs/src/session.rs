//! Mount session state machine.
//!
//! ```text
//! Unmounted -> Mounting -> Mounted -> Unmounting -> Unmounted
//!                  |
//!                  +-> Unmounted (aborted)
//! ```
//!
//! The unmount callback runs exactly once, on `Unmounting -> Unmounted`.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::VfsError;

/// Lifecycle state of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

impl fmt::Display for MountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            MountState::Unmounted => "unmounted",
            MountState::Mounting => "mounting",
            MountState::Mounted => "mounted",
            MountState::Unmounting => "unmounting",
        };
        write!(f, "{}", name)
    }
}

/// Tracks one mount through its lifecycle.
#[derive(Debug)]
pub struct MountSession {
    state: Mutex<MountState>,
}

impl Default for MountSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MountSession {
    /// New session in `Unmounted`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MountState::Unmounted),
        }
    }

    /// Current state.
    pub fn state(&self) -> MountState {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, MountState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, from: MountState, to: MountState) -> Result<(), VfsError> {
        let mut state = self.lock();
        if *state != from {
            return Err(VfsError::InvalidState { from: *state, to });
        }
        debug!("Mount session {} -> {}", from, to);
        *state = to;
        Ok(())
    }

    /// `Unmounted -> Mounting`.
    pub fn begin_mount(&self) -> Result<(), VfsError> {
        self.transition(MountState::Unmounted, MountState::Mounting)
    }

    /// `Mounting -> Mounted`.
    pub fn mount_succeeded(&self) -> Result<(), VfsError> {
        self.transition(MountState::Mounting, MountState::Mounted)
    }

    /// `Mounting -> Unmounted`, when authorization or the mount itself failed.
    pub fn mount_aborted(&self) -> Result<(), VfsError> {
        self.transition(MountState::Mounting, MountState::Unmounted)
    }

    /// `Mounted -> Unmounting`.
    ///
    /// # Returns
    /// `true` for the caller that wins the transition, `false` for every
    /// later caller.
    pub fn begin_unmount(&self) -> bool {
        self.transition(MountState::Mounted, MountState::Unmounting)
            .is_ok()
    }

    /// `Unmounting -> Unmounted`, running `on_unmounted` once.
    pub fn finish_unmount<T>(&self, on_unmounted: impl FnOnce() -> T) -> Result<T, VfsError> {
        self.transition(MountState::Unmounting, MountState::Unmounted)?;
        Ok(on_unmounted())
    }
}
