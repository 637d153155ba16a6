//! Seam between the filesystem and the host mount mechanism.

use std::path::Path;
use std::sync::Arc;

use crate::error::VfsError;
use crate::fs::VirtualFileSystem;
use crate::options::MountOptions;

/// Attaches a [`VirtualFileSystem`] to a host directory.
pub trait MountDriver: Send + Sync {
    /// Mount `vfs` at `mount_point` and return once the mount is live.
    ///
    /// # Arguments
    /// * `vfs` - Filesystem to serve
    /// * `mount_point` - Validated, empty target directory
    /// * `options` - Merged host mount options
    fn mount(
        &self,
        vfs: Arc<VirtualFileSystem>,
        mount_point: &Path,
        options: &MountOptions,
    ) -> Result<Box<dyn MountHandle>, VfsError>;
}

/// A live mount.
pub trait MountHandle: Send {
    /// Detach the filesystem from the host.
    fn unmount(self: Box<Self>) -> Result<(), VfsError>;
}
