//! Read-only virtual filesystem over remote genomic objects.
//!
//! Mounted objects appear as local files; content is fetched on demand with
//! ranged reads against short-lived presigned URLs.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: FUSE Interface (fuser::Filesystem impl, feature "fuse")
//! Layer 2: VFS Operations (lookup, getattr, readdir, read)
//! Layer 1: Primitives (MountContext, FileTree, ObjectReader, MountSession)
//! ```

pub mod context;
pub mod driver;
pub mod error;
pub mod fs;
pub mod fuse;
pub mod options;
pub mod reader;
pub mod session;
pub mod tree;

pub use context::{
    MetricsSnapshot, MountContext, MountMetrics, StorageFile, StorageFileLayout, StorageFiles,
};
pub use driver::{MountDriver, MountHandle};
pub use error::VfsError;
pub use fs::VirtualFileSystem;
#[cfg(feature = "fuse")]
pub use fuse::{fuse_mount_options, FuseAdapter, FuseDriver};
pub use options::{KernelCacheOptions, MountOptions, ReadOptions, VfsOptions, INTERNAL_MOUNT_OPTIONS};
pub use reader::ObjectReader;
pub use session::{MountSession, MountState};
pub use tree::{FileTree, Node, NodeKind, ROOT_INODE};
