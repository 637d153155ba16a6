//! Read-only filesystem operations over a mount context.

use std::sync::{Arc, OnceLock};

use score_storage::ByteRange;

use crate::context::MountContext;
use crate::error::VfsError;
use crate::options::VfsOptions;
use crate::reader::ObjectReader;
use crate::tree::{FileTree, Node};

/// Filesystem view of a [`MountContext`].
///
/// Every operation takes `&self` and may run concurrently. The directory
/// tree is built on first use and never changes afterwards.
pub struct VirtualFileSystem {
    context: Arc<MountContext>,
    reader: ObjectReader,
    options: VfsOptions,
    tree: OnceLock<FileTree>,
}

impl VirtualFileSystem {
    /// Create a filesystem.
    ///
    /// # Arguments
    /// * `context` - Objects, metadata and the read transport to expose
    /// * `options` - Cache, read and mount options
    pub fn new(context: Arc<MountContext>, options: VfsOptions) -> Self {
        let reader: ObjectReader = ObjectReader::new(context.clone(), options.read.clone());
        Self {
            context,
            reader,
            options,
            tree: OnceLock::new(),
        }
    }

    pub fn context(&self) -> &Arc<MountContext> {
        &self.context
    }

    pub fn options(&self) -> &VfsOptions {
        &self.options
    }

    /// The directory tree, built on first call.
    pub fn tree(&self) -> &FileTree {
        self.tree.get_or_init(|| FileTree::build(&self.context))
    }

    /// Resolve a path relative to the mount root.
    pub fn lookup(&self, path: &str) -> Option<Node> {
        self.tree().lookup_path(path).cloned()
    }

    pub fn lookup_child(&self, parent: u64, name: &str) -> Result<Node, VfsError> {
        let tree: &FileTree = self.tree();
        let dir: &Node = tree.get(parent).ok_or(VfsError::InodeNotFound(parent))?;
        if !dir.is_dir() {
            return Err(VfsError::NotADirectory(parent));
        }
        tree.lookup_child(parent, name)
            .cloned()
            .ok_or(VfsError::InodeNotFound(parent))
    }

    pub fn getattr(&self, ino: u64) -> Result<Node, VfsError> {
        self.tree().get(ino).cloned().ok_or(VfsError::InodeNotFound(ino))
    }

    /// Children of a directory, in name order.
    pub fn readdir(&self, ino: u64) -> Result<Vec<Node>, VfsError> {
        Ok(self.tree().children(ino)?.into_iter().cloned().collect())
    }

    /// Read up to `size` bytes of a file starting at `offset`.
    pub async fn read(&self, ino: u64, offset: u64, size: u32) -> Result<Vec<u8>, VfsError> {
        let node: &Node = self.tree().get(ino).ok_or(VfsError::InodeNotFound(ino))?;
        let object_id: &str = node.object_id().ok_or(VfsError::NotAFile(ino))?;
        self.read_object(object_id, ByteRange::with_len(offset, u64::from(size)))
            .await
    }

    /// Read a range of a mounted object by id.
    pub async fn read_object(&self, object_id: &str, range: ByteRange) -> Result<Vec<u8>, VfsError> {
        self.reader.read(object_id, range).await
    }
}
