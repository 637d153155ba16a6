//! In-memory directory tree of a mount.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::context::{MountContext, StorageFile, StorageFileLayout};
use crate::error::VfsError;

/// Inode of the mount root.
pub const ROOT_INODE: u64 = 1;

/// What an inode is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File { object_id: String },
}

/// One directory or file of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub ino: u64,
    pub parent: u64,
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    pub mtime: SystemTime,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Object backing a file node.
    pub fn object_id(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { object_id } => Some(object_id),
            NodeKind::Directory => None,
        }
    }
}

/// Immutable tree built once per mount.
#[derive(Debug)]
pub struct FileTree {
    /// Node of inode `n` lives at index `n - 1`.
    nodes: Vec<Node>,
    children: HashMap<u64, BTreeMap<String, u64>>,
}

fn to_system_time(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}

/// Path components cannot contain separators.
fn sanitize(name: &str) -> String {
    name.replace('/', "_")
}

impl FileTree {
    /// Build the tree for `context` using its layout.
    pub fn build(context: &MountContext) -> Self {
        let mut tree: FileTree = FileTree {
            nodes: vec![Node {
                ino: ROOT_INODE,
                parent: ROOT_INODE,
                name: String::new(),
                kind: NodeKind::Directory,
                size: 0,
                mtime: UNIX_EPOCH,
            }],
            children: HashMap::from([(ROOT_INODE, BTreeMap::new())]),
        };

        match context.layout() {
            StorageFileLayout::ObjectId => {
                for file in context.files() {
                    let name: String = sanitize(&file.object_id);
                    tree.add_file(ROOT_INODE, name, &file);
                }
            }
            StorageFileLayout::Bundle => {
                let mut orphans: usize = 0;
                for file in context.files() {
                    let gnos_id: Option<&str> =
                        file.gnos_id.as_deref().filter(|g| !g.trim().is_empty());
                    let Some(gnos_id) = gnos_id else {
                        debug!("Object {} has no bundle id, not shown", file.object_id);
                        orphans += 1;
                        continue;
                    };
                    let dir: u64 = tree.directory(ROOT_INODE, &sanitize(gnos_id));
                    let mut name: String = sanitize(&file.file_name);
                    if tree.child(dir, &name).is_some() {
                        name = format!("{}.{}", name, file.object_id);
                    }
                    tree.add_file(dir, name, &file);
                }
                if orphans > 0 {
                    warn!("{} objects without a bundle omitted from bundle layout", orphans);
                }
            }
        }

        debug!("Built tree with {} nodes", tree.nodes.len());
        tree
    }

    fn push(&mut self, parent: u64, name: String, kind: NodeKind, size: u64, mtime: SystemTime) -> u64 {
        let ino: u64 = self.nodes.len() as u64 + 1;
        if kind == NodeKind::Directory {
            self.children.insert(ino, BTreeMap::new());
        }
        self.children.entry(parent).or_default().insert(name.clone(), ino);
        self.nodes.push(Node {
            ino,
            parent,
            name,
            kind,
            size,
            mtime,
        });
        ino
    }

    /// Existing or new directory `name` under `parent`.
    fn directory(&mut self, parent: u64, name: &str) -> u64 {
        match self.child(parent, name) {
            Some(ino) => ino,
            None => self.push(parent, name.to_string(), NodeKind::Directory, 0, UNIX_EPOCH),
        }
    }

    fn add_file(&mut self, parent: u64, name: String, file: &StorageFile) {
        let mtime: SystemTime = to_system_time(file.last_modified);
        let kind: NodeKind = NodeKind::File {
            object_id: file.object_id.clone(),
        };
        self.push(parent, name, kind, file.size, mtime);

        // Directories carry the newest mtime below them.
        let mut ino: u64 = parent;
        loop {
            let node: &mut Node = &mut self.nodes[(ino - 1) as usize];
            if node.mtime < mtime {
                node.mtime = mtime;
            }
            if ino == ROOT_INODE {
                break;
            }
            ino = node.parent;
        }
    }

    fn child(&self, parent: u64, name: &str) -> Option<u64> {
        self.children.get(&parent)?.get(name).copied()
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn get(&self, ino: u64) -> Option<&Node> {
        let index: usize = usize::try_from(ino).ok()?.checked_sub(1)?;
        self.nodes.get(index)
    }

    pub fn lookup_child(&self, parent: u64, name: &str) -> Option<&Node> {
        self.child(parent, name).and_then(|ino| self.get(ino))
    }

    /// Resolve a `/`-separated path relative to the root.
    pub fn lookup_path(&self, path: &str) -> Option<&Node> {
        let mut node: &Node = self.get(ROOT_INODE)?;
        for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            node = if component == ".." {
                self.get(node.parent)?
            } else {
                self.lookup_child(node.ino, component)?
            };
        }
        Some(node)
    }

    /// Children of a directory, in name order.
    pub fn children(&self, ino: u64) -> Result<Vec<&Node>, VfsError> {
        let node: &Node = self.get(ino).ok_or(VfsError::InodeNotFound(ino))?;
        if !node.is_dir() {
            return Err(VfsError::NotADirectory(ino));
        }
        Ok(self
            .children
            .get(&ino)
            .map(|entries| entries.values().filter_map(|&c| self.get(c)).collect())
            .unwrap_or_default())
    }
}
