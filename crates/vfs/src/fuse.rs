//! FUSE binding for the read-only filesystem.

#[cfg(feature = "fuse")]
mod impl_fuse {
    use std::ffi::OsStr;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    use fuser::{
        BackgroundSession, FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData,
        ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, Request,
    };
    use tokio::runtime::Handle;
    use tracing::{debug, error};

    use crate::driver::{MountDriver, MountHandle};
    use crate::error::VfsError;
    use crate::fs::VirtualFileSystem;
    use crate::options::MountOptions;
    use crate::tree::Node;

    /// `fuser::Filesystem` over a [`VirtualFileSystem`].
    pub struct FuseAdapter {
        vfs: Arc<VirtualFileSystem>,
        /// Runtime the network reads run on.
        runtime: Handle,
        next_handle: AtomicU64,
    }

    impl FuseAdapter {
        pub fn new(vfs: Arc<VirtualFileSystem>, runtime: Handle) -> Self {
            Self {
                vfs,
                runtime,
                next_handle: AtomicU64::new(1),
            }
        }

        fn to_file_attr(node: &Node) -> FileAttr {
            let kind: FileType = if node.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };

            FileAttr {
                ino: node.ino,
                size: node.size,
                blocks: node.size.div_ceil(512),
                atime: node.mtime,
                mtime: node.mtime,
                ctime: node.mtime,
                crtime: UNIX_EPOCH,
                kind,
                perm: if node.is_dir() { 0o555 } else { 0o444 },
                nlink: if node.is_dir() { 2 } else { 1 },
                uid: unsafe { libc::getuid() },
                gid: unsafe { libc::getgid() },
                rdev: 0,
                blksize: 512,
                flags: 0,
            }
        }

        fn attr_ttl(&self) -> Duration {
            self.vfs.options().kernel_cache.attr_ttl()
        }

        fn entry_ttl(&self) -> Duration {
            self.vfs.options().kernel_cache.entry_ttl()
        }
    }

    impl Filesystem for FuseAdapter {
        fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
            let Some(name) = name.to_str() else {
                reply.error(libc::ENOENT);
                return;
            };
            match self.vfs.lookup_child(parent, name) {
                Ok(node) => reply.entry(&self.entry_ttl(), &Self::to_file_attr(&node), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
            match self.vfs.getattr(ino) {
                Ok(node) => reply.attr(&self.attr_ttl(), &Self::to_file_attr(&node)),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn readdir(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            let (dir, children) = match (self.vfs.getattr(ino), self.vfs.readdir(ino)) {
                (Ok(dir), Ok(children)) => (dir, children),
                (Err(e), _) | (_, Err(e)) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let mut entries: Vec<(u64, FileType, String)> = vec![
                (ino, FileType::Directory, ".".to_string()),
                (dir.parent, FileType::Directory, "..".to_string()),
            ];
            for child in children {
                let kind: FileType = if child.is_dir() {
                    FileType::Directory
                } else {
                    FileType::RegularFile
                };
                entries.push((child.ino, kind, child.name));
            }

            for (i, (e_ino, kind, name)) in entries.iter().enumerate().skip(offset.max(0) as usize) {
                if reply.add(*e_ino, (i + 1) as i64, *kind, name) {
                    break;
                }
            }
            reply.ok();
        }

        fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
            if flags & libc::O_ACCMODE != libc::O_RDONLY || flags & libc::O_TRUNC != 0 {
                reply.error(libc::EROFS);
                return;
            }
            match self.vfs.getattr(ino) {
                Ok(node) if node.is_dir() => reply.error(libc::EISDIR),
                Ok(_) => {
                    let fh: u64 = self.next_handle.fetch_add(1, Ordering::SeqCst);
                    reply.opened(fh, 0);
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn read(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            size: u32,
            _flags: i32,
            _lock: Option<u64>,
            reply: ReplyData,
        ) {
            if offset < 0 {
                reply.error(libc::EINVAL);
                return;
            }
            let vfs: Arc<VirtualFileSystem> = self.vfs.clone();
            self.runtime.spawn(async move {
                match vfs.read(ino, offset as u64, size).await {
                    Ok(data) => reply.data(&data),
                    Err(e) => {
                        error!("Read of inode {} failed: {}", ino, e);
                        reply.error(e.errno());
                    }
                }
            });
        }

        fn release(
            &mut self,
            _req: &Request,
            _ino: u64,
            _fh: u64,
            _flags: i32,
            _lock: Option<u64>,
            _flush: bool,
            reply: ReplyEmpty,
        ) {
            reply.ok();
        }
    }

    /// Convert merged mount options to fuser options.
    pub fn fuse_mount_options(options: &MountOptions) -> Vec<MountOption> {
        options
            .iter()
            .map(|(key, value)| match (key, value) {
                ("ro", None) => MountOption::RO,
                ("fsname", Some(name)) => MountOption::FSName(name.to_string()),
                ("subtype", Some(name)) => MountOption::Subtype(name.to_string()),
                ("default_permissions", None) => MountOption::DefaultPermissions,
                ("noatime", None) => MountOption::NoAtime,
                ("allow_other", None) => MountOption::AllowOther,
                ("allow_root", None) => MountOption::AllowRoot,
                ("auto_unmount", None) => MountOption::AutoUnmount,
                (key, Some(value)) => MountOption::CUSTOM(format!("{}={}", key, value)),
                (key, None) => MountOption::CUSTOM(key.to_string()),
            })
            .collect()
    }

    /// Mounts through `fuser::spawn_mount2` on a background thread.
    #[derive(Debug, Default)]
    pub struct FuseDriver;

    impl FuseDriver {
        pub fn new() -> Self {
            Self
        }
    }

    impl MountDriver for FuseDriver {
        fn mount(
            &self,
            vfs: Arc<VirtualFileSystem>,
            mount_point: &Path,
            options: &MountOptions,
        ) -> Result<Box<dyn MountHandle>, VfsError> {
            let runtime: Handle = Handle::try_current()
                .map_err(|e| VfsError::MountFailed(format!("No tokio runtime: {}", e)))?;

            debug!("Mounting {} with options {}", mount_point.display(), options);
            let session: BackgroundSession = fuser::spawn_mount2(
                FuseAdapter::new(vfs, runtime),
                mount_point,
                &fuse_mount_options(options),
            )
            .map_err(|e| VfsError::MountFailed(e.to_string()))?;

            Ok(Box::new(FuseHandle { session }))
        }
    }

    struct FuseHandle {
        session: BackgroundSession,
    }

    impl MountHandle for FuseHandle {
        fn unmount(self: Box<Self>) -> Result<(), VfsError> {
            self.session.join();
            Ok(())
        }
    }

}

#[cfg(feature = "fuse")]
pub use impl_fuse::{fuse_mount_options, FuseAdapter, FuseDriver};
