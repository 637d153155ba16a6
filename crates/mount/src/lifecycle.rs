//! End-to-end mount orchestration.
//!
//! ```text
//! validate target -> index -> filter -> authorize -> report -> mount
//!     -> wait for shutdown -> unmount -> summary
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use score_storage::{
    Entity, ManifestFilter, MetadataIndex, ObjectInfo, PresignedUrlValidator, RangeFetcher,
    StorageBackend,
};
use score_vfs::{
    MountContext, MountDriver, MountHandle, MountOptions, MountSession, MountState, VfsError,
    VirtualFileSystem,
};
use tracing::{debug, error, info, warn};

use crate::config::MountConfig;
use crate::error::MountError;
use crate::report::{report_mount_view, MountSummary};
use crate::target::validate_mount_target;

/// How a mount run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    /// The caller may not read the objects. Nothing was mounted.
    AccessDenied,
    /// Mounted, then shut down.
    Completed(MountSummary),
}

/// Drives one mount from validation to shutdown.
pub struct MountLifecycle {
    config: MountConfig,
    index: MetadataIndex,
    backend: Arc<dyn StorageBackend>,
    validator: Arc<dyn PresignedUrlValidator>,
    fetcher: Arc<dyn RangeFetcher>,
    driver: Arc<dyn MountDriver>,
    session: MountSession,
}

impl MountLifecycle {
    /// Create a lifecycle.
    ///
    /// # Arguments
    /// * `config` - Mount point, layout, manifest and options
    /// * `index` - Resolves entity and object listings
    /// * `backend` - Issues read URLs
    /// * `validator` - Checks every URL before use
    /// * `fetcher` - Performs ranged reads
    /// * `driver` - Attaches the filesystem to the host
    pub fn new(
        config: MountConfig,
        index: MetadataIndex,
        backend: Arc<dyn StorageBackend>,
        validator: Arc<dyn PresignedUrlValidator>,
        fetcher: Arc<dyn RangeFetcher>,
        driver: Arc<dyn MountDriver>,
    ) -> Self {
        Self {
            config,
            index,
            backend,
            validator,
            fetcher,
            driver,
            session: MountSession::new(),
        }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn session(&self) -> &MountSession {
        &self.session
    }

    /// Mount, serve until `shutdown` resolves, then unmount.
    ///
    /// # Returns
    /// `AccessDenied` when the access check fails, otherwise the
    /// session summary. Shutdown is a normal completion.
    pub async fn run<F>(&self, shutdown: F) -> Result<MountOutcome, MountError>
    where
        F: Future<Output = ()>,
    {
        validate_mount_target(&self.config.mount_point)?;

        let context: Arc<MountContext> = Arc::new(self.build_context().await?);

        self.session.begin_mount()?;
        if !context.is_authorized().await {
            self.session.mount_aborted()?;
            warn!(
                "Access denied to the requested objects, not mounting {}",
                self.config.mount_point.display()
            );
            return Ok(MountOutcome::AccessDenied);
        }

        report_mount_view(&context);

        let options: MountOptions = MountOptions::merge(&self.config.vfs.mount);
        let vfs: Arc<VirtualFileSystem> =
            Arc::new(VirtualFileSystem::new(context.clone(), self.config.vfs.clone()));
        let handle: Box<dyn MountHandle> =
            match self.driver.mount(vfs, &self.config.mount_point, &options) {
                Ok(handle) => handle,
                Err(e) => {
                    self.session.mount_aborted()?;
                    return Err(e.into());
                }
            };
        self.session.mount_succeeded()?;
        let mounted_at: Instant = Instant::now();
        info!(
            "Mounted {} ({} layout); interrupt to unmount",
            self.config.mount_point.display(),
            self.config.layout
        );

        shutdown.await;

        let summary: MountSummary = self.unmount(handle, mounted_at, &context)?;
        Ok(MountOutcome::Completed(summary))
    }

    /// [`run`](Self::run) until Ctrl-C or, on unix, SIGTERM.
    pub async fn run_until_interrupted(&self) -> Result<MountOutcome, MountError> {
        self.run(wait_for_interrupt()).await
    }

    async fn build_context(&self) -> Result<MountContext, MountError> {
        info!("Indexing storage");
        let entities: Vec<Entity> = self.index.resolve_entities().await?;
        let objects: Vec<ObjectInfo> = self.index.resolve_objects().await?;
        debug!("Indexed {} entities and {} objects", entities.len(), objects.len());

        let filter: ManifestFilter = ManifestFilter::new(self.config.manifest.as_ref());
        let missing: Vec<String> = filter.missing_ids(&objects);
        if !missing.is_empty() {
            debug!("Manifest ids not in storage: {}", missing.join(", "));
        }
        let objects: Vec<ObjectInfo> = filter.apply(objects);

        Ok(MountContext::new(
            self.config.layout,
            self.backend.clone(),
            self.validator.clone(),
            self.fetcher.clone(),
            entities,
            objects,
        ))
    }

    fn unmount(
        &self,
        handle: Box<dyn MountHandle>,
        mounted_at: Instant,
        context: &MountContext,
    ) -> Result<MountSummary, MountError> {
        if !self.session.begin_unmount() {
            return Err(VfsError::InvalidState {
                from: self.session.state(),
                to: MountState::Unmounting,
            }
            .into());
        }

        info!("Unmounting {}", self.config.mount_point.display());
        let unmounted: Result<(), VfsError> = handle.unmount();
        let summary: MountSummary = self.session.finish_unmount(|| {
            let summary: MountSummary =
                MountSummary::new(mounted_at.elapsed(), context.metrics().snapshot());
            info!("{}", summary);
            summary
        })?;
        unmounted?;
        Ok(summary)
    }
}

/// Resolves on the first interrupt signal.
async fn wait_for_interrupt() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }

    info!("Interrupt received");
}

async fn ctrl_c() {
    signal_or_pending(tokio::signal::ctrl_c().await).await;
}

/// Resolves once a signal arrived. A listener that failed to install never
/// resolves.
async fn signal_or_pending(result: std::io::Result<()>) {
    if let Err(e) = result {
        error!("Cannot listen for interrupts, unmount externally: {}", e);
        std::future::pending::<()>().await;
    }
}
