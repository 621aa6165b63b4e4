use anyhow::{Context, Result};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    delivery::{DeliverySink, Upload},
    rcon::ServerStatus,
    tickrate::DropContext,
    verbose,
};

use super::compress::{compress_file, COMPRESSED_EXTENSION};
use super::guard::{remove_capture, DeletionGuard};
use super::path::{resolve, CapturePath};

/// A capture that ended, as handed over by the session controller.
#[derive(Debug, Clone)]
pub struct ArtifactJob {
    pub raw_file_path: String,
    /// Present when the capture was stopped because of a tick-rate drop.
    pub drop: Option<DropContext>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The announced path could not be resolved; nothing was touched.
    Unresolved,
    /// Retention policy removed the file without delivering it.
    Discarded { path: PathBuf },
    Delivered { path: PathBuf },
    DeliveryFailed { path: PathBuf },
}

impl PipelineOutcome {
    pub fn capture_path(&self) -> Option<&Path> {
        match self {
            PipelineOutcome::Unresolved => None,
            PipelineOutcome::Discarded { path }
            | PipelineOutcome::Delivered { path }
            | PipelineOutcome::DeliveryFailed { path } => Some(path),
        }
    }
}

/// Deliverable form of a finished capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub source_path: PathBuf,
    pub display_name: String,
    pub compressed: bool,
    pub annotation: Option<String>,
}

impl Artifact {
    pub fn new(
        capture: &CapturePath,
        layer: Option<&str>,
        compressed: bool,
        drop: Option<&DropContext>,
    ) -> Self {
        let mut display_name = match layer {
            Some(layer) => format!("{layer}_{}", capture.file_name),
            None => capture.file_name.clone(),
        };
        if compressed {
            display_name.push_str(COMPRESSED_EXTENSION);
        }

        Self {
            source_path: capture.storage_path.clone(),
            display_name,
            compressed,
            annotation: drop.map(drop_banner),
        }
    }
}

fn drop_banner(drop: &DropContext) -> String {
    format!(
        "**:warning: TICK RATE DROP DETECTED :warning:** {:.1} TPS (recent {:.1} vs {:.1})",
        drop.tick_rate, drop.short_average, drop.long_average
    )
}

struct PipelineInner {
    base_dir: PathBuf,
    compress: bool,
    retain_only_on_drop: bool,
    sink: Arc<dyn DeliverySink>,
    status: Arc<dyn ServerStatus>,
    guard: DeletionGuard,
}

/// Turns an ended capture into a delivered artifact and removes the local
/// file. Failures are logged, never returned.
#[derive(Clone)]
pub struct ArtifactPipeline {
    inner: Arc<PipelineInner>,
}

impl ArtifactPipeline {
    pub fn new(
        base_dir: PathBuf,
        compress: bool,
        retain_only_on_drop: bool,
        sink: Arc<dyn DeliverySink>,
        status: Arc<dyn ServerStatus>,
        guard: DeletionGuard,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                base_dir,
                compress,
                retain_only_on_drop,
                sink,
                status,
                guard,
            }),
        }
    }

    pub fn guard(&self) -> &DeletionGuard {
        &self.inner.guard
    }

    pub async fn handle_ended(&self, job: ArtifactJob) -> PipelineOutcome {
        let inner = &self.inner;
        let capture = match resolve(&inner.base_dir, &job.raw_file_path) {
            Ok(capture) => capture,
            Err(err) => {
                warn!("Ignoring ended capture: {err:#}");
                return PipelineOutcome::Unresolved;
            }
        };
        let path = capture.storage_path.clone();
        verbose!(1, "CSV profiler ended: {}", path.display());

        if job.drop.is_none() && inner.retain_only_on_drop {
            verbose!(1, "No drop recorded, discarding {}", capture.file_name);
            inner.guard.cleanup(&path).await;
            return PipelineOutcome::Discarded { path };
        }

        let layer = inner.status.current_layer().await;
        let artifact = Artifact::new(&capture, layer.as_deref(), inner.compress, job.drop.as_ref());

        let delivered = match self.deliver(&artifact).await {
            Ok(()) => {
                info!(
                    "Delivered {} via {}",
                    artifact.display_name,
                    inner.sink.name()
                );
                true
            }
            Err(err) => {
                error!("Could not deliver {}: {err:#}", artifact.display_name);
                false
            }
        };

        // The drop path owns its file outright; everything else goes through
        // the protected cleanup.
        if job.drop.is_some() {
            remove_capture(&path).await;
        } else {
            inner.guard.cleanup(&path).await;
        }

        if delivered {
            PipelineOutcome::Delivered { path }
        } else {
            PipelineOutcome::DeliveryFailed { path }
        }
    }

    async fn deliver(&self, artifact: &Artifact) -> Result<()> {
        verbose!(1, "Processing file {}", artifact.display_name);
        let source = artifact.source_path.clone();
        let bytes = if artifact.compressed {
            tokio::task::spawn_blocking(move || compress_file(&source))
                .await
                .context("compression task failed")??
        } else {
            tokio::fs::read(&source)
                .await
                .with_context(|| format!("Failed to read {}", source.display()))?
        };

        self.inner
            .sink
            .deliver(Upload {
                file_name: artifact.display_name.clone(),
                bytes,
                content: artifact.annotation.clone(),
            })
            .await
    }
}
