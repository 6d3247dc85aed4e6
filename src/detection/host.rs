use super::context::{spawn_context, ContextHandle, ContextSettings};
use super::primitive::DetectorFactory;
use super::worker::DetectionWorker;
use crate::runtime::config::PipelineConfig;
use crate::runtime::telemetry::Telemetry;
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Host environment able to create detection contexts.
///
/// Only the lifecycle manager calls this; everything else goes through it.
pub trait ContextHost: Send + Sync + 'static {
    fn create_context(&self) -> BoxFuture<'_, Result<ContextHandle>>;
}

/// Hosts each detection context as a task on the current tokio runtime.
pub struct TaskHost {
    factory: Arc<dyn DetectorFactory>,
    model_dir: PathBuf,
    idle_timeout: Duration,
    queue_capacity: usize,
    telemetry: Arc<Telemetry>,
    next_id: AtomicU64,
}

impl TaskHost {
    pub fn new(
        factory: Arc<dyn DetectorFactory>,
        model_dir: impl Into<PathBuf>,
        idle_timeout: Duration,
        queue_capacity: usize,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            factory,
            model_dir: model_dir.into(),
            idle_timeout,
            queue_capacity,
            telemetry,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        factory: Arc<dyn DetectorFactory>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self::new(
            factory,
            config.model_dir(),
            config.idle_timeout(),
            config.context_queue_capacity(),
            telemetry,
        )
    }

    async fn spawn(&self) -> Result<ContextHandle> {
        // Refuse early: a context without its bundled models could never answer.
        let metadata = tokio::fs::metadata(&self.model_dir)
            .await
            .with_context(|| format!("model directory {} is unavailable", self.model_dir.display()))?;
        if !metadata.is_dir() {
            bail!("model path {} is not a directory", self.model_dir.display());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let worker = DetectionWorker::new(
            self.factory.create(),
            self.model_dir.clone(),
            Arc::clone(&self.telemetry),
        );
        let settings = ContextSettings {
            id,
            idle_timeout: self.idle_timeout,
            queue_capacity: self.queue_capacity,
        };

        Ok(spawn_context(settings, worker, Arc::clone(&self.telemetry)))
    }
}

impl ContextHost for TaskHost {
    fn create_context(&self) -> BoxFuture<'_, Result<ContextHandle>> {
        Box::pin(self.spawn())
    }
}
