use crate::detection::{ContextHost, DetectorFactory, TaskHost};
use crate::export::records_to_csv;
use crate::fill::FormFill;
use crate::orchestrator::{CycleError, CycleReport, Extractor, Orchestrator};
use crate::record::{Record, RecordId};
use crate::relay::{ContextLifecycleManager, Relay};
use crate::runtime::config::PipelineConfig;
use crate::runtime::status::StatusIndicator;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::store::json_file::write_replacing;
use crate::store::{JsonFileStore, MemoryStore, RecordStore, StagingSlot};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wires configuration into a working pipeline and owns its background tasks.
pub struct Runner {
    config: PipelineConfig,
    orchestrator: Arc<Orchestrator>,
    lifecycle: Arc<ContextLifecycleManager>,
    relay: Arc<Relay>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    reporter: Option<JoinHandle<()>>,
    started: bool,
}

impl Runner {
    /// Builds a runner whose detection contexts run as tasks on the current
    /// runtime, each with a detector from `factory`.
    pub fn new(
        config: PipelineConfig,
        extractor: Arc<dyn Extractor>,
        factory: Arc<dyn DetectorFactory>,
    ) -> Self {
        let telemetry = Arc::new(Telemetry::default());
        let host = Arc::new(TaskHost::from_config(&config, factory, Arc::clone(&telemetry)));
        Self::with_host(config, extractor, host, telemetry)
    }

    /// Same as [`Runner::new`] with a caller-provided context host.
    pub fn with_host(
        config: PipelineConfig,
        extractor: Arc<dyn Extractor>,
        host: Arc<dyn ContextHost>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let store: Arc<dyn RecordStore> = match config.store_path() {
            Some(path) => Arc::new(JsonFileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        let staging = Arc::new(match config.staging_path() {
            Some(path) => StagingSlot::file(path),
            None => StagingSlot::in_memory(),
        });

        let lifecycle = Arc::new(ContextLifecycleManager::new(host, Arc::clone(&telemetry)));
        let relay = Arc::new(Relay::new(Arc::clone(&lifecycle), config.request_timeout()));
        let orchestrator = Orchestrator::new(extractor, store, relay.clone())
            .with_staging(staging)
            .with_telemetry(Arc::clone(&telemetry))
            .with_retry(
                config.detection_attempts(),
                config.retry_initial_backoff(),
                config.retry_max_backoff(),
            );

        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            lifecycle,
            relay,
            telemetry,
            shutdown: CancellationToken::new(),
            reporter: None,
            started: false,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn status(&self) -> &Arc<StatusIndicator> {
        self.orchestrator.status()
    }

    /// Starts background tasks. Detection contexts are created lazily by the
    /// first cycle that needs one.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.reporter = Some(spawn_metrics_reporter(
            Arc::clone(&self.telemetry),
            self.shutdown.child_token(),
            self.config.metrics_interval(),
        ));
        self.started = true;
        tracing::info!(
            model_dir = %self.config.model_dir().display(),
            idle_timeout_ms = self.config.idle_timeout().as_millis() as u64,
            detection_attempts = self.config.detection_attempts(),
            "face relay runner started"
        );
        Ok(())
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        self.orchestrator.run_cycle().await
    }

    pub async fn records(&self) -> Result<Vec<Record>> {
        self.orchestrator.records().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.orchestrator.clear().await
    }

    /// Writes a CSV summary of every stored record to `path` and returns the
    /// number of rows.
    pub async fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let records = self.records().await?;
        let payload = records_to_csv(&records)?;
        write_replacing(path, &payload).await?;
        tracing::info!(path = %path.display(), records = records.len(), "records exported");
        Ok(records.len())
    }

    pub async fn stage_for_fill(&self, id: &RecordId) -> Result<Option<Record>> {
        self.orchestrator.stage_for_fill(id).await
    }

    pub async fn take_staged(&self) -> Result<Option<Record>> {
        self.orchestrator.take_staged().await
    }

    /// Consumes the staged record, if any, and derives the form values from it.
    pub async fn take_form_fill(&self) -> Result<Option<FormFill>> {
        Ok(self
            .take_staged()
            .await?
            .map(|record| FormFill::from_record(&record)))
    }

    /// Stops background tasks and tears the detection context down.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.shutdown.cancel();
        if let Some(reporter) = self.reporter.take() {
            reporter.await.context("metrics reporter task failed")?;
        }
        self.lifecycle.teardown();
        self.started = false;
        self.shutdown = CancellationToken::new();
        tracing::info!("face relay runner stopped");
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }
}
