use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DETECTION_ATTEMPTS: usize = 1;
const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 250;
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 2_000;
const DEFAULT_CONTEXT_QUEUE_CAPACITY: usize = 8;

pub const ENV_MODEL_DIR: &str = "FACERELAY_MODEL_DIR";
pub const ENV_STORE_PATH: &str = "FACERELAY_STORE_PATH";
pub const ENV_STAGING_PATH: &str = "FACERELAY_STAGING_PATH";
pub const ENV_IDLE_TIMEOUT_SECS: &str = "FACERELAY_IDLE_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "FACERELAY_REQUEST_TIMEOUT_SECS";
pub const ENV_DETECTION_ATTEMPTS: &str = "FACERELAY_DETECTION_ATTEMPTS";

/// Runtime configuration for the face relay pipeline.
///
/// All instances must be constructed via [`PipelineConfig::builder`] or [`PipelineConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    model_dir: PathBuf,
    store_path: Option<PathBuf>,
    staging_path: Option<PathBuf>,
    idle_timeout: Duration,
    request_timeout: Duration,
    detection_attempts: usize,
    retry_initial_backoff: Duration,
    retry_max_backoff: Duration,
    metrics_interval: Duration,
    context_queue_capacity: usize,
}

pub struct PipelineConfigParams {
    pub model_dir: PathBuf,
    pub store_path: Option<PathBuf>,
    pub staging_path: Option<PathBuf>,
    pub idle_timeout: Duration,
    pub request_timeout: Duration,
    pub detection_attempts: usize,
    pub retry_initial_backoff: Duration,
    pub retry_max_backoff: Duration,
    pub metrics_interval: Duration,
    pub context_queue_capacity: usize,
}

impl PipelineConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: PipelineConfigParams) -> Result<Self> {
        let PipelineConfigParams {
            model_dir,
            store_path,
            staging_path,
            idle_timeout,
            request_timeout,
            detection_attempts,
            retry_initial_backoff,
            retry_max_backoff,
            metrics_interval,
            context_queue_capacity,
        } = params;

        let config = Self {
            model_dir,
            store_path,
            staging_path,
            idle_timeout,
            request_timeout,
            detection_attempts,
            retry_initial_backoff,
            retry_max_backoff,
            metrics_interval,
            context_queue_capacity,
        };

        config.validate()?;
        Ok(config)
    }

    /// Bundled model resource location handed to the detector.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// JSON file backing the record store; the store is in memory when unset.
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// JSON file backing the fill staging slot; in memory when unset.
    pub fn staging_path(&self) -> Option<&Path> {
        self.staging_path.as_deref()
    }

    /// Time a detection context may sit without requests before tearing down.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Upper bound on one relay round trip.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// How many times the orchestrator sends a batch before giving up.
    pub fn detection_attempts(&self) -> usize {
        self.detection_attempts
    }

    pub fn retry_initial_backoff(&self) -> Duration {
        self.retry_initial_backoff
    }

    pub fn retry_max_backoff(&self) -> Duration {
        self.retry_max_backoff
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Requests that may queue for a detection context before senders wait.
    pub fn context_queue_capacity(&self) -> usize {
        self.context_queue_capacity
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.model_dir.as_os_str().is_empty() {
            bail!("model_dir cannot be empty");
        }

        ensure_not_empty_path(self.store_path.as_deref(), "store_path")?;
        ensure_not_empty_path(self.staging_path.as_deref(), "staging_path")?;

        if let (Some(store), Some(staging)) = (&self.store_path, &self.staging_path) {
            if store == staging {
                bail!("store_path and staging_path must point at different files");
            }
        }

        if self.idle_timeout.is_zero() {
            bail!("idle_timeout must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.detection_attempts == 0 {
            bail!("detection_attempts must be greater than 0");
        }

        if self.retry_initial_backoff.is_zero() {
            bail!("retry_initial_backoff must be greater than 0");
        }

        if self.retry_max_backoff < self.retry_initial_backoff {
            bail!(
                "retry_max_backoff ({}ms) must not be below retry_initial_backoff ({}ms)",
                self.retry_max_backoff.as_millis(),
                self.retry_initial_backoff.as_millis(),
            );
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.context_queue_capacity == 0 {
            bail!("context_queue_capacity must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PipelineConfigBuilder {
    model_dir: Option<PathBuf>,
    store_path: Option<PathBuf>,
    staging_path: Option<PathBuf>,
    idle_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    detection_attempts: Option<usize>,
    retry_initial_backoff: Option<Duration>,
    retry_max_backoff: Option<Duration>,
    metrics_interval: Option<Duration>,
    context_queue_capacity: Option<usize>,
}

impl PipelineConfigBuilder {
    /// Seeds a builder from `FACERELAY_*` environment variables. Unset
    /// variables keep their defaults; unparseable ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| lookup(key).map(|raw| raw.trim().to_owned()).filter(|v| !v.is_empty());
        let mut builder = Self::default();

        if let Some(dir) = value(ENV_MODEL_DIR) {
            builder = builder.model_dir(dir);
        }
        if let Some(path) = value(ENV_STORE_PATH) {
            builder = builder.store_path(path);
        }
        if let Some(path) = value(ENV_STAGING_PATH) {
            builder = builder.staging_path(path);
        }
        if let Some(raw) = value(ENV_IDLE_TIMEOUT_SECS) {
            let secs: u64 = parse_var(ENV_IDLE_TIMEOUT_SECS, &raw)?;
            builder = builder.idle_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = value(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = parse_var(ENV_REQUEST_TIMEOUT_SECS, &raw)?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = value(ENV_DETECTION_ATTEMPTS) {
            builder = builder.detection_attempts(parse_var(ENV_DETECTION_ATTEMPTS, &raw)?);
        }

        Ok(builder)
    }

    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn staging_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_path = Some(path.into());
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn detection_attempts(mut self, attempts: usize) -> Self {
        self.detection_attempts = Some(attempts);
        self
    }

    pub fn retry_initial_backoff(mut self, backoff: Duration) -> Self {
        self.retry_initial_backoff = Some(backoff);
        self
    }

    pub fn retry_max_backoff(mut self, backoff: Duration) -> Self {
        self.retry_max_backoff = Some(backoff);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn context_queue_capacity(mut self, capacity: usize) -> Self {
        self.context_queue_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let params = PipelineConfigParams {
            model_dir: self.model_dir.context("model_dir is required")?,
            store_path: self.store_path,
            staging_path: self.staging_path,
            idle_timeout: self
                .idle_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            detection_attempts: self
                .detection_attempts
                .unwrap_or(DEFAULT_DETECTION_ATTEMPTS),
            retry_initial_backoff: self
                .retry_initial_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_RETRY_INITIAL_BACKOFF_MS)),
            retry_max_backoff: self
                .retry_max_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_RETRY_MAX_BACKOFF_MS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            context_queue_capacity: self
                .context_queue_capacity
                .unwrap_or(DEFAULT_CONTEXT_QUEUE_CAPACITY),
        };

        PipelineConfig::new(params)
    }
}

fn ensure_not_empty_path(path: Option<&Path>, field: &str) -> Result<()> {
    if path.is_some_and(|path| path.as_os_str().is_empty()) {
        bail!("{field} cannot be empty when set");
    }
    Ok(())
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}"))
}
