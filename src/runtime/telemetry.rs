use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters shared by the orchestrator, the detection contexts and
/// the lifecycle manager.
#[derive(Default, Debug)]
pub struct Telemetry {
    cycles_completed: AtomicU64,
    extraction_misses: AtomicU64,
    detection_failures: AtomicU64,
    faces_detected: AtomicU64,
    images_failed: AtomicU64,
    contexts_created: AtomicU64,
    context_teardowns: AtomicU64,
}

impl Telemetry {
    pub fn record_cycle_completed(&self, faces: usize) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.faces_detected
            .fetch_add(faces as u64, Ordering::Relaxed);
    }

    pub fn record_extraction_miss(&self) {
        self.extraction_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection_failure(&self) {
        self.detection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_image_failed(&self) {
        self.images_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_context_created(&self) {
        self.contexts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_context_teardown(&self) {
        self.context_teardowns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            extraction_misses: self.extraction_misses.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            faces_detected: self.faces_detected.load(Ordering::Relaxed),
            images_failed: self.images_failed.load(Ordering::Relaxed),
            contexts_created: self.contexts_created.load(Ordering::Relaxed),
            context_teardowns: self.context_teardowns.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub cycles_completed: u64,
    pub extraction_misses: u64,
    pub detection_failures: u64,
    pub faces_detected: u64,
    pub images_failed: u64,
    pub contexts_created: u64,
    pub context_teardowns: u64,
}

impl TelemetrySnapshot {
    /// Contexts that were created and have not torn down yet.
    pub fn live_contexts(&self) -> u64 {
        self.contexts_created.saturating_sub(self.context_teardowns)
    }
}

/// Spawns a background task that periodically logs cycle throughput, detection
/// failures and context churn.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "facerelay::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let cycles_delta = current
                        .cycles_completed
                        .saturating_sub(last_snapshot.cycles_completed);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let cycles_per_min = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        cycles_delta as f64 * 60.0 / elapsed
                    };

                    tracing::info!(
                        target: "facerelay::metrics",
                        cycles_per_min = format!("{cycles_per_min:.2}"),
                        cycles = current.cycles_completed,
                        faces = current.faces_detected,
                        extraction_misses = current.extraction_misses,
                        detection_failures = current.detection_failures,
                        images_failed = current.images_failed,
                        live_contexts = current.live_contexts(),
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
