use super::worker::{DetectionError, DetectionWorker};
use crate::record::ImageBlob;
use crate::relay::error::ProcessingError;
use crate::relay::protocol::ContextMessage;
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

/// One message plus the channel its answer travels back on.
pub(crate) struct ContextEnvelope {
    message: ContextMessage,
    reply: oneshot::Sender<ContextReply>,
}

/// What a context answers in-process. A failed batch still counts as an empty
/// crop list on the message level; the fault travels alongside it so callers
/// can tell it apart from "no faces found".
type ContextReply = Result<Vec<ImageBlob>, ContextFault>;

#[derive(Debug)]
enum ContextFault {
    Detection(DetectionError),
    /// Queued when the context shut down; never processed.
    Retired,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ContextSettings {
    pub id: u64,
    pub idle_timeout: Duration,
    pub queue_capacity: usize,
}

/// Caller-side handle to a running detection context.
///
/// Cloning the handle does not keep the context alive. It exits after
/// `idle_timeout` without requests, or when [`ContextHandle::close`] is called.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    id: u64,
    tx: mpsc::Sender<ContextEnvelope>,
    shutdown: CancellationToken,
}

impl ContextHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Existence query against the host: `false` once the context has torn down.
    pub fn is_alive(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.tx.is_closed()
    }

    /// Exactly one request/response round trip.
    ///
    /// A request the context never accepted fails with
    /// [`ProcessingError::Retired`]. One it accepted and then dropped fails
    /// with [`ProcessingError::Transport`].
    pub async fn request(
        &self,
        images: Vec<ImageBlob>,
        limit: Duration,
    ) -> Result<Vec<ImageBlob>, ProcessingError> {
        if self.shutdown.is_cancelled() {
            return Err(ProcessingError::Retired { context: self.id });
        }

        let (reply, response) = oneshot::channel();
        let envelope = ContextEnvelope {
            message: ContextMessage::offscreen_process(images),
            reply,
        };

        let exchange = async {
            self.tx
                .send(envelope)
                .await
                .map_err(|_| ProcessingError::Retired { context: self.id })?;
            let reply = response.await.map_err(|_| {
                ProcessingError::transport(format!(
                    "detection context {} closed before replying",
                    self.id
                ))
            })?;
            reply.map_err(|fault| match fault {
                ContextFault::Detection(DetectionError::ModelLoad { cause }) => {
                    ProcessingError::ModelLoad { cause }
                }
                ContextFault::Detection(err) => ProcessingError::transport(err.to_string()),
                ContextFault::Retired => ProcessingError::Retired { context: self.id },
            })
        };

        match timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ProcessingError::Timeout { after: limit }),
        }
    }

    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
enum TeardownReason {
    Idle,
    Closed,
    Disconnected,
}

impl TeardownReason {
    fn as_str(self) -> &'static str {
        match self {
            TeardownReason::Idle => "idle",
            TeardownReason::Closed => "closed",
            TeardownReason::Disconnected => "disconnected",
        }
    }
}

/// Spawns the context task on the current runtime and returns its handle.
pub(crate) fn spawn_context(
    settings: ContextSettings,
    worker: DetectionWorker,
    telemetry: Arc<Telemetry>,
) -> ContextHandle {
    let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
    let shutdown = CancellationToken::new();

    tokio::spawn(run_context(
        settings,
        worker,
        rx,
        shutdown.clone(),
        telemetry,
    ));

    ContextHandle {
        id: settings.id,
        tx,
        shutdown,
    }
}

async fn run_context(
    settings: ContextSettings,
    mut worker: DetectionWorker,
    mut rx: mpsc::Receiver<ContextEnvelope>,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
) {
    let context = settings.id;
    tracing::info!(context, "detection context started");
    let mut deadline = Instant::now() + settings.idle_timeout;

    let reason = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break TeardownReason::Closed,
            next = rx.recv() => {
                let Some(ContextEnvelope { message, reply }) = next else {
                    break TeardownReason::Disconnected;
                };
                let images = message.into_images();
                tracing::debug!(context, images = images.len(), "detection request received");

                // Teardown mid-batch drops `reply`; the caller sees a transport error.
                let answer = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break TeardownReason::Closed,
                    result = worker.process_images(&images) => result.map_err(|err| {
                        tracing::error!(context, error = %err, "detection batch failed, replying with no faces");
                        ContextFault::Detection(err)
                    }),
                };

                if reply.send(answer).is_err() {
                    tracing::debug!(context, "requester went away before the reply");
                }
                deadline = Instant::now() + settings.idle_timeout;
            }
            _ = sleep_until(deadline) => {
                // Mark the handle dead before anything else can observe it alive.
                shutdown.cancel();
                break TeardownReason::Idle;
            }
        }
    };

    shutdown.cancel();
    rx.close();
    let mut retired = 0usize;
    while let Ok(ContextEnvelope { reply, .. }) = rx.try_recv() {
        let _ = reply.send(Err(ContextFault::Retired));
        retired += 1;
    }
    if retired > 0 {
        tracing::debug!(context, retired, "returned queued requests unprocessed");
    }
    telemetry.record_context_teardown();
    tracing::info!(context, reason = reason.as_str(), "detection context torn down");
}
