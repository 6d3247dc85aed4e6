use crate::record::ImageBlob;
use crate::relay::error::ProcessingError;
use crate::relay::lifecycle::ContextLifecycleManager;
use crate::relay::metrics::{RelayMetrics, RelayMetricsSnapshot};
use crate::relay::protocol::{RelayRequest, RelayResponse};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Sends one batch of images for face extraction and returns the crops.
pub trait FaceBatchClient: Send + Sync {
    fn process_batch<'a>(
        &'a self,
        images: &'a [ImageBlob],
    ) -> BoxFuture<'a, Result<Vec<ImageBlob>, ProcessingError>>;
}

/// Forwards batches into the detection context owned by the lifecycle manager.
pub struct Relay {
    lifecycle: Arc<ContextLifecycleManager>,
    request_timeout: Duration,
    metrics: RelayMetrics,
}

impl FaceBatchClient for Relay {
    fn process_batch<'a>(
        &'a self,
        images: &'a [ImageBlob],
    ) -> BoxFuture<'a, Result<Vec<ImageBlob>, ProcessingError>> {
        Box::pin(self.process_batch(images))
    }
}

impl Relay {
    pub fn new(lifecycle: Arc<ContextLifecycleManager>, request_timeout: Duration) -> Self {
        Self {
            lifecycle,
            request_timeout,
            metrics: RelayMetrics::default(),
        }
    }

    pub fn lifecycle(&self) -> &Arc<ContextLifecycleManager> {
        &self.lifecycle
    }

    pub fn metrics(&self) -> RelayMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// One round trip per batch: ensure a context, send, await the crops.
    /// Failures are reported, not retried.
    ///
    /// A context that shut down between `ensure_context` and the send never
    /// saw the batch. That batch is handed to a fresh context once.
    pub async fn process_batch(
        &self,
        images: &[ImageBlob],
    ) -> Result<Vec<ImageBlob>, ProcessingError> {
        let started = Instant::now();
        let result = match self.deliver(images).await {
            Err(err) if err.is_retired() => {
                tracing::debug!(error = %err, "context retired before delivery, redirecting batch");
                self.deliver(images).await
            }
            other => other,
        };
        let latency = started.elapsed();

        match &result {
            Ok(faces) => {
                self.metrics.record_success(images.len(), latency);
                tracing::debug!(
                    images = images.len(),
                    faces = faces.len(),
                    latency_ms = latency.as_millis() as u64,
                    "relay batch completed"
                );
            }
            Err(err) => {
                if err.is_timeout() {
                    self.metrics.record_timeout(images.len(), latency);
                } else {
                    self.metrics.record_failure(images.len(), latency);
                }
                tracing::warn!(
                    images = images.len(),
                    latency_ms = latency.as_millis() as u64,
                    error = %err,
                    "relay batch failed"
                );
            }
        }

        result
    }

    async fn deliver(&self, images: &[ImageBlob]) -> Result<Vec<ImageBlob>, ProcessingError> {
        let context = self.lifecycle.ensure_context().await?;
        context
            .request(images.to_vec(), self.request_timeout)
            .await
    }

    pub async fn handle(&self, request: RelayRequest) -> RelayResponse {
        match request {
            RelayRequest::ProcessImages { images } => match self.process_batch(&images).await {
                Ok(faces) => RelayResponse::success(faces),
                Err(err) => RelayResponse::failure(err.to_string()),
            },
        }
    }

    /// Like [`Relay::handle`], for requests still in their JSON form.
    pub async fn handle_json(&self, raw: &str) -> RelayResponse {
        match serde_json::from_str::<RelayRequest>(raw) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                tracing::warn!(error = %err, "rejecting malformed relay request");
                RelayResponse::failure(format!("malformed request: {err}"))
            }
        }
    }
}
