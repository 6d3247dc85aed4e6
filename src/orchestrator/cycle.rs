use super::backoff::{retry_with_backoff, RetryBackoff};
use super::extractor::Extractor;
use crate::record::{ImageBlob, Record, RecordId};
use crate::relay::{FaceBatchClient, ProcessingError};
use crate::runtime::status::{Status, StatusIndicator};
use crate::runtime::telemetry::Telemetry;
use crate::store::{self, collection, RecordStore, StagingSlot, UpsertOutcome};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// States one extraction cycle walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    Extracted,
    Persisted,
    Merged,
}

impl CycleStage {
    fn as_str(self) -> &'static str {
        match self {
            CycleStage::Idle => "idle",
            CycleStage::Extracted => "extracted",
            CycleStage::Persisted => "persisted",
            CycleStage::Merged => "merged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// The record had no images; the relay was not called.
    Skipped,
    Completed { faces: usize },
    /// Every attempt failed. The record keeps an empty `croppedFaces`.
    Failed(ProcessingError),
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub id: RecordId,
    pub upsert: UpsertOutcome,
    pub detection: DetectionOutcome,
    /// The record as merged into the store, or `None` if the store was
    /// cleared while detection was running.
    pub record: Option<Record>,
}

#[derive(Debug)]
pub enum CycleError {
    ExtractionEmpty,
    Extraction(anyhow::Error),
    Store(anyhow::Error),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::ExtractionEmpty => write!(f, "no extractable email content found"),
            CycleError::Extraction(err) => write!(f, "extraction failed: {err:#}"),
            CycleError::Store(err) => write!(f, "record store failed: {err:#}"),
        }
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CycleError::ExtractionEmpty => None,
            CycleError::Extraction(err) | CycleError::Store(err) => Some(err.as_ref()),
        }
    }
}

/// Drives extraction cycles: extract, persist, detect, merge.
///
/// Store writes are strictly ordered within a cycle. Across cycles the
/// `write_gate` only spans each read-modify-write of the store, so cycles for
/// different records overlap freely while detection runs, and upsert-by-id
/// keeps two cycles for the same record from duplicating it.
pub struct Orchestrator {
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn RecordStore>,
    relay: Arc<dyn FaceBatchClient>,
    staging: Arc<StagingSlot>,
    status: Arc<StatusIndicator>,
    telemetry: Arc<Telemetry>,
    retry: RetryBackoff,
    write_gate: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn RecordStore>,
        relay: Arc<dyn FaceBatchClient>,
    ) -> Self {
        Self {
            extractor,
            store,
            relay,
            staging: Arc::new(StagingSlot::in_memory()),
            status: Arc::new(StatusIndicator::new()),
            telemetry: Arc::new(Telemetry::default()),
            retry: RetryBackoff::new(Duration::from_millis(250), Duration::from_secs(2), 1),
            write_gate: Mutex::new(()),
        }
    }

    pub fn with_staging(mut self, staging: Arc<StagingSlot>) -> Self {
        self.staging = staging;
        self
    }

    pub fn with_status(mut self, status: Arc<StatusIndicator>) -> Self {
        self.status = status;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Detection attempts per cycle (at least one) and the backoff between them.
    pub fn with_retry(mut self, attempts: usize, initial: Duration, max: Duration) -> Self {
        self.retry = RetryBackoff::new(initial, max, attempts);
        self
    }

    pub fn status(&self) -> &Arc<StatusIndicator> {
        &self.status
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Runs one full cycle for the message the extractor currently sees.
    ///
    /// Detection failures do not fail the cycle: the record stays persisted
    /// with empty faces and the report carries [`DetectionOutcome::Failed`].
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        log_stage(None, CycleStage::Idle);
        self.status.set(Status::Extracting);

        let email = match self.extractor.extract().await {
            Ok(Some(email)) => email,
            Ok(None) => {
                self.telemetry.record_extraction_miss();
                self.status
                    .error("No email content found. Open a message and try again.");
                return Err(CycleError::ExtractionEmpty);
            }
            Err(err) => {
                self.status.error(format!("Extraction failed: {err:#}"));
                return Err(CycleError::Extraction(err));
            }
        };

        let record = Record::from_extracted(email);
        let id = record.id.clone();
        let images = record.images.clone();
        log_stage(Some(&id), CycleStage::Extracted);
        self.status.set(Status::Extracted {
            id: id.clone(),
            images: images.len(),
        });

        let upsert = match self.persist(record).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.store_failure(err)),
        };
        log_stage(Some(&id), CycleStage::Persisted);

        let (faces, detection) = if images.is_empty() {
            (Vec::new(), DetectionOutcome::Skipped)
        } else {
            self.status.set(Status::Detecting {
                images: images.len(),
            });
            match self.detect(&id, &images).await {
                Ok(faces) => {
                    let count = faces.len();
                    (faces, DetectionOutcome::Completed { faces: count })
                }
                Err(err) => {
                    self.telemetry.record_detection_failure();
                    (Vec::new(), DetectionOutcome::Failed(err))
                }
            }
        };

        let face_count = faces.len();
        let merged = match self.merge(&id, faces).await {
            Ok(merged) => merged,
            Err(err) => return Err(self.store_failure(err)),
        };
        log_stage(Some(&id), CycleStage::Merged);

        match (&detection, &merged) {
            (DetectionOutcome::Failed(err), _) => {
                self.status.error(format!("Face detection failed: {err}"));
            }
            (_, None) => {
                tracing::warn!(id = %id, "record was cleared before faces could be merged");
                self.status
                    .error(format!("Record {id} was cleared before faces could be saved"));
            }
            (_, Some(_)) => {
                self.telemetry.record_cycle_completed(face_count);
                self.status.set(Status::Complete { faces: face_count });
            }
        }

        Ok(CycleReport {
            id,
            upsert,
            detection,
            record: merged,
        })
    }

    /// Copies the stored record with `id` into the staging slot for the fill
    /// consumer. Returns `None` when no such record exists.
    pub async fn stage_for_fill(&self, id: &RecordId) -> Result<Option<Record>> {
        let Some(record) = store::find(self.store.as_ref(), id).await? else {
            tracing::warn!(id = %id, "cannot stage unknown record");
            return Ok(None);
        };
        self.staging.stage(record.clone()).await?;
        tracing::info!(id = %id, "record staged for fill");
        Ok(Some(record))
    }

    pub async fn take_staged(&self) -> Result<Option<Record>> {
        self.staging.take().await
    }

    pub async fn records(&self) -> Result<Vec<Record>> {
        self.store.get().await
    }

    /// Bulk clear, the only way records leave the store.
    pub async fn clear(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        store::clear(self.store.as_ref()).await?;
        tracing::info!("record store cleared");
        self.status.set(Status::Idle);
        Ok(())
    }

    async fn persist(&self, record: Record) -> Result<UpsertOutcome> {
        let _gate = self.write_gate.lock().await;
        let id = record.id.clone();
        let outcome = store::upsert(self.store.as_ref(), record).await?;
        if outcome == UpsertOutcome::Replaced {
            tracing::info!(id = %id, "replaced existing record with the same id");
        }
        Ok(outcome)
    }

    async fn detect(
        &self,
        id: &RecordId,
        images: &[ImageBlob],
    ) -> Result<Vec<ImageBlob>, ProcessingError> {
        retry_with_backoff(
            self.retry,
            |_| self.relay.process_batch(images),
            |attempt, delay, err, will_retry| {
                if will_retry {
                    tracing::warn!(
                        id = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "face detection failed, retrying"
                    );
                } else {
                    tracing::error!(id = %id, attempt, error = %err, "face detection failed");
                }
            },
        )
        .await
    }

    /// Re-reads the store and overwrites the faces of the record with `id`.
    /// A record removed in the meantime is not recreated.
    async fn merge(&self, id: &RecordId, faces: Vec<ImageBlob>) -> Result<Option<Record>> {
        let _gate = self.write_gate.lock().await;
        let mut records = self.store.get().await?;
        if !collection::merge_faces(&mut records, id, faces) {
            return Ok(None);
        }
        let merged = collection::find(&records, id).cloned();
        self.store.set(records).await?;
        Ok(merged)
    }

    fn store_failure(&self, err: anyhow::Error) -> CycleError {
        self.status.error(format!("Could not save record: {err:#}"));
        CycleError::Store(err)
    }
}

fn log_stage(id: Option<&RecordId>, stage: CycleStage) {
    match id {
        Some(id) => tracing::debug!(id = %id, stage = stage.as_str(), "cycle stage reached"),
        None => tracing::debug!(stage = stage.as_str(), "cycle stage reached"),
    }
}
