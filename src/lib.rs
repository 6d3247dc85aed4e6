pub mod detection;
pub mod export;
pub mod fill;
pub mod orchestrator;
pub mod record;
pub mod relay;
pub mod runtime;
pub mod store;

pub use detection::{
    ContextHandle, ContextHost, DetectorFactory, DetectorFuture, FaceDetector, FaceRegion,
    TaskHost,
};
pub use export::records_to_csv;
pub use fill::{FaceUpload, FormFill};
pub use orchestrator::{
    CycleError, CycleReport, CycleStage, DetectionOutcome, Extractor, ManifestExtractor,
    Orchestrator,
};
pub use record::{ExtractedEmail, ImageBlob, Record, RecordId};
pub use relay::{
    ContextLifecycleManager, ContextPhase, FaceBatchClient, ProcessingError, Relay, RelayRequest,
    RelayResponse,
};
pub use runtime::config::{PipelineConfig, PipelineConfigBuilder, PipelineConfigParams};
pub use runtime::runner::Runner;
pub use runtime::status::{Status, StatusIndicator};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use store::{JsonFileStore, MemoryStore, RecordStore, StagingSlot, UpsertOutcome};
