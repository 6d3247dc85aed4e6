//! End-to-end extraction cycles and the extractor seam feeding them.

pub(crate) mod backoff;
pub mod cycle;
pub mod extractor;

pub use cycle::{CycleError, CycleReport, CycleStage, DetectionOutcome, Orchestrator};
pub use extractor::{split_sender, Extractor, ManifestExtractor};
