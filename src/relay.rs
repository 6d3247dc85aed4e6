//! Bridge between the orchestrator and the detection context.

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod protocol;

pub use client::{FaceBatchClient, Relay};
pub use error::ProcessingError;
pub use lifecycle::{ContextLifecycleManager, ContextPhase};
pub use metrics::RelayMetricsSnapshot;
pub use protocol::{ContextMessage, RelayRequest, RelayResponse};
