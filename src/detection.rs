//! Face detection running inside an isolated, ephemeral detection context.
//!
//! A context is a spawned task that owns one [`worker::DetectionWorker`] and
//! talks to the outside world only through request/response messages. The
//! [`host::ContextHost`] seam creates contexts; lifecycle decisions live in
//! [`crate::relay::lifecycle`].

pub mod codec;
pub mod context;
pub mod host;
pub mod primitive;
pub mod worker;

pub use context::ContextHandle;
pub use host::{ContextHost, TaskHost};
pub use primitive::{DetectorFactory, DetectorFuture, FaceDetector, FaceRegion};
pub use worker::{DetectionError, DetectionWorker};
