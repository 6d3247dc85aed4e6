//! Runtime glue that wires configuration, telemetry, operator status and
//! runner orchestration.

pub mod config;
pub mod runner;
pub mod status;
pub mod telemetry;
