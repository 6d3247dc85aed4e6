//! Owner of the singleton detection context.
//!
//! The manager is an explicit state machine, `Absent -> Creating -> Ready`,
//! guarded by a mutex that is never held across an await. Concurrent callers
//! that arrive during `Creating` await the same shared creation future, so at
//! most one context is ever created at a time.

use crate::detection::{ContextHandle, ContextHost};
use crate::relay::error::ProcessingError;
use crate::runtime::telemetry::Telemetry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

type CreationFuture = Shared<BoxFuture<'static, Result<ContextHandle, Arc<anyhow::Error>>>>;

enum ContextState {
    Absent,
    Creating {
        generation: u64,
        future: CreationFuture,
    },
    Ready(ContextHandle),
}

/// Snapshot of the manager state for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPhase {
    Absent,
    Creating,
    Ready,
}

pub struct ContextLifecycleManager {
    host: Arc<dyn ContextHost>,
    state: Mutex<ContextState>,
    generation: AtomicU64,
    telemetry: Arc<Telemetry>,
}

impl ContextLifecycleManager {
    pub fn new(host: Arc<dyn ContextHost>, telemetry: Arc<Telemetry>) -> Self {
        Self {
            host,
            state: Mutex::new(ContextState::Absent),
            generation: AtomicU64::new(0),
            telemetry,
        }
    }

    /// Returns a running context, creating one if needed.
    ///
    /// A context that tore itself down after its idle window is detected
    /// through [`ContextHandle::is_alive`] and replaced. Whatever the
    /// creation outcome, the in-flight marker is cleared before returning so a
    /// failed creation can be retried by the next call.
    pub async fn ensure_context(&self) -> Result<ContextHandle, ProcessingError> {
        let (generation, future) = {
            let mut state = self.lock_state();

            if let ContextState::Ready(handle) = &*state {
                if handle.is_alive() {
                    return Ok(handle.clone());
                }
                tracing::info!(context = handle.id(), "detection context is gone, recreating");
            }

            let in_flight = match &*state {
                ContextState::Creating { generation, future } => Some((*generation, future.clone())),
                _ => None,
            };
            match in_flight {
                Some(existing) => existing,
                None => self.start_creation(&mut state),
            }
        };

        let outcome = future.await;

        {
            let mut state = self.lock_state();
            let still_current = matches!(
                &*state,
                ContextState::Creating { generation: current, .. } if *current == generation
            );
            if still_current {
                *state = match &outcome {
                    Ok(handle) => ContextState::Ready(handle.clone()),
                    Err(_) => ContextState::Absent,
                };
            }
        }

        outcome.map_err(|err| ProcessingError::ContextCreation {
            cause: format!("{err:#}"),
        })
    }

    /// Destroys the current context. An in-flight creation is left alone.
    /// Returns whether a context was torn down.
    pub fn teardown(&self) -> bool {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, ContextState::Absent) {
            ContextState::Ready(handle) => {
                handle.close();
                tracing::info!(context = handle.id(), "detection context teardown requested");
                true
            }
            other => {
                *state = other;
                false
            }
        }
    }

    pub fn phase(&self) -> ContextPhase {
        match &*self.lock_state() {
            ContextState::Absent => ContextPhase::Absent,
            ContextState::Creating { .. } => ContextPhase::Creating,
            ContextState::Ready(handle) if handle.is_alive() => ContextPhase::Ready,
            ContextState::Ready(_) => ContextPhase::Absent,
        }
    }

    fn start_creation(&self, state: &mut ContextState) -> (u64, CreationFuture) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let host = Arc::clone(&self.host);
        let telemetry = Arc::clone(&self.telemetry);

        let future = async move {
            let started = Instant::now();
            match host.create_context().await {
                Ok(handle) => {
                    telemetry.record_context_created();
                    tracing::info!(
                        context = handle.id(),
                        generation,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "detection context created"
                    );
                    Ok(handle)
                }
                Err(err) => {
                    tracing::warn!(generation, error = %format!("{err:#}"), "detection context creation failed");
                    Err(Arc::new(err))
                }
            }
        }
        .boxed()
        .shared();

        *state = ContextState::Creating {
            generation,
            future: future.clone(),
        };
        (generation, future)
    }

    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().expect("context lifecycle mutex poisoned")
    }
}
