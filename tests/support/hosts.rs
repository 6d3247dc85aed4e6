use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use facerelay::{ContextHandle, ContextHost};
use futures::future::BoxFuture;
use tokio::time::sleep;

/// Wraps another host, counting creation attempts. The first `refusals`
/// attempts fail as if the host had no room for a context.
pub struct CountingHost {
    inner: Arc<dyn ContextHost>,
    attempts: AtomicUsize,
    refusals: AtomicUsize,
    delay: Duration,
}

impl CountingHost {
    pub fn new(inner: Arc<dyn ContextHost>) -> Self {
        Self {
            inner,
            attempts: AtomicUsize::new(0),
            refusals: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn refusing_first(self, refusals: usize) -> Self {
        self.refusals.store(refusals, Ordering::SeqCst);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ContextHost for CountingHost {
    fn create_context(&self) -> BoxFuture<'_, Result<ContextHandle>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if refused {
                return Err(anyhow!("host refused to open a detection context"));
            }
            self.inner.create_context().await
        })
    }
}
