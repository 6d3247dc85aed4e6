use super::{RecordStore, StoreFuture};
use crate::record::Record;
use tokio::sync::RwLock;

/// Process-local store, used by tests and when no store path is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }
}

impl RecordStore for MemoryStore {
    fn get(&self) -> StoreFuture<'_, Vec<Record>> {
        Box::pin(async move { Ok(self.records.read().await.clone()) })
    }

    fn set(&self, records: Vec<Record>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            *self.records.write().await = records;
            Ok(())
        })
    }
}
