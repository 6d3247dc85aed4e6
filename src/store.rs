//! Persistent key-value storage for processed records.
//!
//! A [`RecordStore`] only knows how to read and replace the whole ordered
//! collection. Append, upsert, find-by-key and bulk clear are layered on top
//! as free functions so every backend gets identical merge semantics.

pub mod collection;
pub mod json_file;
pub mod memory;
pub mod staging;

use crate::record::{Record, RecordId};
use anyhow::Result;
use futures::future::BoxFuture;

pub use collection::UpsertOutcome;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use staging::StagingSlot;

pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T>>;

/// Ordered collection of records persisted as a single value.
pub trait RecordStore: Send + Sync + 'static {
    /// Reads the full collection. A store that was never written reads as empty.
    fn get(&self) -> StoreFuture<'_, Vec<Record>>;

    /// Replaces the full collection.
    fn set(&self, records: Vec<Record>) -> StoreFuture<'_, ()>;
}

/// Appends `record` without checking for an existing id.
pub async fn append<S: RecordStore + ?Sized>(store: &S, record: Record) -> Result<()> {
    let mut records = store.get().await?;
    records.push(record);
    store.set(records).await
}

/// Inserts `record`, or replaces the entry that already carries its id.
pub async fn upsert<S: RecordStore + ?Sized>(store: &S, record: Record) -> Result<UpsertOutcome> {
    let mut records = store.get().await?;
    let outcome = collection::upsert(&mut records, record);
    store.set(records).await?;
    Ok(outcome)
}

pub async fn find<S: RecordStore + ?Sized>(store: &S, id: &RecordId) -> Result<Option<Record>> {
    let records = store.get().await?;
    Ok(collection::find(&records, id).cloned())
}

/// The only way records leave a store.
pub async fn clear<S: RecordStore + ?Sized>(store: &S) -> Result<()> {
    store.set(Vec::new()).await
}
