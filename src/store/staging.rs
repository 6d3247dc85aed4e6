use super::json_file::write_replacing;
use crate::record::Record;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// Single-slot handoff area read once by the fill-target consumer.
///
/// `take` clears the slot, so reloading the consumer never replays a record.
#[derive(Debug)]
pub struct StagingSlot {
    backing: Backing,
}

#[derive(Debug)]
enum Backing {
    Memory(Mutex<Option<Record>>),
    File { path: PathBuf, lock: Mutex<()> },
}

impl StagingSlot {
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(None)),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File {
                path: path.into(),
                lock: Mutex::new(()),
            },
        }
    }

    /// Places `record` in the slot, replacing any unread occupant.
    pub async fn stage(&self, record: Record) -> Result<()> {
        match &self.backing {
            Backing::Memory(slot) => {
                *slot.lock().await = Some(record);
            }
            Backing::File { path, lock } => {
                let _guard = lock.lock().await;
                let payload = serde_json::to_vec(&record).context("failed to encode staged record")?;
                write_replacing(path, &payload)
                    .await
                    .with_context(|| format!("failed to write staging slot {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// Returns the staged record and empties the slot.
    pub async fn take(&self) -> Result<Option<Record>> {
        match &self.backing {
            Backing::Memory(slot) => Ok(slot.lock().await.take()),
            Backing::File { path, lock } => {
                let _guard = lock.lock().await;
                let bytes = match fs::read(path).await {
                    Ok(bytes) => bytes,
                    Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(err) => {
                        return Err(err).with_context(|| {
                            format!("failed to read staging slot {}", path.display())
                        })
                    }
                };
                fs::remove_file(path)
                    .await
                    .with_context(|| format!("failed to clear staging slot {}", path.display()))?;
                let record = serde_json::from_slice(&bytes).context("staged record is corrupt")?;
                Ok(Some(record))
            }
        }
    }
}
