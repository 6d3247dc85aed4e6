use super::{RecordStore, StoreFuture};
use crate::record::Record;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Store persisted as one pretty-printed JSON array.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so readers observe either the previous or the new collection.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&self) -> Result<Vec<Record>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read store {}", self.path.display()))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes)
            .with_context(|| format!("store {} is not a valid record list", self.path.display()))
    }

    async fn write_records(&self, records: &[Record]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let payload = serde_json::to_vec_pretty(records).context("failed to encode records")?;
        write_replacing(&self.path, &payload).await?;

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "record store persisted"
        );
        Ok(())
    }
}

/// Writes `payload` to a `.tmp` sibling and renames it over `path`, creating
/// parent directories as needed. Readers never see a half-written file.
pub(crate) async fn write_replacing(path: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, payload)
        .await
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))
}

impl RecordStore for JsonFileStore {
    fn get(&self) -> StoreFuture<'_, Vec<Record>> {
        Box::pin(self.read_records())
    }

    fn set(&self, records: Vec<Record>) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.write_records(&records).await })
    }
}
