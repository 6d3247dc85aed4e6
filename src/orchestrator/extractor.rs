use crate::record::{ExtractedEmail, ImageBlob, RecordId};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use image::ImageFormat;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Source of the message currently in front of the operator.
///
/// `Ok(None)` means there was nothing to extract; it is not an error.
pub trait Extractor: Send + Sync {
    fn extract(&self) -> BoxFuture<'_, Result<Option<ExtractedEmail>>>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    attachments: Vec<PathBuf>,
}

/// Reads an exported message from a JSON manifest on disk:
///
/// ```json
/// { "id": "18c2...", "from": "Ada <ada@example.com>", "date": "...",
///   "subject": "...", "attachments": ["photo1.jpg", "scans/photo2.png"] }
/// ```
///
/// Relative attachment paths resolve against the manifest's directory.
#[derive(Debug, Clone)]
pub struct ManifestExtractor {
    manifest_path: PathBuf,
}

impl ManifestExtractor {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    async fn read_manifest(&self) -> Result<Option<ExtractedEmail>> {
        let raw = match fs::read(&self.manifest_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read manifest {}", self.manifest_path.display())
                })
            }
        };

        let manifest: Manifest = serde_json::from_slice(&raw).with_context(|| {
            format!("manifest {} is not valid JSON", self.manifest_path.display())
        })?;

        let base_dir = self
            .manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut images = Vec::with_capacity(manifest.attachments.len());
        for attachment in &manifest.attachments {
            let path = base_dir.join(attachment);
            match load_attachment(&path).await {
                Ok(blob) => images.push(blob),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "skipping attachment");
                }
            }
        }

        let (sender_name, sender_email) = manifest
            .from
            .as_deref()
            .map(split_sender)
            .unwrap_or((None, None));
        let id = non_empty(manifest.id)
            .map(RecordId::new)
            .unwrap_or_else(RecordId::generate);

        tracing::info!(
            id = %id,
            images = images.len(),
            "extracted message from manifest"
        );

        Ok(Some(ExtractedEmail {
            id,
            sender_name,
            sender_email,
            date: non_empty(manifest.date),
            subject: non_empty(manifest.subject),
            images,
        }))
    }
}

impl Extractor for ManifestExtractor {
    fn extract(&self) -> BoxFuture<'_, Result<Option<ExtractedEmail>>> {
        Box::pin(self.read_manifest())
    }
}

async fn load_attachment(path: &Path) -> Result<ImageBlob> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("{} does not look like an image", path.display()))?;
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(ImageBlob::from_bytes(format.to_mime_type(), &bytes))
}

/// Splits a `Name <address>` header. A bare address has no name.
pub fn split_sender(raw: &str) -> (Option<String>, Option<String>) {
    let raw = raw.trim();
    match (raw.rfind('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = raw[..open].trim().trim_matches('"').trim();
            let address = raw[open + 1..close].trim();
            (
                (!name.is_empty()).then(|| name.to_string()),
                (!address.is_empty()).then(|| address.to_string()),
            )
        }
        _ if raw.contains('@') => (None, Some(raw.to_string())),
        _ if raw.is_empty() => (None, None),
        _ => (Some(raw.to_string()), None),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
