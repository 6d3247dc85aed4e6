//! Record model shared by the extractor, the store, and the detection relay.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// Opaque identifier assigned at extraction time. Unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Timestamp-derived id used when the source carries no stable message id.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        Self(format!("email_{millis}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An encoded image carried as a `data:<mime>;base64,<payload>` URL.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageBlob(String);

impl ImageBlob {
    /// Wraps an existing data URL without validating it. Decoding happens
    /// lazily inside the detection context, where failures are isolated per image.
    pub fn from_data_url(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let payload = BASE64_STANDARD.encode(bytes);
        Self(format!("{DATA_URL_PREFIX}{mime}{BASE64_MARKER},{payload}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Media type declared in the data URL header, if the header is well formed.
    pub fn mime(&self) -> Option<&str> {
        let header = self.0.strip_prefix(DATA_URL_PREFIX)?.split_once(',')?.0;
        let mime = header.strip_suffix(BASE64_MARKER).unwrap_or(header);
        (!mime.is_empty()).then_some(mime)
    }

    /// Returns the raw encoded bytes (PNG, JPEG, ...) carried by the URL.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let Some(rest) = self.0.strip_prefix(DATA_URL_PREFIX) else {
            bail!("image blob is not a data URL");
        };
        let (header, payload) = rest
            .split_once(',')
            .context("data URL is missing its payload separator")?;
        if !header.ends_with(BASE64_MARKER) {
            bail!("data URL payload is not base64 encoded");
        }
        BASE64_STANDARD
            .decode(payload.trim())
            .context("data URL payload is not valid base64")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("mime", &self.mime())
            .field("len", &self.0.len())
            .finish()
    }
}

/// Output of the external extractor: metadata plus the raw images of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEmail {
    pub id: RecordId,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
    pub images: Vec<ImageBlob>,
}

/// One processed unit of work.
///
/// `cropped_faces` is always present: an empty list on a record with images
/// means detection has not produced anything yet (or produced zero faces),
/// never that the field is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageBlob>,
    #[serde(default)]
    pub cropped_faces: Vec<ImageBlob>,
}

impl Record {
    pub fn from_extracted(email: ExtractedEmail) -> Self {
        let ExtractedEmail {
            id,
            sender_name,
            sender_email,
            date,
            subject,
            images,
        } = email;

        Self {
            id,
            sender_name,
            sender_email,
            date,
            subject,
            images,
            cropped_faces: Vec::new(),
        }
    }
}
