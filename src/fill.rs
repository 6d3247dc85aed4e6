//! Values the fill-target consumer types into the destination form.

use crate::orchestrator::split_sender;
use crate::record::Record;
use chrono::{DateTime, NaiveDateTime};

pub const FACE_UPLOAD_FILENAME: &str = "face.png";

/// Gmail's title attribute format, e.g. `Mon, Oct 14, 2024, 10:15 AM`.
const TITLE_DATE_FORMAT: &str = "%a, %b %d, %Y, %I:%M %p";
const TITLE_DATE_FORMAT_NO_WEEKDAY: &str = "%b %d, %Y, %I:%M %p";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceUpload {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFill {
    pub email: Option<String>,
    /// `mm/dd/yyyy`
    pub date: Option<String>,
    /// `hh:mm AM`
    pub time: Option<String>,
    pub upload: Option<FaceUpload>,
}

impl FormFill {
    pub fn from_record(record: &Record) -> Self {
        let email = record
            .sender_email
            .as_deref()
            .and_then(|raw| split_sender(raw).1);

        let timestamp = record.date.as_deref().and_then(parse_timestamp);
        if record.date.is_some() && timestamp.is_none() {
            tracing::debug!(id = %record.id, "record date is not in a recognised format");
        }

        let upload = record.cropped_faces.first().and_then(|face| match face.decode() {
            Ok(bytes) => Some(FaceUpload {
                filename: FACE_UPLOAD_FILENAME.to_string(),
                mime: face.mime().unwrap_or("image/png").to_string(),
                bytes,
            }),
            Err(err) => {
                tracing::warn!(id = %record.id, error = %format!("{err:#}"), "first face could not be decoded");
                None
            }
        });

        Self {
            email,
            date: timestamp.map(|ts| ts.format("%m/%d/%Y").to_string()),
            time: timestamp.map(|ts| ts.format("%I:%M %p").to_string()),
            upload,
        }
    }
}

/// Wall-clock time as written in the message; offsets are not applied.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.naive_local());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    NaiveDateTime::parse_from_str(raw, TITLE_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, TITLE_DATE_FORMAT_NO_WEEKDAY))
        .ok()
}
