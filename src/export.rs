//! Tabular summary of the stored records, one row per email.

use crate::record::Record;
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    #[serde(rename = "Id")]
    id: &'a str,
    #[serde(rename = "Sender")]
    sender: String,
    #[serde(rename = "Date")]
    date: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "Images")]
    images: usize,
    #[serde(rename = "Faces")]
    faces: usize,
}

impl<'a> SummaryRow<'a> {
    fn from_record(record: &'a Record) -> Self {
        let email = record.sender_email.as_deref().unwrap_or_default();
        let sender = match record.sender_name.as_deref() {
            Some(name) if !email.is_empty() => format!("{name} <{email}>"),
            Some(name) => name.to_string(),
            None => email.to_string(),
        };
        Self {
            id: record.id.as_str(),
            sender,
            date: record.date.as_deref().unwrap_or_default(),
            subject: record.subject.as_deref().unwrap_or_default(),
            images: record.images.len(),
            faces: record.cropped_faces.len(),
        }
    }
}

/// Renders `records` as CSV with a header row. Missing metadata becomes an
/// empty cell; image payloads are summarised as counts.
pub fn records_to_csv(records: &[Record]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer
            .serialize(SummaryRow::from_record(record))
            .with_context(|| format!("failed to export record {}", record.id))?;
    }
    if records.is_empty() {
        writer
            .write_record(["Id", "Sender", "Date", "Subject", "Images", "Faces"])
            .context("failed to write export header")?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush export: {}", err.error()))
}
