use crate::record::{ImageBlob, Record, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

pub fn find<'a>(records: &'a [Record], id: &RecordId) -> Option<&'a Record> {
    records.iter().find(|record| &record.id == id)
}

pub fn find_mut<'a>(records: &'a mut [Record], id: &RecordId) -> Option<&'a mut Record> {
    records.iter_mut().find(|record| &record.id == id)
}

/// Replaces in place so the record keeps its position in the collection.
pub fn upsert(records: &mut Vec<Record>, record: Record) -> UpsertOutcome {
    match find_mut(records, &record.id) {
        Some(existing) => {
            *existing = record;
            UpsertOutcome::Replaced
        }
        None => {
            records.push(record);
            UpsertOutcome::Inserted
        }
    }
}

/// Overwrites the faces of the record with `id`. Returns `false` when the
/// record is no longer present.
pub fn merge_faces(records: &mut [Record], id: &RecordId, faces: Vec<ImageBlob>) -> bool {
    match find_mut(records, id) {
        Some(record) => {
            record.cropped_faces = faces;
            true
        }
        None => false,
    }
}
