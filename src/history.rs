//! In-memory history of versioned upload records.
//!
//! Newest first. Records are never removed or replaced; the only mutation
//! after append is the field-scoped status edit in
//! [`HistoryStore::update_component_status`].

use crate::model::{ComponentStatus, UploadRecord};
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

/// Ordered, append-only collection of [`UploadRecord`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStore {
    records: VecDeque<UploadRecord>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head. No dedup, no eviction.
    pub fn append(&mut self, record: UploadRecord) {
        debug!(
            "history: + {} v{} ({} components)",
            record.file_name,
            record.version,
            record.components.len()
        );
        self.records.push_front(record);
    }

    pub fn select(&self, id: Uuid) -> Option<&UploadRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Set `current_status` on every component of record `record_id` whose
    /// id is `component_id`, and nothing else.
    ///
    /// Returns how many components changed. Zero means the record or the
    /// component was not found, which is not an error.
    pub fn update_component_status(
        &mut self,
        record_id: Uuid,
        component_id: &str,
        status: ComponentStatus,
    ) -> usize {
        let Some(record) = self.records.iter_mut().find(|r| r.id == record_id) else {
            debug!("history: status edit for unknown record {record_id} ignored");
            return 0;
        };

        let mut updated = 0;
        for component in record.components.iter_mut().filter(|c| c.id == component_id) {
            component.current_status = status;
            updated += 1;
        }
        if updated == 0 {
            debug!("history: component {component_id} not in record {record_id}, ignored");
        }
        updated
    }

    /// Number of records already held for `file_name`.
    pub fn count_for(&self, file_name: &str) -> usize {
        self.records.iter().filter(|r| r.file_name == file_name).count()
    }

    /// Version the next upload of `file_name` receives.
    pub fn next_version(&self, file_name: &str) -> u32 {
        u32::try_from(self.count_for(file_name))
            .unwrap_or(u32::MAX - 1)
            .saturating_add(1)
    }

    pub fn find_version(&self, file_name: &str, version: u32) -> Option<&UploadRecord> {
        self.records
            .iter()
            .find(|r| r.file_name == file_name && r.version == version)
    }

    /// All records of `file_name`, newest first.
    pub fn versions_of<'a>(
        &'a self,
        file_name: &'a str,
    ) -> impl Iterator<Item = &'a UploadRecord> + 'a {
        self.records.iter().filter(move |r| r.file_name == file_name)
    }

    pub fn latest(&self) -> Option<&UploadRecord> {
        self.records.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
