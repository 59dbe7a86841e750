//! Storage backings for item status.
//!
//! The item model only needs two capabilities: read an item's fields and
//! write some of them. `SnapshotBackend` serves a reconciliation snapshot
//! it does not own; `ResourceBackend` owns a loaded group status and
//! updates it in place. Both record every write into a `StatusPatch`.

use tracing::trace;

use crate::patch::StatusPatch;
use crate::types::{GroupStatus, ItemFields};

/// Read/write access to per-item status fields.
pub trait StatusBackend: Send {
    /// Current fields of `item`, including writes made through this backend.
    fn get(&self, item: &str) -> ItemFields;

    /// Overwrite the given fields of `item`, leaving others untouched.
    fn patch(&mut self, item: &str, fields: ItemFields);
}

/// Backing over a borrowed status snapshot with a pending-write overlay.
pub struct SnapshotBackend<'a> {
    base: &'a GroupStatus,
    pending: StatusPatch,
}

impl<'a> SnapshotBackend<'a> {
    pub fn new(base: &'a GroupStatus) -> Self {
        Self {
            base,
            pending: StatusPatch::new(),
        }
    }

    /// The item writes made so far.
    pub fn pending(&self) -> &StatusPatch {
        &self.pending
    }

    pub fn into_patch(self) -> StatusPatch {
        self.pending
    }
}

impl StatusBackend for SnapshotBackend<'_> {
    fn get(&self, item: &str) -> ItemFields {
        let mut fields = self.base.item_fields(item).cloned().unwrap_or_default();
        if let Some(overlay) = self.pending.items.get(item) {
            fields.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        fields
    }

    fn patch(&mut self, item: &str, fields: ItemFields) {
        trace!(%item, count = fields.len(), "item fields staged");
        self.pending.patch_item(item, fields);
    }
}

/// Backing over an owned, freshly loaded group status.
#[derive(Debug, Clone, Default)]
pub struct ResourceBackend {
    status: GroupStatus,
    written: StatusPatch,
}

impl ResourceBackend {
    pub fn new(status: GroupStatus) -> Self {
        Self {
            status,
            written: StatusPatch::new(),
        }
    }

    pub fn status(&self) -> &GroupStatus {
        &self.status
    }

    /// The updated status and the patch describing what changed.
    pub fn into_parts(self) -> (GroupStatus, StatusPatch) {
        (self.status, self.written)
    }
}

impl StatusBackend for ResourceBackend {
    fn get(&self, item: &str) -> ItemFields {
        self.status.item_fields(item).cloned().unwrap_or_default()
    }

    fn patch(&mut self, item: &str, fields: ItemFields) {
        trace!(%item, count = fields.len(), "item fields written");
        self.status
            .items
            .entry(item.to_string())
            .or_default()
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.written.patch_item(item, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(key: &str, value: &str) -> ItemFields {
        ItemFields::from([(key.to_string(), value.to_string())])
    }

    fn base_status() -> GroupStatus {
        let mut status = GroupStatus::default();
        status.items.insert(
            "a".to_string(),
            ItemFields::from([
                ("failure_count".to_string(), "2".to_string()),
                ("podphase".to_string(), "Running".to_string()),
            ]),
        );
        status
    }

    fn exercise(backend: &mut dyn StatusBackend) {
        assert_eq!(backend.get("a")["failure_count"], "2");
        backend.patch("a", one("failure_count", "3"));
        assert_eq!(backend.get("a")["failure_count"], "3");
        assert_eq!(backend.get("a")["podphase"], "Running");
        assert!(backend.get("missing").is_empty());
    }

    #[test]
    fn snapshot_overlays_pending_writes_without_touching_base() {
        let status = base_status();
        let mut backend = SnapshotBackend::new(&status);
        exercise(&mut backend);
        let patch = backend.into_patch();
        assert_eq!(patch.items["a"]["failure_count"], "3");
        assert_eq!(status.items["a"]["failure_count"], "2");
    }

    #[test]
    fn resource_backend_updates_in_place() {
        let mut backend = ResourceBackend::new(base_status());
        exercise(&mut backend);
        let (status, patch) = backend.into_parts();
        assert_eq!(status.items["a"]["failure_count"], "3");
        assert_eq!(patch.items["a"].len(), 1);
    }
}
