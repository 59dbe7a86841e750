//! StatusPatch: accumulated status and annotation changes for one cycle.
//!
//! Each reconciliation step returns its own patch; the orchestrator merges
//! them in order (later writes win) and hands the result to whatever
//! persists the group. Nothing reads the patch back during the cycle.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use oaat_core::GroupState;

use crate::types::{GroupStatus, ItemFields, RunningPodRef};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPatch {
    pub state: Option<GroupState>,
    /// `Some(None)` clears both `pod` and `currentlyRunning`.
    pub running: Option<Option<RunningPodRef>>,
    pub loops: Option<u64>,
    pub items: BTreeMap<String, ItemFields>,
    /// `None` removes the annotation.
    pub annotations: BTreeMap<String, Option<String>>,
}

impl StatusPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&mut self, state: GroupState) -> &mut Self {
        self.state = Some(state);
        self
    }

    pub fn set_running(&mut self, running: RunningPodRef) -> &mut Self {
        self.running = Some(Some(running));
        self
    }

    pub fn clear_running(&mut self) -> &mut Self {
        self.running = Some(None);
        self
    }

    pub fn set_loops(&mut self, loops: u64) -> &mut Self {
        self.loops = Some(loops);
        self
    }

    pub fn patch_item(&mut self, item: &str, fields: ItemFields) -> &mut Self {
        self.items.entry(item.to_string()).or_default().extend(fields);
        self
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.annotations.insert(key.to_string(), Some(value.into()));
        self
    }

    pub fn remove_annotation(&mut self, key: &str) -> &mut Self {
        self.annotations.insert(key.to_string(), None);
        self
    }

    /// Fold `other` into this patch; fields written by `other` win.
    pub fn merge(&mut self, other: StatusPatch) {
        if other.state.is_some() {
            self.state = other.state;
        }
        if other.running.is_some() {
            self.running = other.running;
        }
        if other.loops.is_some() {
            self.loops = other.loops;
        }
        for (item, fields) in other.items {
            self.patch_item(&item, fields);
        }
        self.annotations.extend(other.annotations);
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.running.is_none()
            && self.loops.is_none()
            && self.items.is_empty()
            && self.annotations.is_empty()
    }

    /// Apply the status part of this patch to an in-memory status.
    pub fn apply(&self, status: &mut GroupStatus) {
        if let Some(state) = self.state {
            status.state = Some(state);
        }
        match &self.running {
            Some(Some(running)) => {
                status.pod = Some(running.pod.clone());
                status.currently_running = Some(running.item.clone());
            }
            Some(None) => {
                status.pod = None;
                status.currently_running = None;
            }
            None => {}
        }
        if let Some(loops) = self.loops {
            status.loops = loops;
        }
        for (item, fields) in &self.items {
            status
                .items
                .entry(item.clone())
                .or_default()
                .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    /// JSON merge patch for the `status` subresource, or `None` when the
    /// patch changes no status field. Cleared fields are written as `null`.
    pub fn status_merge_patch(&self) -> Option<Value> {
        let mut status = Map::new();
        if let Some(state) = self.state {
            status.insert("state".to_string(), json!(state));
        }
        match &self.running {
            Some(Some(running)) => {
                status.insert("pod".to_string(), json!(running.pod));
                status.insert("currentlyRunning".to_string(), json!(running.item));
            }
            Some(None) => {
                status.insert("pod".to_string(), Value::Null);
                status.insert("currentlyRunning".to_string(), Value::Null);
            }
            None => {}
        }
        if let Some(loops) = self.loops {
            status.insert("loops".to_string(), json!(loops));
        }
        if !self.items.is_empty() {
            status.insert("items".to_string(), json!(self.items));
        }
        if status.is_empty() {
            return None;
        }
        Some(json!({ "status": status }))
    }

    /// JSON merge patch for `metadata.annotations`, if any changed.
    pub fn annotations_merge_patch(&self) -> Option<Value> {
        if self.annotations.is_empty() {
            return None;
        }
        Some(json!({ "metadata": { "annotations": self.annotations } }))
    }
}
