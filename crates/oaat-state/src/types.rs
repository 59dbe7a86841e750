//! Persisted group status types.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use oaat_core::GroupState;

/// String-valued status fields of a single item.
pub type ItemFields = BTreeMap<String, String>;

/// Status of a group as stored on the group resource.
///
/// `pod` and `currently_running` are stored separately so that a broken
/// pair can be detected; writes go through [`RunningPodRef`] so that they
/// are always set or cleared together.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<GroupState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currently_running: Option<String>,
    pub loops: u64,
    pub items: BTreeMap<String, ItemFields>,
}

/// The job pod a group believes is running, and the item it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningPodRef {
    pub item: String,
    pub pod: String,
}

impl RunningPodRef {
    pub fn new(item: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            pod: pod.into(),
        }
    }
}

/// Shape of the running-pod bookkeeping in a stored status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunningSlot {
    Empty,
    Occupied(RunningPodRef),
    /// Exactly one of `pod` / `currently_running` is set.
    Broken {
        pod: Option<String>,
        item: Option<String>,
    },
}

impl GroupStatus {
    /// Classify the running-pod pair. Empty strings count as unset.
    pub fn running_slot(&self) -> RunningSlot {
        let pod = self.pod.clone().filter(|p| !p.is_empty());
        let item = self.currently_running.clone().filter(|i| !i.is_empty());
        match (pod, item) {
            (None, None) => RunningSlot::Empty,
            (Some(pod), Some(item)) => RunningSlot::Occupied(RunningPodRef { item, pod }),
            (pod, item) => RunningSlot::Broken { pod, item },
        }
    }

    pub fn item_fields(&self, item: &str) -> Option<&ItemFields> {
        self.items.get(item)
    }
}
