//! Pod collaborator boundary.
//!
//! The controller never talks to the cluster directly. Everything it needs
//! from the pod store goes through [`PodApi`], which the daemon implements
//! against the Kubernetes API and tests implement in memory.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use oaat_core::{ContainerTemplate, PodPhase};

use crate::error::PodApiError;

/// Label carrying the operator's application name.
pub const APP_LABEL: &str = "app";
/// Label carrying the owning group's name.
pub const PARENT_LABEL: &str = "parent-name";
/// Label carrying the item a pod runs.
pub const ITEM_LABEL: &str = "oaat-name";

/// API version and kind of the owning group resource.
pub const GROUP_API_VERSION: &str = "oaat.dev/v1";
pub const GROUP_KIND: &str = "OaatGroup";

/// Boxed future returned by [`PodApi`] methods.
pub type PodFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PodApiError>> + Send + 'a>>;

/// Observed state of a job pod.
#[derive(Debug, Clone, PartialEq)]
pub struct PodInfo {
    pub name: String,
    pub phase: PodPhase,
    pub labels: BTreeMap<String, String>,
    /// Start of the job container, when known.
    pub started_at: Option<DateTime<Utc>>,
    /// Termination time of the job container, once it has finished.
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl PodInfo {
    pub fn new(name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            labels: BTreeMap::new(),
            started_at: None,
            finished_at: None,
            exit_code: None,
        }
    }

    /// Item this pod runs, from its item label.
    pub fn item(&self) -> Option<&str> {
        self.labels.get(ITEM_LABEL).map(String::as_str)
    }

    /// Owning group, from its parent label.
    pub fn group(&self) -> Option<&str> {
        self.labels.get(PARENT_LABEL).map(String::as_str)
    }
}

/// Reference from a job pod to the group that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

/// A fully resolved single-container job pod, ready to create.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPodSpec {
    pub namespace: String,
    /// Name prefix; the pod store appends a unique suffix.
    pub generate_name: String,
    pub labels: BTreeMap<String, String>,
    pub owner: OwnerRef,
    pub container: ContainerTemplate,
    pub restart_policy: String,
    pub service_account_name: Option<String>,
}

/// Pod operations the controller requests of the cluster.
pub trait PodApi: Send + Sync {
    /// Look up a pod; `Ok(None)` when it does not exist.
    fn get_pod<'a>(&'a self, namespace: &'a str, name: &'a str) -> PodFuture<'a, Option<PodInfo>>;

    /// All pods carrying every label in `selector`.
    fn list_pods<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a BTreeMap<String, String>,
    ) -> PodFuture<'a, Vec<PodInfo>>;

    /// Create a job pod and return its generated name.
    fn create_pod<'a>(&'a self, pod: &'a JobPodSpec) -> PodFuture<'a, String>;

    /// Delete a pod. Deleting a pod that is already gone succeeds.
    fn delete_pod<'a>(&'a self, namespace: &'a str, name: &'a str) -> PodFuture<'a, ()>;
}

/// Label selector matching every job pod of `group`.
pub fn group_selector(app_label: &str, group: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), app_label.to_string()),
        (PARENT_LABEL.to_string(), group.to_string()),
    ])
}

/// Render a selector as `key=value,...` for list requests.
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_identify_group_and_item() {
        let mut pod = PodInfo::new("nightly-a-x7", PodPhase::Running);
        assert_eq!(pod.item(), None);
        pod.labels.insert(ITEM_LABEL.to_string(), "a".to_string());
        pod.labels.insert(PARENT_LABEL.to_string(), "nightly".to_string());
        assert_eq!(pod.item(), Some("a"));
        assert_eq!(pod.group(), Some("nightly"));
    }

    #[test]
    fn selector_renders_sorted_pairs() {
        let selector = group_selector("oaat-operator", "nightly");
        assert_eq!(
            selector_string(&selector),
            "app=oaat-operator,parent-name=nightly"
        );
    }
}
