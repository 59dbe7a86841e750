//! In-memory pod store, for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use oaat_core::PodPhase;

use crate::error::PodApiError;
use crate::pods::{JobPodSpec, PodApi, PodFuture, PodInfo};

#[derive(Debug, Default)]
struct Inner {
    /// Keyed by (namespace, name).
    pods: BTreeMap<(String, String), PodInfo>,
    created: Vec<JobPodSpec>,
    deleted: Vec<String>,
    next_suffix: u64,
    fail_requests: bool,
    fail_creates: bool,
}

/// A `PodApi` backed by a map.
///
/// Created pods start `Pending` and are named `<generate_name><n>`.
#[derive(Debug, Default)]
pub struct InMemoryPods {
    inner: Mutex<Inner>,
}

impl InMemoryPods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a pod.
    pub fn insert(&self, namespace: &str, pod: PodInfo) {
        self.with(|inner| {
            inner
                .pods
                .insert((namespace.to_string(), pod.name.clone()), pod);
        });
    }

    /// Current state of a pod.
    pub fn pod(&self, namespace: &str, name: &str) -> Option<PodInfo> {
        self.with(|inner| {
            inner
                .pods
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        })
    }

    /// Move a pod to `phase`. Returns false when the pod does not exist.
    pub fn set_phase(&self, namespace: &str, name: &str, phase: PodPhase) -> bool {
        self.with(|inner| {
            match inner
                .pods
                .get_mut(&(namespace.to_string(), name.to_string()))
            {
                Some(pod) => {
                    pod.phase = phase;
                    true
                }
                None => false,
            }
        })
    }

    /// Drop a pod without recording a deletion, as if it vanished.
    pub fn remove(&self, namespace: &str, name: &str) -> Option<PodInfo> {
        self.with(|inner| {
            inner
                .pods
                .remove(&(namespace.to_string(), name.to_string()))
        })
    }

    /// Every pod spec passed to `create_pod`, in order.
    pub fn created(&self) -> Vec<JobPodSpec> {
        self.with(|inner| inner.created.clone())
    }

    /// Names of deleted pods, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.with(|inner| inner.deleted.clone())
    }

    pub fn len(&self) -> usize {
        self.with(|inner| inner.pods.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every subsequent request fail until reset.
    pub fn fail_requests(&self, fail: bool) {
        self.with(|inner| inner.fail_requests = fail);
    }

    /// Make only `create_pod` fail until reset.
    pub fn fail_creates(&self, fail: bool) {
        self.with(|inner| inner.fail_creates = fail);
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut inner)
    }

    fn check(&self) -> Result<(), PodApiError> {
        if self.with(|inner| inner.fail_requests) {
            return Err(PodApiError::Request("injected failure".to_string()));
        }
        Ok(())
    }
}

impl PodApi for InMemoryPods {
    fn get_pod<'a>(&'a self, namespace: &'a str, name: &'a str) -> PodFuture<'a, Option<PodInfo>> {
        Box::pin(async move { self.check().map(|()| self.pod(namespace, name)) })
    }

    fn list_pods<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a BTreeMap<String, String>,
    ) -> PodFuture<'a, Vec<PodInfo>> {
        Box::pin(async move {
            self.check()?;
            Ok::<_, PodApiError>(self.with(|inner| {
                inner
                    .pods
                    .iter()
                    .filter(|((ns, _), _)| ns == namespace)
                    .map(|(_, pod)| pod)
                    .filter(|pod| {
                        selector
                            .iter()
                            .all(|(k, v)| pod.labels.get(k) == Some(v))
                    })
                    .cloned()
                    .collect()
            }))
        })
    }

    fn create_pod<'a>(&'a self, spec: &'a JobPodSpec) -> PodFuture<'a, String> {
        Box::pin(async move {
            self.check()?;
            self.with(|inner| -> Result<String, PodApiError> {
                if inner.fail_creates {
                    return Err(PodApiError::Request("pod creation refused".to_string()));
                }
                inner.next_suffix += 1;
                let name = format!("{}{:05}", spec.generate_name, inner.next_suffix);
                let key = (spec.namespace.clone(), name.clone());
                if inner.pods.contains_key(&key) {
                    return Err(PodApiError::AlreadyExists(name));
                }
                let mut pod = PodInfo::new(name.clone(), PodPhase::Pending);
                pod.labels = spec.labels.clone();
                inner.pods.insert(key, pod);
                inner.created.push(spec.clone());
                Ok(name)
            })
        })
    }

    fn delete_pod<'a>(&'a self, namespace: &'a str, name: &'a str) -> PodFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.with(|inner| {
                inner
                    .pods
                    .remove(&(namespace.to_string(), name.to_string()));
                inner.deleted.push(name.to_string());
            });
            Ok::<_, PodApiError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pods::{ITEM_LABEL, OwnerRef};
    use oaat_core::ContainerTemplate;

    fn spec(item: &str) -> JobPodSpec {
        JobPodSpec {
            namespace: "default".to_string(),
            generate_name: format!("grp-{item}-"),
            labels: BTreeMap::from([(ITEM_LABEL.to_string(), item.to_string())]),
            owner: OwnerRef {
                api_version: "oaat.dev/v1".to_string(),
                kind: "OaatGroup".to_string(),
                name: "grp".to_string(),
                uid: "uid-1".to_string(),
            },
            container: ContainerTemplate::default(),
            restart_policy: "Never".to_string(),
            service_account_name: None,
        }
    }

    #[tokio::test]
    async fn create_list_delete() {
        let pods = InMemoryPods::new();
        let name = pods.create_pod(&spec("a")).await.unwrap();
        assert_eq!(name, "grp-a-00001");
        assert_eq!(pods.pod("default", &name).unwrap().phase, PodPhase::Pending);

        let selector = BTreeMap::from([(ITEM_LABEL.to_string(), "a".to_string())]);
        assert_eq!(pods.list_pods("default", &selector).await.unwrap().len(), 1);
        assert!(pods.list_pods("other", &selector).await.unwrap().is_empty());

        pods.delete_pod("default", &name).await.unwrap();
        assert!(pods.get_pod("default", &name).await.unwrap().is_none());
        assert_eq!(pods.deleted(), vec![name]);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let pods = InMemoryPods::new();
        pods.fail_requests(true);
        assert!(matches!(
            pods.create_pod(&spec("a")).await,
            Err(PodApiError::Request(_))
        ));
        assert!(pods.is_empty());
    }
}
