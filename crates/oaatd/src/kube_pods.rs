//! `PodApi` backed by the Kubernetes API.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use oaat_controller::pods::selector_string;
use oaat_controller::{JobPodSpec, PodApi, PodApiError, PodInfo};
use oaat_core::PodPhase;

/// Pod operations against the cluster.
#[derive(Clone)]
pub struct KubePods {
    client: Client,
}

impl KubePods {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl PodApi for KubePods {
    fn get_pod<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> oaat_controller::PodFuture<'a, Option<PodInfo>> {
        Box::pin(async move {
            let pod = self.api(namespace).get_opt(name).await.map_err(request_error)?;
            Ok::<_, PodApiError>(pod.as_ref().map(pod_info))
        })
    }

    fn list_pods<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a BTreeMap<String, String>,
    ) -> oaat_controller::PodFuture<'a, Vec<PodInfo>> {
        Box::pin(async move {
            let params = ListParams::default().labels(&selector_string(selector));
            let pods = self.api(namespace).list(&params).await.map_err(request_error)?;
            Ok::<_, PodApiError>(pods.items.iter().map(pod_info).collect())
        })
    }

    fn create_pod<'a>(&'a self, spec: &'a JobPodSpec) -> oaat_controller::PodFuture<'a, String> {
        Box::pin(async move {
            let pod = to_pod(spec);
            let created = self
                .api(&spec.namespace)
                .create(&PostParams::default(), &pod)
                .await
                .map_err(request_error)?;
            let name = created.name_any();
            debug!(pod = %name, namespace = %spec.namespace, "pod created");
            Ok::<_, PodApiError>(name)
        })
    }

    fn delete_pod<'a>(&'a self, namespace: &'a str, name: &'a str) -> oaat_controller::PodFuture<'a, ()> {
        Box::pin(async move {
            match self.api(namespace).delete(name, &DeleteParams::background()).await {
                Ok(_) => Ok(()),
                Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
                Err(e) => Err(request_error(e)),
            }
        })
    }
}

fn request_error(e: kube::Error) -> PodApiError {
    match e {
        kube::Error::Api(response) if response.code == 409 => {
            PodApiError::AlreadyExists(response.message)
        }
        other => PodApiError::Request(other.to_string()),
    }
}

/// Observed state of a pod, read from its status.
pub fn pod_info(pod: &Pod) -> PodInfo {
    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(|p| p.parse().unwrap_or(PodPhase::Unknown))
        .unwrap_or(PodPhase::Pending);

    let container_state = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .and_then(|c| c.state.as_ref());
    let terminated = container_state.and_then(|s| s.terminated.as_ref());
    let running_since = container_state
        .and_then(|s| s.running.as_ref())
        .and_then(|r| r.started_at.as_ref());

    let started_at = terminated
        .and_then(|t| t.started_at.as_ref())
        .or(running_since)
        .or_else(|| status.and_then(|s| s.start_time.as_ref()))
        .map(|t| t.0);

    PodInfo {
        name: pod.name_any(),
        phase,
        labels: pod.labels().clone(),
        started_at,
        finished_at: terminated.and_then(|t| t.finished_at.as_ref()).map(|t| t.0),
        exit_code: terminated.map(|t| t.exit_code),
    }
}

/// The Kubernetes pod for a resolved job.
pub fn to_pod(spec: &JobPodSpec) -> Pod {
    let template = &spec.container;
    let non_empty = |values: &Vec<String>| (!values.is_empty()).then(|| values.clone());
    let env = template
        .env
        .iter()
        .map(|var| EnvVar {
            name: var.name.clone(),
            value: Some(var.value.clone()),
            ..EnvVar::default()
        })
        .collect();

    Pod {
        metadata: ObjectMeta {
            generate_name: Some(spec.generate_name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(spec.labels.clone()),
            owner_references: Some(vec![OwnerReference {
                api_version: spec.owner.api_version.clone(),
                kind: spec.owner.kind.clone(),
                name: spec.owner.name.clone(),
                uid: spec.owner.uid.clone(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: template.name.clone(),
                image: Some(template.image.clone()),
                command: non_empty(&template.command),
                args: non_empty(&template.args),
                env: Some(env),
                ..Container::default()
            }],
            restart_policy: Some(spec.restart_policy.clone()),
            service_account_name: spec.service_account_name.clone(),
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}
