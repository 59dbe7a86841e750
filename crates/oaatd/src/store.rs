//! Where groups and job types are read from and patched.

use std::future::Future;
use std::pin::Pin;

use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;

use oaat_state::StatusPatch;

use crate::crd::{OaatGroup, OaatType};
use crate::error::{OperatorError, OperatorResult};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = OperatorResult<T>> + Send + 'a>>;

/// Group storage used by the operator loops.
pub trait GroupStore: Send + Sync {
    /// Every group in scope.
    fn list_groups(&self) -> StoreFuture<'_, Vec<OaatGroup>>;

    fn get_group<'a>(&'a self, namespace: &'a str, name: &'a str) -> StoreFuture<'a, Option<OaatGroup>>;

    fn get_job_type<'a>(&'a self, namespace: &'a str, name: &'a str) -> StoreFuture<'a, Option<OaatType>>;

    /// Persist the status and annotation parts of `patch`.
    fn patch_group<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a StatusPatch,
    ) -> StoreFuture<'a, ()>;
}

/// An `Api` over one namespace, or over all of them when unset.
pub fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Groups stored as `OaatGroup` resources in the cluster.
#[derive(Clone)]
pub struct KubeGroups {
    client: Client,
    namespace: Option<String>,
}

impl KubeGroups {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }
}

impl GroupStore for KubeGroups {
    fn list_groups(&self) -> StoreFuture<'_, Vec<OaatGroup>> {
        Box::pin(async move {
            let api = scoped::<OaatGroup>(&self.client, self.namespace.as_deref());
            Ok::<_, OperatorError>(api.list(&ListParams::default()).await?.items)
        })
    }

    fn get_group<'a>(&'a self, namespace: &'a str, name: &'a str) -> StoreFuture<'a, Option<OaatGroup>> {
        Box::pin(async move {
            let api = Api::<OaatGroup>::namespaced(self.client.clone(), namespace);
            Ok::<_, OperatorError>(api.get_opt(name).await?)
        })
    }

    fn get_job_type<'a>(&'a self, namespace: &'a str, name: &'a str) -> StoreFuture<'a, Option<OaatType>> {
        Box::pin(async move {
            let api = Api::<OaatType>::namespaced(self.client.clone(), namespace);
            Ok::<_, OperatorError>(api.get_opt(name).await?)
        })
    }

    fn patch_group<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a StatusPatch,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = Api::<OaatGroup>::namespaced(self.client.clone(), namespace);
            let params = PatchParams::default();
            if let Some(status) = patch.status_merge_patch() {
                api.patch_status(name, &params, &Patch::Merge(&status)).await?;
            }
            if let Some(metadata) = patch.annotations_merge_patch() {
                api.patch(name, &params, &Patch::Merge(&metadata)).await?;
            }
            Ok::<_, OperatorError>(())
        })
    }
}
