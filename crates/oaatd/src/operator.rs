//! Cluster wiring: the group scan loop and the job pod watcher.
//!
//! Every group cycle bumps `status.loops`, so reconciles are driven by a
//! fixed scan plus a per-group due table rather than by resource events.
//! Pod events are handled as they arrive and make the owning group due.
//! Both kinds of cycle run under one lock and read the group fresh from
//! the store once they hold it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube::api::Api;
use kube::runtime::{WatchStreamExt, watcher};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use oaat_controller::pods::APP_LABEL;
use oaat_controller::{GroupCycle, GroupRef, GroupReconciler, PodApi, PodCycle, PodInfo, Requeue};
use oaat_core::OperatorConfig;

use crate::crd::OaatGroup;
use crate::due::{DueTable, Intervals, group_key};
use crate::error::{OperatorError, OperatorResult};
use crate::kube_pods::pod_info;
use crate::store::GroupStore;

/// Requeue intervals from the `[timers]` section.
pub fn intervals(config: &OperatorConfig) -> anyhow::Result<Intervals> {
    Ok(Intervals {
        idle: config.timers.idle()?.to_std()?,
        running: config.timers.running()?.to_std()?,
        backoff: config.timers.error_backoff()?.to_std()?,
    })
}

/// Label selector matching every job pod this operator creates.
pub fn job_pod_selector(app_label: &str) -> String {
    format!("{APP_LABEL}={app_label}")
}

pub struct Operator<S, P> {
    store: S,
    reconciler: GroupReconciler<P>,
    /// Held for the whole of each cycle so group and pod cycles never interleave.
    due: Mutex<DueTable>,
}

impl<S: GroupStore, P: PodApi> Operator<S, P> {
    pub fn new(store: S, pods: P, config: &OperatorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            reconciler: GroupReconciler::new(pods, config.into()),
            due: Mutex::new(DueTable::new(intervals(config)?)),
        })
    }

    /// Scan groups every `interval` until shutdown.
    pub async fn run_groups(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "group loop started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan().await {
                        error!(error = %e, "group scan failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("group loop shutting down");
                    break;
                }
            }
        }
    }

    async fn scan(&self) -> OperatorResult<()> {
        let listed = self.store.list_groups().await?;
        self.reconcile_listed(&listed).await;
        Ok(())
    }

    /// Run a group cycle for every listed group that is due.
    ///
    /// The listing only decides which groups are due; each cycle re-reads
    /// its group under the lock, so status written by a pod cycle since
    /// the listing is never overwritten from the older copy.
    async fn reconcile_listed(&self, listed: &[OaatGroup]) {
        let live: Vec<String> = listed
            .iter()
            .map(|g| group_key(&g.namespace().unwrap_or_default(), &g.name_any()))
            .collect();

        for (group, key) in listed.iter().zip(&live) {
            let mut due = self.due.lock().await;
            if !due.is_due(key, group.metadata.generation, Instant::now()) {
                continue;
            }

            let namespace = group.namespace().unwrap_or_default();
            let fresh = match self.store.get_group(&namespace, &group.name_any()).await {
                Ok(Some(fresh)) => fresh,
                Ok(None) => {
                    debug!(group = %key, "group deleted since listing");
                    continue;
                }
                Err(e) => {
                    error!(group = %key, error = %e, "group could not be read");
                    due.record(key, Requeue::Backoff, group.metadata.generation, Instant::now());
                    continue;
                }
            };

            let generation = fresh.metadata.generation;
            let requeue = match self.reconcile_group(&fresh).await {
                Ok(requeue) => requeue,
                Err(e) => {
                    error!(group = %key, error = %e, "group cycle failed");
                    Requeue::Backoff
                }
            };
            due.record(key, requeue, generation, Instant::now());
        }

        let mut due = self.due.lock().await;
        due.retain(&live);
        debug!(groups = live.len(), tracked = due.len(), "scan complete");
    }

    async fn reconcile_group(&self, group: &OaatGroup) -> OperatorResult<Requeue> {
        let name = group.name_any();
        let namespace = group
            .namespace()
            .ok_or_else(|| OperatorError::MissingNamespace(name.clone()))?;
        let uid = group.uid().ok_or_else(|| OperatorError::MissingUid(name.clone()))?;

        let type_name = &group.spec.group.oaat_type;
        let job_type = if type_name.is_empty() {
            None
        } else {
            self.store.get_job_type(&namespace, type_name).await?
        };

        let status = group.status.clone().unwrap_or_default();
        let cycle = GroupCycle {
            group: GroupRef {
                name: &name,
                namespace: &namespace,
                uid: &uid,
            },
            spec: &group.spec.group,
            status: &status,
            job_type: job_type.as_ref().map(|t| &t.spec.job),
            now: Utc::now(),
        };
        let mut rng = StdRng::from_entropy();
        let reconciled = self.reconciler.reconcile(&cycle, &mut rng).await;
        self.store.patch_group(&namespace, &name, &reconciled.patch).await?;
        if let Some(pod) = &reconciled.finished_pod {
            self.reconciler.cleanup(&namespace, pod).await;
        }
        Ok(reconciled.outcome.requeue())
    }

    /// Follow job pods until shutdown.
    pub async fn watch_pods(self: Arc<Self>, pods: Api<Pod>, mut shutdown: watch::Receiver<bool>) {
        let selector = job_pod_selector(&self.reconciler.settings().app_label);
        info!(%selector, "pod watcher started");
        let config = watcher::Config::default().labels(&selector);
        let mut events = Box::pin(watcher(pods, config).default_backoff().applied_objects());
        loop {
            tokio::select! {
                event = events.try_next() => match event {
                    Ok(Some(pod)) => {
                        if let Err(e) = self.handle_pod(&pod).await {
                            warn!(pod = %pod.name_any(), error = %e, "pod cycle failed");
                        }
                    }
                    Ok(None) => {
                        warn!("pod watch stream ended");
                        break;
                    }
                    Err(e) => warn!(error = %e, "pod watch error"),
                },
                _ = shutdown.changed() => {
                    info!("pod watcher shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_pod(&self, pod: &Pod) -> OperatorResult<()> {
        let namespace = pod
            .namespace()
            .ok_or_else(|| OperatorError::MissingNamespace(pod.name_any()))?;
        self.observe_job_pod(&namespace, pod_info(pod)).await
    }

    /// Run a pod cycle for one observed job pod.
    ///
    /// A failed cycle is not retried here: the group cycle folds in a
    /// finished tracked pod on its own.
    async fn observe_job_pod(&self, namespace: &str, observed: PodInfo) -> OperatorResult<()> {
        let parent = observed
            .group()
            .map(str::to_string)
            .ok_or_else(|| OperatorError::NoParent(observed.name.clone()))?;

        let mut due = self.due.lock().await;
        let Some(group) = self.store.get_group(namespace, &parent).await? else {
            debug!(pod = %observed.name, group = %parent, "owning group is gone");
            return Ok(());
        };
        let uid = group.uid().ok_or_else(|| OperatorError::MissingUid(parent.clone()))?;
        let status = group.status.clone().unwrap_or_default();

        let reconciled = {
            let cycle = PodCycle {
                group: GroupRef {
                    name: &parent,
                    namespace,
                    uid: &uid,
                },
                status: &status,
                pod: &observed,
            };
            let mut rng = StdRng::from_entropy();
            self.reconciler.observe(&cycle, &mut rng)
        };
        self.store.patch_group(namespace, &parent, &reconciled.patch).await?;

        if let Some(done) = &reconciled.completion {
            debug!(group = %parent, item = %done.item, "completion persisted, group due");
            due.wake(&group_key(namespace, &parent));
        }
        if let Some(pod) = &reconciled.finished_pod {
            self.reconciler.cleanup(namespace, pod).await;
        }
        Ok(())
    }
}
