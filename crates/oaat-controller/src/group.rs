//! Group orchestrator: one reconciliation cycle per call.
//!
//! A group cycle validates the configuration, checks the running-pod
//! bookkeeping, and either watches the current job or picks and starts the
//! next one. A pod cycle folds one observed pod phase into the group.
//! Neither touches the group resource: both return a [`Reconciled`] whose
//! patch the caller persists.

use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, error, info, warn};

use oaat_core::{GroupSpec, GroupState, JobTypeSpec, OperatorConfig, PodPhase};
use oaat_scheduler::{Selection, SchedulerError, find_job_to_run};
use oaat_state::{GroupStatus, Items, RunningPodRef, SnapshotBackend, StatusPatch};

use crate::error::{ConfigError, LifecycleError};
use crate::job::{GroupRef, build_job_pod};
use crate::lifecycle::{
    Failure, observe_pod, validate_expected_pod_is_running, validate_no_rogue_pods_running,
    validate_state,
};
use crate::outcome::{IdleReason, Outcome, Reconciled};
use crate::pods::{PodApi, PodInfo, group_selector};
use crate::validate::{ValidGroup, check_label_value, validate_group, validation_annotations};

/// Settings the orchestrator takes from the operator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerSettings {
    pub reservoir_capacity: usize,
    pub confidence_factor: f64,
    pub delete_finished: bool,
    pub app_label: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self::from(&OperatorConfig::default())
    }
}

impl From<&OperatorConfig> for ReconcilerSettings {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            reservoir_capacity: config.statistics.reservoir_capacity,
            confidence_factor: config.statistics.confidence_factor,
            delete_finished: config.pods.delete_finished,
            app_label: config.pods.app_label.clone(),
        }
    }
}

/// Snapshot handed to a group cycle.
#[derive(Debug, Clone, Copy)]
pub struct GroupCycle<'a> {
    pub group: GroupRef<'a>,
    pub spec: &'a GroupSpec,
    pub status: &'a GroupStatus,
    /// The job type named by the spec, if it exists.
    pub job_type: Option<&'a JobTypeSpec>,
    pub now: DateTime<Utc>,
}

/// Snapshot handed to a pod cycle.
#[derive(Debug, Clone, Copy)]
pub struct PodCycle<'a> {
    pub group: GroupRef<'a>,
    pub status: &'a GroupStatus,
    pub pod: &'a PodInfo,
}

/// Drives group and pod cycles against a pod store.
pub struct GroupReconciler<P> {
    pods: P,
    settings: ReconcilerSettings,
}

impl<P: PodApi> GroupReconciler<P> {
    pub fn new(pods: P, settings: ReconcilerSettings) -> Self {
        Self { pods, settings }
    }

    pub fn pods(&self) -> &P {
        &self.pods
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Run one group cycle.
    pub async fn reconcile(
        &self,
        cycle: &GroupCycle<'_>,
        rng: &mut (dyn RngCore + Send),
    ) -> Reconciled {
        let name = cycle.group.name;
        let mut patch = StatusPatch::new();
        patch.set_loops(cycle.status.loops.saturating_add(1));

        let validated =
            check_label_value(name).and_then(|()| validate_group(cycle.spec, cycle.job_type));
        patch.merge(validation_annotations(cycle.spec, &validated));
        let valid = match validated {
            Ok(valid) => valid,
            Err(e) => {
                warn!(group = %name, error = %e, "group configuration rejected");
                return Reconciled::new(Outcome::ConfigError(e), patch);
            }
        };

        let running = match validate_state(cycle.status) {
            Ok(running) => running,
            Err(Failure { error, patch: reset }) => {
                patch.merge(reset);
                return Reconciled::new(Outcome::Recovered(error), patch);
            }
        };

        let mut backend = SnapshotBackend::new(cycle.status);
        let mut step = match Items::new(
            valid.items.clone(),
            &mut backend,
            self.settings.reservoir_capacity,
        ) {
            Ok(mut items) => match running {
                Some(running) => self.watch(cycle, &running, &mut items, rng).await,
                None => {
                    let (outcome, group_patch) =
                        self.schedule(cycle, &valid, &mut items, rng).await;
                    Reconciled::new(outcome, group_patch)
                }
            },
            // Names were checked by validate_group.
            Err(e) => {
                error!(group = %name, error = %e, "item list rejected");
                Reconciled::new(Outcome::ConfigError(ConfigError::NoItems), StatusPatch::new())
            }
        };
        patch.merge(backend.into_patch());
        patch.merge(std::mem::take(&mut step.patch));
        step.patch = patch;

        let outcome = &step.outcome;
        match outcome {
            Outcome::Scheduled { .. } => info!(group = %name, %outcome, "cycle complete"),
            Outcome::Idle(_) => debug!(group = %name, %outcome, "cycle complete"),
            Outcome::Recovered(_) => warn!(group = %name, %outcome, "cycle recovered"),
            Outcome::ConfigError(_) | Outcome::Fatal(_) => {
                error!(group = %name, %outcome, "cycle failed")
            }
        }
        step
    }

    /// A job pod is recorded as running: make sure it still exists and is alone.
    ///
    /// A tracked pod that already finished is folded in here, so a lost pod
    /// event cannot leave the group running forever.
    async fn watch(
        &self,
        cycle: &GroupCycle<'_>,
        running: &RunningPodRef,
        items: &mut Items<'_>,
        rng: &mut (dyn RngCore + Send),
    ) -> Reconciled {
        let namespace = cycle.group.namespace;
        let pod = match validate_expected_pod_is_running(
            &self.pods, namespace, running, items, cycle.now,
        )
        .await
        {
            Ok(pod) => pod,
            Err(Failure { error, patch }) => return Reconciled::new(lifecycle_outcome(error), patch),
        };

        if pod.phase.is_terminal() {
            return finish_tracked(cycle, running, pod, items, rng);
        }

        let selector = group_selector(&self.settings.app_label, cycle.group.name);
        if let Err(Failure { error, patch }) =
            validate_no_rogue_pods_running(&self.pods, namespace, &selector, Some(&running.pod))
                .await
        {
            return Reconciled::new(Outcome::Fatal(error), patch);
        }

        let outcome = Outcome::Idle(IdleReason::PodActive {
            item: running.item.clone(),
            pod: pod.name,
            phase: pod.phase,
        });
        Reconciled::new(outcome, StatusPatch::new())
    }

    /// Nothing is running: pick the next item and start its pod.
    async fn schedule(
        &self,
        cycle: &GroupCycle<'_>,
        valid: &ValidGroup,
        items: &mut Items<'_>,
        rng: &mut (dyn RngCore + Send),
    ) -> (Outcome, StatusPatch) {
        let name = cycle.group.name;
        let namespace = cycle.group.namespace;
        let mut patch = StatusPatch::new();

        let selector = group_selector(&self.settings.app_label, name);
        if let Err(Failure { error, patch }) =
            validate_no_rogue_pods_running(&self.pods, namespace, &selector, None).await
        {
            return (Outcome::Fatal(error), patch);
        }

        if let Some(blackout) = valid.blackout_at(cycle.now) {
            patch.set_state(GroupState::Idle);
            return (
                Outcome::Idle(IdleReason::NoStartWindow(blackout.name.clone())),
                patch,
            );
        }

        let candidates = items.list();
        let item = match find_job_to_run(&candidates, &valid.policy, cycle.now, rng) {
            Ok(Selection::Run { item, tier }) => {
                debug!(group = %name, %item, ?tier, "item selected");
                item
            }
            Ok(Selection::NotTimeYet) => {
                patch.set_state(GroupState::Idle);
                return (Outcome::Idle(IdleReason::NotTimeYet), patch);
            }
            Err(SchedulerError::NoItemsConfigured) => {
                return (Outcome::ConfigError(ConfigError::NoItems), patch);
            }
        };

        let spec = match build_job_pod(cycle.group, &item, &valid.template, &self.settings.app_label)
        {
            Ok(spec) => spec,
            Err(e) => return (Outcome::ConfigError(e), patch),
        };

        match self.pods.create_pod(&spec).await {
            Ok(pod) => {
                let predicted = items
                    .status_of(&item)
                    .runtime
                    .and_then(|r| r.predict(self.settings.confidence_factor));
                info!(group = %name, %item, %pod, predicted_secs = ?predicted, "job pod created");
                items.set_phase(&item, PodPhase::Started);
                patch
                    .set_running(RunningPodRef::new(item.clone(), pod.clone()))
                    .set_state(GroupState::Running);
                (Outcome::Scheduled { item, pod }, patch)
            }
            Err(e) => {
                error!(group = %name, %item, error = %e, "job pod creation failed");
                items.mark_failed(&item, cycle.now);
                patch.set_state(GroupState::Idle);
                (Outcome::Fatal(LifecycleError::Api(e)), patch)
            }
        }
    }

    /// Run one pod cycle.
    pub fn observe(&self, cycle: &PodCycle<'_>, rng: &mut dyn RngCore) -> Reconciled {
        let pod = cycle.pod;
        let Some(item) = pod.item().filter(|i| !i.is_empty()) else {
            warn!(group = %cycle.group.name, pod = %pod.name, "ignoring pod without item label");
            return Reconciled::new(
                Outcome::Fatal(LifecycleError::UnlabeledPod(pod.name.clone())),
                StatusPatch::new(),
            );
        };

        let mut backend = SnapshotBackend::new(cycle.status);
        let (group_patch, completion) = match Items::new(
            vec![item.to_string()],
            &mut backend,
            self.settings.reservoir_capacity,
        ) {
            Ok(mut items) => observe_pod(&mut items, cycle.status, item, pod, rng),
            Err(e) => {
                error!(group = %cycle.group.name, pod = %pod.name, error = %e, "pod item rejected");
                (StatusPatch::new(), None)
            }
        };

        let mut patch = backend.into_patch();
        patch.merge(group_patch);
        let outcome = Outcome::Idle(IdleReason::PhaseRecorded {
            item: item.to_string(),
            phase: pod.phase,
        });
        let finished_pod = (pod.phase.is_terminal() && pod.finished_at.is_some()).then(|| pod.clone());
        Reconciled {
            outcome,
            patch,
            completion,
            finished_pod,
        }
    }

    /// Delete a finished job pod once its result has been persisted.
    ///
    /// Does nothing unless `delete_finished` is set and the pod is terminal
    /// with a known finish time. Failures are logged, never returned.
    pub async fn cleanup(&self, namespace: &str, pod: &PodInfo) -> bool {
        if !self.settings.delete_finished || !pod.phase.is_terminal() || pod.finished_at.is_none() {
            return false;
        }
        match self.pods.delete_pod(namespace, &pod.name).await {
            Ok(()) => {
                debug!(pod = %pod.name, "finished job pod deleted");
                true
            }
            Err(e) => {
                warn!(pod = %pod.name, error = %e, "could not delete finished job pod");
                false
            }
        }
    }
}

/// Record the result of the tracked pod when its own pod cycle never landed.
fn finish_tracked(
    cycle: &GroupCycle<'_>,
    running: &RunningPodRef,
    mut pod: PodInfo,
    items: &mut Items<'_>,
    rng: &mut dyn RngCore,
) -> Reconciled {
    if pod.finished_at.is_none() {
        warn!(group = %cycle.group.name, pod = %pod.name, "finished pod has no finish time, using cycle time");
        pod.finished_at = Some(cycle.now);
    }
    let (patch, completion) = observe_pod(items, cycle.status, &running.item, &pod, rng);
    let outcome = Outcome::Idle(IdleReason::JobFinished {
        item: running.item.clone(),
        pod: pod.name.clone(),
        phase: pod.phase,
    });
    Reconciled {
        outcome,
        patch,
        completion,
        finished_pod: Some(pod),
    }
}

fn lifecycle_outcome(error: LifecycleError) -> Outcome {
    match error {
        LifecycleError::PodMissing { .. } | LifecycleError::InternalInconsistency { .. } => {
            Outcome::Recovered(error)
        }
        LifecycleError::RoguePods { .. }
        | LifecycleError::UnlabeledPod(_)
        | LifecycleError::Api(_) => Outcome::Fatal(error),
    }
}
