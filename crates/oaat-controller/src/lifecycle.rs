//! Lifecycle state machine.
//!
//! Keeps the group's running-pod bookkeeping aligned with the pods that
//! actually exist, and folds observed pod phases back into item status.
//!
//! ```text
//!            create pod
//!   idle ───────────────▶ running ──── terminal phase observed ───▶ idle
//!    ▲                      │
//!    │                      └── pod gone ──▶ missing ── next cycle ──┐
//!    │                                                               │
//!    └──────── next cycle ◀── inconsistent ◀── broken pod/item pair  │
//!    └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Item writes go through the [`Items`] passed in; each check returns only
//! the group-level fields it changed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, error, info, warn};

use oaat_core::{GroupState, PodPhase};
use oaat_state::{GroupStatus, Items, RunningPodRef, RunningSlot, StatusPatch};

use crate::error::LifecycleError;
use crate::outcome::Completion;
use crate::pods::{PodApi, PodInfo};

/// A check that ended the cycle, with the group fields it reset.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub error: LifecycleError,
    pub patch: StatusPatch,
}

impl Failure {
    fn new(error: LifecycleError, patch: StatusPatch) -> Self {
        Self { error, patch }
    }
}

impl From<LifecycleError> for Failure {
    fn from(error: LifecycleError) -> Self {
        Self::new(error, StatusPatch::new())
    }
}

/// Check that `pod` and `currentlyRunning` are both set or both unset.
///
/// A broken pair is cleared and reported as an internal inconsistency.
pub fn validate_state(status: &GroupStatus) -> Result<Option<RunningPodRef>, Failure> {
    match status.running_slot() {
        RunningSlot::Empty => Ok(None),
        RunningSlot::Occupied(running) => Ok(Some(running)),
        RunningSlot::Broken { pod, item } => {
            error!(?pod, ?item, "running pod bookkeeping is inconsistent, resetting");
            let mut patch = StatusPatch::new();
            patch.clear_running().set_state(GroupState::Inconsistent);
            Err(Failure::new(
                LifecycleError::InternalInconsistency { pod, item },
                patch,
            ))
        }
    }
}

/// Look up the pod the group believes is running.
///
/// A missing pod fails its item, clears the running pair, and moves the
/// group to `missing`. A live pod whose phase differs from the recorded one
/// is only logged.
pub async fn validate_expected_pod_is_running<P: PodApi + ?Sized>(
    pods: &P,
    namespace: &str,
    running: &RunningPodRef,
    items: &mut Items<'_>,
    now: DateTime<Utc>,
) -> Result<PodInfo, Failure> {
    let found = pods
        .get_pod(namespace, &running.pod)
        .await
        .map_err(LifecycleError::from)?;

    let Some(pod) = found else {
        warn!(item = %running.item, pod = %running.pod, "running pod has disappeared");
        items.mark_failed(&running.item, now);
        let mut patch = StatusPatch::new();
        patch.clear_running().set_state(GroupState::Missing);
        return Err(Failure::new(
            LifecycleError::PodMissing {
                pod: running.pod.clone(),
                item: running.item.clone(),
            },
            patch,
        ));
    };

    if let Some(label) = pod.item() {
        if label != running.item {
            warn!(pod = %pod.name, expected = %running.item, label, "pod item label does not match currentlyRunning");
        }
    }

    match items.status_of(&running.item).pod_phase {
        Some(recorded) if recorded != pod.phase && recorded != PodPhase::Started => {
            warn!(
                item = %running.item,
                pod = %pod.name,
                %recorded,
                live = %pod.phase,
                "pod phase differs from recorded phase"
            );
        }
        _ => debug!(item = %running.item, pod = %pod.name, phase = %pod.phase, "expected pod found"),
    }
    Ok(pod)
}

/// Fail when any active job pod of the group other than `expected` exists.
///
/// Pods that already reached a terminal phase are not counted. Rogue pods
/// are reported, never deleted.
pub async fn validate_no_rogue_pods_running<P: PodApi + ?Sized>(
    pods: &P,
    namespace: &str,
    selector: &BTreeMap<String, String>,
    expected: Option<&str>,
) -> Result<(), Failure> {
    let listed = pods
        .list_pods(namespace, selector)
        .await
        .map_err(LifecycleError::from)?;

    let rogue: Vec<String> = listed
        .into_iter()
        .filter(|pod| !pod.phase.is_terminal())
        .filter(|pod| Some(pod.name.as_str()) != expected)
        .map(|pod| pod.name)
        .collect();

    if rogue.is_empty() {
        return Ok(());
    }
    error!(?expected, pods = ?rogue, "rogue job pods detected");
    Err(LifecycleError::RoguePods { pods: rogue }.into())
}

/// Fold an observed pod phase into the status of `item`.
///
/// The phase is always recorded. A terminal phase carrying a finish time
/// newer than the recorded one marks the item succeeded or failed, records
/// the runtime, and yields a [`Completion`]. Whenever the finished pod is
/// the one the group tracks, the running pair is cleared and the group
/// returns to `idle`.
pub fn observe_pod(
    items: &mut Items<'_>,
    status: &GroupStatus,
    item: &str,
    pod: &PodInfo,
    rng: &mut dyn RngCore,
) -> (StatusPatch, Option<Completion>) {
    items.set_phase(item, pod.phase);

    let mut patch = StatusPatch::new();
    if !pod.phase.is_terminal() {
        return (patch, None);
    }
    let Some(finished) = pod.finished_at else {
        warn!(%item, pod = %pod.name, phase = %pod.phase, "terminal pod has no finish time");
        return (patch, None);
    };

    let succeeded = pod.phase == PodPhase::Succeeded;
    let applied = if succeeded {
        items.mark_success(item, finished)
    } else {
        items.mark_failed(item, finished)
    };

    let completion = if applied {
        items.record_runtime(item, pod.started_at, finished, rng);
        info!(%item, pod = %pod.name, succeeded, exit_code = ?pod.exit_code, "job finished");
        Some(Completion {
            item: item.to_string(),
            succeeded,
        })
    } else {
        debug!(%item, pod = %pod.name, "terminal phase already recorded");
        None
    };

    if let RunningSlot::Occupied(running) = status.running_slot() {
        if running.pod == pod.name {
            patch.clear_running().set_state(GroupState::Idle);
        }
    }
    (patch, completion)
}
