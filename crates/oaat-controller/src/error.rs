//! Controller error types.

use thiserror::Error;

use oaat_core::DurationError;

/// Failure reported by the pod collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PodApiError {
    #[error("pod {0} already exists")]
    AlreadyExists(String),

    #[error("pod API request failed: {0}")]
    Request(String),
}

/// A group whose configuration cannot be scheduled.
///
/// Surfaced to the group's owner; the group is not scheduled until its
/// spec changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no items configured")]
    NoItems,

    #[error("item names must not be empty")]
    EmptyItemName,

    #[error("{0:?} is not a valid label value (at most 63 of [A-Za-z0-9._-], alphanumeric at both ends)")]
    InvalidLabelValue(String),

    #[error("item {0:?} is listed more than once")]
    DuplicateItem(String),

    #[error("frequency {0:?} is not a duration")]
    InvalidFrequency(String),

    #[error("failureCoolOff {0:?} is not a duration")]
    InvalidCoolOff(String),

    #[error("no-start window {window:?}: {source}")]
    InvalidWindow {
        window: String,
        #[source]
        source: DurationError,
    },

    #[error("job type {0:?} not found")]
    MissingJobType(String),

    #[error("job type has unsupported kind {0:?} (only \"pod\" is supported)")]
    UnsupportedJobKind(String),

    #[error("pod template has no containers")]
    NoContainers,

    #[error("pod template has {0} containers; exactly one is supported")]
    MultipleContainers(usize),

    #[error("restartPolicy {0:?} is not allowed; job pods must use Never")]
    RestartPolicy(String),
}

/// Lifecycle faults detected while checking the running-pod bookkeeping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("inconsistent running state: pod={pod:?} currentlyRunning={item:?}")]
    InternalInconsistency {
        pod: Option<String>,
        item: Option<String>,
    },

    #[error("pod {pod} for item {item} is missing")]
    PodMissing { pod: String, item: String },

    #[error("unexpected job pods running: {}", .pods.join(", "))]
    RoguePods { pods: Vec<String> },

    #[error("pod {0} has no item label")]
    UnlabeledPod(String),

    #[error(transparent)]
    Api(#[from] PodApiError),
}
