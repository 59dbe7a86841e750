//! Cycle outcomes.
//!
//! Every reconciliation cycle ends in exactly one [`Outcome`]. The outcome
//! never carries status writes itself: those travel next to it in
//! [`Reconciled::patch`] and are persisted whatever the outcome.

use std::fmt;

use oaat_core::PodPhase;
use oaat_state::StatusPatch;

use crate::error::{ConfigError, LifecycleError};
use crate::pods::PodInfo;

/// Why a cycle ended without starting anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleReason {
    /// No item is eligible yet.
    NotTimeYet,
    /// Inside a configured no-start window.
    NoStartWindow(String),
    /// The group's job pod is still active.
    PodActive { item: String, pod: String, phase: PodPhase },
    /// A pod phase was recorded.
    PhaseRecorded { item: String, phase: PodPhase },
    /// The tracked job pod had already finished and its result was folded in.
    JobFinished { item: String, pod: String, phase: PodPhase },
}

impl fmt::Display for IdleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleReason::NotTimeYet => f.write_str("not time to run next item"),
            IdleReason::NoStartWindow(name) => write!(f, "inside no-start window {name}"),
            IdleReason::PodActive { item, pod, phase } => {
                write!(f, "pod {pod} for item {item} is {phase}")
            }
            IdleReason::PhaseRecorded { item, phase } => {
                write!(f, "recorded phase {phase} for item {item}")
            }
            IdleReason::JobFinished { item, pod, phase } => {
                write!(f, "pod {pod} for item {item} finished as {phase}")
            }
        }
    }
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A job pod was created for `item`.
    Scheduled { item: String, pod: String },
    /// Nothing to do this cycle.
    Idle(IdleReason),
    /// Bookkeeping was reset to a known-good state; the next cycle proceeds normally.
    Recovered(LifecycleError),
    /// The group cannot be scheduled until its configuration changes.
    ConfigError(ConfigError),
    /// The cycle failed; the caller should retry later.
    Fatal(LifecycleError),
}

/// When the caller should run the group's next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    Idle,
    Running,
    AwaitChange,
    Backoff,
}

impl Outcome {
    pub fn requeue(&self) -> Requeue {
        match self {
            Outcome::Scheduled { .. } | Outcome::Idle(IdleReason::PodActive { .. }) => {
                Requeue::Running
            }
            Outcome::Idle(_) | Outcome::Recovered(_) => Requeue::Idle,
            Outcome::ConfigError(_) => Requeue::AwaitChange,
            Outcome::Fatal(_) => Requeue::Backoff,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::ConfigError(_) | Outcome::Fatal(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Scheduled { item, pod } => write!(f, "started pod {pod} for item {item}"),
            Outcome::Idle(reason) => write!(f, "{reason}"),
            Outcome::Recovered(e) => write!(f, "recovered: {e}"),
            Outcome::ConfigError(e) => write!(f, "configuration error: {e}"),
            Outcome::Fatal(e) => write!(f, "failed: {e}"),
        }
    }
}

/// A terminal job result that was newly recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub item: String,
    pub succeeded: bool,
}

/// Outcome of a cycle plus everything it wants persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub outcome: Outcome,
    pub patch: StatusPatch,
    pub completion: Option<Completion>,
    /// Finished job pod whose result this cycle recorded; delete it only
    /// after `patch` has been persisted.
    pub finished_pod: Option<PodInfo>,
}

impl Reconciled {
    pub fn new(outcome: Outcome, patch: StatusPatch) -> Self {
        Self {
            outcome,
            patch,
            completion: None,
            finished_pod: None,
        }
    }
}
