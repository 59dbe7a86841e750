//! oaat-controller: reconciliation engine for one-at-a-time groups.
//!
//! # Architecture
//!
//! ```text
//! GroupReconciler::reconcile (group cycle)
//!   ├── validate_group           → ConfigError + status annotations
//!   ├── validate_state           → pod/currentlyRunning pair
//!   ├── pod recorded as running
//!   │     ├── validate_expected_pod_is_running
//!   │     └── validate_no_rogue_pods_running
//!   └── nothing running
//!         ├── validate_no_rogue_pods_running
//!         ├── no-start windows
//!         ├── find_job_to_run    (oaat-scheduler)
//!         └── build_job_pod → PodApi::create_pod
//!
//! GroupReconciler::observe (pod cycle)
//!   └── observe_pod              → phase, success/failure, runtime
//! ```
//!
//! Every cycle returns a [`Reconciled`]: an [`Outcome`] plus the
//! [`StatusPatch`](oaat_state::StatusPatch) the caller persists. Cluster
//! access goes through the [`PodApi`] trait; [`memory::InMemoryPods`]
//! implements it for tests.

pub mod error;
pub mod group;
pub mod job;
pub mod lifecycle;
pub mod memory;
pub mod outcome;
pub mod pods;
pub mod validate;

pub use error::{ConfigError, LifecycleError, PodApiError};
pub use group::{GroupCycle, GroupReconciler, PodCycle, ReconcilerSettings};
pub use job::{GroupRef, build_job_pod};
pub use outcome::{Completion, IdleReason, Outcome, Reconciled, Requeue};
pub use pods::{JobPodSpec, OwnerRef, PodApi, PodFuture, PodInfo};
