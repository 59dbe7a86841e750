//! Shared types used across the oaat crates.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Placeholder substituted with the item name in job command and args.
pub const ITEM_PLACEHOLDER: &str = "%%oaat_item%%";

/// Environment variable carrying the item name into the job container.
pub const ITEM_ENV_VAR: &str = "OAAT_ITEM";

// ── Group ─────────────────────────────────────────────────────────

/// Desired configuration of a group of one-at-a-time items.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    /// Minimum interval between successful runs of the same item (e.g. "1d").
    pub frequency: String,
    /// Minimum delay after a failure before the item is retried (e.g. "1h").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_cool_off: Option<String>,
    /// Daily windows during which no new job may start.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub no_start_windows: Vec<NoStartWindow>,
    /// Names of the items in this group.
    #[serde(default)]
    pub items: Vec<String>,
    /// Name of the job type providing the pod template.
    pub oaat_type: String,
}

/// A named daily blackout window.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NoStartWindow {
    pub name: String,
    pub start: TimeOfDaySpec,
    pub end: TimeOfDaySpec,
}

/// A time of day, `HH[:MM]` with optional `Z`/`±HH:MM` suffix.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TimeOfDaySpec {
    pub time: String,
    /// Zone used when `time` carries no suffix; UTC when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
}

// ── Job template ──────────────────────────────────────────────────

/// Only job kind currently supported.
pub const POD_JOB_KIND: &str = "pod";

/// A job type: how items of a group are executed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JobTypeSpec {
    /// Job kind; must be `pod`.
    #[serde(rename = "type")]
    pub kind: String,
    pub podspec: JobTemplate,
}

/// Pod template provided by a job type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplate {
    #[serde(default)]
    pub containers: Vec<ContainerTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerTemplate {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

// ── Phases and states ─────────────────────────────────────────────

/// Recorded phase of an item's job pod.
///
/// `Started` is written by the operator when it creates the pod; the rest
/// mirror the pod phases reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Started,
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Started => "started",
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }

    /// No further transition happens from a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PodPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(PodPhase::Started),
            "Pending" => Ok(PodPhase::Pending),
            "Running" => Ok(PodPhase::Running),
            "Succeeded" => Ok(PodPhase::Succeeded),
            "Failed" => Ok(PodPhase::Failed),
            "Unknown" => Ok(PodPhase::Unknown),
            other => Err(format!("unknown pod phase: {other}")),
        }
    }
}

/// Lifecycle state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Idle,
    Running,
    Missing,
    Inconsistent,
}

impl GroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupState::Idle => "idle",
            GroupState::Running => "running",
            GroupState::Missing => "missing",
            GroupState::Inconsistent => "inconsistent",
        }
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_phase_round_trips_through_strings() {
        for phase in [
            PodPhase::Started,
            PodPhase::Pending,
            PodPhase::Running,
            PodPhase::Succeeded,
            PodPhase::Failed,
            PodPhase::Unknown,
        ] {
            assert_eq!(phase.as_str().parse::<PodPhase>(), Ok(phase));
        }
        assert!("Evicted".parse::<PodPhase>().is_err());
    }

    #[test]
    fn terminal_phases() {
        assert!(PodPhase::Succeeded.is_terminal());
        assert!(PodPhase::Failed.is_terminal());
        assert!(!PodPhase::Running.is_terminal());
        assert!(!PodPhase::Started.is_terminal());
    }

    #[test]
    fn group_spec_parses_camel_case() {
        let json = r#"{
            "frequency": "1d",
            "failureCoolOff": "2h",
            "noStartWindows": [
                {"name": "backup", "start": {"time": "01:00"}, "end": {"time": "03:00", "tz": "Z"}}
            ],
            "items": ["a", "b"],
            "oaatType": "batch"
        }"#;
        let spec: GroupSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.failure_cool_off.as_deref(), Some("2h"));
        assert_eq!(spec.no_start_windows[0].end.tz.as_deref(), Some("Z"));
        assert_eq!(spec.items, vec!["a", "b"]);
    }

    #[test]
    fn job_type_reads_type_and_podspec() {
        let json = r#"{
            "type": "pod",
            "podspec": {
                "containers": [{"name": "job", "image": "busybox", "args": ["%%oaat_item%%"]}],
                "restartPolicy": "Never"
            }
        }"#;
        let job: JobTypeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(job.kind, POD_JOB_KIND);
        assert_eq!(job.podspec.containers[0].args, vec![ITEM_PLACEHOLDER]);
        assert_eq!(job.podspec.restart_policy.as_deref(), Some("Never"));
    }

    #[test]
    fn group_state_serializes_lowercase() {
        let json = serde_json::to_string(&GroupState::Inconsistent).unwrap();
        assert_eq!(json, "\"inconsistent\"");
    }
}
