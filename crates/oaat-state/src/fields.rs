//! Per-item status field names.
//!
//! Each item's status is a flat map of strings keyed by these names, plus
//! the `runtime_*` fields owned by `oaat_stats`.

/// Timestamp of the most recent success (RFC 3339).
pub const LAST_SUCCESS: &str = "last_success";

/// Timestamp of the most recent failure (RFC 3339).
pub const LAST_FAILURE: &str = "last_failure";

/// Failures since the most recent success.
pub const FAILURE_COUNT: &str = "failure_count";

/// Last observed phase of the item's job pod.
pub const POD_PHASE: &str = "podphase";
