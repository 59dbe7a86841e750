//! Typed view of one item's stored status fields.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use tracing::warn;

use oaat_core::PodPhase;
use oaat_stats::RuntimeStats;

use crate::fields;
use crate::types::ItemFields;

/// The timestamp recorded for "never happened".
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// `at + delta`, pinned to the representable range instead of overflowing.
pub fn saturating_add(at: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parsed status of a single item.
///
/// Unreadable stored values degrade to their defaults with a warning: a
/// bad timestamp reads as the epoch, a bad runtime history as no history.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStatus {
    pub last_success: DateTime<Utc>,
    pub last_failure: DateTime<Utc>,
    pub failure_count: u32,
    pub pod_phase: Option<PodPhase>,
    pub runtime: Option<RuntimeStats>,
}

impl Default for ItemStatus {
    fn default() -> Self {
        Self {
            last_success: epoch(),
            last_failure: epoch(),
            failure_count: 0,
            pod_phase: None,
            runtime: None,
        }
    }
}

impl ItemStatus {
    pub fn from_fields(item: &str, stored: &ItemFields, capacity: usize) -> Self {
        let runtime = match RuntimeStats::from_fields(stored, capacity) {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(%item, error = %e, "dropping unreadable runtime statistics");
                None
            }
        };

        let pod_phase = stored
            .get(fields::POD_PHASE)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| match raw.parse::<PodPhase>() {
                Ok(phase) => Some(phase),
                Err(e) => {
                    warn!(%item, error = %e, "ignoring stored pod phase");
                    None
                }
            });

        let failure_count = match stored.get(fields::FAILURE_COUNT) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(%item, value = %raw, "unreadable failure count, treating as 0");
                0
            }),
            None => 0,
        };

        Self {
            last_success: timestamp_field(item, stored, fields::LAST_SUCCESS),
            last_failure: timestamp_field(item, stored, fields::LAST_FAILURE),
            failure_count,
            pod_phase,
            runtime,
        }
    }

    pub fn has_succeeded(&self) -> bool {
        self.last_success > epoch()
    }

    pub fn has_failed(&self) -> bool {
        self.last_failure > epoch()
    }
}

fn timestamp_field(item: &str, stored: &ItemFields, key: &str) -> DateTime<Utc> {
    let Some(raw) = stored.get(key).filter(|raw| !raw.is_empty()) else {
        return epoch();
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at.with_timezone(&Utc),
        Err(e) => {
            warn!(%item, field = key, value = %raw, error = %e, "unreadable timestamp, treating as never");
            epoch()
        }
    }
}

/// An item and its parsed status.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    pub status: ItemStatus,
}

impl Item {
    pub fn new(name: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stored(pairs: &[(&str, &str)]) -> ItemFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_fields_mean_never_run() {
        let status = ItemStatus::from_fields("a", &ItemFields::new(), 100);
        assert_eq!(status, ItemStatus::default());
        assert!(!status.has_succeeded());
        assert!(!status.has_failed());
    }

    #[test]
    fn parses_stored_fields() {
        let status = ItemStatus::from_fields(
            "a",
            &stored(&[
                ("last_success", "2024-01-02T03:04:05Z"),
                ("last_failure", "2024-01-01T00:00:00+01:00"),
                ("failure_count", "2"),
                ("podphase", "Running"),
            ]),
            100,
        );
        assert_eq!(
            status.last_success,
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(
            status.last_failure,
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap()
        );
        assert_eq!(status.failure_count, 2);
        assert_eq!(status.pod_phase, Some(PodPhase::Running));
    }

    #[test]
    fn garbage_degrades_to_defaults() {
        let status = ItemStatus::from_fields(
            "a",
            &stored(&[
                ("last_success", "yesterday"),
                ("failure_count", "many"),
                ("podphase", "Evicted"),
                ("runtime_count", "2"),
                ("runtime_total", "x"),
            ]),
            100,
        );
        assert_eq!(status, ItemStatus::default());
    }

    #[test]
    fn timestamps_keep_subseconds() {
        let at = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        let raw = format_timestamp(at);
        let status = ItemStatus::from_fields("a", &stored(&[("last_success", raw.as_str())]), 100);
        assert_eq!(status.last_success, at);
    }

    #[test]
    fn saturating_add_pins_to_range() {
        assert_eq!(saturating_add(epoch(), TimeDelta::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            saturating_add(epoch(), TimeDelta::seconds(60)),
            Utc.with_ymd_and_hms(1970, 1, 1, 0, 1, 0).unwrap()
        );
    }
}
