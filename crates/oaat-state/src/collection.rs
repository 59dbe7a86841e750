//! Items: the configured items of a group, backed by a `StatusBackend`.
//!
//! All item status writes go through this type so that the stored fields
//! stay consistent: a success resets the failure count, a failure bumps
//! it, and a terminal update is only applied when it carries a newer
//! timestamp than the one already recorded.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use tracing::{debug, info, warn};

use oaat_core::PodPhase;
use oaat_stats::RuntimeStats;

use crate::backend::StatusBackend;
use crate::error::{StateError, StateResult};
use crate::fields;
use crate::item::{Item, ItemStatus, format_timestamp, saturating_add};
use crate::types::ItemFields;

/// Derived scheduling metadata for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSchedule {
    pub name: String,
    pub last_success: DateTime<Utc>,
    pub last_failure: DateTime<Utc>,
    pub failure_count: u32,
    /// Earliest instant after which the item may be selected.
    pub eligible_after: DateTime<Utc>,
    pub eligible: bool,
    /// Predicted runtime in seconds, once any history exists.
    pub predicted_runtime: Option<f64>,
}

/// The configured items of one group.
pub struct Items<'a> {
    names: Vec<String>,
    backend: &'a mut dyn StatusBackend,
    capacity: usize,
}

impl<'a> Items<'a> {
    /// Build a collection over `names`, rejecting empty or duplicate names.
    ///
    /// `capacity` bounds the runtime sample kept per item.
    pub fn new(
        names: Vec<String>,
        backend: &'a mut dyn StatusBackend,
        capacity: usize,
    ) -> StateResult<Self> {
        let mut seen = HashSet::new();
        for name in &names {
            if name.is_empty() {
                return Err(StateError::EmptyName);
            }
            if !seen.insert(name.as_str()) {
                return Err(StateError::DuplicateItem(name.clone()));
            }
        }
        Ok(Self {
            names,
            backend,
            capacity,
        })
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Parsed status of a configured item.
    pub fn get(&self, name: &str) -> StateResult<Item> {
        if !self.contains(name) {
            return Err(StateError::NotFound(name.to_string()));
        }
        Ok(Item::new(name, self.status_of(name)))
    }

    /// All configured items, in configuration order.
    pub fn list(&self) -> Vec<Item> {
        self.names
            .iter()
            .map(|name| Item::new(name.clone(), self.status_of(name)))
            .collect()
    }

    /// Scheduling metadata for every configured item at `now`.
    pub fn schedule(
        &self,
        now: DateTime<Utc>,
        frequency: TimeDelta,
        cool_off: Option<TimeDelta>,
        confidence: f64,
    ) -> Vec<ItemSchedule> {
        self.list()
            .into_iter()
            .map(|item| {
                let fresh_after = saturating_add(item.status.last_success, frequency);
                let cooled_after =
                    cool_off.map(|c| saturating_add(item.status.last_failure, c));
                let eligible_after = cooled_after.map_or(fresh_after, |c| c.max(fresh_after));
                ItemSchedule {
                    eligible: now > eligible_after,
                    eligible_after,
                    last_success: item.status.last_success,
                    last_failure: item.status.last_failure,
                    failure_count: item.status.failure_count,
                    predicted_runtime: item
                        .status
                        .runtime
                        .as_ref()
                        .and_then(|r| r.predict(confidence)),
                    name: item.name,
                }
            })
            .collect()
    }

    /// Status of any item, configured or not.
    pub fn status_of(&self, name: &str) -> ItemStatus {
        ItemStatus::from_fields(name, &self.backend.get(name), self.capacity)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Record the latest observed pod phase. Always applied.
    pub fn set_phase(&mut self, name: &str, phase: PodPhase) {
        debug!(item = %name, %phase, "recording pod phase");
        self.write(name, [(fields::POD_PHASE, phase.as_str().to_string())]);
    }

    /// Record a success at `at` and reset the failure count.
    ///
    /// Returns `false`, writing nothing, unless `at` is newer than the
    /// recorded last success. A success older than the recorded last
    /// failure moves `last_success` but leaves the failure count alone.
    pub fn mark_success(&mut self, name: &str, at: DateTime<Utc>) -> bool {
        let status = self.status_of(name);
        if at <= status.last_success {
            debug!(item = %name, %at, recorded = %status.last_success, "stale success ignored");
            return false;
        }
        if at <= status.last_failure {
            warn!(item = %name, %at, last_failure = %status.last_failure, "success predates last failure, keeping failure count");
            self.write(name, [(fields::LAST_SUCCESS, format_timestamp(at))]);
            return true;
        }
        info!(item = %name, %at, "item succeeded");
        self.write(
            name,
            [
                (fields::LAST_SUCCESS, format_timestamp(at)),
                (fields::FAILURE_COUNT, "0".to_string()),
            ],
        );
        true
    }

    /// Record a failure at `at` and increment the failure count.
    ///
    /// Returns `false`, writing nothing, unless `at` is newer than the
    /// recorded last failure. A failure older than the recorded last
    /// success moves `last_failure` but does not count.
    pub fn mark_failed(&mut self, name: &str, at: DateTime<Utc>) -> bool {
        let status = self.status_of(name);
        if at <= status.last_failure {
            debug!(item = %name, %at, recorded = %status.last_failure, "stale failure ignored");
            return false;
        }
        if at <= status.last_success {
            warn!(item = %name, %at, last_success = %status.last_success, "failure predates last success, not counted");
            self.write(name, [(fields::LAST_FAILURE, format_timestamp(at))]);
            return true;
        }
        let failures = status.failure_count.saturating_add(1);
        info!(item = %name, %at, failures, "item failed");
        self.write(
            name,
            [
                (fields::LAST_FAILURE, format_timestamp(at)),
                (fields::FAILURE_COUNT, failures.to_string()),
            ],
        );
        true
    }

    /// Add one runtime observation to the item's statistics.
    ///
    /// Rejected (logged, returns `false`) when the start is unknown or the
    /// run does not have a positive duration.
    pub fn record_runtime(
        &mut self,
        name: &str,
        started: Option<DateTime<Utc>>,
        finished: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> bool {
        let Some(started) = started else {
            warn!(item = %name, "runtime not recorded: start time unknown");
            return false;
        };
        if finished <= started {
            warn!(item = %name, %started, %finished, "runtime not recorded: end is not after start");
            return false;
        }

        let seconds = (finished - started).num_milliseconds() as f64 / 1000.0;
        let mut stats = self
            .status_of(name)
            .runtime
            .unwrap_or_else(|| RuntimeStats::new(self.capacity));
        stats.record(seconds, finished, rng);
        debug!(item = %name, seconds, count = stats.count(), "runtime recorded");
        self.backend.patch(name, stats.to_fields());
        true
    }

    fn write<const N: usize>(&mut self, name: &str, pairs: [(&str, String); N]) {
        let fields: ItemFields = pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.backend.patch(name, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ResourceBackend, SnapshotBackend};
    use crate::types::GroupStatus;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_duplicate_and_empty_names() {
        let mut backend = ResourceBackend::default();
        assert_eq!(
            Items::new(names(&["a", "b", "a"]), &mut backend, 10).err(),
            Some(StateError::DuplicateItem("a".to_string()))
        );
        assert_eq!(
            Items::new(names(&["a", ""]), &mut backend, 10).err(),
            Some(StateError::EmptyName)
        );
    }

    #[test]
    fn lists_in_configuration_order() {
        let mut backend = ResourceBackend::default();
        let items = Items::new(names(&["c", "a", "b"]), &mut backend, 10).unwrap();
        assert_eq!(items.count(), 3);
        let listed: Vec<String> = items.list().into_iter().map(|i| i.name).collect();
        assert_eq!(listed, names(&["c", "a", "b"]));
        assert_eq!(items.get("z"), Err(StateError::NotFound("z".to_string())));
    }

    #[test]
    fn success_resets_failure_count() {
        let mut backend = ResourceBackend::default();
        let mut items = Items::new(names(&["a"]), &mut backend, 10).unwrap();
        assert!(items.mark_failed("a", t(1)));
        assert!(items.mark_failed("a", t(2)));
        assert_eq!(items.get("a").unwrap().status.failure_count, 2);

        assert!(items.mark_success("a", t(3)));
        let status = items.get("a").unwrap().status;
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.last_success, t(3));
        assert_eq!(status.last_failure, t(2));
    }

    #[test]
    fn terminal_updates_are_idempotent() {
        let mut backend = ResourceBackend::default();
        let mut items = Items::new(names(&["a"]), &mut backend, 10).unwrap();

        assert!(items.mark_failed("a", t(5)));
        assert!(!items.mark_failed("a", t(5)));
        assert!(!items.mark_failed("a", t(4)));
        assert_eq!(items.get("a").unwrap().status.failure_count, 1);

        assert!(items.mark_success("a", t(6)));
        assert!(!items.mark_success("a", t(6)));

        let (_, patch) = backend.into_parts();
        assert_eq!(patch.items["a"]["failure_count"], "0");
    }

    #[test]
    fn late_success_keeps_newer_failure_counted() {
        let mut backend = ResourceBackend::default();
        let mut items = Items::new(names(&["a"]), &mut backend, 10).unwrap();

        assert!(items.mark_failed("a", t(10)));
        assert!(items.mark_success("a", t(2)));
        let status = items.get("a").unwrap().status;
        assert_eq!(status.last_success, t(2));
        assert_eq!(status.last_failure, t(10));
        assert_eq!(status.failure_count, 1);
    }

    #[test]
    fn late_failure_does_not_count_after_newer_success() {
        let mut backend = ResourceBackend::default();
        let mut items = Items::new(names(&["a"]), &mut backend, 10).unwrap();

        assert!(items.mark_success("a", t(10)));
        assert!(items.mark_failed("a", t(3)));
        let status = items.get("a").unwrap().status;
        assert_eq!(status.last_failure, t(3));
        assert_eq!(status.failure_count, 0);

        assert!(items.mark_failed("a", t(11)));
        assert_eq!(items.get("a").unwrap().status.failure_count, 1);
    }

    #[test]
    fn snapshot_backend_sees_its_own_writes() {
        let status = GroupStatus::default();
        let mut backend = SnapshotBackend::new(&status);
        let mut items = Items::new(names(&["a"]), &mut backend, 10).unwrap();
        assert!(items.mark_failed("a", t(1)));
        assert!(!items.mark_failed("a", t(1)));
        items.set_phase("a", PodPhase::Failed);
        assert_eq!(
            items.get("a").unwrap().status.pod_phase,
            Some(PodPhase::Failed)
        );
        assert!(status.items.is_empty());
    }

    #[test]
    fn runtime_recording_requires_a_positive_duration() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut backend = ResourceBackend::default();
        let mut items = Items::new(names(&["a"]), &mut backend, 10).unwrap();

        assert!(!items.record_runtime("a", None, t(5), &mut rng));
        assert!(!items.record_runtime("a", Some(t(5)), t(5), &mut rng));
        assert!(!items.record_runtime("a", Some(t(6)), t(5), &mut rng));
        assert!(items.get("a").unwrap().status.runtime.is_none());

        assert!(items.record_runtime("a", Some(t(1)), t(3), &mut rng));
        assert!(items.record_runtime("a", Some(t(10)), t(14), &mut rng));
        let runtime = items.get("a").unwrap().status.runtime.unwrap();
        assert_eq!(runtime.count(), 2);
        assert_eq!(runtime.mean(), Some(180.0));
        assert_eq!(runtime.last_updated(), Some(t(14)));
    }

    #[test]
    fn schedule_reports_eligibility() {
        let mut backend = ResourceBackend::default();
        let mut items = Items::new(names(&["fresh", "stale", "failed"]), &mut backend, 10).unwrap();
        items.mark_success("fresh", t(50));
        items.mark_success("stale", t(10));
        items.mark_success("failed", t(10));
        items.mark_failed("failed", t(55));

        let schedule = items.schedule(
            t(59),
            TimeDelta::minutes(30),
            Some(TimeDelta::minutes(10)),
            1.5,
        );
        let by_name = |n: &str| schedule.iter().find(|s| s.name == n).unwrap().clone();

        assert!(!by_name("fresh").eligible);
        assert_eq!(by_name("fresh").eligible_after, t(50) + TimeDelta::minutes(30));
        assert!(by_name("stale").eligible);
        assert!(!by_name("failed").eligible);
        assert_eq!(by_name("failed").eligible_after, t(55) + TimeDelta::minutes(10));
        assert_eq!(by_name("failed").failure_count, 1);
        assert_eq!(by_name("stale").predicted_runtime, None);
    }
}
