//! When each group should next be reconciled.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use oaat_controller::Requeue;

/// Requeue intervals resolved from the operator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub idle: Duration,
    pub running: Duration,
    pub backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Due {
    At(Instant),
    /// Wait until the group's spec generation moves past this one.
    OnChange(Option<i64>),
}

/// Group key (`namespace/name`) to next reconcile time.
#[derive(Debug)]
pub struct DueTable {
    intervals: Intervals,
    entries: HashMap<String, Due>,
}

impl DueTable {
    pub fn new(intervals: Intervals) -> Self {
        Self {
            intervals,
            entries: HashMap::new(),
        }
    }

    /// Unknown groups are always due.
    pub fn is_due(&self, key: &str, generation: Option<i64>, now: Instant) -> bool {
        match self.entries.get(key) {
            None => true,
            Some(Due::At(at)) => *at <= now,
            Some(Due::OnChange(seen)) => *seen != generation,
        }
    }

    pub fn record(&mut self, key: &str, requeue: Requeue, generation: Option<i64>, now: Instant) {
        let due = match requeue {
            Requeue::Idle => Due::At(now + self.intervals.idle),
            Requeue::Running => Due::At(now + self.intervals.running),
            Requeue::Backoff => Due::At(now + self.intervals.backoff),
            Requeue::AwaitChange => Due::OnChange(generation),
        };
        self.entries.insert(key.to_string(), due);
    }

    /// Make a group due on the next scan.
    pub fn wake(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Forget groups that no longer exist.
    pub fn retain(&mut self, live: &[String]) {
        self.entries.retain(|key, _| live.iter().any(|k| k == key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

pub fn group_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DueTable {
        DueTable::new(Intervals {
            idle: Duration::from_secs(60),
            running: Duration::from_secs(10),
            backoff: Duration::from_secs(120),
        })
    }

    #[test]
    fn unknown_group_is_due() {
        assert!(table().is_due("jobs/nightly", Some(1), Instant::now()));
    }

    #[test]
    fn intervals_follow_requeue() {
        let mut due = table();
        let now = Instant::now();
        due.record("jobs/a", Requeue::Running, Some(1), now);
        due.record("jobs/b", Requeue::Idle, Some(1), now);

        let later = now + Duration::from_secs(11);
        assert!(due.is_due("jobs/a", Some(1), later));
        assert!(!due.is_due("jobs/b", Some(1), later));
        assert!(due.is_due("jobs/b", Some(1), now + Duration::from_secs(60)));
    }

    #[test]
    fn config_errors_wait_for_new_generation() {
        let mut due = table();
        let now = Instant::now();
        due.record("jobs/a", Requeue::AwaitChange, Some(4), now);
        assert!(!due.is_due("jobs/a", Some(4), now + Duration::from_secs(3600)));
        assert!(due.is_due("jobs/a", Some(5), now));
    }

    #[test]
    fn wake_and_retain() {
        let mut due = table();
        let now = Instant::now();
        due.record("jobs/a", Requeue::Backoff, None, now);
        due.record("jobs/b", Requeue::Backoff, None, now);
        due.wake("jobs/a");
        assert!(due.is_due("jobs/a", None, now));

        due.retain(&["jobs/a".to_string()]);
        assert_eq!(due.len(), 0);
        due.record("jobs/a", Requeue::Idle, None, now);
        due.retain(&["jobs/a".to_string()]);
        assert_eq!(due.len(), 1);
        assert_eq!(group_key("jobs", "a"), "jobs/a");
    }
}
