//! Group configuration validation and the annotations derived from it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use oaat_core::{
    GroupSpec, JobTemplate, JobTypeSpec, NoStartWindow, POD_JOB_KIND, TimeWindow, parse_duration,
    parse_time_of_day,
};
use oaat_scheduler::SchedulePolicy;
use oaat_state::StatusPatch;

use crate::error::ConfigError;
use crate::job::check_template;

/// Longest value Kubernetes accepts for a label.
pub const MAX_LABEL_VALUE: usize = 63;

/// Annotation gating the periodic scheduling trigger.
pub const STATUS_ANNOTATION: &str = "oaat.dev/status";
/// Annotation recording the configured item count.
pub const ITEM_COUNT_ANNOTATION: &str = "oaat.dev/item-count";

/// Value of [`STATUS_ANNOTATION`] for a schedulable group.
pub const STATUS_ACTIVE: &str = "active";
/// Value of [`STATUS_ANNOTATION`] for a group with no items.
pub const STATUS_MISSING_ITEMS: &str = "missingItems";
/// Value of [`STATUS_ANNOTATION`] for any other configuration error.
pub const STATUS_INVALID: &str = "invalid";

/// A named no-start window, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blackout {
    pub name: String,
    pub window: TimeWindow,
}

/// A group configuration that passed validation.
#[derive(Debug, Clone)]
pub struct ValidGroup {
    pub items: Vec<String>,
    pub policy: SchedulePolicy,
    pub blackouts: Vec<Blackout>,
    pub template: JobTemplate,
}

impl ValidGroup {
    /// The first no-start window containing `now`, if any.
    pub fn blackout_at(&self, now: DateTime<Utc>) -> Option<&Blackout> {
        self.blackouts.iter().find(|b| b.window.contains_instant(now))
    }
}

/// Validate a group spec against its resolved job type.
///
/// `job_type` is `None` when the referenced type does not exist.
pub fn validate_group(
    spec: &GroupSpec,
    job_type: Option<&JobTypeSpec>,
) -> Result<ValidGroup, ConfigError> {
    if spec.items.is_empty() {
        return Err(ConfigError::NoItems);
    }
    let mut seen = HashSet::new();
    for item in &spec.items {
        if item.is_empty() {
            return Err(ConfigError::EmptyItemName);
        }
        check_label_value(item)?;
        if !seen.insert(item.as_str()) {
            return Err(ConfigError::DuplicateItem(item.clone()));
        }
    }

    let frequency = parse_duration(&spec.frequency)
        .ok_or_else(|| ConfigError::InvalidFrequency(spec.frequency.clone()))?;
    let cool_off = match &spec.failure_cool_off {
        Some(raw) => Some(parse_duration(raw).ok_or_else(|| ConfigError::InvalidCoolOff(raw.clone()))?),
        None => None,
    };

    let blackouts = spec
        .no_start_windows
        .iter()
        .map(parse_window)
        .collect::<Result<Vec<_>, _>>()?;

    let Some(job_type) = job_type else {
        return Err(ConfigError::MissingJobType(spec.oaat_type.clone()));
    };
    if job_type.kind != POD_JOB_KIND {
        return Err(ConfigError::UnsupportedJobKind(job_type.kind.clone()));
    }
    check_template(&job_type.podspec)?;

    Ok(ValidGroup {
        items: spec.items.clone(),
        policy: SchedulePolicy {
            frequency,
            cool_off,
        },
        blackouts,
        template: job_type.podspec.clone(),
    })
}

/// Group and item names are written to job pod labels verbatim.
pub fn check_label_value(value: &str) -> Result<(), ConfigError> {
    let bytes = value.as_bytes();
    let inner_ok = bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    let ends_ok = match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric(),
        _ => true,
    };
    if value.len() > MAX_LABEL_VALUE || !inner_ok || !ends_ok {
        return Err(ConfigError::InvalidLabelValue(value.to_string()));
    }
    Ok(())
}

fn parse_window(window: &NoStartWindow) -> Result<Blackout, ConfigError> {
    let invalid = |source| ConfigError::InvalidWindow {
        window: window.name.clone(),
        source,
    };
    let start = parse_time_of_day(&window.start.time, window.start.tz.as_deref()).map_err(invalid)?;
    let end = parse_time_of_day(&window.end.time, window.end.tz.as_deref()).map_err(invalid)?;
    Ok(Blackout {
        name: window.name.clone(),
        window: TimeWindow::new(start, end),
    })
}

/// Annotations reflecting a validation result.
pub fn validation_annotations(
    spec: &GroupSpec,
    result: &Result<ValidGroup, ConfigError>,
) -> StatusPatch {
    let status = match result {
        Ok(_) => STATUS_ACTIVE,
        Err(ConfigError::NoItems) => STATUS_MISSING_ITEMS,
        Err(_) => STATUS_INVALID,
    };
    let mut patch = StatusPatch::new();
    patch
        .set_annotation(STATUS_ANNOTATION, status)
        .set_annotation(ITEM_COUNT_ANNOTATION, spec.items.len().to_string());
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use oaat_core::{ContainerTemplate, DurationError, TimeOfDaySpec};

    fn spec() -> GroupSpec {
        GroupSpec {
            frequency: "1h".to_string(),
            failure_cool_off: Some("10m".to_string()),
            no_start_windows: vec![],
            items: vec!["a".to_string(), "b".to_string()],
            oaat_type: "batch".to_string(),
        }
    }

    fn job_type() -> JobTypeSpec {
        JobTypeSpec {
            kind: "pod".to_string(),
            podspec: JobTemplate {
                containers: vec![ContainerTemplate {
                    name: "job".to_string(),
                    image: "busybox".to_string(),
                    ..ContainerTemplate::default()
                }],
                ..JobTemplate::default()
            },
        }
    }

    fn window(name: &str, start: &str, end: &str) -> NoStartWindow {
        NoStartWindow {
            name: name.to_string(),
            start: TimeOfDaySpec {
                time: start.to_string(),
                tz: None,
            },
            end: TimeOfDaySpec {
                time: end.to_string(),
                tz: None,
            },
        }
    }

    #[test]
    fn valid_group_parses_policy() {
        let group = validate_group(&spec(), Some(&job_type())).unwrap();
        assert_eq!(group.policy.frequency, TimeDelta::hours(1));
        assert_eq!(group.policy.cool_off, Some(TimeDelta::minutes(10)));
        assert_eq!(group.items, vec!["a", "b"]);
    }

    #[test]
    fn item_problems_are_reported_first() {
        let mut no_items = spec();
        no_items.items.clear();
        assert_eq!(validate_group(&no_items, None).err(), Some(ConfigError::NoItems));

        let mut dup = spec();
        dup.items.push("a".to_string());
        assert_eq!(
            validate_group(&dup, Some(&job_type())).err(),
            Some(ConfigError::DuplicateItem("a".to_string()))
        );
    }

    #[test]
    fn names_must_fit_in_labels() {
        let long = "x".repeat(64);
        for bad in ["db/7", "-db", "db.", "has space", long.as_str()] {
            let mut spec = spec();
            spec.items.push(bad.to_string());
            assert_eq!(
                validate_group(&spec, Some(&job_type())).err(),
                Some(ConfigError::InvalidLabelValue(bad.to_string())),
                "{bad:?}"
            );
        }

        let mut ok = spec();
        ok.items.push("db-7.eu_west".to_string());
        ok.items.push("y".repeat(63));
        assert!(validate_group(&ok, Some(&job_type())).is_ok());

        assert!(check_label_value("nightly").is_ok());
        assert!(check_label_value("nightly-backups-for-the-whole-fleet-of-databases-in-every-region").is_err());
    }

    #[test]
    fn durations_must_parse() {
        let mut bad = spec();
        bad.frequency = "often".to_string();
        assert_eq!(
            validate_group(&bad, Some(&job_type())).err(),
            Some(ConfigError::InvalidFrequency("often".to_string()))
        );

        let mut bad = spec();
        bad.failure_cool_off = Some("soon".to_string());
        assert_eq!(
            validate_group(&bad, Some(&job_type())).err(),
            Some(ConfigError::InvalidCoolOff("soon".to_string()))
        );
    }

    #[test]
    fn job_type_must_exist_and_be_a_pod() {
        assert_eq!(
            validate_group(&spec(), None).err(),
            Some(ConfigError::MissingJobType("batch".to_string()))
        );
        let mut other = job_type();
        other.kind = "cronjob".to_string();
        assert_eq!(
            validate_group(&spec(), Some(&other)).err(),
            Some(ConfigError::UnsupportedJobKind("cronjob".to_string()))
        );
        let mut two = job_type();
        two.podspec.containers.push(two.podspec.containers[0].clone());
        assert_eq!(
            validate_group(&spec(), Some(&two)).err(),
            Some(ConfigError::MultipleContainers(2))
        );
    }

    #[test]
    fn windows_are_parsed_and_checked() {
        let mut with_windows = spec();
        with_windows.no_start_windows = vec![window("backup", "22:00", "02:00")];
        let group = validate_group(&with_windows, Some(&job_type())).unwrap();

        let at = |h, m| Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap();
        assert_eq!(group.blackout_at(at(23, 30)).map(|b| b.name.as_str()), Some("backup"));
        assert_eq!(group.blackout_at(at(1, 0)).map(|b| b.name.as_str()), Some("backup"));
        assert!(group.blackout_at(at(12, 0)).is_none());

        with_windows.no_start_windows = vec![window("bad", "25:00", "02:00")];
        assert_eq!(
            validate_group(&with_windows, Some(&job_type())).err(),
            Some(ConfigError::InvalidWindow {
                window: "bad".to_string(),
                source: DurationError::InvalidTime("25:00".to_string()),
            })
        );
    }

    #[test]
    fn annotations_follow_validation() {
        let ok = validate_group(&spec(), Some(&job_type()));
        let patch = validation_annotations(&spec(), &ok);
        assert_eq!(patch.annotations[STATUS_ANNOTATION].as_deref(), Some(STATUS_ACTIVE));
        assert_eq!(patch.annotations[ITEM_COUNT_ANNOTATION].as_deref(), Some("2"));

        let mut empty = spec();
        empty.items.clear();
        let patch = validation_annotations(&empty, &validate_group(&empty, None));
        assert_eq!(
            patch.annotations[STATUS_ANNOTATION].as_deref(),
            Some(STATUS_MISSING_ITEMS)
        );
        assert_eq!(patch.annotations[ITEM_COUNT_ANNOTATION].as_deref(), Some("0"));

        let patch = validation_annotations(&spec(), &validate_group(&spec(), None));
        assert_eq!(patch.annotations[STATUS_ANNOTATION].as_deref(), Some(STATUS_INVALID));
    }
}
