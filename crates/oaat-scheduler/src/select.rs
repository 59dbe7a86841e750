//! Item selection: find the next job to run.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use oaat_state::{Item, saturating_add};

use crate::error::{SchedulerError, SchedulerResult};

/// Timing policy of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Minimum delay after a success before the item is eligible again.
    pub frequency: TimeDelta,
    /// Minimum delay after a failure before the item is eligible again.
    pub cool_off: Option<TimeDelta>,
}

/// Which tier of the selection settled the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    /// Only one item passed the freshness and cool-off filters.
    OnlyCandidate,
    /// One candidate had the oldest last success.
    OldestSuccess,
    /// Among the oldest successes, one had the oldest failure.
    OldestFailure,
    /// A true tie, broken at random.
    Random,
}

/// Result of a selection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Run { item: String, tier: SelectionTier },
    /// Nothing is eligible yet.
    NotTimeYet,
}

impl Selection {
    pub fn item(&self) -> Option<&str> {
        match self {
            Selection::Run { item, .. } => Some(item),
            Selection::NotTimeYet => None,
        }
    }
}

/// Pick the next item to run at `now`.
///
/// The freshness filter applies first, then the cool-off filter (only when
/// a cool-off is configured). An item that never failed has the epoch as
/// its last failure and so always passes the cool-off filter.
pub fn find_job_to_run<R: Rng + ?Sized>(
    items: &[Item],
    policy: &SchedulePolicy,
    now: DateTime<Utc>,
    rng: &mut R,
) -> SchedulerResult<Selection> {
    if items.is_empty() {
        return Err(SchedulerError::NoItemsConfigured);
    }

    let mut candidates: Vec<&Item> = items
        .iter()
        .filter(|item| now > saturating_add(item.status.last_success, policy.frequency))
        .collect();
    debug!(
        total = items.len(),
        fresh = candidates.len(),
        "applied frequency filter"
    );

    if let Some(cool_off) = policy.cool_off {
        candidates.retain(|item| now > saturating_add(item.status.last_failure, cool_off));
        debug!(cooled = candidates.len(), "applied cool-off filter");
    }

    match candidates.as_slice() {
        [] => return Ok(Selection::NotTimeYet),
        [only] => return Ok(run(only, SelectionTier::OnlyCandidate)),
        _ => {}
    }

    let Some(oldest_success) = candidates.iter().map(|i| i.status.last_success).min() else {
        return Ok(Selection::NotTimeYet);
    };
    let oldest: Vec<&Item> = candidates
        .into_iter()
        .filter(|i| i.status.last_success == oldest_success)
        .collect();
    if let [only] = oldest.as_slice() {
        return Ok(run(only, SelectionTier::OldestSuccess));
    }

    let failed: Vec<&Item> = oldest
        .iter()
        .copied()
        .filter(|i| i.status.failure_count > 0)
        .collect();
    let pool = match failed.iter().map(|i| i.status.last_failure).min() {
        Some(oldest_failure) => {
            let pool: Vec<&Item> = failed
                .into_iter()
                .filter(|i| i.status.last_failure == oldest_failure)
                .collect();
            if let [only] = pool.as_slice() {
                return Ok(run(only, SelectionTier::OldestFailure));
            }
            pool
        }
        None => oldest,
    };

    match pool.choose(rng) {
        Some(item) => Ok(run(item, SelectionTier::Random)),
        None => Ok(Selection::NotTimeYet),
    }
}

fn run(item: &Item, tier: SelectionTier) -> Selection {
    debug!(item = %item.name, ?tier, "selected item");
    Selection::Run {
        item: item.name.clone(),
        tier,
    }
}
