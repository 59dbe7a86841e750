//! Runtime statistics with a bounded reservoir sample.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::StatsError;

/// Default number of samples kept per item.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default number of standard deviations added to the mean in `predict`.
pub const DEFAULT_CONFIDENCE: f64 = 1.5;

/// Status field names used to persist runtime statistics.
pub mod field {
    pub const COUNT: &str = "runtime_count";
    pub const TOTAL: &str = "runtime_total";
    pub const SUM_SQUARES: &str = "runtime_sum_squares";
    pub const MIN: &str = "runtime_min";
    pub const MAX: &str = "runtime_max";
    pub const SAMPLE: &str = "runtime_sample";
    pub const LAST_UPDATED: &str = "runtime_last_updated";

    pub const ALL: [&str; 7] = [COUNT, TOTAL, SUM_SQUARES, MIN, MAX, SAMPLE, LAST_UPDATED];
}

/// Runtime history for one item, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeStats {
    capacity: usize,
    count: u64,
    total: f64,
    sum_squares: f64,
    min: f64,
    max: f64,
    /// Sorted ascending, never longer than `capacity`.
    sample: Vec<f64>,
    last_updated: Option<DateTime<Utc>>,
}

impl RuntimeStats {
    /// Create empty statistics keeping at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            count: 0,
            total: 0.0,
            sum_squares: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sample: Vec::new(),
            last_updated: None,
        }
    }

    /// Record one runtime observation.
    ///
    /// Totals always include the value. The sample takes every value until
    /// it is full; after that the value replaces a uniformly chosen sample
    /// element with probability `capacity / count`.
    pub fn record<R: Rng + ?Sized>(&mut self, seconds: f64, at: DateTime<Utc>, rng: &mut R) {
        self.count += 1;
        self.total += seconds;
        self.sum_squares += seconds * seconds;
        self.min = self.min.min(seconds);
        self.max = self.max.max(seconds);
        self.last_updated = Some(at);

        if self.sample.len() < self.capacity {
            insert_sorted(&mut self.sample, seconds);
            return;
        }

        let slot = rng.gen_range(0..self.count);
        if slot < self.capacity as u64 {
            let victim = rng.gen_range(0..self.sample.len());
            self.sample.remove(victim);
            insert_sorted(&mut self.sample, seconds);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn sample(&self) -> &[f64] {
        &self.sample
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }

    /// Population standard deviation over the full history.
    ///
    /// `None` below two observations.
    pub fn std_dev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.total / n;
        let variance = (self.sum_squares / n - mean * mean).max(0.0);
        Some(variance.sqrt())
    }

    /// Order-statistic estimate: the sample element at `floor(p * len)`,
    /// clamped to the last index.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.sample.is_empty() {
            return None;
        }
        let idx = (p.clamp(0.0, 1.0) * self.sample.len() as f64) as usize;
        Some(self.sample[idx.min(self.sample.len() - 1)])
    }

    /// Conservative runtime prediction: the larger of the 90th percentile
    /// and `mean + confidence * std_dev`.
    pub fn predict(&self, confidence: f64) -> Option<f64> {
        let p90 = self.percentile(0.9);
        let mean = self.mean();
        match (p90, mean, self.std_dev()) {
            (Some(p90), Some(mean), Some(sd)) => Some(p90.max(mean + confidence * sd)),
            (_, Some(mean), None) => Some(mean),
            (p90, None, _) => p90,
            (None, Some(mean), Some(sd)) => Some(mean + confidence * sd),
        }
    }

    // ── Persistence ────────────────────────────────────────────────

    /// Flatten into string-valued status fields.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(field::COUNT.to_string(), self.count.to_string());
        fields.insert(field::TOTAL.to_string(), self.total.to_string());
        fields.insert(field::SUM_SQUARES.to_string(), self.sum_squares.to_string());
        if let (Some(min), Some(max)) = (self.min(), self.max()) {
            fields.insert(field::MIN.to_string(), min.to_string());
            fields.insert(field::MAX.to_string(), max.to_string());
        }
        fields.insert(
            field::SAMPLE.to_string(),
            serde_json::to_string(&self.sample).unwrap_or_else(|_| "[]".to_string()),
        );
        if let Some(at) = self.last_updated {
            fields.insert(field::LAST_UPDATED.to_string(), at.to_rfc3339());
        }
        fields
    }

    /// Rebuild from stored status fields.
    ///
    /// Returns `Ok(None)` when no statistics were ever stored. A stored sample
    /// longer than `capacity` is thinned evenly down to `capacity`.
    pub fn from_fields(
        fields: &BTreeMap<String, String>,
        capacity: usize,
    ) -> Result<Option<Self>, StatsError> {
        let Some(count) = fields.get(field::COUNT) else {
            return Ok(None);
        };
        let count: u64 = parse_field(field::COUNT, count)?;
        let mut stats = Self::new(capacity);
        if count == 0 {
            return Ok(Some(stats));
        }

        stats.count = count;
        stats.total = required_f64(fields, field::TOTAL)?;
        stats.sum_squares = required_f64(fields, field::SUM_SQUARES)?;
        stats.min = required_f64(fields, field::MIN)?;
        stats.max = required_f64(fields, field::MAX)?;

        let raw_sample = fields.get(field::SAMPLE).map(String::as_str).unwrap_or("[]");
        let mut sample: Vec<f64> =
            serde_json::from_str(raw_sample).map_err(|_| StatsError::Malformed {
                field: field::SAMPLE,
                value: raw_sample.to_string(),
            })?;
        if sample.iter().any(|v| !v.is_finite()) {
            return Err(StatsError::Malformed {
                field: field::SAMPLE,
                value: raw_sample.to_string(),
            });
        }
        if sample.len() as u64 > count {
            return Err(StatsError::Inconsistent(format!(
                "{} samples but count is {count}",
                sample.len()
            )));
        }
        if stats.min > stats.max {
            return Err(StatsError::Inconsistent(format!(
                "min {} exceeds max {}",
                stats.min, stats.max
            )));
        }
        sample.sort_by(f64::total_cmp);
        stats.sample = thin(sample, stats.capacity);

        if let Some(raw) = fields.get(field::LAST_UPDATED) {
            let at = DateTime::parse_from_rfc3339(raw).map_err(|_| StatsError::Malformed {
                field: field::LAST_UPDATED,
                value: raw.clone(),
            })?;
            stats.last_updated = Some(at.with_timezone(&Utc));
        }

        Ok(Some(stats))
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn insert_sorted(sample: &mut Vec<f64>, value: f64) {
    let idx = sample.partition_point(|v| *v <= value);
    sample.insert(idx, value);
}

/// Keep `capacity` evenly spaced elements of a sorted sample.
fn thin(sample: Vec<f64>, capacity: usize) -> Vec<f64> {
    if sample.len() <= capacity {
        return sample;
    }
    let len = sample.len();
    (0..capacity).map(|i| sample[i * len / capacity]).collect()
}

fn parse_field<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, StatsError> {
    raw.trim().parse().map_err(|_| StatsError::Malformed {
        field: name,
        value: raw.to_string(),
    })
}

fn required_f64(fields: &BTreeMap<String, String>, name: &'static str) -> Result<f64, StatsError> {
    let raw = fields.get(name).ok_or_else(|| StatsError::Malformed {
        field: name,
        value: String::new(),
    })?;
    let value: f64 = parse_field(name, raw)?;
    if !value.is_finite() {
        return Err(StatsError::Malformed {
            field: name,
            value: raw.clone(),
        });
    }
    Ok(value)
}
