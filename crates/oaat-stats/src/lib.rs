//! oaat-stats: runtime statistics for one-at-a-time items.
//!
//! Each item keeps running totals over its full history plus a bounded,
//! sorted reservoir sample of individual runtimes (seconds). The sample
//! backs order statistics such as the 90th percentile; the totals back
//! the mean and standard deviation. Together they give a conservative
//! runtime prediction.
//!
//! Statistics persist as flat string fields (`runtime_count`,
//! `runtime_sample`, ...) alongside the rest of an item's status.

pub mod error;
pub mod runtime;

pub use error::StatsError;
pub use runtime::{DEFAULT_CAPACITY, DEFAULT_CONFIDENCE, RuntimeStats, field};
