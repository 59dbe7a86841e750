//! oaat-scheduler: picks the next item to run in a one-at-a-time group.
//!
//! Selection narrows the configured items in tiers:
//!
//! ```text
//! all items
//!   ├── fresh:   now > last_success + frequency
//!   ├── cooled:  now > last_failure + cool_off   (only with a cool-off)
//!   ├── oldest last_success
//!   ├── oldest last_failure among items that have failed
//!   └── uniform random choice
//! ```
//!
//! The random source is passed in, so a seeded generator makes the
//! choice reproducible.

pub mod error;
pub mod select;

pub use error::{SchedulerError, SchedulerResult};
pub use select::{SchedulePolicy, Selection, SelectionTier, find_job_to_run};
