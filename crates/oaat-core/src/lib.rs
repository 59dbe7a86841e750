//! oaat-core: shared types, duration parsing, and operator configuration
//! for the one-at-a-time operator.

pub mod config;
pub mod duration;
pub mod types;

pub use config::OperatorConfig;
pub use duration::{DurationError, TimeWindow, parse_duration, parse_time_of_day, time_of_day};
pub use types::*;
