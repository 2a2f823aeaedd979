//! # Fan-out
//!
//! Concurrent dispatch of one operation per layer under a shared round
//! deadline, with all-or-nothing joining.

mod config;
mod executor;

pub use config::{
    round_deadline, FanoutConfig, CONCURRENCY_CEILING, CONCURRENCY_PER_CPU, DEFAULT_ROUND_DEADLINE,
};
pub use executor::FanoutExecutor;
