//! Fan-out configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Round deadline used when no request carries a statement timeout
pub const DEFAULT_ROUND_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Tasks allowed per available CPU
pub const CONCURRENCY_PER_CPU: usize = 4;

/// Upper bound for the derived concurrency
pub const CONCURRENCY_CEILING: usize = 64;

/// Fan-out tuning.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Maximum layer tasks running at once
    pub max_concurrency: usize,
    /// Deadline when every statement timeout is zero, in milliseconds
    pub default_deadline_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: host_concurrency(),
            default_deadline_ms: DEFAULT_ROUND_DEADLINE.as_millis() as u64,
        }
    }
}

impl FanoutConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline_ms = deadline.as_millis() as u64;
        self
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("fanout.max_concurrency must be > 0".to_string());
        }
        if self.default_deadline_ms == 0 {
            return Err("fanout.default_deadline_ms must be > 0".to_string());
        }
        Ok(())
    }
}

/// min(cpus * CONCURRENCY_PER_CPU, CONCURRENCY_CEILING)
fn host_concurrency() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cpus * CONCURRENCY_PER_CPU).min(CONCURRENCY_CEILING)
}

/// Deadline for one round.
///
/// The largest statement timeout among the round's requests, so one slow
/// layer can be granted more time without shortening the others. Falls
/// back to `default` when every timeout is zero.
pub fn round_deadline<I>(timeouts: I, default: Duration) -> Duration
where
    I: IntoIterator<Item = Duration>,
{
    let longest = timeouts.into_iter().max().unwrap_or(Duration::ZERO);
    if longest.is_zero() {
        default
    } else {
        longest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FanoutConfig::default();
        assert!(config.max_concurrency >= 1);
        assert!(config.max_concurrency <= CONCURRENCY_CEILING);
        assert_eq!(config.default_deadline(), Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(FanoutConfig::default().with_max_concurrency(0).validate().is_err());
        assert!(FanoutConfig::default()
            .with_default_deadline(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FanoutConfig = serde_json::from_str(r#"{"max_concurrency": 3}"#).unwrap();
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.default_deadline_ms, 600_000);
    }

    #[test]
    fn test_deadline_is_longest_timeout() {
        let deadline = round_deadline(
            [Duration::from_secs(2), Duration::from_secs(30), Duration::ZERO],
            DEFAULT_ROUND_DEADLINE,
        );
        assert_eq!(deadline, Duration::from_secs(30));
    }

    #[test]
    fn test_all_zero_timeouts_use_default() {
        let zeros = [Duration::ZERO, Duration::ZERO, Duration::ZERO];
        let deadline = round_deadline(zeros, DEFAULT_ROUND_DEADLINE);
        assert_eq!(deadline, Duration::from_secs(600));
        assert_eq!(
            round_deadline(Vec::<Duration>::new(), DEFAULT_ROUND_DEADLINE),
            DEFAULT_ROUND_DEADLINE
        );
    }
}
