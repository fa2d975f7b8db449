use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default base delay between retries.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(10);
/// Default cap on consecutive failures of one kind before an error becomes terminal.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How the retry delay grows with the attempt counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffMode {
    /// `unit × (connect_attempts + query_attempts + 1)`: a host failing in any way
    /// keeps backing off further.
    #[default]
    Combined,
    /// `unit × (attempts + 1)` using only the counter of the failing operation.
    Independent,
}

/// Which operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Query,
}

/// Consecutive failure counters of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptCounters {
    /// Failed connection attempts since the last successful connect
    pub connect: u32,
    /// Failed query attempts since the last successful query
    pub query: u32,
}

/// Outcome of consulting the policy after a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Bump the counter to `attempt`, sleep `delay`, then try again.
    Retry { attempt: u32, delay: Duration },
    /// The cap is reached; surface the error.
    GiveUp,
}

/// Linear backoff with per-operation attempt caps.
///
/// Pure: the policy holds no state and performs no I/O, the endpoint owns the counters.
///
/// ```rust
/// use std::time::Duration;
/// use sql_failover::backoff::{AttemptCounters, Operation, RetryDecision, RetryPolicy};
///
/// let policy = RetryPolicy::default();
/// let decision = policy.decide(Operation::Connect, AttemptCounters { connect: 0, query: 0 });
/// assert_eq!(
///     decision,
///     RetryDecision::Retry { attempt: 1, delay: Duration::from_secs(20) }
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Base delay multiplied by the attempt factor
    #[serde(with = "millis")]
    pub backoff_unit: Duration,
    /// Connect failures tolerated before a connect cycle fails
    pub max_connect_attempts: u32,
    /// Fatal query failures tolerated before a query fails
    pub max_query_attempts: u32,
    pub mode: BackoffMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            max_connect_attempts: DEFAULT_MAX_ATTEMPTS,
            max_query_attempts: DEFAULT_MAX_ATTEMPTS,
            mode: BackoffMode::Combined,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default caps and the given base delay.
    #[must_use]
    pub fn with_backoff_unit(backoff_unit: Duration) -> Self {
        Self {
            backoff_unit,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: BackoffMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn max_attempts(self, operation: Operation) -> u32 {
        match operation {
            Operation::Connect => self.max_connect_attempts,
            Operation::Query => self.max_query_attempts,
        }
    }

    /// Delay before the next attempt, given counters that already include the
    /// failure being retried.
    #[must_use]
    pub fn delay(&self, operation: Operation, counters: AttemptCounters) -> Duration {
        let factor = match self.mode {
            BackoffMode::Combined => counters.connect.saturating_add(counters.query),
            BackoffMode::Independent => match operation {
                Operation::Connect => counters.connect,
                Operation::Query => counters.query,
            },
        }
        .saturating_add(1);
        self.backoff_unit.saturating_mul(factor)
    }

    /// Decide what to do after `operation` failed with the current `counters`.
    #[must_use]
    pub fn decide(&self, operation: Operation, counters: AttemptCounters) -> RetryDecision {
        let mut next = counters;
        let slot = match operation {
            Operation::Connect => &mut next.connect,
            Operation::Query => &mut next.query,
        };
        if *slot >= self.max_attempts(operation) {
            return RetryDecision::GiveUp;
        }
        *slot += 1;
        RetryDecision::Retry {
            attempt: *slot,
            delay: self.delay(operation, next),
        }
    }

    /// Sum of every backoff sleep a connect cycle goes through before giving up,
    /// starting from `counters`.
    #[must_use]
    pub fn worst_case_connect_wait(&self, counters: AttemptCounters) -> Duration {
        let mut total = Duration::ZERO;
        let mut current = counters;
        while let RetryDecision::Retry { attempt, delay } =
            self.decide(Operation::Connect, current)
        {
            total = total.saturating_add(delay);
            current.connect = attempt;
        }
        total
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
