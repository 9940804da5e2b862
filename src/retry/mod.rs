use std::time::Duration;

use reqwest::StatusCode;

use crate::transport::TransportError;

/// Where a single batch send stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Retrying,
    Success,
    GivenUp,
}

/// What the sender should do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Done,
    RetryAfter(Duration),
    GiveUp,
}

/// Linear backoff over a bounded number of sends.
///
/// One policy per batch: the attempt counter belongs to that batch alone.
/// `max_attempts` counts every send including the first, and the delay
/// before retry `n` is `n * base_delay`.
#[derive(Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    attempts: u32,
    state: RetryState,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            attempts: 0,
            state: RetryState::Pending,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Sends made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the outcome of one send and decide what happens next.
    ///
    /// Terminal states are sticky: once `Success` or `GivenUp`, further
    /// outcomes are ignored and the same terminal decision is returned.
    pub fn on_outcome(&mut self, outcome: &Result<StatusCode, TransportError>) -> RetryDecision {
        match self.state {
            RetryState::Success => return RetryDecision::Done,
            RetryState::GivenUp => return RetryDecision::GiveUp,
            RetryState::Pending | RetryState::Retrying => {}
        }

        self.attempts += 1;

        if matches!(outcome, Ok(status) if status.is_success()) {
            self.state = RetryState::Success;
            return RetryDecision::Done;
        }

        if self.attempts >= self.max_attempts {
            self.state = RetryState::GivenUp;
            return RetryDecision::GiveUp;
        }

        self.state = RetryState::Retrying;
        RetryDecision::RetryAfter(self.base_delay.saturating_mul(self.attempts))
    }
}
