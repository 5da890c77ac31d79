//! Attempt classification and backoff.
//!
//! Every failed attempt is folded into an [`AttemptFailure`] and handed to
//! the [`RetryPolicy`], which answers with a [`RetryDecision`]. The policy
//! is pure classification: it never sleeps, refreshes credentials, or
//! adjusts clocks itself. The pipeline acts on the decision.
//!
//! Classification rules:
//!
//! - transport failures are retryable under the attempt cap; if the body
//!   came from a single-use stream the decision is
//!   [`RetryDecision::ResetStreamAndRetry`] so the pipeline can fail fast
//!   when the stream cannot be rewound;
//! - `RequestTimeTooSkewed` / `RequestExpired` ask for a one-shot clock
//!   correction that does not consume a retry slot;
//! - expired-credential codes ask for a provider refresh and do consume a
//!   slot;
//! - HTTP 5xx and 429 are plainly retryable; every other service error is
//!   terminal.

use std::time::Duration;

use rand::RngExt;

use crate::error::ServiceError;
use crate::transport::TransportError;

/// Service codes that signal the request timestamp was out of tolerance.
const CLOCK_SKEW_CODES: &[&str] = &["RequestTimeTooSkewed", "RequestExpired"];

/// Service codes that signal the credentials went stale mid-flight.
const CREDENTIAL_CODES: &[&str] = &[
    "ExpiredToken",
    "InvalidAccessKeyId",
    "TokenRefreshRequired",
    "UnrecognizedClientException",
    "InvalidToken",
    "AuthFailure",
];

/// Why one attempt failed.
#[derive(Debug, Clone)]
pub enum AttemptFailure {
    /// No response was produced.
    Transport(TransportError),
    /// The service answered with a non-2xx response.
    Service(ServiceError),
}

/// What the pipeline should do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Surface the failure, no further attempts.
    None,
    /// Sleep for the delay, then retry as-is.
    Retry { delay: Duration },
    /// Correct the local clock offset from the server date, then retry
    /// immediately. Does not consume a retry slot.
    CorrectClockSkewAndRetry,
    /// Ask the credentials provider for fresh credentials, then retry.
    RefreshCredentialsAndRetry { delay: Duration },
    /// Retry, but the body must be rewound first; the pipeline fails with a
    /// stream error if it cannot be.
    ResetStreamAndRetry { delay: Duration },
}

/// Classification policy shared by all attempts of one logical call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retry_count: u32,
    max_skew_retry_count: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_count: tos_core::constants::DEFAULT_MAX_RETRY_COUNT,
            max_skew_retry_count: 1,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Build a policy with the given retry cap and default backoff.
    #[must_use]
    pub fn new(max_retry_count: u32) -> Self {
        Self {
            max_retry_count,
            ..Self::default()
        }
    }

    /// Maximum retries after the first attempt.
    #[must_use]
    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    /// Maximum clock-skew corrections per logical call.
    #[must_use]
    pub fn max_skew_retry_count(&self) -> u32 {
        self.max_skew_retry_count
    }

    /// Replace the clock-skew correction cap.
    #[must_use]
    pub fn with_max_skew_retry_count(mut self, count: u32) -> Self {
        self.max_skew_retry_count = count;
        self
    }

    /// Override the backoff window.
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Classify one failed attempt.
    ///
    /// `retries_used` counts retries already consumed (0 after the first
    /// attempt); `skew_retries_used` counts clock corrections already
    /// applied; `body_replayable` is false when the body came from a
    /// single-use stream.
    #[must_use]
    pub fn decide(
        &self,
        failure: &AttemptFailure,
        retries_used: u32,
        skew_retries_used: u32,
        body_replayable: bool,
    ) -> RetryDecision {
        match failure {
            AttemptFailure::Transport(_) => {
                if retries_used >= self.max_retry_count {
                    return RetryDecision::None;
                }
                let delay = self.backoff(retries_used);
                if body_replayable {
                    RetryDecision::Retry { delay }
                } else {
                    RetryDecision::ResetStreamAndRetry { delay }
                }
            }
            AttemptFailure::Service(err) => self.decide_service(
                err,
                retries_used,
                skew_retries_used,
                body_replayable,
            ),
        }
    }

    fn decide_service(
        &self,
        err: &ServiceError,
        retries_used: u32,
        skew_retries_used: u32,
        body_replayable: bool,
    ) -> RetryDecision {
        if CLOCK_SKEW_CODES.contains(&err.code.as_str()) {
            // Skew corrections are bounded separately and do not eat into
            // the retry budget.
            if skew_retries_used < self.max_skew_retry_count {
                return RetryDecision::CorrectClockSkewAndRetry;
            }
            return RetryDecision::None;
        }

        if retries_used >= self.max_retry_count {
            return RetryDecision::None;
        }
        let delay = self.backoff(retries_used);

        if CREDENTIAL_CODES.contains(&err.code.as_str()) {
            return RetryDecision::RefreshCredentialsAndRetry { delay };
        }

        if err.is_server_error() || err.status == http::StatusCode::TOO_MANY_REQUESTS {
            if body_replayable {
                return RetryDecision::Retry { delay };
            }
            return RetryDecision::ResetStreamAndRetry { delay };
        }

        RetryDecision::None
    }

    /// Exponential backoff with additive jitter, capped at `max_delay`.
    fn backoff(&self, retries_used: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << retries_used.min(16));
        let capped = exp.min(self.max_delay);
        let jitter_ceiling = (capped.as_millis() as u64 / 4).max(1);
        let jitter = rand::rng().random_range(0..jitter_ceiling);
        (capped + Duration::from_millis(jitter)).min(self.max_delay)
    }
}
