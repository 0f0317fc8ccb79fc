use async_trait::async_trait;
use http::StatusCode;

use super::chain::RetryPolicy;
use super::state::{PolicyVerdict, RetryState, ShouldRetryResult};
use crate::config::RetryOptions;
use crate::core::Result;
use crate::request::AttemptFailure;

/// Terminal policy: waits out rate limiting, and refuses everything else.
pub struct ThrottlingPolicy {
    options: RetryOptions,
}

impl ThrottlingPolicy {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl RetryPolicy for ThrottlingPolicy {
    fn name(&self) -> &'static str {
        "throttling"
    }

    async fn should_retry(
        &self,
        failure: &AttemptFailure,
        state: &mut RetryState,
    ) -> Result<PolicyVerdict> {
        let AttemptFailure::Response(response) = failure else {
            return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
        };
        if response.status != StatusCode::TOO_MANY_REQUESTS {
            return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
        }
        if state.throttle_retry_count >= self.options.max_throttle_retry_attempts {
            return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
        }

        let suggested = response
            .retry_after()
            .unwrap_or_else(|| self.options.default_throttle_retry_after_duration());
        let delay = suggested * self.options.throttle_backoff_factor.max(1);
        let max_wait = self.options.max_throttle_wait_duration();
        if delay > max_wait || state.cumulative_throttle_delay + delay > max_wait {
            return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
        }

        state.throttle_retry_count += 1;
        state.cumulative_throttle_delay += delay;
        Ok(PolicyVerdict::Decided(ShouldRetryResult::RetryAfter(delay)))
    }
}
