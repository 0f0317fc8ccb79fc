use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{Level, event};

use super::chain::RetryPolicy;
use super::state::{PolicyVerdict, RetryContext, RetryState, ShouldRetryResult};
use crate::config::RetryOptions;
use crate::core::{Result, SubStatusCode};
use crate::request::{AttemptFailure, OperationRequest};
use crate::routing::LocationTopology;

/// Retries "read session not available" on other replicas.
///
/// With multiple write regions every endpoint gets one try in preference
/// order; otherwise one retry goes to the primary write region.
pub struct SessionExhaustionPolicy {
    locations: Arc<dyn LocationTopology>,
    options: RetryOptions,
}

impl SessionExhaustionPolicy {
    pub fn new(locations: Arc<dyn LocationTopology>, options: RetryOptions) -> Self {
        Self { locations, options }
    }
}

#[async_trait]
impl RetryPolicy for SessionExhaustionPolicy {
    fn name(&self) -> &'static str {
        "session_exhaustion"
    }

    async fn on_before_send(
        &self,
        request: &mut OperationRequest,
        state: &mut RetryState,
    ) -> Result<()> {
        state.can_use_multiple_write_locations =
            self.locations.can_use_multiple_write_locations(request);
        Ok(())
    }

    async fn should_retry(
        &self,
        failure: &AttemptFailure,
        state: &mut RetryState,
    ) -> Result<PolicyVerdict> {
        if !failure.is_status(
            StatusCode::NOT_FOUND,
            SubStatusCode::READ_SESSION_NOT_AVAILABLE,
        ) {
            return Ok(PolicyVerdict::Forward);
        }

        state.session_token_retry_count += 1;
        if !self.options.enable_endpoint_discovery {
            return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
        }

        if state.can_use_multiple_write_locations {
            let endpoint_count = if state.is_read_request {
                self.locations.read_endpoints().len()
            } else {
                self.locations.write_endpoints().len()
            };
            if state.session_token_retry_count as usize > endpoint_count {
                event!(
                    Level::WARN,
                    session_retries = state.session_token_retry_count,
                    endpoints = endpoint_count,
                    "session token unavailable on every endpoint"
                );
                return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
            }
            state.retry_context = Some(RetryContext::new(
                state.session_token_retry_count as usize,
                true,
            ));
        } else {
            if state.session_token_retry_count > 1 {
                event!(
                    Level::WARN,
                    session_retries = state.session_token_retry_count,
                    "session token unavailable on the write region"
                );
                return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
            }
            state.retry_context = Some(RetryContext::new(0, false));
        }

        event!(
            Level::DEBUG,
            session_retries = state.session_token_retry_count,
            "retrying read session on another endpoint"
        );
        Ok(PolicyVerdict::Decided(ShouldRetryResult::retry_now()))
    }
}
