use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{Level, event};

use super::chain::RetryPolicy;
use super::state::{PolicyVerdict, RetryContext, RetryState, ShouldRetryResult};
use crate::config::RetryOptions;
use crate::core::{Result, SubStatusCode};
use crate::request::{AttemptFailure, OperationRequest};
use crate::routing::{EndpointUsage, LocationTopology};

/// Moves the operation to another region when the current one cannot serve it.
///
/// Triggers on transport failures, on writes rejected as forbidden at the
/// endpoint, and on reads (or multi-write requests) hitting a region that
/// does not know the account yet.
pub struct EndpointFailoverPolicy {
    locations: Arc<dyn LocationTopology>,
    options: RetryOptions,
}

impl EndpointFailoverPolicy {
    pub fn new(locations: Arc<dyn LocationTopology>, options: RetryOptions) -> Self {
        Self { locations, options }
    }

    fn is_trigger(failure: &AttemptFailure, state: &RetryState) -> bool {
        match failure {
            AttemptFailure::Transport(_) => true,
            AttemptFailure::Response(response) => {
                let sub_status = response.sub_status();
                if response.status != StatusCode::FORBIDDEN {
                    return false;
                }
                (sub_status == SubStatusCode::WRITE_FORBIDDEN && !state.is_read_request)
                    || (sub_status == SubStatusCode::DATABASE_ACCOUNT_NOT_FOUND
                        && (state.is_read_request || state.can_use_multiple_write_locations))
            }
        }
    }
}

#[async_trait]
impl RetryPolicy for EndpointFailoverPolicy {
    fn name(&self) -> &'static str {
        "endpoint_failover"
    }

    async fn on_before_send(
        &self,
        request: &mut OperationRequest,
        state: &mut RetryState,
    ) -> Result<()> {
        state.can_use_multiple_write_locations =
            self.locations.can_use_multiple_write_locations(request);
        // Pin the exact endpoint so a later failure marks the one actually used.
        let endpoint = self.locations.resolve_service_endpoint(request)?;
        request.routing.endpoint = Some(endpoint.clone());
        state.location_endpoint = Some(endpoint);
        Ok(())
    }

    async fn should_retry(
        &self,
        failure: &AttemptFailure,
        state: &mut RetryState,
    ) -> Result<PolicyVerdict> {
        if !Self::is_trigger(failure, state) {
            return Ok(PolicyVerdict::Forward);
        }
        if !self.options.enable_endpoint_discovery {
            return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
        }

        state.cancellation().check()?;
        state.failover_retry_count += 1;
        if state.failover_retry_count > self.options.max_failover_retry_count {
            event!(
                Level::WARN,
                failover_retries = state.failover_retry_count,
                endpoint = ?state.location_endpoint,
                "endpoint failover budget exhausted"
            );
            return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
        }

        if let Some(endpoint) = state.location_endpoint.as_ref() {
            let usage = if state.is_read_request {
                EndpointUsage::Read
            } else {
                EndpointUsage::Write
            };
            self.locations.mark_endpoint_unavailable(endpoint, usage)?;
        }

        self.locations.refresh_locations(true).await?;

        state.retry_context = Some(RetryContext::new(
            state.failover_retry_count as usize,
            false,
        ));

        let delay = if !state.is_read_request && state.failover_retry_count > 1 {
            self.options.failover_write_retry_delay()
        } else {
            Duration::ZERO
        };
        event!(
            Level::DEBUG,
            failover_retries = state.failover_retry_count,
            endpoint = ?state.location_endpoint,
            read = state.is_read_request,
            "failing over to next endpoint"
        );
        Ok(PolicyVerdict::Decided(ShouldRetryResult::RetryAfter(delay)))
    }
}
