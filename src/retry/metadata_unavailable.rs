use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{Level, event};

use super::chain::RetryPolicy;
use super::state::{PolicyVerdict, RetryContext, RetryState, ShouldRetryResult};
use crate::core::{Result, SubStatusCode};
use crate::request::AttemptFailure;
use crate::routing::LocationTopology;

/// Walks preferred regions when a metadata read finds its endpoint unhealthy.
///
/// Once every preferred region has been tried the failure goes on to the
/// next policy.
pub struct MetadataUnavailablePolicy {
    locations: Arc<dyn LocationTopology>,
}

impl MetadataUnavailablePolicy {
    pub fn new(locations: Arc<dyn LocationTopology>) -> Self {
        Self { locations }
    }

    fn is_trigger(failure: &AttemptFailure) -> bool {
        let Some(status) = failure.status() else {
            return false;
        };
        let sub_status = failure.sub_status();
        status == StatusCode::SERVICE_UNAVAILABLE
            || status == StatusCode::INTERNAL_SERVER_ERROR
            || (status == StatusCode::GONE && sub_status == SubStatusCode::LEASE_NOT_FOUND)
            || (status == StatusCode::FORBIDDEN
                && sub_status == SubStatusCode::DATABASE_ACCOUNT_NOT_FOUND)
    }
}

#[async_trait]
impl RetryPolicy for MetadataUnavailablePolicy {
    fn name(&self) -> &'static str {
        "metadata_unavailable"
    }

    async fn should_retry(
        &self,
        failure: &AttemptFailure,
        state: &mut RetryState,
    ) -> Result<PolicyVerdict> {
        if !Self::is_trigger(failure) {
            return Ok(PolicyVerdict::Forward);
        }
        let bound = std::cmp::max(1, self.locations.preferred_location_count()) as u32;
        if state.unavailable_endpoint_retry_count >= bound {
            event!(
                Level::DEBUG,
                unavailable_endpoint_retries = state.unavailable_endpoint_retry_count,
                bound,
                "metadata endpoints exhausted; forwarding"
            );
            return Ok(PolicyVerdict::Forward);
        }
        state.unavailable_endpoint_retry_count += 1;
        state.retry_context = Some(RetryContext::new(
            state.unavailable_endpoint_retry_count as usize,
            true,
        ));
        Ok(PolicyVerdict::Decided(ShouldRetryResult::retry_now()))
    }
}
