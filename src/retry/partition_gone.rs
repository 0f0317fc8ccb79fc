use async_trait::async_trait;
use http::StatusCode;

use super::chain::RetryPolicy;
use super::state::{PolicyVerdict, RetryState, ShouldRetryResult};
use crate::core::{Result, SubStatusCode};
use crate::request::AttemptFailure;

/// Immediate retries for bulk operations that hit a moving partition.
pub struct PartitionGonePolicy {
    max_retries: u32,
}

impl PartitionGonePolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    fn is_trigger(failure: &AttemptFailure) -> bool {
        if failure.status() != Some(StatusCode::GONE) {
            return false;
        }
        matches!(
            failure.sub_status(),
            SubStatusCode::PARTITION_KEY_RANGE_GONE
                | SubStatusCode::NAME_CACHE_IS_STALE
                | SubStatusCode::COMPLETING_SPLIT
                | SubStatusCode::COMPLETING_PARTITION_MIGRATION
        )
    }
}

#[async_trait]
impl RetryPolicy for PartitionGonePolicy {
    fn name(&self) -> &'static str {
        "partition_gone"
    }

    async fn should_retry(
        &self,
        failure: &AttemptFailure,
        state: &mut RetryState,
    ) -> Result<PolicyVerdict> {
        if !Self::is_trigger(failure) {
            return Ok(PolicyVerdict::Forward);
        }
        if state.partition_gone_retry_count >= self.max_retries {
            return Ok(PolicyVerdict::Decided(ShouldRetryResult::NoRetry));
        }
        state.partition_gone_retry_count += 1;
        state.force_partition_key_range_refresh = true;
        Ok(PolicyVerdict::Decided(ShouldRetryResult::retry_now()))
    }
}
