use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Level, event};

use super::endpoint_failover::EndpointFailoverPolicy;
use super::metadata_unavailable::MetadataUnavailablePolicy;
use super::partition_gone::PartitionGonePolicy;
use super::session_exhaustion::SessionExhaustionPolicy;
use super::state::{PolicyVerdict, RetryState, ShouldRetryResult};
use super::throttling::ThrottlingPolicy;
use crate::config::RetryOptions;
use crate::core::{CancellationSignal, Result};
use crate::request::{AttemptFailure, OperationRequest};
use crate::routing::LocationTopology;

/// One link of the retry chain, specialised in one failure category.
///
/// A policy that does not recognise a failure must return
/// `PolicyVerdict::Forward` so the next link sees it unchanged.
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before every attempt, the first one included.
    async fn on_before_send(
        &self,
        _request: &mut OperationRequest,
        _state: &mut RetryState,
    ) -> Result<()> {
        Ok(())
    }

    async fn should_retry(
        &self,
        failure: &AttemptFailure,
        state: &mut RetryState,
    ) -> Result<PolicyVerdict>;
}

/// Ordered policies plus the retry state of a single operation.
pub struct RetryPolicyChain {
    policies: Vec<Box<dyn RetryPolicy>>,
    state: RetryState,
}

impl RetryPolicyChain {
    pub fn new(policies: Vec<Box<dyn RetryPolicy>>, cancellation: CancellationSignal) -> Self {
        Self {
            policies,
            state: RetryState::new(cancellation),
        }
    }

    /// Point reads, writes, queries and feeds.
    pub fn for_data_operation(
        locations: Arc<dyn LocationTopology>,
        options: &RetryOptions,
        cancellation: CancellationSignal,
    ) -> Self {
        Self::new(
            vec![
                Box::new(EndpointFailoverPolicy::new(locations.clone(), options.clone())),
                Box::new(SessionExhaustionPolicy::new(locations, options.clone())),
                Box::new(ThrottlingPolicy::new(options.clone())),
            ],
            cancellation,
        )
    }

    /// Topology and account metadata reads.
    pub fn for_metadata_operation(
        locations: Arc<dyn LocationTopology>,
        options: &RetryOptions,
        cancellation: CancellationSignal,
    ) -> Self {
        Self::new(
            vec![
                Box::new(EndpointFailoverPolicy::new(locations.clone(), options.clone())),
                Box::new(MetadataUnavailablePolicy::new(locations)),
                Box::new(ThrottlingPolicy::new(options.clone())),
            ],
            cancellation,
        )
    }

    /// Batched item operations, which also absorb partition-gone responses.
    pub fn for_bulk_operation(
        locations: Arc<dyn LocationTopology>,
        options: &RetryOptions,
        cancellation: CancellationSignal,
    ) -> Self {
        Self::new(
            vec![
                Box::new(EndpointFailoverPolicy::new(locations.clone(), options.clone())),
                Box::new(SessionExhaustionPolicy::new(locations, options.clone())),
                Box::new(PartitionGonePolicy::new(options.max_partition_gone_retries)),
                Box::new(ThrottlingPolicy::new(options.clone())),
            ],
            cancellation,
        )
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    pub fn policy_names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|policy| policy.name()).collect()
    }

    /// Applies the pending routing directive and lets every policy annotate the request.
    pub async fn on_before_send(&mut self, request: &mut OperationRequest) -> Result<()> {
        self.state.cancellation().check()?;
        self.state.attempts += 1;
        self.state.is_read_request = request.is_read_only();
        request.routing.force_partition_key_range_refresh =
            std::mem::take(&mut self.state.force_partition_key_range_refresh);
        request.routing.clear_endpoint();
        if let Some(context) = self.state.retry_context {
            request
                .routing
                .route_to_location(context.location_index, context.use_preferred_locations);
        }

        for policy in &self.policies {
            policy.on_before_send(request, &mut self.state).await?;
        }

        if let Some(endpoint) = request.routing.endpoint.as_ref() {
            self.state.record_endpoint(endpoint);
        }
        Ok(())
    }

    /// Asks each policy in order until one decides; nobody deciding means no retry.
    pub async fn should_retry(&mut self, failure: &AttemptFailure) -> Result<ShouldRetryResult> {
        self.state.cancellation().check()?;
        for policy in &self.policies {
            match policy.should_retry(failure, &mut self.state).await? {
                PolicyVerdict::Forward => continue,
                PolicyVerdict::Decided(result) => {
                    if let ShouldRetryResult::RetryAfter(delay) = result {
                        self.state.total_retry_delay += delay;
                        event!(
                            Level::DEBUG,
                            policy = policy.name(),
                            attempt = self.state.attempts,
                            delay_ms = delay.as_millis() as u64,
                            "retrying attempt"
                        );
                    } else {
                        self.trace_give_up(policy.name(), failure);
                    }
                    return Ok(result);
                }
            }
        }
        self.trace_give_up("none", failure);
        Ok(ShouldRetryResult::NoRetry)
    }

    /// First-attempt failures are ordinary outcomes; only retried operations warn.
    fn trace_give_up(&self, policy: &'static str, failure: &AttemptFailure) {
        let state = &self.state;
        if state.attempts <= 1 {
            event!(
                Level::DEBUG,
                policy,
                status = ?failure.status(),
                sub_status = %failure.sub_status(),
                "attempt failed without retry"
            );
            return;
        }
        event!(
            Level::WARN,
            policy,
            status = ?failure.status(),
            sub_status = %failure.sub_status(),
            attempts = state.attempts,
            failover_retries = state.failover_retry_count,
            session_retries = state.session_token_retry_count,
            unavailable_endpoint_retries = state.unavailable_endpoint_retry_count,
            partition_gone_retries = state.partition_gone_retry_count,
            throttle_retries = state.throttle_retry_count,
            endpoints = state.endpoints_contacted.len(),
            "giving up on operation"
        );
    }
}
