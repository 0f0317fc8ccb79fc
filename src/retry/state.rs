use std::time::Duration;

use crate::core::CancellationSignal;
use crate::routing::Endpoint;

/// Routing directive for the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    pub location_index: usize,
    pub use_preferred_locations: bool,
}

impl RetryContext {
    pub fn new(location_index: usize, use_preferred_locations: bool) -> Self {
        Self {
            location_index,
            use_preferred_locations,
        }
    }
}

/// Retry decision for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShouldRetryResult {
    NoRetry,
    RetryAfter(Duration),
}

impl ShouldRetryResult {
    pub fn retry_now() -> Self {
        Self::RetryAfter(Duration::ZERO)
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, Self::RetryAfter(_))
    }

    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::RetryAfter(delay) => Some(*delay),
            Self::NoRetry => None,
        }
    }
}

/// What one policy says about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    Decided(ShouldRetryResult),
    /// Not this policy's concern; ask the next one.
    Forward,
}

/// Mutable retry bookkeeping for one logical operation.
///
/// Never shared between operations: each chain owns exactly one.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub failover_retry_count: u32,
    pub session_token_retry_count: u32,
    pub unavailable_endpoint_retry_count: u32,
    pub partition_gone_retry_count: u32,
    pub throttle_retry_count: u32,
    pub cumulative_throttle_delay: Duration,
    pub retry_context: Option<RetryContext>,
    /// Endpoint the last attempt was pinned to.
    pub location_endpoint: Option<Endpoint>,
    pub is_read_request: bool,
    pub can_use_multiple_write_locations: bool,
    /// Ask the next attempt to bypass the partition map cache.
    pub force_partition_key_range_refresh: bool,
    pub attempts: u32,
    pub endpoints_contacted: Vec<Endpoint>,
    pub total_retry_delay: Duration,
    cancellation: CancellationSignal,
}

impl RetryState {
    pub fn new(cancellation: CancellationSignal) -> Self {
        Self {
            failover_retry_count: 0,
            session_token_retry_count: 0,
            unavailable_endpoint_retry_count: 0,
            partition_gone_retry_count: 0,
            throttle_retry_count: 0,
            cumulative_throttle_delay: Duration::ZERO,
            retry_context: None,
            location_endpoint: None,
            is_read_request: true,
            can_use_multiple_write_locations: false,
            force_partition_key_range_refresh: false,
            attempts: 0,
            endpoints_contacted: Vec::new(),
            total_retry_delay: Duration::ZERO,
            cancellation,
        }
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub(crate) fn record_endpoint(&mut self, endpoint: &Endpoint) {
        if self.endpoints_contacted.last() != Some(endpoint) {
            self.endpoints_contacted.push(endpoint.clone());
        }
    }
}
