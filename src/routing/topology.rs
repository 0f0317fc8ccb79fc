use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::range::{PartitionKeyRange, PartitionRange};
use crate::core::Result;
use crate::request::OperationRequest;

/// A regional service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointUsage {
    Read,
    Write,
}

/// Partition map lookups for a container.
///
/// Implementations keep a cache; `force_refresh` bypasses it and must
/// return the service's current view.
#[async_trait]
pub trait PartitionTopologyProvider: Send + Sync {
    /// Ranges overlapping `range`, ordered by their min key.
    async fn resolve_overlapping_ranges(
        &self,
        container_id: &str,
        range: &PartitionRange,
        force_refresh: bool,
    ) -> Result<Vec<PartitionKeyRange>>;

    async fn try_get_range_by_effective_partition_key(
        &self,
        container_id: &str,
        effective_partition_key: &str,
        force_refresh: bool,
    ) -> Result<Option<PartitionKeyRange>>;

    async fn try_get_range_by_id(
        &self,
        container_id: &str,
        range_id: &str,
        force_refresh: bool,
    ) -> Result<Option<PartitionKeyRange>>;

    /// Unconditionally reloads the routing entry for `range_id`.
    async fn refresh_range(&self, container_id: &str, range_id: &str) -> Result<()>;
}

/// Regional endpoint selection and health.
#[async_trait]
pub trait LocationTopology: Send + Sync {
    /// Endpoint the request should go to, honouring its routing directive.
    fn resolve_service_endpoint(&self, request: &OperationRequest) -> Result<Endpoint>;

    /// Read endpoints in preference order, available ones first.
    fn read_endpoints(&self) -> Vec<Endpoint>;

    /// Write endpoints in preference order, available ones first.
    fn write_endpoints(&self) -> Vec<Endpoint>;

    fn can_use_multiple_write_locations(&self, request: &OperationRequest) -> bool;

    fn preferred_location_count(&self) -> usize;

    fn mark_endpoint_unavailable(&self, endpoint: &Endpoint, usage: EndpointUsage) -> Result<()>;

    async fn refresh_locations(&self, force_refresh: bool) -> Result<()>;
}
