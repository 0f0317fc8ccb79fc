use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::range::{PartitionKeyRange, PartitionRange};
use super::topology::{Endpoint, EndpointUsage, LocationTopology, PartitionTopologyProvider};
use crate::core::{DriverError, Result};
use crate::request::OperationRequest;

#[derive(Debug, Default)]
struct PartitionMaps {
    /// What the service currently serves.
    published: HashMap<String, Vec<PartitionKeyRange>>,
    /// What lookups without a forced refresh observe.
    cached: HashMap<String, Vec<PartitionKeyRange>>,
    range_refreshes: Vec<(String, String)>,
    failures: Vec<String>,
}

/// An in-memory `PartitionTopologyProvider` with a deliberately stale cache.
///
/// `publish` changes the service-side map only; callers see it after a
/// forced refresh. That mirrors how a real routing cache lags behind splits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartitionTopology {
    maps: Arc<RwLock<PartitionMaps>>,
    forced_refreshes: Arc<AtomicUsize>,
}

impl InMemoryPartitionTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a container whose cache is already in sync.
    pub async fn register_container(
        &self,
        container_id: impl Into<String>,
        ranges: Vec<PartitionKeyRange>,
    ) -> Result<()> {
        let container_id = container_id.into();
        let ranges = Self::validated(&container_id, ranges)?;
        let mut maps = self.maps.write().await;
        maps.cached.insert(container_id.clone(), ranges.clone());
        maps.published.insert(container_id, ranges);
        Ok(())
    }

    /// Replaces the service-side map without touching the cache.
    pub async fn publish(
        &self,
        container_id: impl Into<String>,
        ranges: Vec<PartitionKeyRange>,
    ) -> Result<()> {
        let container_id = container_id.into();
        let ranges = Self::validated(&container_id, ranges)?;
        let mut maps = self.maps.write().await;
        maps.published.insert(container_id, ranges);
        Ok(())
    }

    /// Makes the next forced refresh fail with a topology error.
    pub async fn fail_next_refresh(&self, message: impl Into<String>) {
        self.maps.write().await.failures.push(message.into());
    }

    pub fn forced_refresh_count(&self) -> usize {
        self.forced_refreshes.load(Ordering::SeqCst)
    }

    /// `(container, range id)` pairs passed to `refresh_range`, in call order.
    pub async fn range_refreshes(&self) -> Vec<(String, String)> {
        self.maps.read().await.range_refreshes.clone()
    }

    fn validated(
        container_id: &str,
        mut ranges: Vec<PartitionKeyRange>,
    ) -> Result<Vec<PartitionKeyRange>> {
        if container_id.trim().is_empty() {
            return Err(DriverError::Topology(
                "container_id must not be empty".to_string(),
            ));
        }
        ranges.sort_by(|a, b| a.range.cmp(&b.range));
        for pair in ranges.windows(2) {
            if pair[0].range.overlaps(&pair[1].range) {
                return Err(DriverError::Topology(format!(
                    "ranges {} and {} overlap",
                    pair[0].range, pair[1].range
                )));
            }
        }
        Ok(ranges)
    }

    async fn refresh_cache(&self, container_id: &str) -> Result<()> {
        self.forced_refreshes.fetch_add(1, Ordering::SeqCst);
        let mut maps = self.maps.write().await;
        if !maps.failures.is_empty() {
            let message = maps.failures.remove(0);
            return Err(DriverError::Topology(message));
        }
        if let Some(ranges) = maps.published.get(container_id).cloned() {
            maps.cached.insert(container_id.to_string(), ranges);
        }
        Ok(())
    }

    async fn cached_ranges(&self, container_id: &str) -> Vec<PartitionKeyRange> {
        self.maps
            .read()
            .await
            .cached
            .get(container_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PartitionTopologyProvider for InMemoryPartitionTopology {
    async fn resolve_overlapping_ranges(
        &self,
        container_id: &str,
        range: &PartitionRange,
        force_refresh: bool,
    ) -> Result<Vec<PartitionKeyRange>> {
        if force_refresh {
            self.refresh_cache(container_id).await?;
        }
        Ok(self
            .cached_ranges(container_id)
            .await
            .into_iter()
            .filter(|candidate| candidate.range.overlaps(range))
            .collect())
    }

    async fn try_get_range_by_effective_partition_key(
        &self,
        container_id: &str,
        effective_partition_key: &str,
        force_refresh: bool,
    ) -> Result<Option<PartitionKeyRange>> {
        if force_refresh {
            self.refresh_cache(container_id).await?;
        }
        Ok(self
            .cached_ranges(container_id)
            .await
            .into_iter()
            .find(|candidate| candidate.range.contains_key(effective_partition_key)))
    }

    async fn try_get_range_by_id(
        &self,
        container_id: &str,
        range_id: &str,
        force_refresh: bool,
    ) -> Result<Option<PartitionKeyRange>> {
        if force_refresh {
            self.refresh_cache(container_id).await?;
        }
        Ok(self
            .cached_ranges(container_id)
            .await
            .into_iter()
            .find(|candidate| candidate.id == range_id))
    }

    async fn refresh_range(&self, container_id: &str, range_id: &str) -> Result<()> {
        self.maps
            .write()
            .await
            .range_refreshes
            .push((container_id.to_string(), range_id.to_string()));
        self.refresh_cache(container_id).await
    }
}

#[derive(Debug, Default)]
struct LocationState {
    read: Vec<Endpoint>,
    write: Vec<Endpoint>,
    unavailable_read: HashSet<Endpoint>,
    unavailable_write: HashSet<Endpoint>,
}

/// An in-memory `LocationTopology` over a fixed list of regional endpoints.
///
/// Endpoints marked unavailable drop to the back of the preference order
/// until `reset_availability` is called.
#[derive(Debug)]
pub struct InMemoryLocationCache {
    state: StdRwLock<LocationState>,
    multiple_write_locations: bool,
    preferred_location_count: usize,
    refreshes: AtomicUsize,
}

impl InMemoryLocationCache {
    pub fn new(read: Vec<Endpoint>, write: Vec<Endpoint>) -> Self {
        let preferred_location_count = read.len();
        Self {
            state: StdRwLock::new(LocationState {
                read,
                write,
                ..LocationState::default()
            }),
            multiple_write_locations: false,
            preferred_location_count,
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Single-region account: one endpoint for reads and writes.
    pub fn single(endpoint: Endpoint) -> Self {
        Self::new(vec![endpoint.clone()], vec![endpoint])
    }

    pub fn with_multiple_write_locations(mut self, enabled: bool) -> Self {
        self.multiple_write_locations = enabled;
        self
    }

    pub fn with_preferred_location_count(mut self, count: usize) -> Self {
        self.preferred_location_count = count;
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn is_unavailable(&self, endpoint: &Endpoint, usage: EndpointUsage) -> Result<bool> {
        let state = self.state.read()?;
        Ok(match usage {
            EndpointUsage::Read => state.unavailable_read.contains(endpoint),
            EndpointUsage::Write => state.unavailable_write.contains(endpoint),
        })
    }

    pub fn reset_availability(&self) -> Result<()> {
        let mut state = self.state.write()?;
        state.unavailable_read.clear();
        state.unavailable_write.clear();
        Ok(())
    }

    fn ordered(endpoints: &[Endpoint], unavailable: &HashSet<Endpoint>) -> Vec<Endpoint> {
        let (mut available, down): (Vec<Endpoint>, Vec<Endpoint>) = endpoints
            .iter()
            .cloned()
            .partition(|endpoint| !unavailable.contains(endpoint));
        available.extend(down);
        available
    }
}

#[async_trait]
impl LocationTopology for InMemoryLocationCache {
    fn resolve_service_endpoint(&self, request: &OperationRequest) -> Result<Endpoint> {
        if let Some(endpoint) = request.routing.endpoint.as_ref() {
            return Ok(endpoint.clone());
        }
        let state = self.state.read()?;
        let index = request.routing.location_index;
        let is_write = request.operation_type.is_write_operation();

        // Without preferred locations, writes and pinned retries flip between
        // the first two account write regions.
        if !request.routing.use_preferred_locations
            || (is_write && !self.can_use_multiple_write_locations(request))
        {
            if state.write.is_empty() {
                return Err(DriverError::Topology(
                    "no write endpoints are configured".to_string(),
                ));
            }
            let slot = std::cmp::min(index % 2, state.write.len() - 1);
            return Ok(state.write[slot].clone());
        }

        let endpoints = if is_write {
            Self::ordered(&state.write, &state.unavailable_write)
        } else {
            Self::ordered(&state.read, &state.unavailable_read)
        };
        if endpoints.is_empty() {
            return Err(DriverError::Topology("no endpoints are configured".to_string()));
        }
        Ok(endpoints[index % endpoints.len()].clone())
    }

    fn read_endpoints(&self) -> Vec<Endpoint> {
        match self.state.read() {
            Ok(state) => Self::ordered(&state.read, &state.unavailable_read),
            Err(_) => Vec::new(),
        }
    }

    fn write_endpoints(&self) -> Vec<Endpoint> {
        match self.state.read() {
            Ok(state) => Self::ordered(&state.write, &state.unavailable_write),
            Err(_) => Vec::new(),
        }
    }

    fn can_use_multiple_write_locations(&self, request: &OperationRequest) -> bool {
        self.multiple_write_locations && !request.resource_type.is_master_resource()
    }

    fn preferred_location_count(&self) -> usize {
        self.preferred_location_count
    }

    fn mark_endpoint_unavailable(&self, endpoint: &Endpoint, usage: EndpointUsage) -> Result<()> {
        let mut state = self.state.write()?;
        match usage {
            EndpointUsage::Read => state.unavailable_read.insert(endpoint.clone()),
            EndpointUsage::Write => state.unavailable_write.insert(endpoint.clone()),
        };
        Ok(())
    }

    async fn refresh_locations(&self, _force_refresh: bool) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
