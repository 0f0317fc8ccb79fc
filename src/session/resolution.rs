use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use tracing::{Level, event};

use super::store::SessionTokenStore;
use super::token::parse_segments;
use crate::core::{
    ConsistencyLevel, OperationType, ResourceType, Result, SubStatusCode, headers,
};
use crate::request::OperationRequest;
use crate::routing::{PartitionKeyRange, PartitionTopologyProvider};

/// Stamps session tokens on outgoing requests and records the ones that come back.
pub struct SessionResolver {
    store: Arc<dyn SessionTokenStore>,
    topology: Arc<dyn PartitionTopologyProvider>,
    default_consistency: ConsistencyLevel,
}

impl SessionResolver {
    pub fn new(
        store: Arc<dyn SessionTokenStore>,
        topology: Arc<dyn PartitionTopologyProvider>,
        default_consistency: ConsistencyLevel,
    ) -> Self {
        Self {
            store,
            topology,
            default_consistency,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionTokenStore> {
        &self.store
    }

    /// Attaches the stored token for the range the request maps to.
    ///
    /// Caller-supplied tokens are left alone, except on master resources
    /// where session tokens mean nothing and are dropped. A token stamped by
    /// an earlier attempt is resolved again, since the partition map or the
    /// store may have moved on.
    pub async fn apply_session_token(&self, request: &mut OperationRequest) -> Result<()> {
        if request.has_caller_session_token() {
            if request.resource_type.is_master_resource() {
                request.clear_session_token();
            }
            return Ok(());
        }
        request.clear_session_token();
        request.resolved_range = None;

        if request.resource_type.is_master_resource() {
            return Ok(());
        }
        let consistency = request
            .consistency_level
            .unwrap_or(self.default_consistency);
        if consistency != ConsistencyLevel::Session {
            return Ok(());
        }

        let force = request.routing.force_partition_key_range_refresh;
        let mut resolved = self.resolve_range(request, force).await?;
        if resolved.is_none() && !force {
            resolved = self.resolve_range(request, true).await?;
        }
        let Some(range) = resolved else {
            event!(
                Level::DEBUG,
                container = %request.container_id,
                "no partition range resolved; sending without session token"
            );
            return Ok(());
        };

        if let Some(token) = self.token_for_range(&request.container_id, &range)? {
            request.set_resolved_session_token(&token)?;
        }
        request.resolved_range = Some(range);
        Ok(())
    }

    /// Records the session token a response carried.
    ///
    /// Successful and not-modified responses always count. Failures count only for partitioned
    /// resources answering 412, 409, or 404 other than "read session not
    /// available", since those still reflect the attempted write. Deleting a
    /// container clears its tokens instead.
    pub async fn capture_session_token(
        &self,
        status: StatusCode,
        sub_status: SubStatusCode,
        request: &OperationRequest,
        response_headers: &HeaderMap,
    ) -> Result<()> {
        let success = status.is_success();
        let captured = success || status == StatusCode::NOT_MODIFIED;
        if !captured && !Self::failure_carries_token(status, sub_status, request) {
            return Ok(());
        }

        if success
            && request.resource_type == ResourceType::Container
            && request.operation_type == OperationType::Delete
        {
            self.store.clear(&request.container_id)?;
            return Ok(());
        }

        if let Some(header) = response_headers
            .get(headers::SESSION_TOKEN)
            .and_then(|value| value.to_str().ok())
        {
            for segment in parse_segments(header) {
                self.store.set(
                    &request.container_id,
                    &segment.range_id,
                    &segment.to_header_value(),
                )?;
            }
        }

        self.detect_routing_drift(request, response_headers).await
    }

    fn failure_carries_token(
        status: StatusCode,
        sub_status: SubStatusCode,
        request: &OperationRequest,
    ) -> bool {
        if request.resource_type.is_master_resource() {
            return false;
        }
        status == StatusCode::PRECONDITION_FAILED
            || status == StatusCode::CONFLICT
            || (status == StatusCode::NOT_FOUND
                && sub_status != SubStatusCode::READ_SESSION_NOT_AVAILABLE)
    }

    async fn detect_routing_drift(
        &self,
        request: &OperationRequest,
        response_headers: &HeaderMap,
    ) -> Result<()> {
        let Some(resolved) = request.resolved_range.as_ref() else {
            return Ok(());
        };
        let served = response_headers
            .get(headers::PARTITION_KEY_RANGE_ID)
            .and_then(|value| value.to_str().ok());
        if let Some(served) = served {
            if served != resolved.id {
                event!(
                    Level::DEBUG,
                    container = %request.container_id,
                    resolved = %resolved.id,
                    served = %served,
                    "server answered from a different partition; refreshing routing"
                );
                self.topology
                    .refresh_range(&request.container_id, served)
                    .await?;
            }
        }
        Ok(())
    }

    async fn resolve_range(
        &self,
        request: &OperationRequest,
        force_refresh: bool,
    ) -> Result<Option<PartitionKeyRange>> {
        if let Some(range_id) = request.partition_key_range_id.as_deref() {
            return self
                .topology
                .try_get_range_by_id(&request.container_id, range_id, force_refresh)
                .await;
        }
        if let Some(key) = request.effective_partition_key.as_deref() {
            return self
                .topology
                .try_get_range_by_effective_partition_key(&request.container_id, key, force_refresh)
                .await;
        }
        Ok(None)
    }

    /// A split child has no token of its own until it serves a request, so
    /// fall back to the newest parent that has one.
    fn token_for_range(
        &self,
        container_id: &str,
        range: &PartitionKeyRange,
    ) -> Result<Option<String>> {
        if let Some(token) = self.store.get(container_id, &range.id)? {
            return Ok(Some(token));
        }
        for parent in range.parents.iter().rev() {
            if let Some(token) = self.store.get(container_id, parent)? {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }
}
