use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::core::{
    ConsistencyLevel, DriverError, OperationType, ResourceType, Result, SubStatusCode, headers,
};
use crate::routing::{Endpoint, PartitionKeyRange};

/// Where the next attempt of a request should be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRouting {
    pub location_index: usize,
    pub use_preferred_locations: bool,
    /// Endpoint the attempt is pinned to once resolved.
    pub endpoint: Option<Endpoint>,
    pub force_partition_key_range_refresh: bool,
}

impl Default for RequestRouting {
    fn default() -> Self {
        Self {
            location_index: 0,
            use_preferred_locations: true,
            endpoint: None,
            force_partition_key_range_refresh: false,
        }
    }
}

impl RequestRouting {
    pub fn clear_endpoint(&mut self) {
        self.endpoint = None;
    }

    pub fn route_to_location(&mut self, location_index: usize, use_preferred_locations: bool) {
        self.location_index = location_index;
        self.use_preferred_locations = use_preferred_locations;
        self.endpoint = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTokenOrigin {
    None,
    Caller,
    Resolved,
}

/// One logical operation as the executor sees it, reused across attempts.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub activity_id: Uuid,
    pub operation_type: OperationType,
    pub resource_type: ResourceType,
    pub container_id: String,
    pub effective_partition_key: Option<String>,
    pub partition_key_range_id: Option<String>,
    pub consistency_level: Option<ConsistencyLevel>,
    pub headers: HeaderMap,
    pub routing: RequestRouting,
    /// Range the session resolver mapped this request to on the last attempt.
    pub resolved_range: Option<PartitionKeyRange>,
    pub change_feed: bool,
    session_token_origin: SessionTokenOrigin,
}

impl OperationRequest {
    pub fn new(
        operation_type: OperationType,
        resource_type: ResourceType,
        container_id: impl Into<String>,
    ) -> Self {
        Self {
            activity_id: Uuid::new_v4(),
            operation_type,
            resource_type,
            container_id: container_id.into(),
            effective_partition_key: None,
            partition_key_range_id: None,
            consistency_level: None,
            headers: HeaderMap::new(),
            routing: RequestRouting::default(),
            resolved_range: None,
            change_feed: false,
            session_token_origin: SessionTokenOrigin::None,
        }
    }

    pub fn with_effective_partition_key(mut self, key: impl Into<String>) -> Self {
        self.effective_partition_key = Some(key.into());
        self
    }

    pub fn with_partition_key_range_id(mut self, range_id: impl Into<String>) -> Self {
        self.partition_key_range_id = Some(range_id.into());
        self
    }

    pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = Some(level);
        self
    }

    /// Attaches a caller-chosen session token; the driver never overrides it.
    pub fn with_session_token(mut self, token: &str) -> Result<Self> {
        self.set_header(headers::SESSION_TOKEN, token)?;
        self.session_token_origin = SessionTokenOrigin::Caller;
        Ok(self)
    }

    /// Marks the request as an incremental (change feed) read.
    pub fn as_change_feed(mut self) -> Self {
        self.change_feed = true;
        self.headers.insert(
            HeaderName::from_static(headers::A_IM),
            HeaderValue::from_static(headers::INCREMENTAL_FEED),
        );
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.operation_type.is_read_only()
    }

    pub fn is_write(&self) -> bool {
        self.operation_type.is_write_operation()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn set_header(&mut self, name: &'static str, value: &str) -> Result<()> {
        let value = HeaderValue::from_str(value).map_err(|err| {
            DriverError::InvalidState(format!("invalid value for header '{}': {}", name, err))
        })?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(())
    }

    pub fn remove_header(&mut self, name: &'static str) {
        self.headers.remove(name);
    }

    pub fn session_token(&self) -> Option<&str> {
        self.header(headers::SESSION_TOKEN)
    }

    pub fn has_caller_session_token(&self) -> bool {
        self.session_token_origin == SessionTokenOrigin::Caller
    }

    pub(crate) fn set_resolved_session_token(&mut self, token: &str) -> Result<()> {
        self.set_header(headers::SESSION_TOKEN, token)?;
        self.session_token_origin = SessionTokenOrigin::Resolved;
        Ok(())
    }

    pub(crate) fn clear_session_token(&mut self) {
        self.remove_header(headers::SESSION_TOKEN);
        self.session_token_origin = SessionTokenOrigin::None;
    }
}

/// Status, headers and optional body of one attempt.
#[derive(Debug, Clone)]
pub struct AttemptResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl AttemptResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Adds a header; values that are not valid header text are dropped.
    pub fn with_header(mut self, name: &'static str, value: impl AsRef<str>) -> Self {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(value) => {
                self.headers.insert(HeaderName::from_static(name), value);
            }
            Err(err) => log::warn!("dropping response header '{}': {}", name, err),
        }
        self
    }

    pub fn with_sub_status(self, sub_status: SubStatusCode) -> Self {
        self.with_header(headers::SUB_STATUS, sub_status.to_string())
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Missing or unparsable sub-status reads as `UNKNOWN`.
    pub fn sub_status(&self) -> SubStatusCode {
        self.header(headers::SUB_STATUS)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(SubStatusCode::UNKNOWN)
    }

    pub fn continuation(&self) -> Option<&str> {
        self.header(headers::CONTINUATION)
            .filter(|token| !token.is_empty())
    }

    pub fn session_token(&self) -> Option<&str> {
        self.header(headers::SESSION_TOKEN)
    }

    pub fn partition_key_range_id(&self) -> Option<&str> {
        self.header(headers::PARTITION_KEY_RANGE_ID)
    }

    pub fn container_rid(&self) -> Option<&str> {
        self.header(headers::CONTAINER_RID)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header(headers::ETAG).filter(|etag| !etag.is_empty())
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.header(headers::RETRY_AFTER_MS)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// 4xx and 5xx are failures; 304 is a valid change feed answer.
    pub fn is_failure(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TransportError {
    pub endpoint: Option<Endpoint>,
    pub message: String,
}

impl TransportError {
    pub fn new(endpoint: Option<Endpoint>, message: impl Into<String>) -> Self {
        Self {
            endpoint,
            message: message.into(),
        }
    }
}

/// Why an attempt failed, as handed to the retry chain.
#[derive(Debug, Clone)]
pub enum AttemptFailure {
    Transport(TransportError),
    Response(AttemptResponse),
}

impl AttemptFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport(_) => None,
            Self::Response(response) => Some(response.status),
        }
    }

    pub fn sub_status(&self) -> SubStatusCode {
        match self {
            Self::Transport(_) => SubStatusCode::UNKNOWN,
            Self::Response(response) => response.sub_status(),
        }
    }

    pub fn is_status(&self, status: StatusCode, sub_status: SubStatusCode) -> bool {
        self.status() == Some(status) && self.sub_status() == sub_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_accessors() {
        let response = AttemptResponse::new(StatusCode::TOO_MANY_REQUESTS)
            .with_sub_status(SubStatusCode(3200))
            .with_header(headers::RETRY_AFTER_MS, "250")
            .with_header(headers::CONTINUATION, "");
        assert_eq!(response.sub_status(), SubStatusCode(3200));
        assert_eq!(response.retry_after(), Some(Duration::from_millis(250)));
        assert_eq!(response.continuation(), None);
        assert!(response.is_failure());
        assert!(!AttemptResponse::new(StatusCode::NOT_MODIFIED).is_failure());
    }

    #[test]
    fn test_caller_session_token_is_tracked() {
        let request = OperationRequest::new(OperationType::Read, ResourceType::Document, "orders")
            .with_session_token("0:1#9")
            .unwrap();
        assert!(request.has_caller_session_token());
        assert_eq!(request.session_token(), Some("0:1#9"));
    }
}
