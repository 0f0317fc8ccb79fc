use async_trait::async_trait;

use crate::request::{AttemptResponse, OperationRequest, TransportError};
use crate::routing::Endpoint;

/// Sends one attempt and reports what came back.
///
/// Any HTTP status is a response; only failing to get one is a `TransportError`.
#[async_trait]
pub trait AttemptTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: Option<&Endpoint>,
        request: &OperationRequest,
    ) -> std::result::Result<AttemptResponse, TransportError>;
}
