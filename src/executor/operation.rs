use std::sync::Arc;

use tracing::{Instrument, Level, event, info_span};

use super::transport::AttemptTransport;
use crate::config::DriverConfig;
use crate::core::{
    CancellationSignal, DriverError, RequestDiagnostics, Result, sleep_or_cancel,
};
use crate::request::{AttemptFailure, AttemptResponse, OperationRequest};
use crate::retry::{RetryPolicyChain, RetryState, ShouldRetryResult};
use crate::routing::{LocationTopology, PartitionTopologyProvider};
use crate::session::{SessionResolver, SessionTokenStore, ShardedSessionTokenStore};

/// Drives attempts of an operation through session resolution, the retry
/// chain, and the transport until it succeeds or a policy gives up.
pub struct OperationExecutor {
    pub(crate) config: DriverConfig,
    pub(crate) transport: Arc<dyn AttemptTransport>,
    pub(crate) partitions: Arc<dyn PartitionTopologyProvider>,
    pub(crate) locations: Arc<dyn LocationTopology>,
    pub(crate) session: SessionResolver,
}

impl OperationExecutor {
    pub fn new(
        config: DriverConfig,
        transport: Arc<dyn AttemptTransport>,
        partitions: Arc<dyn PartitionTopologyProvider>,
        locations: Arc<dyn LocationTopology>,
    ) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn SessionTokenStore> =
            Arc::new(ShardedSessionTokenStore::new(config.session_store_shards)?);
        let session = SessionResolver::new(store, partitions.clone(), config.default_consistency);
        Ok(Self {
            config,
            transport,
            partitions,
            locations,
            session,
        })
    }

    /// Swaps in a shared store, e.g. one owned by the client instance.
    pub fn with_session_store(mut self, store: Arc<dyn SessionTokenStore>) -> Self {
        self.session = SessionResolver::new(
            store,
            self.partitions.clone(),
            self.config.default_consistency,
        );
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionResolver {
        &self.session
    }

    pub fn data_chain(&self, cancellation: CancellationSignal) -> RetryPolicyChain {
        RetryPolicyChain::for_data_operation(self.locations.clone(), &self.config.retry, cancellation)
    }

    pub fn metadata_chain(&self, cancellation: CancellationSignal) -> RetryPolicyChain {
        RetryPolicyChain::for_metadata_operation(
            self.locations.clone(),
            &self.config.retry,
            cancellation,
        )
    }

    pub fn bulk_chain(&self, cancellation: CancellationSignal) -> RetryPolicyChain {
        RetryPolicyChain::for_bulk_operation(self.locations.clone(), &self.config.retry, cancellation)
    }

    /// Runs a request with a fresh chain picked from its resource type.
    pub async fn execute(
        &self,
        request: OperationRequest,
        cancellation: &CancellationSignal,
    ) -> Result<AttemptResponse> {
        let mut chain = if request.resource_type.is_master_resource() {
            self.metadata_chain(cancellation.clone())
        } else {
            self.data_chain(cancellation.clone())
        };
        self.execute_with_chain(request, &mut chain).await
    }

    /// Runs a request against a caller-built chain.
    ///
    /// The chain must be fresh: its counters are the operation's retry budget.
    pub async fn execute_with_chain(
        &self,
        request: OperationRequest,
        chain: &mut RetryPolicyChain,
    ) -> Result<AttemptResponse> {
        let span = info_span!(
            "rangefeed.operation",
            activity_id = %request.activity_id,
            operation = ?request.operation_type,
            resource = ?request.resource_type,
            container = %request.container_id
        );
        self.attempt_loop(request, chain).instrument(span).await
    }

    async fn attempt_loop(
        &self,
        mut request: OperationRequest,
        chain: &mut RetryPolicyChain,
    ) -> Result<AttemptResponse> {
        let mut diagnostics = RequestDiagnostics::new(request.activity_id);
        loop {
            chain.on_before_send(&mut request).await?;
            self.session.apply_session_token(&mut request).await?;

            let outcome = self
                .transport
                .send(request.routing.endpoint.as_ref(), &request)
                .await;

            let failure = match outcome {
                Ok(response) => {
                    self.session
                        .capture_session_token(
                            response.status,
                            response.sub_status(),
                            &request,
                            &response.headers,
                        )
                        .await?;
                    if !response.is_failure() {
                        event!(
                            Level::DEBUG,
                            status = response.status.as_u16(),
                            attempts = chain.state().attempts,
                            "operation completed"
                        );
                        return Ok(response);
                    }
                    AttemptFailure::Response(response)
                }
                Err(err) => AttemptFailure::Transport(err),
            };

            let decision = match chain.should_retry(&failure).await {
                Ok(decision) => decision,
                Err(DriverError::Cancelled) => {
                    event!(Level::DEBUG, "operation cancelled");
                    return Err(DriverError::Cancelled);
                }
                Err(err) => return Err(err),
            };

            match decision {
                ShouldRetryResult::NoRetry => {
                    Self::fill_diagnostics(&mut diagnostics, chain.state());
                    return Err(Self::surface(failure, diagnostics));
                }
                ShouldRetryResult::RetryAfter(delay) => {
                    if let Err(err) = sleep_or_cancel(delay, chain.state().cancellation()).await {
                        event!(Level::DEBUG, "operation cancelled during retry delay");
                        return Err(err);
                    }
                }
            }
        }
    }

    fn fill_diagnostics(diagnostics: &mut RequestDiagnostics, state: &RetryState) {
        diagnostics.attempts = state.attempts;
        diagnostics.endpoints_contacted = state
            .endpoints_contacted
            .iter()
            .map(|endpoint| endpoint.to_string())
            .collect();
        diagnostics.retry_delay_total_ms = state.total_retry_delay.as_millis() as u64;
    }

    /// The caller sees the last underlying failure, not a synthesized one.
    fn surface(failure: AttemptFailure, diagnostics: RequestDiagnostics) -> DriverError {
        match failure {
            AttemptFailure::Response(response) => DriverError::RequestFailed {
                status: response.status,
                sub_status: response.sub_status(),
                diagnostics: Box::new(diagnostics),
            },
            AttemptFailure::Transport(err) => DriverError::Transport {
                message: err.message,
                diagnostics: Box::new(diagnostics),
            },
        }
    }
}
