// ============================================================================
// rangefeed: continuation, retry and session layer of a partitioned
// document database client
// ============================================================================
//
// The request executor asks the continuation for the next range and cursor,
// lets the session resolver stamp the request, sends one attempt, and on
// failure asks a per-operation retry chain what to do next.

pub mod config;
pub mod continuation;
pub mod core;
pub mod executor;
pub mod request;
pub mod retry;
pub mod routing;
pub mod session;

pub use config::{DriverConfig, RetryOptions};
pub use continuation::{ContinuationEntry, FeedContinuation};
pub use core::{
    CancellationSignal, ConsistencyLevel, DriverError, ErrorCategory, OperationType,
    RequestDiagnostics, ResourceType, Result, SubStatusCode, headers,
};
pub use executor::{AttemptTransport, FeedPage, OperationExecutor};
pub use request::{AttemptFailure, AttemptResponse, OperationRequest, RequestRouting, TransportError};
pub use retry::{
    PolicyVerdict, RetryContext, RetryPolicy, RetryPolicyChain, RetryState, ShouldRetryResult,
};
pub use routing::{
    Endpoint, EndpointUsage, InMemoryLocationCache, InMemoryPartitionTopology, LocationTopology,
    PartitionKeyRange, PartitionRange, PartitionTopologyProvider,
};
pub use session::{SessionResolver, SessionTokenStore, ShardedSessionTokenStore};
