//! Per-operation retry decisions, composed as an ordered chain of policies.
//!
//! Each policy recognises one failure category and either decides or forwards
//! to the next one. `ThrottlingPolicy` is always last and never forwards.

pub mod chain;
pub mod endpoint_failover;
pub mod metadata_unavailable;
pub mod partition_gone;
pub mod session_exhaustion;
pub mod state;
pub mod throttling;

pub use chain::{RetryPolicy, RetryPolicyChain};
pub use endpoint_failover::EndpointFailoverPolicy;
pub use metadata_unavailable::MetadataUnavailablePolicy;
pub use partition_gone::PartitionGonePolicy;
pub use session_exhaustion::SessionExhaustionPolicy;
pub use state::{PolicyVerdict, RetryContext, RetryState, ShouldRetryResult};
pub use throttling::ThrottlingPolicy;
