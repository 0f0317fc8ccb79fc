pub mod cancellation;
pub mod error;
pub mod types;

pub use cancellation::{CancellationSignal, sleep_or_cancel};
pub use error::{DriverError, ErrorCategory, RequestDiagnostics, Result};
pub use types::{
    ConsistencyLevel, OperationType, ResourceType, SubStatusCode, headers, is_split_signal,
};
