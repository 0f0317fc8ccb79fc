use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::types::SubStatusCode;

/// Context accumulated over every attempt of one logical operation.
///
/// Attached to service and transport failures once the retry chain gives up,
/// so callers can see how far the driver went before surfacing the error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDiagnostics {
    pub activity_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub attempts: u32,
    pub endpoints_contacted: Vec<String>,
    pub retry_delay_total_ms: u64,
}

impl RequestDiagnostics {
    pub fn new(activity_id: Uuid) -> Self {
        Self {
            activity_id,
            started_at: Utc::now(),
            attempts: 0,
            endpoints_contacted: Vec::new(),
            retry_delay_total_ms: 0,
        }
    }

    pub fn retry_delay_total(&self) -> Duration {
        Duration::from_millis(self.retry_delay_total_ms)
    }
}

impl fmt::Display for RequestDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "activity {} after {} attempt(s), endpoints [{}], waited {}ms",
            self.activity_id,
            self.attempts,
            self.endpoints_contacted.join(", "),
            self.retry_delay_total_ms
        )
    }
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Malformed continuation token: {0}")]
    MalformedContinuation(String),

    #[error("Continuation is bound to container '{expected}' but the response came from '{actual}'")]
    ContainerMismatch { expected: String, actual: String },

    #[error("No partition ranges overlap {0}")]
    NoOverlappingRanges(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Request failed with status {status} (sub-status {sub_status}): {diagnostics}")]
    RequestFailed {
        status: StatusCode,
        sub_status: SubStatusCode,
        diagnostics: Box<RequestDiagnostics>,
    },

    #[error("Transport failure: {message}: {diagnostics}")]
    Transport {
        message: String,
        diagnostics: Box<RequestDiagnostics>,
    },

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse grouping callers use to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Client-side state is structurally invalid; retrying cannot help.
    Validation,
    /// The service or network failed and the retry budget is spent.
    Service,
    Cancelled,
    Internal,
}

impl DriverError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedContinuation(_)
            | Self::ContainerMismatch { .. }
            | Self::NoOverlappingRanges(_)
            | Self::InvalidState(_)
            | Self::Configuration(_) => ErrorCategory::Validation,
            Self::RequestFailed { .. } | Self::Transport { .. } | Self::Topology(_) => {
                ErrorCategory::Service
            }
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::LockError(_) | Self::Serialization(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for a surfaced service failure that means the targeted range split.
    pub fn is_split_signal(&self) -> bool {
        match self {
            Self::RequestFailed {
                status, sub_status, ..
            } => super::types::is_split_signal(*status, *sub_status),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn diagnostics(&self) -> Option<&RequestDiagnostics> {
        match self {
            Self::RequestFailed { diagnostics, .. } | Self::Transport { diagnostics, .. } => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

impl<T> From<std::sync::PoisonError<T>> for DriverError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
