use std::fmt;
use std::str::FromStr;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::{DriverError, Result};

/// Secondary status code the service sends alongside the HTTP status.
///
/// The same numeric value means different things under different statuses,
/// so several constants share a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SubStatusCode(pub u32);

impl SubStatusCode {
    pub const UNKNOWN: Self = Self(0);

    // 403
    pub const WRITE_FORBIDDEN: Self = Self(3);
    pub const DATABASE_ACCOUNT_NOT_FOUND: Self = Self(1008);

    // 404
    pub const READ_SESSION_NOT_AVAILABLE: Self = Self(1002);

    // 410
    pub const NAME_CACHE_IS_STALE: Self = Self(1000);
    pub const PARTITION_KEY_RANGE_GONE: Self = Self(1002);
    pub const COMPLETING_SPLIT: Self = Self(1007);
    pub const COMPLETING_PARTITION_MIGRATION: Self = Self(1008);
    pub const LEASE_NOT_FOUND: Self = Self(1022);

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubStatusCode {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| DriverError::InvalidState(format!("invalid sub-status '{}'", s)))
    }
}

/// Gone with a sub-status that means the range was split or is being split.
pub fn is_split_signal(status: StatusCode, sub_status: SubStatusCode) -> bool {
    status == StatusCode::GONE
        && (sub_status == SubStatusCode::PARTITION_KEY_RANGE_GONE
            || sub_status == SubStatusCode::COMPLETING_SPLIT)
}

/// Header names exchanged with the service.
pub mod headers {
    pub const SESSION_TOKEN: &str = "x-ms-session-token";
    pub const CONTINUATION: &str = "x-ms-continuation";
    pub const SUB_STATUS: &str = "x-ms-substatus";
    pub const RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";
    pub const PARTITION_KEY_RANGE_ID: &str = "x-ms-documentdb-partitionkeyrangeid";
    pub const START_EPK: &str = "x-ms-start-epk";
    pub const END_EPK: &str = "x-ms-end-epk";
    pub const CONSISTENCY_LEVEL: &str = "x-ms-consistency-level";
    pub const CONTAINER_RID: &str = "x-ms-content-path";
    pub const ACTIVITY_ID: &str = "x-ms-activity-id";
    pub const ETAG: &str = "etag";
    pub const IF_NONE_MATCH: &str = "if-none-match";
    pub const A_IM: &str = "a-im";

    pub const INCREMENTAL_FEED: &str = "Incremental feed";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    Session,
    ConsistentPrefix,
    Eventual,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "Strong",
            Self::BoundedStaleness => "BoundedStaleness",
            Self::Session => "Session",
            Self::ConsistentPrefix => "ConsistentPrefix",
            Self::Eventual => "Eventual",
        }
    }
}

impl Default for ConsistencyLevel {
    fn default() -> Self {
        Self::Session
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strong" => Ok(Self::Strong),
            "boundedstaleness" => Ok(Self::BoundedStaleness),
            "session" => Ok(Self::Session),
            "consistentprefix" => Ok(Self::ConsistentPrefix),
            "eventual" => Ok(Self::Eventual),
            other => Err(DriverError::Configuration(format!(
                "unknown consistency level '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Create,
    Read,
    ReadFeed,
    Query,
    Head,
    Replace,
    Upsert,
    Patch,
    Delete,
    Batch,
}

impl OperationType {
    pub fn is_write_operation(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Replace | Self::Upsert | Self::Patch | Self::Delete | Self::Batch
        )
    }

    pub fn is_read_only(&self) -> bool {
        !self.is_write_operation()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    DatabaseAccount,
    Database,
    Container,
    PartitionKeyRange,
    Offer,
    User,
    Permission,
    Document,
    StoredProcedure,
    Trigger,
    UserDefinedFunction,
    Conflict,
}

impl ResourceType {
    /// Master resources live outside any partition and never carry session tokens.
    pub fn is_master_resource(&self) -> bool {
        matches!(
            self,
            Self::DatabaseAccount
                | Self::Database
                | Self::Container
                | Self::PartitionKeyRange
                | Self::Offer
                | Self::User
                | Self::Permission
        )
    }
}
