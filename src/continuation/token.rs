use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::entry::ContinuationEntry;
use super::feed::FeedContinuation;
use crate::core::{DriverError, Result};
use crate::routing::PartitionRange;

const TOKEN_VERSION: u32 = 1;

/// Persisted form of a `FeedContinuation`.
#[derive(Debug, Serialize, Deserialize)]
struct FeedTokenWire {
    #[serde(rename = "V")]
    version: u32,
    #[serde(rename = "Rid")]
    container_id: String,
    #[serde(rename = "Continuation")]
    entries: Vec<EntryWire>,
    #[serde(rename = "Range")]
    complete_range: PartitionRange,
    #[serde(rename = "Marker", default, skip_serializing_if = "Option::is_none")]
    marker: Option<PartitionRange>,
    #[serde(rename = "Drained", default, skip_serializing_if = "is_false")]
    drained: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryWire {
    token: Option<String>,
    range: PartitionRange,
    #[serde(default, skip_serializing_if = "is_false")]
    done: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FeedContinuation {
    /// Opaque token capturing the whole entry queue, safe to hand to callers.
    pub fn serialize(&self) -> Result<String> {
        let wire = FeedTokenWire {
            version: TOKEN_VERSION,
            container_id: self.container_id.clone(),
            entries: self
                .entries
                .iter()
                .map(|entry| EntryWire {
                    token: entry.token.clone(),
                    range: entry.range.clone(),
                    done: entry.exhausted,
                })
                .collect(),
            complete_range: self.complete_range.clone(),
            marker: self.not_modified_marker.clone(),
            drained: self.drained,
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Parses a token produced by `serialize`.
    ///
    /// Anything structurally off is `MalformedContinuation`; nothing is
    /// silently reset.
    pub fn deserialize(token: &str) -> Result<Self> {
        let wire: FeedTokenWire = serde_json::from_str(token)
            .map_err(|err| DriverError::MalformedContinuation(err.to_string()))?;
        if wire.version != TOKEN_VERSION {
            return Err(DriverError::MalformedContinuation(format!(
                "unsupported token version {}",
                wire.version
            )));
        }
        let entries: VecDeque<ContinuationEntry> = wire
            .entries
            .into_iter()
            .map(|entry| ContinuationEntry {
                range: entry.range,
                token: entry.token.filter(|token| !token.is_empty()),
                exhausted: entry.done,
            })
            .collect();
        FeedContinuation::from_parts(
            wire.container_id,
            wire.complete_range,
            entries,
            wire.marker,
            wire.drained,
        )
        .map_err(|err| match err {
            DriverError::InvalidState(message) => DriverError::MalformedContinuation(message),
            other => other,
        })
    }

    /// Parses a token and checks it belongs to `container_id`.
    pub fn from_token_for_container(token: &str, container_id: &str) -> Result<Self> {
        let continuation = Self::deserialize(token)?;
        continuation.check_container(container_id)?;
        Ok(continuation)
    }

    /// Wraps a bare server cursor for a range known out of band.
    pub fn from_legacy_token(
        container_id: impl Into<String>,
        complete_range: PartitionRange,
        server_token: &str,
    ) -> Result<Self> {
        let entry = ContinuationEntry::new(complete_range.clone(), Some(server_token.to_string()));
        Self::from_parts(
            container_id.into(),
            complete_range,
            VecDeque::from([entry]),
            None,
            false,
        )
    }

    /// Accepts either a structured token or, when the range is known, a bare server cursor.
    pub fn parse_or_legacy(
        token: &str,
        container_id: &str,
        complete_range: Option<PartitionRange>,
    ) -> Result<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(DriverError::MalformedContinuation(
                "continuation token is empty".to_string(),
            ));
        }
        if trimmed.starts_with('{') {
            return Self::from_token_for_container(trimmed, container_id);
        }
        match complete_range {
            Some(range) => Self::from_legacy_token(container_id, range, trimmed),
            None => Err(DriverError::MalformedContinuation(
                "bare continuation token needs a known range".to_string(),
            )),
        }
    }
}
