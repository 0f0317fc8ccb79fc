use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::{DriverError, Result};

/// One `rangeId:token` pair from a session token header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokenSegment {
    pub range_id: String,
    pub token: String,
}

impl SessionTokenSegment {
    /// The segment as it travels on the wire.
    pub fn to_header_value(&self) -> String {
        format!("{}:{}", self.range_id, self.token)
    }
}

impl FromStr for SessionTokenSegment {
    type Err = DriverError;

    fn from_str(raw: &str) -> Result<Self> {
        let (range_id, token) = raw.trim().split_once(':').ok_or_else(|| {
            DriverError::InvalidState(format!("session token segment '{}' has no range id", raw))
        })?;
        if range_id.is_empty() || token.is_empty() {
            return Err(DriverError::InvalidState(format!(
                "session token segment '{}' is incomplete",
                raw
            )));
        }
        Ok(Self {
            range_id: range_id.to_string(),
            token: token.to_string(),
        })
    }
}

/// Splits a compound header (`r1:t1,r2:t2`), skipping unparsable segments.
pub fn parse_segments(header: &str) -> Vec<SessionTokenSegment> {
    header
        .split(',')
        .filter(|raw| !raw.trim().is_empty())
        .filter_map(|raw| match raw.parse::<SessionTokenSegment>() {
            Ok(segment) => Some(segment),
            Err(err) => {
                log::debug!("ignoring session token segment: {}", err);
                None
            }
        })
        .collect()
}

/// `version#globalLsn(#region=lsn)*` progress vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSessionToken {
    pub version: u64,
    pub global_lsn: u64,
    pub regional_lsns: BTreeMap<u32, u64>,
}

impl VectorSessionToken {
    /// Newer version wins outright; the same version takes the max of every LSN.
    pub fn merge(&self, other: &VectorSessionToken) -> VectorSessionToken {
        if self.version != other.version {
            return if self.version > other.version {
                self.clone()
            } else {
                other.clone()
            };
        }
        let mut regional_lsns = self.regional_lsns.clone();
        for (region, lsn) in &other.regional_lsns {
            let slot = regional_lsns.entry(*region).or_insert(*lsn);
            *slot = (*slot).max(*lsn);
        }
        VectorSessionToken {
            version: self.version,
            global_lsn: self.global_lsn.max(other.global_lsn),
            regional_lsns,
        }
    }
}

impl FromStr for VectorSessionToken {
    type Err = DriverError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || DriverError::InvalidState(format!("invalid vector session token '{}'", raw));
        let mut parts = raw.split('#');
        let version = parts
            .next()
            .and_then(|part| part.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let global_lsn = parts
            .next()
            .and_then(|part| part.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let mut regional_lsns = BTreeMap::new();
        for part in parts {
            let (region, lsn) = part.split_once('=').ok_or_else(invalid)?;
            let region = region.parse::<u32>().map_err(|_| invalid())?;
            let lsn = lsn.parse::<u64>().map_err(|_| invalid())?;
            regional_lsns.insert(region, lsn);
        }
        Ok(Self {
            version,
            global_lsn,
            regional_lsns,
        })
    }
}

impl fmt::Display for VectorSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.version, self.global_lsn)?;
        for (region, lsn) in &self.regional_lsns {
            write!(f, "#{}={}", region, lsn)?;
        }
        Ok(())
    }
}

/// Combines a stored segment with a newly observed one for the same range.
///
/// Falls back to the incoming segment when either side is not a vector token.
pub fn merge_segments(existing: &str, incoming: &str) -> String {
    let (Ok(old), Ok(new)) = (
        existing.parse::<SessionTokenSegment>(),
        incoming.parse::<SessionTokenSegment>(),
    ) else {
        return incoming.to_string();
    };
    match (
        old.token.parse::<VectorSessionToken>(),
        new.token.parse::<VectorSessionToken>(),
    ) {
        (Ok(old_vector), Ok(new_vector)) => SessionTokenSegment {
            range_id: new.range_id,
            token: old_vector.merge(&new_vector).to_string(),
        }
        .to_header_value(),
        _ => incoming.to_string(),
    }
}
