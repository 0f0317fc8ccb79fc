use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{DriverError, Result};

/// Lowest effective partition key.
pub const MIN_EFFECTIVE_KEY: &str = "";
/// Upper bound of the effective key space (exclusive).
pub const MAX_EFFECTIVE_KEY: &str = "FF";

/// Half-open `[min, max)` slice of the effective key space.
///
/// Keys compare ordinally as strings. `min < max` always holds; the
/// deserializer enforces it too, so a persisted range cannot smuggle in an
/// empty or inverted slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr")]
pub struct PartitionRange {
    min: String,
    max: String,
}

#[derive(Deserialize)]
struct RangeRepr {
    min: String,
    max: String,
}

impl TryFrom<RangeRepr> for PartitionRange {
    type Error = DriverError;

    fn try_from(repr: RangeRepr) -> Result<Self> {
        PartitionRange::new(repr.min, repr.max)
    }
}

impl PartitionRange {
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Result<Self> {
        let min = min.into();
        let max = max.into();
        if min >= max {
            return Err(DriverError::InvalidState(format!(
                "range min '{}' must sort before max '{}'",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// The whole key space.
    pub fn full() -> Self {
        Self {
            min: MIN_EFFECTIVE_KEY.to_string(),
            max: MAX_EFFECTIVE_KEY.to_string(),
        }
    }

    pub fn min_inclusive(&self) -> &str {
        &self.min
    }

    pub fn max_exclusive(&self) -> &str {
        &self.max
    }

    pub fn contains_key(&self, effective_key: &str) -> bool {
        self.min.as_str() <= effective_key && effective_key < self.max.as_str()
    }

    pub fn contains_range(&self, other: &PartitionRange) -> bool {
        self.min <= other.min && other.max <= self.max
    }

    pub fn overlaps(&self, other: &PartitionRange) -> bool {
        self.min < other.max && other.min < self.max
    }

    /// Overlapping part of two ranges, if any.
    pub fn intersect(&self, other: &PartitionRange) -> Option<PartitionRange> {
        if !self.overlaps(other) {
            return None;
        }
        let min = std::cmp::max(&self.min, &other.min).clone();
        let max = std::cmp::min(&self.max, &other.max).clone();
        Some(Self { min, max })
    }

    /// Checks that `parts` tile this range with no gap or overlap, in any order.
    pub fn is_exactly_covered_by<'a, I>(&self, parts: I) -> bool
    where
        I: IntoIterator<Item = &'a PartitionRange>,
    {
        let mut sorted: Vec<&PartitionRange> = parts.into_iter().collect();
        if sorted.is_empty() {
            return false;
        }
        sorted.sort();
        let mut cursor = self.min.as_str();
        for part in sorted {
            if part.min != cursor {
                return false;
            }
            cursor = part.max.as_str();
        }
        cursor == self.max
    }
}

impl Ord for PartitionRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.min
            .cmp(&other.min)
            .then_with(|| self.max.cmp(&other.max))
    }
}

impl PartialOrd for PartitionRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.min, self.max)
    }
}

/// A server-side partition: its id, key range, and the ranges it was split from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyRange {
    pub id: String,
    pub range: PartitionRange,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    pub fn new(id: impl Into<String>, range: PartitionRange) -> Self {
        Self {
            id: id.into(),
            range,
            parents: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: &str, max: &str) -> PartitionRange {
        PartitionRange::new(min, max).unwrap()
    }

    #[test]
    fn test_rejects_empty_range() {
        assert!(PartitionRange::new("40", "40").is_err());
        assert!(PartitionRange::new("80", "40").is_err());
    }

    #[test]
    fn test_half_open_membership() {
        let r = range("00", "80");
        assert!(r.contains_key("00"));
        assert!(r.contains_key("7F"));
        assert!(!r.contains_key("80"));
        assert!(PartitionRange::full().contains_key(""));
    }

    #[test]
    fn test_intersect_and_overlap() {
        let left = range("00", "80");
        let right = range("40", "C0");
        assert_eq!(left.intersect(&right), Some(range("40", "80")));
        assert!(!left.overlaps(&range("80", "FF")));
        assert_eq!(left.intersect(&range("80", "FF")), None);
    }

    #[test]
    fn test_exact_cover() {
        let parent = range("00", "80");
        let a = range("00", "40");
        let b = range("40", "80");
        assert!(parent.is_exactly_covered_by([&b, &a]));
        assert!(!parent.is_exactly_covered_by([&a]));
        assert!(!parent.is_exactly_covered_by([&a, &range("30", "80")]));
    }

    #[test]
    fn test_bounds_alongside_ordering() {
        let mut ranges = vec![range("80", "FF"), range("", "40"), range("40", "80")];
        ranges.sort();
        let bounds: Vec<(&str, &str)> = ranges
            .iter()
            .map(|r| (r.min_inclusive(), r.max_exclusive()))
            .collect();
        assert_eq!(bounds, vec![("", "40"), ("40", "80"), ("80", "FF")]);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: PartitionRange = serde_json::from_str(r#"{"min":"","max":"FF"}"#).unwrap();
        assert_eq!(ok, PartitionRange::full());
        let bad = serde_json::from_str::<PartitionRange>(r#"{"min":"FF","max":"00"}"#);
        assert!(bad.is_err());
    }
}
