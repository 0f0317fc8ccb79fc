use std::collections::VecDeque;

use tracing::{Level, event};

use super::entry::ContinuationEntry;
use crate::core::{DriverError, Result};
use crate::routing::{PartitionKeyRange, PartitionRange, PartitionTopologyProvider};

/// Per-range pagination cursor for one feed operation.
///
/// Entries form a round-robin queue; the front entry is the one the next
/// request targets. Exhausted entries stay in the queue so the entries
/// always tile `complete_range`, but rotation skips them.
///
/// Change feed polling uses a not-modified marker: the range that answered
/// "no new data" first in the current cycle. When rotation comes back to it
/// without any data in between, the cycle is drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedContinuation {
    pub(crate) container_id: String,
    pub(crate) complete_range: PartitionRange,
    pub(crate) entries: VecDeque<ContinuationEntry>,
    pub(crate) not_modified_marker: Option<PartitionRange>,
    pub(crate) drained: bool,
}

impl FeedContinuation {
    /// Builds a fresh continuation over `ranges`, none of them started.
    pub fn new(
        container_id: impl Into<String>,
        complete_range: PartitionRange,
        ranges: Vec<PartitionRange>,
    ) -> Result<Self> {
        let entries = ranges
            .into_iter()
            .map(|range| ContinuationEntry::new(range, None))
            .collect();
        Self::from_parts(container_id.into(), complete_range, entries, None, false)
    }

    /// Starts a feed over `complete_range` using the current partition map.
    pub async fn start(
        container_id: impl Into<String>,
        complete_range: PartitionRange,
        topology: &dyn PartitionTopologyProvider,
    ) -> Result<Self> {
        let container_id = container_id.into();
        let overlapping = topology
            .resolve_overlapping_ranges(&container_id, &complete_range, false)
            .await?;
        let ranges = Self::clip_to(&complete_range, &overlapping);
        if ranges.is_empty() {
            return Err(DriverError::NoOverlappingRanges(complete_range.to_string()));
        }
        Self::new(container_id, complete_range, ranges)
    }

    pub(crate) fn from_parts(
        container_id: String,
        complete_range: PartitionRange,
        entries: VecDeque<ContinuationEntry>,
        not_modified_marker: Option<PartitionRange>,
        drained: bool,
    ) -> Result<Self> {
        if container_id.trim().is_empty() {
            return Err(DriverError::InvalidState(
                "continuation container_id must not be empty".to_string(),
            ));
        }
        if entries.is_empty() {
            return Err(DriverError::InvalidState(
                "continuation must hold at least one range".to_string(),
            ));
        }
        if !complete_range.is_exactly_covered_by(entries.iter().map(|entry| &entry.range)) {
            return Err(DriverError::InvalidState(format!(
                "continuation ranges do not exactly cover {}",
                complete_range
            )));
        }
        if let Some(marker) = not_modified_marker.as_ref() {
            if !entries.iter().any(|entry| &entry.range == marker) {
                return Err(DriverError::InvalidState(format!(
                    "not-modified marker {} is not one of the continuation ranges",
                    marker
                )));
            }
        }
        Ok(Self {
            container_id,
            complete_range,
            entries,
            not_modified_marker,
            drained,
        })
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn complete_range(&self) -> &PartitionRange {
        &self.complete_range
    }

    /// Entries in queue order, current first.
    pub fn entries(&self) -> impl Iterator<Item = &ContinuationEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry the next request should target.
    pub fn current(&self) -> Result<&ContinuationEntry> {
        self.entries.front().ok_or_else(|| {
            DriverError::InvalidState("continuation has no ranges".to_string())
        })
    }

    /// Records a data-bearing response for the current entry and rotates.
    ///
    /// A missing or empty token means the range is exhausted.
    pub fn advance(&mut self, new_token: Option<String>) -> Result<()> {
        let entry = self.current_mut()?;
        let token = new_token.filter(|token| !token.is_empty());
        entry.exhausted = token.is_none();
        entry.token = token;
        self.reset_cycle();
        self.rotate();
        Ok(())
    }

    /// Records a change-feed page for the current entry and rotates.
    ///
    /// Change-feed ranges never run dry; a page without a cursor keeps the previous one.
    pub fn advance_change_feed(&mut self, new_token: Option<String>) -> Result<()> {
        let entry = self.current_mut()?;
        if let Some(token) = new_token.filter(|token| !token.is_empty()) {
            entry.token = Some(token);
        }
        entry.exhausted = false;
        self.reset_cycle();
        self.rotate();
        Ok(())
    }

    /// Records a "no new data" (not modified) response for the current entry.
    ///
    /// The server may still hand back a fresher cursor; it replaces the old one.
    pub fn advance_without_changes(&mut self, new_token: Option<String>) -> Result<()> {
        let entry = self.current_mut()?;
        if let Some(token) = new_token.filter(|token| !token.is_empty()) {
            entry.token = Some(token);
        }
        let current_range = entry.range.clone();

        if self.live_entries() <= 1 {
            self.drained = true;
            return Ok(());
        }

        if self.not_modified_marker.is_none() {
            self.not_modified_marker = Some(current_range);
        }
        self.rotate();

        let back_at_marker = match (self.not_modified_marker.as_ref(), self.entries.front()) {
            (Some(marker), Some(front)) => marker == &front.range,
            _ => false,
        };
        if back_at_marker {
            event!(
                Level::DEBUG,
                container = %self.container_id,
                ranges = self.entries.len(),
                "feed cycle drained"
            );
            self.drained = true;
        }
        Ok(())
    }

    /// Clears loop detection so a new poll cycle can run.
    pub fn start_poll_cycle(&mut self) {
        self.reset_cycle();
    }

    /// Every range is exhausted, or the current poll cycle saw no new data anywhere.
    pub fn is_done(&self) -> bool {
        self.drained || self.entries.iter().all(|entry| entry.exhausted)
    }

    /// Fails when a response claims to come from a different container.
    pub fn check_container(&self, reported_container_id: &str) -> Result<()> {
        if reported_container_id != self.container_id {
            return Err(DriverError::ContainerMismatch {
                expected: self.container_id.clone(),
                actual: reported_container_id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn current_mut(&mut self) -> Result<&mut ContinuationEntry> {
        self.entries.front_mut().ok_or_else(|| {
            DriverError::InvalidState("continuation has no ranges".to_string())
        })
    }

    pub(crate) fn reset_cycle(&mut self) {
        self.not_modified_marker = None;
        self.drained = false;
    }

    pub(crate) fn clip_to(
        bounds: &PartitionRange,
        ranges: &[PartitionKeyRange],
    ) -> Vec<PartitionRange> {
        ranges
            .iter()
            .filter_map(|candidate| candidate.range.intersect(bounds))
            .collect()
    }

    fn live_entries(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.exhausted).count()
    }

    /// Moves the front entry to the back, then skips exhausted entries.
    fn rotate(&mut self) {
        let len = self.entries.len();
        if len <= 1 {
            return;
        }
        self.entries.rotate_left(1);
        for _ in 1..len {
            match self.entries.front() {
                Some(front) if front.exhausted => self.entries.rotate_left(1),
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: &str, max: &str) -> PartitionRange {
        PartitionRange::new(min, max).unwrap()
    }

    fn three_way() -> FeedContinuation {
        FeedContinuation::new(
            "orders",
            range("", "FF"),
            vec![range("", "55"), range("55", "AA"), range("AA", "FF")],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_gaps() {
        let result = FeedContinuation::new(
            "orders",
            range("", "FF"),
            vec![range("", "40"), range("50", "FF")],
        );
        assert!(matches!(result, Err(DriverError::InvalidState(_))));
    }

    #[test]
    fn test_advance_rotates_round_robin() {
        let mut feed = three_way();
        feed.advance(Some("a1".into())).unwrap();
        assert_eq!(feed.current().unwrap().range, range("55", "AA"));
        feed.advance(Some("b1".into())).unwrap();
        feed.advance(Some("c1".into())).unwrap();
        let current = feed.current().unwrap();
        assert_eq!(current.range, range("", "55"));
        assert_eq!(current.token.as_deref(), Some("a1"));
    }

    #[test]
    fn test_exhausted_ranges_are_skipped() {
        let mut feed = three_way();
        feed.advance(None).unwrap();
        feed.advance(Some("b1".into())).unwrap();
        feed.advance(Some("c1".into())).unwrap();
        assert_eq!(feed.current().unwrap().range, range("55", "AA"));
        assert!(!feed.is_done());
        feed.advance(None).unwrap();
        feed.advance(None).unwrap();
        assert!(feed.is_done());
        assert_eq!(feed.len(), 3);
    }

    #[test]
    fn test_not_modified_cycle_needs_full_rotation() {
        let mut feed = three_way();
        feed.advance_without_changes(Some("e1".into())).unwrap();
        assert!(!feed.is_done());
        feed.advance_without_changes(Some("e2".into())).unwrap();
        assert!(!feed.is_done());
        feed.advance_without_changes(Some("e3".into())).unwrap();
        assert!(feed.is_done());

        feed.start_poll_cycle();
        assert!(!feed.is_done());
    }

    #[test]
    fn test_data_resets_not_modified_marker() {
        let mut feed = three_way();
        feed.advance_without_changes(None).unwrap();
        feed.advance(Some("b2".into())).unwrap();
        feed.advance_without_changes(None).unwrap();
        // Marker restarted at the third range, so returning to the first is not a full cycle.
        assert!(!feed.is_done());
        feed.advance_without_changes(None).unwrap();
        feed.advance_without_changes(None).unwrap();
        assert!(feed.is_done());
    }

    #[test]
    fn test_single_range_drains_immediately() {
        let mut feed =
            FeedContinuation::new("orders", range("", "FF"), vec![range("", "FF")]).unwrap();
        feed.advance_without_changes(Some("etag-1".into())).unwrap();
        assert!(feed.is_done());
        assert_eq!(feed.current().unwrap().token.as_deref(), Some("etag-1"));
        feed.advance(Some("etag-2".into())).unwrap();
        assert!(!feed.is_done());
    }

    #[test]
    fn test_change_feed_page_without_etag_keeps_range_live() {
        let mut feed =
            FeedContinuation::new("orders", range("", "FF"), vec![range("", "FF")]).unwrap();
        feed.advance_change_feed(None).unwrap();
        assert!(!feed.is_done());
        assert!(!feed.current().unwrap().exhausted);

        feed.advance_change_feed(Some("etag-1".into())).unwrap();
        feed.advance_change_feed(None).unwrap();
        assert_eq!(feed.current().unwrap().token.as_deref(), Some("etag-1"));

        feed.start_poll_cycle();
        assert!(!feed.is_done());
    }

    #[test]
    fn test_container_check() {
        let feed = three_way();
        assert!(feed.check_container("orders").is_ok());
        let err = feed.check_container("invoices").unwrap_err();
        assert!(err.is_validation());
    }
}
