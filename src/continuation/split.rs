use http::StatusCode;
use tracing::{Level, event};

use super::entry::ContinuationEntry;
use super::feed::FeedContinuation;
use crate::core::{CancellationSignal, DriverError, Result, SubStatusCode, is_split_signal};
use crate::routing::{PartitionRange, PartitionTopologyProvider};

impl FeedContinuation {
    /// Replaces the current entry with the ranges it was split into.
    ///
    /// Every child inherits the current token. The first child takes the
    /// current slot, the rest go to the back of the queue in the given order.
    /// A single child means a merge or an unchanged map, and the entry is kept.
    pub fn handle_split(&mut self, child_ranges: Vec<PartitionRange>) -> Result<()> {
        let current = self.current()?.clone();
        let children: Vec<PartitionRange> = child_ranges
            .iter()
            .filter_map(|child| child.intersect(&current.range))
            .collect();

        if children.len() <= 1 {
            event!(
                Level::DEBUG,
                container = %self.container_id,
                range = %current.range,
                "split repair found a single overlapping range; keeping entry"
            );
            self.reset_cycle();
            return Ok(());
        }

        if !current.range.is_exactly_covered_by(children.iter()) {
            return Err(DriverError::InvalidState(format!(
                "child ranges do not exactly cover split range {}",
                current.range
            )));
        }

        let mut children = children.into_iter();
        if let Some(first) = children.next() {
            let slot = self.current_mut()?;
            slot.range = first;
            slot.exhausted = false;
        }
        for child in children {
            self.entries
                .push_back(ContinuationEntry::new(child, current.token.clone()));
        }
        // Entries changed under the cycle, so a drained verdict would not be trustworthy.
        self.reset_cycle();

        event!(
            Level::DEBUG,
            container = %self.container_id,
            range = %current.range,
            entries = self.entries.len(),
            "continuation split repaired"
        );
        Ok(())
    }

    /// Repairs the continuation when a failure means the current range split.
    ///
    /// Returns `false` for any other failure. Asks the topology provider for
    /// the current range's children with a forced refresh; zero children means
    /// the continuation does not belong to this container's key space.
    pub async fn should_retry_on_split(
        &mut self,
        topology: &dyn PartitionTopologyProvider,
        status: StatusCode,
        sub_status: SubStatusCode,
        cancellation: &CancellationSignal,
    ) -> Result<bool> {
        if !is_split_signal(status, sub_status) {
            return Ok(false);
        }
        cancellation.check()?;
        let stale = self.current()?.range.clone();
        let overlapping = topology
            .resolve_overlapping_ranges(&self.container_id, &stale, true)
            .await?;
        cancellation.check()?;
        if overlapping.is_empty() {
            return Err(DriverError::NoOverlappingRanges(format!(
                "{} in container '{}'",
                stale, self.container_id
            )));
        }
        let children = FeedContinuation::clip_to(&stale, &overlapping);
        self.handle_split(children)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: &str, max: &str) -> PartitionRange {
        PartitionRange::new(min, max).unwrap()
    }

    #[test]
    fn test_children_inherit_token() {
        let mut feed =
            FeedContinuation::new("orders", range("00", "80"), vec![range("00", "80")]).unwrap();
        feed.advance(Some("ct1".into())).unwrap();
        feed.handle_split(vec![range("00", "40"), range("40", "80")])
            .unwrap();

        let entries: Vec<_> = feed.entries().cloned().collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.token.as_deref() == Some("ct1")));
        assert_eq!(feed.current().unwrap().range, range("00", "40"));
        assert!(range("00", "80").is_exactly_covered_by(entries.iter().map(|e| &e.range)));
    }

    #[test]
    fn test_remaining_children_go_to_back() {
        let mut feed = FeedContinuation::new(
            "orders",
            range("", "FF"),
            vec![range("", "80"), range("80", "FF")],
        )
        .unwrap();
        feed.handle_split(vec![range("", "20"), range("20", "50"), range("50", "80")])
            .unwrap();
        let order: Vec<_> = feed.entries().map(|e| e.range.clone()).collect();
        assert_eq!(
            order,
            vec![
                range("", "20"),
                range("80", "FF"),
                range("20", "50"),
                range("50", "80")
            ]
        );
    }

    #[test]
    fn test_wider_children_are_clipped() {
        let mut feed = FeedContinuation::new(
            "orders",
            range("", "FF"),
            vec![range("", "80"), range("80", "FF")],
        )
        .unwrap();
        // A merged parent wider than the entry leaves it untouched.
        feed.handle_split(vec![range("", "FF")]).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.current().unwrap().range, range("", "80"));
    }

    #[test]
    fn test_gap_in_children_is_rejected() {
        let mut feed =
            FeedContinuation::new("orders", range("00", "80"), vec![range("00", "80")]).unwrap();
        let result = feed.handle_split(vec![range("00", "30"), range("40", "80")]);
        assert!(matches!(result, Err(DriverError::InvalidState(_))));
        assert_eq!(feed.len(), 1);
    }
}
