use crate::routing::PartitionRange;

/// Pagination progress within one partition range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationEntry {
    pub range: PartitionRange,
    /// Server cursor; `None` means the range has not been read yet.
    pub token: Option<String>,
    /// The server reported no more data for this range.
    pub exhausted: bool,
}

impl ContinuationEntry {
    pub fn new(range: PartitionRange, token: Option<String>) -> Self {
        Self {
            range,
            token: token.filter(|token| !token.is_empty()),
            exhausted: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.token.is_some()
    }
}
