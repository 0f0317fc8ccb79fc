//! Per-range pagination state for feed operations and its repair across splits.

pub mod entry;
pub mod feed;
mod split;
mod token;

pub use entry::ContinuationEntry;
pub use feed::FeedContinuation;
