pub mod resolution;
pub mod store;
pub mod token;

pub use resolution::SessionResolver;
pub use store::{SessionTokenStore, ShardedSessionTokenStore};
pub use token::{SessionTokenSegment, VectorSessionToken, merge_segments, parse_segments};
