pub mod in_memory;
pub mod range;
pub mod topology;

pub use in_memory::{InMemoryLocationCache, InMemoryPartitionTopology};
pub use range::{MAX_EFFECTIVE_KEY, MIN_EFFECTIVE_KEY, PartitionKeyRange, PartitionRange};
pub use topology::{Endpoint, EndpointUsage, LocationTopology, PartitionTopologyProvider};
