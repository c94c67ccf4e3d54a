//! Post event consumption for the fanout writer

pub mod memory;
pub mod offsets;
pub mod post_events;

pub use memory::{InMemoryPostEventSource, InMemoryPostEvents};
pub use offsets::{CommitOffset, MessagePosition, OffsetTracker};
pub use post_events::{KafkaPostEventSource, PostEventMessage, PostEventSource};
