//! Append-only event persistence.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[allow(clippy::module_inception)]
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
