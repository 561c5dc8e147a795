//! Infrastructure layer: event persistence, command dispatch, read models.

pub mod command_dispatcher;
pub mod event_store;
pub mod lead_numbers;
pub mod projections;
pub mod read_model;
pub mod sync_writer;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use lead_numbers::{InMemoryLeadNumberAllocator, LeadNumberAllocator};
pub use read_model::{InMemoryStore, Store};
