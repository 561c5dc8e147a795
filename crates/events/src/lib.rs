//! `forgecrm-events` — event abstractions shared by domain and infrastructure.
//!
//! Events are the system of record here: every business change is an immutable,
//! actor-attributed event, and the audit trail is derived from them rather than
//! logged next to them.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
