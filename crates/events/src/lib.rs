//! Lifecycle events and their distribution.
//!
//! Domain modules describe what happened as typed [`Event`]s; the
//! infrastructure wraps them in an [`EventEnvelope`] and hands them to an
//! [`EventBus`] for fire-and-forget delivery (webhooks, notifications).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
