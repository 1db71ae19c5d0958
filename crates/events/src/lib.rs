//! Event mechanics shared by all domain modules.
//!
//! Aggregates emit typed events ("a member was registered", "a batch entry
//! failed"); this crate defines what an event is, how it travels (envelopes,
//! bus), and the consumer-side contracts (projections, sagas).

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;
pub mod saga;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::CommandHandler;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
pub use saga::{Saga, SagaAction};
pub use tenant::TenantScoped;
