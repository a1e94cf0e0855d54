//! Runtime orchestration for an auto-combat session.
//!
//! This crate wires the synchronous engine from `combat-core` to the outside
//! world: a session worker owns the state, a polling driver and a push adapter
//! feed it round records, and [`SessionHandle`] is the controller clients use.
//! Consumers embed [`CombatRuntime`] and subscribe to events by topic.
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the handle, errors, and transport traits
//! - [`events`] provides topic-based event bus for flexible event routing
//! - `workers` keeps background tasks internal to the crate
pub mod api;
pub mod events;
pub mod runtime;

mod workers;

pub use api::{
    CombatApi, PushFrame, PushSubscription, PushTransport, Result, RuntimeError, SessionHandle,
    TransportError,
};
pub use events::{CombatEvent, ConnectionEvent, Event, EventBus, Topic};
pub use runtime::{CombatRuntime, RuntimeBuilder, RuntimeConfig};
