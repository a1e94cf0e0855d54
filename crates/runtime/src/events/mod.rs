//! Topic-based event bus for runtime events.
//!
//! Events are published to specific topics, and consumers subscribe only to
//! the topics they need. State itself is observed through the snapshot watch
//! on [`crate::SessionHandle`]; the bus carries transitions.

mod bus;
mod types;

pub use bus::{Event, EventBus, Topic};
pub use types::{CombatEvent, ConnectionEvent};
