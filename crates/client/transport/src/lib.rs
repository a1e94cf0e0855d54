//! Network transports for the combat runtime.
//!
//! [`HttpCombatApi`] implements the request/response seam against the game
//! API; [`PusherTransport`] implements the push seam over the broadcaster's
//! WebSocket. Both report failures as [`combat_runtime::TransportError`] so
//! the session classifies them the same way regardless of origin.
pub mod config;
pub mod http;
pub mod protocol;
pub mod push;

pub use config::TransportConfig;
pub use http::HttpCombatApi;
pub use push::PusherTransport;
