//! Worker tasks that back the runtime orchestration.
//!
//! The session worker owns the combat state and serializes every update. The
//! polling and push workers only perform I/O and feed results back to it.

mod polling;
mod push;
mod session;

pub use polling::PollingWorker;
pub use push::PushWorker;
pub use session::{Command, SessionChannels, SessionWorker};
