//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from worker coordination, rejected phase transitions, and
//! transport calls so clients can bubble them up with consistent context.
use thiserror::Error;
use tokio::sync::oneshot;

use combat_core::{CharacterId, TransitionError};

use super::transport::TransportError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no character selected")]
    NoCharacter,

    #[error("character {expected} is no longer selected (now {current:?})")]
    CharacterChanged {
        expected: CharacterId,
        current: Option<CharacterId>,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("runtime requires a combat API before building")]
    MissingApi,

    #[error("session worker command channel closed")]
    CommandChannelClosed,

    #[error("session worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),
}
