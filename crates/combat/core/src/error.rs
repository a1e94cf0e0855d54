//! Error classification for the combat engine.
//!
//! Failures reaching the session fall into three classes; each class has a
//! fixed recovery strategy:
//! - **Transient**: network or timeout trouble. Logged, surfaced as a
//!   dismissible message, polling stays armed.
//! - **AuthoritativeStop**: the server reports HP depletion. Always wins,
//!   clears intent and enabled skills, ends in `Defeated`.
//! - **Malformed**: payload with an unexpected shape. Logged and dropped.
//!
//! Duplicate deliveries are not errors and have no class.
use serde::{Deserialize, Serialize};

use crate::phase::{PhaseInput, SessionPhase};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum FailureClass {
    Transient,
    AuthoritativeStop,
    Malformed,
}

impl FailureClass {
    /// Returns true if polling should keep running after this failure.
    pub const fn keeps_polling(&self) -> bool {
        matches!(self, Self::Transient | Self::Malformed)
    }
}

/// Failure of a resolution (or start/enter-map) call as seen by the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub class: FailureClass,
    pub message: String,
    /// HP reported by an auto-stop payload.
    pub current_hp: Option<i64>,
}

impl ResolutionFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            message: message.into(),
            current_hp: None,
        }
    }

    pub fn auto_stopped(message: impl Into<String>, current_hp: Option<i64>) -> Self {
        Self {
            class: FailureClass::AuthoritativeStop,
            message: message.into(),
            current_hp,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Malformed,
            message: message.into(),
            current_hp: None,
        }
    }
}

/// Rejected phase transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {input} while {phase}; resume from a map first")]
    Defeated {
        phase: SessionPhase,
        input: PhaseInput,
    },

    #[error("cannot start combat with depleted HP ({hp})")]
    Depleted { hp: i64 },
}

/// Failure to decode a server payload.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown push event `{0}`")]
    UnknownEvent(String),

    #[error("malformed `{event}` payload: {source}")]
    Payload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
