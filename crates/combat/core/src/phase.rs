//! Explicit session state machine.
//!
//! ```text
//!   Idle ──start/resume──► Starting ──round admitted──► Fighting
//!   Starting | Fighting ──stop──► Stopping ──stop acknowledged──► Idle
//!   Starting | Fighting ──depleted──► Defeated ──resume──► Starting
//! ```
//!
//! `fighting` and the auto-fight intent are derived from the phase and are
//! never stored on their own.
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    /// Not fighting, no intent.
    #[default]
    Idle,
    /// Intent set, waiting for the first admitted round.
    Starting,
    /// Intent set and confirmed by at least one admitted round.
    Fighting,
    /// Intent cleared by the player, server stop not yet acknowledged.
    Stopping,
    /// Auto-stopped on HP depletion. Only `Resume` leaves it.
    Defeated,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum PhaseInput {
    Start,
    Resume,
    Stop,
    StopAcknowledged,
    RoundAdmitted,
    Depleted,
}

impl SessionPhase {
    /// Transition table. Every (phase, input) pair is listed.
    pub fn next(self, input: PhaseInput) -> Result<SessionPhase, TransitionError> {
        use PhaseInput as I;
        use SessionPhase as P;

        let next = match (self, input) {
            (P::Idle, I::Start | I::Resume) => P::Starting,
            (P::Idle, I::Stop | I::StopAcknowledged | I::RoundAdmitted | I::Depleted) => P::Idle,

            (P::Starting, I::Start | I::Resume) => P::Starting,
            (P::Starting, I::Stop) => P::Stopping,
            (P::Starting, I::StopAcknowledged) => P::Starting,
            (P::Starting, I::RoundAdmitted) => P::Fighting,
            (P::Starting, I::Depleted) => P::Defeated,

            (P::Fighting, I::Start | I::Resume | I::StopAcknowledged | I::RoundAdmitted) => {
                P::Fighting
            }
            (P::Fighting, I::Stop) => P::Stopping,
            (P::Fighting, I::Depleted) => P::Defeated,

            (P::Stopping, I::Start | I::Resume) => P::Starting,
            (P::Stopping, I::Stop | I::RoundAdmitted | I::Depleted) => P::Stopping,
            (P::Stopping, I::StopAcknowledged) => P::Idle,

            (P::Defeated, I::Start) => {
                return Err(TransitionError::Defeated {
                    phase: self,
                    input,
                });
            }
            (P::Defeated, I::Resume) => P::Starting,
            (P::Defeated, I::Stop | I::StopAcknowledged | I::RoundAdmitted | I::Depleted) => {
                P::Defeated
            }
        };

        Ok(next)
    }

    /// Confirmed, server-backed fighting.
    pub const fn is_fighting(&self) -> bool {
        matches!(self, Self::Fighting)
    }

    /// Player wants auto-combat to keep running.
    pub const fn has_intent(&self) -> bool {
        matches!(self, Self::Starting | Self::Fighting)
    }

    pub const fn is_defeated(&self) -> bool {
        matches!(self, Self::Defeated)
    }
}
