//! Event types for different topics.
use serde::{Deserialize, Serialize};

use combat_core::{CharacterId, FailureClass, PhaseChange, RoundId, RoundSource};

/// Session-level changes (admissions, phase moves, failures)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// A round passed the deduplicator and was applied.
    RoundAdmitted {
        character: CharacterId,
        round_id: Option<RoundId>,
        source: RoundSource,
    },

    PhaseChanged {
        character: CharacterId,
        change: PhaseChange,
    },

    /// A potion was consumed; the inventory view is stale.
    InventoryRefreshRequested { character: CharacterId },

    /// A call failed; `class` tells how the session recovered.
    FailureReported {
        character: CharacterId,
        class: FailureClass,
        message: String,
    },
}

/// Push subscription lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    Subscribed { character: CharacterId },
    Unsubscribed { character: CharacterId },
    Disconnected { character: CharacterId },
    SubscribeFailed { character: CharacterId, error: String },
}

impl ConnectionEvent {
    pub fn character(&self) -> CharacterId {
        match self {
            ConnectionEvent::Subscribed { character }
            | ConnectionEvent::Unsubscribed { character }
            | ConnectionEvent::Disconnected { character }
            | ConnectionEvent::SubscribeFailed { character, .. } => *character,
        }
    }
}
