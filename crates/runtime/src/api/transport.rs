//! Transport abstraction traits.
//!
//! The runtime never talks HTTP or WebSocket itself. It drives two seams:
//! - [`CombatApi`]: request/response calls to the combat backend
//! - [`PushTransport`]: per-character subscriptions to server-pushed events
//!
//! Concrete implementations live in `client-transport`; tests script them.
use async_trait::async_trait;
use tokio::sync::mpsc;

use combat_core::{
    CharacterId, CharacterSnapshot, FailureClass, MapId, ResolutionFailure, RoundResolution,
    SkillDefinition, SkillId,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("server rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        /// Server reported that auto-combat stopped (HP depleted).
        auto_stopped: bool,
        current_hp: Option<i64>,
    },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("push connection closed")]
    Closed,
}

impl TransportError {
    /// Maps the failure onto the session's recovery strategy.
    pub fn classify(&self) -> FailureClass {
        match self {
            TransportError::Rejected {
                auto_stopped: true, ..
            } => FailureClass::AuthoritativeStop,
            TransportError::Decode(_) => FailureClass::Malformed,
            TransportError::Network(_)
            | TransportError::Timeout
            | TransportError::Rejected { .. }
            | TransportError::Closed => FailureClass::Transient,
        }
    }

    pub fn to_failure(&self) -> ResolutionFailure {
        match self {
            TransportError::Rejected {
                auto_stopped: true,
                message,
                current_hp,
                ..
            } => ResolutionFailure::auto_stopped(message.clone(), *current_hp),
            TransportError::Decode(message) => ResolutionFailure::malformed(message.clone()),
            other => ResolutionFailure::transient(other.to_string()),
        }
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// Combat backend calls used by the session.
#[async_trait]
pub trait CombatApi: Send + Sync {
    /// Tells the server that auto-combat begins with the given skills.
    async fn start_combat(
        &self,
        character: CharacterId,
        skills: &[SkillId],
    ) -> Result<(), TransportError>;

    /// Resolves one round. The response may duplicate a pushed record.
    async fn resolve_round(
        &self,
        character: CharacterId,
        skills: &[SkillId],
    ) -> Result<RoundResolution, TransportError>;

    async fn stop_combat(&self, character: CharacterId) -> Result<(), TransportError>;

    /// Syncs the enabled skill set mid-fight. `skill` is the toggled one.
    async fn update_skills(
        &self,
        character: CharacterId,
        skill: SkillId,
        skills: &[SkillId],
    ) -> Result<(), TransportError>;

    /// Enters a map; the server restores HP and auto-starts combat.
    async fn enter_map(
        &self,
        character: CharacterId,
        map: MapId,
    ) -> Result<Option<CharacterSnapshot>, TransportError>;

    async fn fetch_character(
        &self,
        character: CharacterId,
    ) -> Result<Option<CharacterSnapshot>, TransportError>;

    async fn fetch_skills(
        &self,
        character: CharacterId,
    ) -> Result<Vec<SkillDefinition>, TransportError>;
}

// ============================================================================
// Push
// ============================================================================

/// Raw event received on a character's channel. Decoding happens in the
/// runtime so every transport normalizes identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFrame {
    /// Character whose channel delivered the frame.
    pub character: CharacterId,
    pub event: String,
    pub data: String,
}

/// Live subscription. The stream ends when the connection drops.
#[derive(Debug)]
pub struct PushSubscription {
    pub character: CharacterId,
    pub frames: mpsc::Receiver<PushFrame>,
}

impl PushSubscription {
    pub fn new(character: CharacterId, frames: mpsc::Receiver<PushFrame>) -> Self {
        Self { character, frames }
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn subscribe(&self, character: CharacterId) -> Result<PushSubscription, TransportError>;

    /// Tears the subscription down; frames still buffered are discarded.
    async fn unsubscribe(&self, subscription: PushSubscription) -> Result<(), TransportError>;
}
