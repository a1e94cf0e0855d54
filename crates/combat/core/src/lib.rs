//! Synchronous combat-session engine.
//!
//! `combat-core` owns the rules of an auto-combat session: which round records
//! are admitted, how the session phase moves, what the rolling log and the HP
//! gauges show, and when skills are cooling down. All state mutation flows
//! through [`session::CombatSession`]; the async runtime wraps it in a worker
//! and feeds it records from both delivery channels.
pub mod character;
pub mod config;
pub mod cooldown;
pub mod dedup;
pub mod error;
pub mod notify;
pub mod phase;
pub mod session;
pub mod types;
pub mod wire;

pub use character::{CharacterSnapshot, PotionSettings};
pub use config::EngineConfig;
pub use cooldown::{CooldownTracker, CooldownView};
pub use dedup::{Admission, RoundDeduplicator};
pub use error::{FailureClass, ResolutionFailure, TransitionError, WireError};
pub use notify::{Notification, RoundNotice};
pub use phase::{PhaseInput, SessionPhase};
pub use session::{
    AdmittedRound, CombatSession, FailureOutcome, Intent, LoggedRound, PhaseChange,
    RoundApplication, RoundLog, SessionSnapshot, SkillToggle,
};
pub use types::{
    CharacterId, Item, ItemId, ItemQuality, LevelUpEvent, Loot, LootEvent, MapId, MonsterKind,
    MonsterSummary, PotionUsage, RoundId, RoundRecord, RoundResolution, RoundSource, ServerEvent,
    SkillDefinition, SkillId, SkillUsage,
};
pub use wire::{ErrorBody, PushEventKind};
