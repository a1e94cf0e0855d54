//! User-facing notifications derived from admitted updates.
//!
//! The session emits at most one notification per admitted round, so a
//! listener (sound, toast) never needs to diff raw state.
use serde::{Deserialize, Serialize};

use crate::types::{CharacterId, Item, Loot, RoundId, RoundRecord};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum RoundNotice {
    Victory,
    Defeat,
    Hit,
}

impl RoundNotice {
    pub fn for_record(record: &RoundRecord) -> Self {
        if record.defeat || record.ends_combat() {
            RoundNotice::Defeat
        } else if record.victory {
            RoundNotice::Victory
        } else {
            RoundNotice::Hit
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    Round {
        character: CharacterId,
        round_id: Option<RoundId>,
        notice: RoundNotice,
        loot: Option<Loot>,
    },
    /// Auto-stop reported through a failed call rather than a round.
    Defeated {
        character: CharacterId,
        message: String,
    },
    LootDropped {
        character: CharacterId,
        item: Option<Item>,
        currency: i64,
    },
    LevelUp {
        character: CharacterId,
        level: u32,
    },
}

impl Notification {
    pub fn character(&self) -> CharacterId {
        match self {
            Notification::Round { character, .. }
            | Notification::Defeated { character, .. }
            | Notification::LootDropped { character, .. }
            | Notification::LevelUp { character, .. } => *character,
        }
    }
}
