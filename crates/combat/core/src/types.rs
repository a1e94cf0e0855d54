//! Identifiers and record types produced by the combat backend.
//!
//! These are the normalized shapes; both the HTTP resolution call and the
//! push channel are decoded into them by [`crate::wire`].
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::character::CharacterSnapshot;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Server-side character identifier. Push channels are named after it.
    CharacterId
);
id_type!(
    /// Server-assigned round identifier, increasing per character but not gap-free.
    RoundId
);
id_type!(SkillId);
id_type!(MapId);
id_type!(ItemId);

/// Channel a round record arrived on.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum RoundSource {
    /// Response of the client-driven resolution call.
    Polling,
    /// Server-pushed `combat.update` event.
    Push,
}

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
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ItemQuality {
    #[default]
    Common,
    Magic,
    Rare,
    Legendary,
    Mythic,
}

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
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MonsterKind {
    #[default]
    Normal,
    Elite,
    Boss,
}

/// Inventory item as far as the combat engine cares about it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: Option<String>,
    pub quality: ItemQuality,
    pub quantity: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loot {
    pub item: Option<Item>,
    pub potion: Option<Item>,
    pub currency: i64,
    /// Item dropped but could not be stored (full inventory etc.).
    pub item_lost: Option<String>,
}

impl Loot {
    pub fn is_empty(&self) -> bool {
        self.item.is_none() && self.potion.is_none() && self.currency == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterSummary {
    pub id: Option<u64>,
    pub name: String,
    pub kind: MonsterKind,
    pub level: u32,
    pub hp: Option<i64>,
    pub max_hp: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillUsage {
    pub skill_id: SkillId,
    pub name: String,
    pub use_count: u32,
}

/// One resolved combat round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Missing on malformed or legacy payloads.
    pub round_id: Option<RoundId>,
    pub victory: bool,
    pub defeat: bool,
    pub auto_stopped: bool,
    pub monster: Option<MonsterSummary>,
    pub damage_dealt: i64,
    pub damage_taken: i64,
    pub experience_gained: i64,
    pub currency_gained: i64,
    pub loot: Option<Loot>,
    pub skills_used: Vec<SkillUsage>,
    pub resulting_hp: Option<i64>,
    pub resulting_mana: Option<i64>,
}

impl RoundRecord {
    /// Empty record with the given id; handy for builders and tests.
    pub fn new(round_id: Option<RoundId>) -> Self {
        Self {
            round_id,
            victory: false,
            defeat: false,
            auto_stopped: false,
            monster: None,
            damage_dealt: 0,
            damage_taken: 0,
            experience_gained: 0,
            currency_gained: 0,
            loot: None,
            skills_used: Vec::new(),
            resulting_hp: None,
            resulting_mana: None,
        }
    }

    /// True when this round must end auto-combat: either flagged by the
    /// server or leaving the character at zero HP.
    pub fn ends_combat(&self) -> bool {
        self.auto_stopped || self.resulting_hp.is_some_and(|hp| hp <= 0)
    }
}

/// Potion consumption reported alongside a round, keyed by item id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotionUsage {
    pub before: BTreeMap<String, i64>,
    pub after: BTreeMap<String, i64>,
}

impl PotionUsage {
    pub fn consumed_any(&self) -> bool {
        !self.before.is_empty() || !self.after.is_empty()
    }
}

/// Full result of a resolution call or a `combat.update` push.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResolution {
    pub record: RoundRecord,
    pub character: Option<CharacterSnapshot>,
    pub potion_used: Option<PotionUsage>,
}

impl RoundResolution {
    pub fn new(record: RoundRecord) -> Self {
        Self {
            record,
            character: None,
            potion_used: None,
        }
    }

    /// HP after the round, preferring the record over the character snapshot.
    pub fn resulting_hp(&self) -> Option<i64> {
        self.record
            .resulting_hp
            .or_else(|| self.character.as_ref().and_then(|c| c.current_hp))
    }

    pub fn resulting_mana(&self) -> Option<i64> {
        self.record
            .resulting_mana
            .or_else(|| self.character.as_ref().and_then(|c| c.current_mana))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootEvent {
    pub item: Option<Item>,
    pub currency: i64,
    pub character: Option<CharacterSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpEvent {
    pub level: u32,
    pub character: Option<CharacterSnapshot>,
}

/// Normalized event from either delivery channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    RoundResolved(RoundResolution),
    LootDropped(LootEvent),
    LevelUp(LevelUpEvent),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RoundResolved(_) => "round_resolved",
            ServerEvent::LootDropped(_) => "loot_dropped",
            ServerEvent::LevelUp(_) => "level_up",
        }
    }
}

/// Skill catalog entry used to seed cooldowns and the default enabled set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub id: SkillId,
    pub name: String,
    pub active: bool,
    pub learned: bool,
    /// Cooldown in rounds; displayed as one second per round.
    pub cooldown_rounds: u32,
}
