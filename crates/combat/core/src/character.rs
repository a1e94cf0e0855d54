//! Character snapshot carried next to combat results.
//!
//! Only a handful of fields matter to the engine (HP/MP, level, currency);
//! the rest is forwarded to the UI untouched.
use serde::{Deserialize, Serialize};

use crate::types::{CharacterId, MapId};

/// Automatic potion settings. The resolution endpoint sometimes returns a
/// character without them, so a merge never drops existing values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotionSettings {
    pub auto_use_hp_potion: Option<bool>,
    pub hp_potion_threshold: Option<u32>,
    pub auto_use_mp_potion: Option<bool>,
    pub mp_potion_threshold: Option<u32>,
}

impl PotionSettings {
    fn merge_from(&mut self, other: &PotionSettings) {
        self.auto_use_hp_potion = other.auto_use_hp_potion.or(self.auto_use_hp_potion);
        self.hp_potion_threshold = other.hp_potion_threshold.or(self.hp_potion_threshold);
        self.auto_use_mp_potion = other.auto_use_mp_potion.or(self.auto_use_mp_potion);
        self.mp_potion_threshold = other.mp_potion_threshold.or(self.mp_potion_threshold);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: CharacterId,
    pub name: Option<String>,
    pub level: Option<u32>,
    pub experience: Option<i64>,
    pub currency: Option<i64>,
    pub skill_points: Option<u32>,
    pub current_map: Option<MapId>,
    pub current_hp: Option<i64>,
    pub current_mana: Option<i64>,
    pub max_hp: Option<i64>,
    pub max_mana: Option<i64>,
    pub potions: PotionSettings,
}

impl CharacterSnapshot {
    pub fn new(id: CharacterId) -> Self {
        Self {
            id,
            name: None,
            level: None,
            experience: None,
            currency: None,
            skill_points: None,
            current_map: None,
            current_hp: None,
            current_mana: None,
            max_hp: None,
            max_mana: None,
            potions: PotionSettings::default(),
        }
    }

    /// Overlays every field present in `other`; absent fields keep their value.
    pub fn merge_from(&mut self, other: &CharacterSnapshot) {
        if other.name.is_some() {
            self.name.clone_from(&other.name);
        }
        self.level = other.level.or(self.level);
        self.experience = other.experience.or(self.experience);
        self.currency = other.currency.or(self.currency);
        self.skill_points = other.skill_points.or(self.skill_points);
        self.current_map = other.current_map.or(self.current_map);
        self.current_hp = other.current_hp.or(self.current_hp);
        self.current_mana = other.current_mana.or(self.current_mana);
        self.max_hp = other.max_hp.or(self.max_hp);
        self.max_mana = other.max_mana.or(self.max_mana);
        self.potions.merge_from(&other.potions);
    }

    pub fn add_currency(&mut self, amount: i64) {
        self.currency = Some(self.currency.unwrap_or(0).saturating_add(amount));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_potion_settings_missing_from_incoming() {
        let mut base = CharacterSnapshot::new(CharacterId(1));
        base.potions.auto_use_hp_potion = Some(true);
        base.potions.hp_potion_threshold = Some(30);
        base.current_hp = Some(90);

        let mut incoming = CharacterSnapshot::new(CharacterId(1));
        incoming.current_hp = Some(70);
        incoming.level = Some(4);

        base.merge_from(&incoming);

        assert_eq!(base.current_hp, Some(70));
        assert_eq!(base.level, Some(4));
        assert_eq!(base.potions.auto_use_hp_potion, Some(true));
        assert_eq!(base.potions.hp_potion_threshold, Some(30));
    }

    #[test]
    fn add_currency_starts_from_zero() {
        let mut snapshot = CharacterSnapshot::new(CharacterId(3));
        snapshot.add_currency(15);
        snapshot.add_currency(5);
        assert_eq!(snapshot.currency, Some(20));
    }

    #[test]
    fn add_currency_saturates() {
        let mut snapshot = CharacterSnapshot::new(CharacterId(3));
        snapshot.add_currency(i64::MAX);
        snapshot.add_currency(i64::MAX);
        assert_eq!(snapshot.currency, Some(i64::MAX));
    }
}
