//! JSON payloads of the combat backend and their normalization.
//!
//! The HTTP resolution response and the `combat.update` push carry the same
//! record with slightly different field sets (`id` vs `combat_log_id`,
//! top-level vs nested HP). Everything is decoded leniently: unknown fields
//! are ignored, missing numbers default to zero.
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::character::{CharacterSnapshot, PotionSettings};
use crate::error::WireError;
use crate::types::{
    CharacterId, Item, ItemId, ItemQuality, LevelUpEvent, Loot, LootEvent, MapId, MonsterKind,
    MonsterSummary, PotionUsage, RoundId, RoundRecord, RoundResolution, ServerEvent,
    SkillDefinition, SkillId, SkillUsage,
};

pub type Result<T> = std::result::Result<T, WireError>;

/// Skill cooldown (in rounds) assumed when the catalog omits it.
pub const DEFAULT_COOLDOWN_ROUNDS: u32 = 3;

/// Push events the engine consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr)]
pub enum PushEventKind {
    #[strum(serialize = "combat.update")]
    CombatUpdate,
    #[strum(serialize = "loot.dropped")]
    LootDropped,
    #[strum(serialize = "level.up")]
    LevelUp,
}

impl PushEventKind {
    /// Accepts both `combat.update` and the listener form `.combat.update`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_str(name.trim_start_matches('.')).ok()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CharacterDto {
    id: u64,
    name: Option<String>,
    level: Option<u32>,
    experience: Option<i64>,
    copper: Option<i64>,
    skill_points: Option<u32>,
    current_map_id: Option<u64>,
    current_hp: Option<i64>,
    current_mana: Option<i64>,
    max_hp: Option<i64>,
    max_mana: Option<i64>,
    auto_use_hp_potion: Option<bool>,
    hp_potion_threshold: Option<u32>,
    auto_use_mp_potion: Option<bool>,
    mp_potion_threshold: Option<u32>,
}

impl From<CharacterDto> for CharacterSnapshot {
    fn from(dto: CharacterDto) -> Self {
        CharacterSnapshot {
            id: CharacterId(dto.id),
            name: dto.name,
            level: dto.level,
            experience: dto.experience,
            currency: dto.copper,
            skill_points: dto.skill_points,
            current_map: dto.current_map_id.map(MapId),
            current_hp: dto.current_hp,
            current_mana: dto.current_mana,
            max_hp: dto.max_hp,
            max_mana: dto.max_mana,
            potions: PotionSettings {
                auto_use_hp_potion: dto.auto_use_hp_potion,
                hp_potion_threshold: dto.hp_potion_threshold,
                auto_use_mp_potion: dto.auto_use_mp_potion,
                mp_potion_threshold: dto.mp_potion_threshold,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CombatStatsDto {
    max_hp: Option<i64>,
    max_mana: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemDefinitionDto {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemDto {
    id: u64,
    definition: Option<ItemDefinitionDto>,
    quality: Option<String>,
    quantity: Option<u32>,
}

impl From<ItemDto> for Item {
    fn from(dto: ItemDto) -> Self {
        Item {
            id: ItemId(dto.id),
            name: dto.definition.and_then(|d| d.name),
            quality: dto
                .quality
                .as_deref()
                .and_then(|q| ItemQuality::from_str(q).ok())
                .unwrap_or_default(),
            quantity: dto.quantity.unwrap_or(1),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MonsterDto {
    id: Option<u64>,
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    level: u32,
    hp: Option<i64>,
    max_hp: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LootDto {
    copper: Option<i64>,
    item: Option<ItemDto>,
    potion: Option<ItemDto>,
    item_lost: Option<bool>,
    item_lost_reason: Option<String>,
}

impl From<LootDto> for Loot {
    fn from(dto: LootDto) -> Self {
        let item_lost = match (dto.item_lost, dto.item_lost_reason) {
            (_, Some(reason)) => Some(reason),
            (Some(true), None) => Some(String::from("item lost")),
            _ => None,
        };
        Loot {
            item: dto.item.map(Item::from),
            potion: dto.potion.map(Item::from),
            currency: dto.copper.unwrap_or(0),
            item_lost,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SkillUsedDto {
    skill_id: u64,
    name: String,
    use_count: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PotionUsedDto {
    before: Option<BTreeMap<String, serde_json::Value>>,
    after: Option<BTreeMap<String, serde_json::Value>>,
}

fn quantities(map: Option<BTreeMap<String, serde_json::Value>>) -> BTreeMap<String, i64> {
    map.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.as_i64().unwrap_or_default()))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RoundDto {
    id: Option<u64>,
    combat_log_id: Option<u64>,
    victory: bool,
    defeat: bool,
    auto_stopped: bool,
    monster_id: Option<u64>,
    monster: Option<MonsterDto>,
    damage_dealt: i64,
    damage_taken: i64,
    experience_gained: i64,
    copper_gained: i64,
    loot: Option<LootDto>,
    skills_used: Vec<SkillUsedDto>,
    character: Option<CharacterDto>,
    current_hp: Option<i64>,
    current_mana: Option<i64>,
    potion_used: Option<PotionUsedDto>,
}

impl From<RoundDto> for RoundResolution {
    fn from(dto: RoundDto) -> Self {
        let monster_id = dto.monster_id;
        let record = RoundRecord {
            // `id` is the persisted log id; pushes only carry `combat_log_id`
            round_id: dto.id.or(dto.combat_log_id).map(RoundId),
            victory: dto.victory,
            defeat: dto.defeat,
            auto_stopped: dto.auto_stopped,
            monster: dto.monster.map(|m| MonsterSummary {
                id: m.id.or(monster_id),
                name: m.name,
                kind: m
                    .kind
                    .as_deref()
                    .and_then(|k| MonsterKind::from_str(k).ok())
                    .unwrap_or_default(),
                level: m.level,
                hp: m.hp,
                max_hp: m.max_hp,
            }),
            damage_dealt: dto.damage_dealt,
            damage_taken: dto.damage_taken,
            experience_gained: dto.experience_gained,
            currency_gained: dto.copper_gained,
            loot: dto.loot.map(Loot::from),
            skills_used: dto
                .skills_used
                .into_iter()
                .map(|s| SkillUsage {
                    skill_id: SkillId(s.skill_id),
                    name: s.name,
                    use_count: s.use_count,
                })
                .collect(),
            resulting_hp: dto.current_hp,
            resulting_mana: dto.current_mana,
        };

        RoundResolution {
            record,
            character: dto.character.map(CharacterSnapshot::from),
            potion_used: dto.potion_used.map(|p| PotionUsage {
                before: quantities(p.before),
                after: quantities(p.after),
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LootDroppedDto {
    item: Option<ItemDto>,
    copper: i64,
    character: Option<CharacterDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LevelUpDto {
    level: u32,
    character: Option<CharacterDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CharacterEnvelope {
    character: Option<CharacterDto>,
    combat_stats: Option<CombatStatsDto>,
    current_hp: Option<i64>,
    current_mana: Option<i64>,
}

impl CharacterEnvelope {
    fn into_snapshot(self) -> Option<CharacterSnapshot> {
        let mut snapshot = CharacterSnapshot::from(self.character?);
        if let Some(stats) = self.combat_stats {
            snapshot.max_hp = stats.max_hp.or(snapshot.max_hp);
            snapshot.max_mana = stats.max_mana.or(snapshot.max_mana);
        }
        snapshot.current_hp = self.current_hp.or(snapshot.current_hp);
        snapshot.current_mana = self.current_mana.or(snapshot.current_mana);
        Some(snapshot)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SkillDto {
    id: u64,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    is_learned: bool,
    cooldown: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SkillsEnvelope {
    skills: Vec<SkillDto>,
}

/// Body of a rejected HTTP call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub auto_stopped: bool,
    pub current_hp: Option<i64>,
}

fn parse<'a, T: Deserialize<'a>>(event: &'static str, body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|source| WireError::Payload { event, source })
}

/// Decodes the response of the resolution call.
pub fn decode_resolution(body: &[u8]) -> Result<RoundResolution> {
    parse::<RoundDto>("combat.execute", body).map(RoundResolution::from)
}

/// Decodes a push event by name. `data` is the event's JSON payload.
pub fn decode_push(event: &str, data: &[u8]) -> Result<ServerEvent> {
    let kind = PushEventKind::parse(event).ok_or_else(|| WireError::UnknownEvent(event.into()))?;

    let decoded = match kind {
        PushEventKind::CombatUpdate => {
            ServerEvent::RoundResolved(parse::<RoundDto>("combat.update", data)?.into())
        }
        PushEventKind::LootDropped => {
            let dto: LootDroppedDto = parse("loot.dropped", data)?;
            ServerEvent::LootDropped(LootEvent {
                item: dto.item.map(Item::from),
                currency: dto.copper,
                character: dto.character.map(CharacterSnapshot::from),
            })
        }
        PushEventKind::LevelUp => {
            let dto: LevelUpDto = parse("level.up", data)?;
            ServerEvent::LevelUp(LevelUpEvent {
                level: dto.level,
                character: dto.character.map(CharacterSnapshot::from),
            })
        }
    };
    Ok(decoded)
}

/// Decodes the character endpoint; `None` when no character exists.
pub fn decode_character(body: &[u8]) -> Result<Option<CharacterSnapshot>> {
    parse::<CharacterEnvelope>("character", body).map(CharacterEnvelope::into_snapshot)
}

/// Decodes the enter-map response, which carries the refreshed character.
pub fn decode_enter_map(body: &[u8]) -> Result<Option<CharacterSnapshot>> {
    decode_character(body)
}

pub fn decode_skills(body: &[u8]) -> Result<Vec<SkillDefinition>> {
    let envelope: SkillsEnvelope = parse("skills", body)?;
    Ok(envelope
        .skills
        .into_iter()
        .map(|s| SkillDefinition {
            id: SkillId(s.id),
            name: s.name,
            active: s.kind.eq_ignore_ascii_case("active"),
            learned: s.is_learned,
            cooldown_rounds: s
                .cooldown
                .filter(|c| c.is_finite() && *c >= 0.0)
                .map_or(DEFAULT_COOLDOWN_ROUNDS, |c| c.round() as u32),
        })
        .collect())
}

/// Best-effort decode of an error body; anything unparsable yields `None`.
pub fn decode_error_body(body: &[u8]) -> Option<ErrorBody> {
    serde_json::from_slice(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_prefers_id_over_combat_log_id() {
        let body = br#"{"id": 12, "combat_log_id": 99, "victory": true}"#;
        let resolution = decode_resolution(body).unwrap();
        assert_eq!(resolution.record.round_id, Some(RoundId(12)));
    }

    #[test]
    fn push_update_normalizes_like_http_response() {
        let data = br#"{
            "victory": false,
            "auto_stopped": true,
            "monster": {"name": "Fallen", "type": "elite", "level": 3},
            "damage_dealt": 4,
            "damage_taken": 40,
            "copper_gained": 0,
            "skills_used": [{"skill_id": 2, "name": "Bash", "use_count": 1}],
            "character": {"id": 42, "current_hp": 0, "copper": 110},
            "combat_log_id": 501
        }"#;

        let event = decode_push(".combat.update", data).unwrap();
        let ServerEvent::RoundResolved(resolution) = event else {
            panic!("expected round");
        };
        assert_eq!(resolution.record.round_id, Some(RoundId(501)));
        assert!(resolution.record.auto_stopped);
        assert_eq!(resolution.resulting_hp(), Some(0));
        assert_eq!(resolution.record.monster.unwrap().kind, MonsterKind::Elite);
        assert_eq!(resolution.record.skills_used[0].skill_id, SkillId(2));
        assert_eq!(resolution.character.unwrap().currency, Some(110));
    }

    #[test]
    fn top_level_hp_wins_over_character_hp() {
        let data = br#"{"combat_log_id": 1, "current_hp": 15, "character": {"id": 1, "current_hp": 80}}"#;
        let resolution = decode_resolution(data).unwrap();
        assert_eq!(resolution.resulting_hp(), Some(15));
    }

    #[test]
    fn potion_usage_is_decoded() {
        let data = br#"{"combat_log_id": 3, "potion_used": {"before": {"17": 4}, "after": {}}}"#;
        let resolution = decode_resolution(data).unwrap();
        let usage = resolution.potion_used.unwrap();
        assert!(usage.consumed_any());
        assert_eq!(usage.before.get("17"), Some(&4));
    }

    #[test]
    fn loot_and_level_up_events() {
        let loot = decode_push(
            "loot.dropped",
            br#"{"copper": 7, "item": {"id": 5, "quality": "legendary", "definition": {"name": "Ring"}}}"#,
        )
        .unwrap();
        match loot {
            ServerEvent::LootDropped(event) => {
                assert_eq!(event.currency, 7);
                let item = event.item.unwrap();
                assert_eq!(item.quality, ItemQuality::Legendary);
                assert_eq!(item.name.as_deref(), Some("Ring"));
                assert_eq!(item.quantity, 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        let level = decode_push("level.up", br#"{"level": 12, "character": {"id": 42}}"#).unwrap();
        assert!(matches!(level, ServerEvent::LevelUp(LevelUpEvent { level: 12, .. })));
    }

    #[test]
    fn unknown_event_and_bad_payload_are_errors() {
        assert!(matches!(
            decode_push("inventory.update", b"{}"),
            Err(WireError::UnknownEvent(_))
        ));
        assert!(matches!(
            decode_push("combat.update", b"[1, 2"),
            Err(WireError::Payload { event: "combat.update", .. })
        ));
    }

    #[test]
    fn unknown_quality_falls_back_to_common() {
        let data = br#"{"combat_log_id": 1, "loot": {"copper": 3, "item": {"id": 9, "quality": "cursed"}}}"#;
        let loot = decode_resolution(data).unwrap().record.loot.unwrap();
        assert_eq!(loot.item.unwrap().quality, ItemQuality::Common);
        assert_eq!(loot.currency, 3);
    }

    #[test]
    fn character_envelope_merges_combat_stats() {
        let body = br#"{
            "character": {"id": 42, "level": 7, "auto_use_hp_potion": true},
            "combat_stats": {"max_hp": 200, "max_mana": 50},
            "current_hp": 180
        }"#;
        let snapshot = decode_character(body).unwrap().unwrap();
        assert_eq!(snapshot.max_hp, Some(200));
        assert_eq!(snapshot.current_hp, Some(180));
        assert_eq!(snapshot.potions.auto_use_hp_potion, Some(true));

        assert_eq!(decode_character(br#"{"character": null}"#).unwrap(), None);
    }

    #[test]
    fn skills_catalog_defaults_cooldown() {
        let body = br#"{"skills": [
            {"id": 1, "name": "Fireball", "type": "active", "is_learned": true, "cooldown": 2},
            {"id": 2, "name": "Aura", "type": "passive", "is_learned": false}
        ], "skill_points": 3}"#;
        let skills = decode_skills(body).unwrap();
        assert_eq!(skills[0].cooldown_rounds, 2);
        assert!(skills[0].active && skills[0].learned);
        assert_eq!(skills[1].cooldown_rounds, DEFAULT_COOLDOWN_ROUNDS);
        assert!(!skills[1].active);
    }

    #[test]
    fn error_body_reports_auto_stop() {
        let body = br#"{"message": "HP too low", "auto_stopped": true, "current_hp": 0}"#;
        let error = decode_error_body(body).unwrap();
        assert!(error.auto_stopped);
        assert_eq!(error.current_hp, Some(0));
        assert_eq!(decode_error_body(b"<html>"), None);
    }
}
