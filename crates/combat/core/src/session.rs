//! Combat State Store: the single source of truth for one character.
//!
//! Every mutation goes through a method on [`CombatSession`]; round records
//! are gated by the [`RoundDeduplicator`] before anything is touched. Methods
//! are synchronous so a caller applies a whole update without yielding.
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::character::CharacterSnapshot;
use crate::config::EngineConfig;
use crate::cooldown::CooldownView;
use crate::dedup::{Admission, RoundDeduplicator};
use crate::error::{FailureClass, ResolutionFailure, TransitionError};
use crate::notify::{Notification, RoundNotice};
use crate::phase::{PhaseInput, SessionPhase};
use crate::types::{
    CharacterId, LevelUpEvent, LootEvent, RoundId, RoundRecord, RoundResolution, RoundSource,
    SkillDefinition, SkillId,
};

const DEFAULT_DEFEAT_MESSAGE: &str = "HP depleted, auto-combat stopped";

/// Round as kept in the rolling log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedRound {
    pub source: RoundSource,
    pub record: RoundRecord,
}

/// Newest-first log ordered by admission, not by round id.
#[derive(Clone, Debug)]
pub struct RoundLog {
    entries: VecDeque<LoggedRound>,
    capacity: usize,
}

impl RoundLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LoggedRound) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoggedRound> {
        self.entries.iter()
    }

    pub fn round_ids(&self) -> impl Iterator<Item = RoundId> + '_ {
        self.entries.iter().filter_map(|e| e.record.round_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

/// What the async layer needs to act on an intent change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Intent {
    pub character: CharacterId,
    pub epoch: u64,
    pub skills: Vec<SkillId>,
    pub phase_change: Option<PhaseChange>,
}

/// Result of applying a round that passed the deduplicator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmittedRound {
    pub source: RoundSource,
    pub record: RoundRecord,
    pub notification: Notification,
    pub phase_change: Option<PhaseChange>,
    /// A potion was consumed; the inventory owner should refresh.
    pub inventory_refresh: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundApplication {
    Admitted(Box<AdmittedRound>),
    Duplicate(RoundId),
    /// Id-less record rejected by the admission heuristic.
    Suppressed,
}

impl RoundApplication {
    pub fn admitted(&self) -> Option<&AdmittedRound> {
        match self {
            RoundApplication::Admitted(admitted) => Some(admitted),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureOutcome {
    pub phase_change: Option<PhaseChange>,
    pub notification: Option<Notification>,
}

/// Result of toggling one skill.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkillToggle {
    pub character: CharacterId,
    pub skill: SkillId,
    pub enabled: bool,
    pub skills: Vec<SkillId>,
    /// The server only needs to hear about the change mid-fight.
    pub fighting: bool,
}

/// Read-only view handed to UI collaborators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub character_id: CharacterId,
    pub phase: SessionPhase,
    pub fighting: bool,
    pub auto_fight_intent: bool,
    pub defeated: bool,
    pub current_hp: Option<i64>,
    pub current_max_hp: i64,
    pub current_mana: Option<i64>,
    pub current_max_mana: i64,
    pub last_round: Option<LoggedRound>,
    pub log: Vec<LoggedRound>,
    pub enabled_skills: Vec<SkillId>,
    pub character: Option<CharacterSnapshot>,
    pub cooldowns: Vec<CooldownView>,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn log_round_ids(&self) -> Vec<Option<RoundId>> {
        self.log.iter().map(|entry| entry.record.round_id).collect()
    }
}

/// Per-character combat session.
#[derive(Clone, Debug)]
pub struct CombatSession {
    character_id: CharacterId,
    phase: SessionPhase,
    epoch: u64,
    current_hp: Option<i64>,
    current_max_hp: i64,
    current_mana: Option<i64>,
    current_max_mana: i64,
    last_round: Option<LoggedRound>,
    log: RoundLog,
    enabled_skills: BTreeSet<SkillId>,
    character: Option<CharacterSnapshot>,
    dedup: RoundDeduplicator,
    last_error: Option<String>,
    resume_tickets: u64,
    /// Map entry the server has not confirmed yet.
    pending_resume: Option<u64>,
}

impl CombatSession {
    pub fn new(
        character_id: CharacterId,
        snapshot: Option<CharacterSnapshot>,
        config: &EngineConfig,
    ) -> Self {
        let mut session = Self {
            character_id,
            phase: SessionPhase::Idle,
            epoch: 0,
            current_hp: None,
            current_max_hp: 0,
            current_mana: None,
            current_max_mana: 0,
            last_round: None,
            log: RoundLog::new(config.log_capacity),
            enabled_skills: BTreeSet::new(),
            character: None,
            dedup: RoundDeduplicator::new(config.dedup_capacity(), config.poll_interval),
            last_error: None,
            resume_tickets: 0,
            pending_resume: None,
        };
        if let Some(snapshot) = snapshot {
            session.apply_character(&snapshot);
        }
        session
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_fighting(&self) -> bool {
        self.phase.is_fighting()
    }

    pub fn has_intent(&self) -> bool {
        self.phase.has_intent()
    }

    pub fn current_hp(&self) -> Option<i64> {
        self.current_hp
    }

    pub fn current_mana(&self) -> Option<i64> {
        self.current_mana
    }

    pub fn log(&self) -> &RoundLog {
        &self.log
    }

    pub fn last_round(&self) -> Option<&LoggedRound> {
        self.last_round.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn character(&self) -> Option<&CharacterSnapshot> {
        self.character.as_ref()
    }

    pub fn enabled_skills(&self) -> Vec<SkillId> {
        self.enabled_skills.iter().copied().collect()
    }

    fn hp_depleted(&self) -> bool {
        self.current_hp.is_some_and(|hp| hp <= 0)
    }

    /// Whether the polling driver may issue a resolution call right now.
    pub fn polls(&self) -> bool {
        self.phase.has_intent() && !self.hp_depleted()
    }

    fn intent(&self, phase_change: Option<PhaseChange>) -> Intent {
        Intent {
            character: self.character_id,
            epoch: self.epoch,
            skills: self.enabled_skills(),
            phase_change,
        }
    }

    fn advance(&mut self, input: PhaseInput) -> Result<Option<PhaseChange>, TransitionError> {
        let from = self.phase;
        let to = from.next(input)?;
        if from == to {
            return Ok(None);
        }

        self.phase = to;
        if from.has_intent() != to.has_intent() {
            self.epoch += 1;
        }
        debug!(character = %self.character_id, %from, %to, %input, "session phase changed");
        Ok(Some(PhaseChange { from, to }))
    }

    /// Sets the auto-fight intent.
    pub fn start(&mut self) -> Result<Intent, TransitionError> {
        if !self.phase.has_intent()
            && let Some(hp) = self.current_hp.filter(|hp| *hp <= 0)
        {
            return Err(TransitionError::Depleted { hp });
        }

        let change = self.advance(PhaseInput::Start)?;
        Ok(self.intent(change))
    }

    /// Records a map entry about to be sent to the server. The entry only
    /// takes effect through [`Self::take_resume`] with the returned ticket.
    pub fn request_resume(&mut self) -> u64 {
        self.resume_tickets += 1;
        self.pending_resume = Some(self.resume_tickets);
        self.resume_tickets
    }

    /// Whether `ticket` is still the wanted map entry. Consumes it.
    pub fn take_resume(&mut self, ticket: u64) -> bool {
        if self.pending_resume != Some(ticket) {
            return false;
        }
        self.pending_resume = None;
        true
    }

    /// Drops a pending map entry. Returns `true` if one was pending.
    pub fn cancel_resume(&mut self) -> bool {
        self.pending_resume.take().is_some()
    }

    /// Enters (or re-enters) a map. The only way out of `Defeated`.
    pub fn resume(&mut self) -> Intent {
        // the server restores HP on entry; an unknown value re-arms polling
        if self.hp_depleted() {
            self.current_hp = None;
        }
        self.last_error = None;
        let change = self.advance(PhaseInput::Resume).ok().flatten();
        self.intent(change)
    }

    /// Clears the intent and the enabled skills. Returns `None` when there
    /// was no intent to clear, which makes repeated calls no-ops.
    ///
    /// A pending map entry is dropped as well; call [`Self::cancel_resume`]
    /// first to learn whether there was one.
    pub fn stop(&mut self) -> Option<Intent> {
        self.pending_resume = None;
        if !self.phase.has_intent() {
            return None;
        }
        self.enabled_skills.clear();
        let change = self.advance(PhaseInput::Stop).ok().flatten();
        Some(self.intent(change))
    }

    /// Server confirmed a stop; ignored if the intent changed since.
    pub fn acknowledge_stop(&mut self, epoch: u64) -> Option<PhaseChange> {
        if epoch != self.epoch {
            debug!(
                character = %self.character_id,
                epoch,
                current = self.epoch,
                "ignoring stale stop acknowledgement"
            );
            return None;
        }
        self.advance(PhaseInput::StopAcknowledged).ok().flatten()
    }

    /// Atomically checks the polling condition and captures what the call needs.
    pub fn begin_resolution(&self) -> Option<Intent> {
        self.polls().then(|| self.intent(None))
    }

    /// Applies a round record if the deduplicator admits it.
    pub fn apply_round(
        &mut self,
        resolution: RoundResolution,
        source: RoundSource,
        now: Instant,
    ) -> RoundApplication {
        match self.dedup.admit(resolution.record.round_id, now) {
            Admission::Duplicate(id) => return RoundApplication::Duplicate(id),
            Admission::AnonymousSuppressed => return RoundApplication::Suppressed,
            Admission::Fresh(_) | Admission::Anonymous => {}
        }

        let resulting_hp = resolution.resulting_hp();
        let resulting_mana = resolution.resulting_mana();
        let RoundResolution {
            record,
            character,
            potion_used,
        } = resolution;

        if let Some(snapshot) = &character {
            self.merge_character(snapshot);
        }
        if resulting_hp.is_some() {
            self.current_hp = resulting_hp;
        }
        if resulting_mana.is_some() {
            self.current_mana = resulting_mana;
        }

        let ends_combat = record.auto_stopped || resulting_hp.is_some_and(|hp| hp <= 0);
        let phase_change = if ends_combat {
            self.enabled_skills.clear();
            self.advance(PhaseInput::Depleted).ok().flatten()
        } else {
            self.advance(PhaseInput::RoundAdmitted).ok().flatten()
        };
        if ends_combat {
            info!(
                character = %self.character_id,
                round_id = ?record.round_id,
                %source,
                "round ended auto-combat"
            );
        }

        let notice = if ends_combat {
            RoundNotice::Defeat
        } else {
            RoundNotice::for_record(&record)
        };
        let notification = Notification::Round {
            character: self.character_id,
            round_id: record.round_id,
            notice,
            loot: record.loot.clone().filter(|loot| !loot.is_empty()),
        };

        let entry = LoggedRound {
            source,
            record: record.clone(),
        };
        self.log.push(entry.clone());
        self.last_round = Some(entry);

        RoundApplication::Admitted(Box::new(AdmittedRound {
            source,
            record,
            notification,
            phase_change,
            inventory_refresh: potion_used.is_some_and(|usage| usage.consumed_any()),
        }))
    }

    /// Applies a failed resolution, start or enter-map call.
    pub fn apply_failure(&mut self, failure: &ResolutionFailure) -> FailureOutcome {
        match failure.class {
            FailureClass::AuthoritativeStop => {
                self.current_hp = Some(failure.current_hp.unwrap_or(0));
                self.enabled_skills.clear();
                let message = if failure.message.is_empty() {
                    DEFAULT_DEFEAT_MESSAGE.to_string()
                } else {
                    failure.message.clone()
                };
                self.last_error = Some(message.clone());

                let phase_change = self.advance(PhaseInput::Depleted).ok().flatten();
                let notification = phase_change
                    .filter(|change| change.to.is_defeated())
                    .map(|_| Notification::Defeated {
                        character: self.character_id,
                        message,
                    });
                FailureOutcome {
                    phase_change,
                    notification,
                }
            }
            FailureClass::Transient => {
                self.last_error = Some(failure.message.clone());
                FailureOutcome::default()
            }
            FailureClass::Malformed => FailureOutcome::default(),
        }
    }

    /// Loot never touches the fighting state or the session HP.
    pub fn apply_loot(&mut self, event: &LootEvent) -> Notification {
        let character = self
            .character
            .get_or_insert_with(|| CharacterSnapshot::new(self.character_id));
        character.add_currency(event.currency);
        if let Some(snapshot) = &event.character {
            character.current_hp = snapshot.current_hp.or(character.current_hp);
            character.current_mana = snapshot.current_mana.or(character.current_mana);
        }

        Notification::LootDropped {
            character: self.character_id,
            item: event.item.clone(),
            currency: event.currency,
        }
    }

    pub fn apply_level_up(&mut self, event: &LevelUpEvent) -> Notification {
        if let Some(snapshot) = &event.character {
            self.merge_character(snapshot);
        }
        let character = self
            .character
            .get_or_insert_with(|| CharacterSnapshot::new(self.character_id));
        character.level = Some(event.level);

        Notification::LevelUp {
            character: self.character_id,
            level: event.level,
        }
    }

    /// Merges an authoritative character snapshot (selection, map entry)
    /// including its HP/MP values.
    pub fn apply_character(&mut self, snapshot: &CharacterSnapshot) -> Option<PhaseChange> {
        self.merge_character(snapshot);
        if snapshot.current_hp.is_some() {
            self.current_hp = snapshot.current_hp;
        }
        if snapshot.current_mana.is_some() {
            self.current_mana = snapshot.current_mana;
        }

        if self.hp_depleted() && self.phase.has_intent() {
            self.enabled_skills.clear();
            return self.advance(PhaseInput::Depleted).ok().flatten();
        }
        None
    }

    fn merge_character(&mut self, snapshot: &CharacterSnapshot) {
        match &mut self.character {
            Some(existing) => existing.merge_from(snapshot),
            None => self.character = Some(snapshot.clone()),
        }
        if let Some(max_hp) = snapshot.max_hp {
            self.current_max_hp = max_hp;
        }
        if let Some(max_mana) = snapshot.max_mana {
            self.current_max_mana = max_mana;
        }
    }

    pub fn toggle_skill(&mut self, skill: SkillId) -> SkillToggle {
        let enabled = if self.enabled_skills.remove(&skill) {
            false
        } else {
            self.enabled_skills.insert(skill);
            true
        };
        SkillToggle {
            character: self.character_id,
            skill,
            enabled,
            skills: self.enabled_skills(),
            fighting: self.phase.is_fighting(),
        }
    }

    /// Seeds the enabled set with learned active skills when it is empty.
    pub fn load_skills(&mut self, skills: &[SkillDefinition]) {
        if !self.enabled_skills.is_empty() {
            return;
        }
        self.enabled_skills = skills
            .iter()
            .filter(|skill| skill.learned && skill.active)
            .map(|skill| skill.id)
            .collect();
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    pub fn snapshot(&self, cooldowns: Vec<CooldownView>) -> SessionSnapshot {
        SessionSnapshot {
            character_id: self.character_id,
            phase: self.phase,
            fighting: self.phase.is_fighting(),
            auto_fight_intent: self.phase.has_intent(),
            defeated: self.phase.is_defeated(),
            current_hp: self.current_hp,
            current_max_hp: self.current_max_hp,
            current_mana: self.current_mana,
            current_max_mana: self.current_max_mana,
            last_round: self.last_round.clone(),
            log: self.log.iter().cloned().collect(),
            enabled_skills: self.enabled_skills(),
            character: self.character.clone(),
            cooldowns,
            last_error: self.last_error.clone(),
        }
    }
}
