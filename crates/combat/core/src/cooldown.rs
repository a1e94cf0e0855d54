//! Per-skill cooldown tracking driven by admitted rounds.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::{RoundRecord, SkillDefinition, SkillId};

/// Remaining cooldown of one skill, for display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownView {
    pub skill_id: SkillId,
    pub remaining: Duration,
    pub total: Duration,
}

#[derive(Clone, Debug)]
pub struct CooldownTracker {
    durations: HashMap<SkillId, Duration>,
    default_duration: Duration,
    ends: HashMap<SkillId, Instant>,
}

impl CooldownTracker {
    pub fn new(default_duration: Duration) -> Self {
        Self {
            durations: HashMap::new(),
            default_duration,
            ends: HashMap::new(),
        }
    }

    /// Registers cooldown durations from the skill catalog.
    pub fn load_catalog(&mut self, skills: &[SkillDefinition]) {
        for skill in skills {
            self.durations.insert(
                skill.id,
                EngineConfig::COOLDOWN_ROUND * skill.cooldown_rounds,
            );
        }
    }

    pub fn duration_for(&self, skill_id: SkillId) -> Duration {
        self.durations
            .get(&skill_id)
            .copied()
            .unwrap_or(self.default_duration)
    }

    /// Starts (or extends) the cooldown of every skill used in `record`.
    ///
    /// An end time never moves backwards, even if the catalog shortened a
    /// duration between rounds.
    pub fn on_round_admitted(&mut self, record: &RoundRecord, now: Instant) {
        for usage in &record.skills_used {
            let end = now + self.duration_for(usage.skill_id);
            self.ends
                .entry(usage.skill_id)
                .and_modify(|current| *current = (*current).max(end))
                .or_insert(end);
        }
    }

    pub fn ends_at(&self, skill_id: SkillId) -> Option<Instant> {
        self.ends.get(&skill_id).copied()
    }

    /// True while at least one cooldown is outstanding; the refresh timer
    /// is only scheduled in that case.
    pub fn is_active(&self) -> bool {
        !self.ends.is_empty()
    }

    /// Drops expired entries and returns what is still cooling down,
    /// sorted by skill id.
    pub fn refresh(&mut self, now: Instant) -> Vec<CooldownView> {
        self.ends.retain(|_, end| *end > now);

        let mut views: Vec<CooldownView> = self
            .ends
            .iter()
            .map(|(&skill_id, &end)| CooldownView {
                skill_id,
                remaining: end.saturating_duration_since(now),
                total: self.duration_for(skill_id),
            })
            .collect();
        views.sort_by_key(|view| view.skill_id);
        views
    }
}
