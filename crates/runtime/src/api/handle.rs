//! Cloneable façade for driving the combat session.
//!
//! [`SessionHandle`] is the controller surface: UI code issues intents
//! through it and observes state through the snapshot watch. It never
//! touches the session directly.
use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use combat_core::{CharacterId, CharacterSnapshot, MapId, SessionSnapshot, SkillDefinition, SkillId};

use super::errors::{Result, RuntimeError};
use crate::events::{Event, EventBus, Topic};
use crate::workers::Command;

/// Client-facing handle to interact with the runtime
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<Option<SessionSnapshot>>,
    event_bus: EventBus,
}

impl SessionHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<Command>,
        snapshot_rx: watch::Receiver<Option<SessionSnapshot>>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            command_tx,
            snapshot_rx,
            event_bus,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Selects a character, discarding any previous session (log, dedup
    /// memory, cooldowns, skills) and retargeting the push subscription.
    pub async fn select_character(
        &self,
        character: CharacterId,
        snapshot: Option<CharacterSnapshot>,
    ) -> Result<SessionSnapshot> {
        self.request(|reply| Command::SelectCharacter {
            character,
            snapshot,
            reply,
        })
        .await
    }

    /// Destroys the session and unsubscribes the push channel.
    pub async fn logout(&self) -> Result<()> {
        self.request(|reply| Command::Logout { reply }).await
    }

    /// Sets the auto-fight intent. Rejected while defeated or at zero HP.
    pub async fn start(&self) -> Result<()> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Clears the intent and the enabled skills immediately.
    ///
    /// Idempotent: returns `false` when there was nothing to stop. An
    /// in-flight resolution call is left to finish; its result is logged
    /// but cannot restart combat. A map entry still loading is cancelled
    /// and will not resume combat when it completes.
    pub async fn stop(&self) -> Result<bool> {
        self.request(|reply| Command::Stop { reply }).await?
    }

    /// Enters `map` and resumes auto-combat once the server confirms.
    /// The only way out of a defeat.
    pub async fn resume(&self, map: MapId) -> Result<()> {
        self.request(|reply| Command::Resume { map, reply }).await?
    }

    /// Flips one skill; returns whether it is now enabled.
    pub async fn toggle_skill(&self, skill: SkillId) -> Result<bool> {
        self.request(|reply| Command::ToggleSkill { skill, reply })
            .await?
    }

    /// Registers the skill catalog (cooldowns, default enabled set).
    pub async fn load_skills(&self, skills: Vec<SkillDefinition>) -> Result<()> {
        self.request(|reply| Command::LoadSkills { skills, reply })
            .await?
    }

    pub async fn dismiss_error(&self) -> Result<()> {
        self.request(|reply| Command::DismissError { reply }).await
    }

    /// Latest published snapshot; `None` when no character is selected.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch receiver that wakes on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<Option<SessionSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to events from a specific topic
    ///
    /// # Topics
    ///
    /// - `Topic::Combat` - Round admissions, phase changes, failures
    /// - `Topic::Notification` - One signal per victory, defeat, loot, level up
    /// - `Topic::Connection` - Push channel lifecycle
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(
        &self,
        topics: &[Topic],
    ) -> HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    /// Get a reference to the event bus for advanced usage
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)
    }
}
