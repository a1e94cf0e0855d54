//! Session worker that owns the authoritative [`CombatSession`].
//!
//! Every mutation arrives as a [`Command`] and is applied without yielding,
//! so polling results, push events, and controller calls are serialized.
//! Server calls triggered by a command run in spawned tasks and report back
//! through the same queue.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use combat_core::{
    CharacterId, CharacterSnapshot, CombatSession, CooldownTracker, FailureClass, Intent, MapId,
    PhaseChange, ResolutionFailure, RoundApplication, RoundResolution, RoundSource, ServerEvent,
    SessionSnapshot, SkillDefinition, SkillId,
};

use crate::api::{CombatApi, Result, RuntimeError, TransportError};
use crate::events::{CombatEvent, Event, EventBus};
use crate::runtime::RuntimeConfig;

/// Commands that can be sent to the session worker
pub enum Command {
    /// Replaces the session with a fresh one for `character`.
    SelectCharacter {
        character: CharacterId,
        snapshot: Option<CharacterSnapshot>,
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Logout {
        reply: oneshot::Sender<()>,
    },
    Start {
        reply: oneshot::Sender<Result<()>>,
    },
    /// Replies `true` when an intent was actually cleared.
    Stop {
        reply: oneshot::Sender<Result<bool>>,
    },
    Resume {
        map: MapId,
        reply: oneshot::Sender<Result<()>>,
    },
    ToggleSkill {
        skill: SkillId,
        reply: oneshot::Sender<Result<bool>>,
    },
    LoadSkills {
        skills: Vec<SkillDefinition>,
        reply: oneshot::Sender<Result<()>>,
    },
    DismissError {
        reply: oneshot::Sender<()>,
    },

    /// Polling ticket: checks the arm condition and captures the call inputs.
    BeginResolution {
        reply: oneshot::Sender<Option<Intent>>,
    },
    ResolutionFinished {
        character: CharacterId,
        result: std::result::Result<RoundResolution, TransportError>,
    },
    /// Decoded event from the push channel of `character`.
    Pushed {
        character: CharacterId,
        event: ServerEvent,
    },
    StartFinished {
        character: CharacterId,
        epoch: u64,
        result: std::result::Result<(), TransportError>,
    },
    StopFinished {
        character: CharacterId,
        epoch: u64,
    },
    MapEntered {
        character: CharacterId,
        map: MapId,
        ticket: u64,
        result: std::result::Result<Option<CharacterSnapshot>, TransportError>,
        reply: oneshot::Sender<Result<()>>,
    },

    Shutdown,
}

/// Channels the worker publishes derived state on.
pub struct SessionChannels {
    pub snapshot: watch::Sender<Option<SessionSnapshot>>,
    /// `Some` while the polling driver may issue calls.
    pub polling: watch::Sender<Option<CharacterId>>,
    /// Character the push adapter should be subscribed to.
    pub character: watch::Sender<Option<CharacterId>>,
}

struct ActiveSession {
    session: CombatSession,
    cooldowns: CooldownTracker,
}

pub struct SessionWorker {
    config: RuntimeConfig,
    api: Arc<dyn CombatApi>,
    command_rx: mpsc::Receiver<Command>,
    command_tx: mpsc::WeakSender<Command>,
    event_bus: EventBus,
    channels: SessionChannels,
    active: Option<ActiveSession>,
    cooldown_ticker: Option<Interval>,
}

impl SessionWorker {
    pub fn new(
        config: RuntimeConfig,
        api: Arc<dyn CombatApi>,
        command_rx: mpsc::Receiver<Command>,
        command_tx: mpsc::WeakSender<Command>,
        event_bus: EventBus,
        channels: SessionChannels,
    ) -> Self {
        Self {
            config,
            api,
            command_rx,
            command_tx,
            event_bus,
            channels,
            active: None,
            cooldown_ticker: None,
        }
    }

    /// Main worker loop.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                _ = next_tick(&mut self.cooldown_ticker) => {}
            }
            self.sync();
        }

        debug!("session worker stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SelectCharacter {
                character,
                snapshot,
                reply,
            } => {
                let snapshot = self.select_character(character, snapshot);
                if reply.send(snapshot).is_err() {
                    debug!("SelectCharacter reply channel closed (caller dropped)");
                }
            }
            Command::Logout { reply } => {
                if let Some(active) = self.active.take() {
                    info!(character = %active.session.character_id(), "logged out");
                }
                let _ = reply.send(());
            }
            Command::Start { reply } => {
                let result = self.start();
                if reply.send(result).is_err() {
                    debug!("Start reply channel closed (caller dropped)");
                }
            }
            Command::Stop { reply } => {
                let result = self.stop();
                if reply.send(result).is_err() {
                    debug!("Stop reply channel closed (caller dropped)");
                }
            }
            Command::Resume { map, reply } => self.resume(map, reply),
            Command::ToggleSkill { skill, reply } => {
                let result = self.toggle_skill(skill);
                if reply.send(result).is_err() {
                    debug!("ToggleSkill reply channel closed (caller dropped)");
                }
            }
            Command::LoadSkills { skills, reply } => {
                let result = self.active_mut().map(|active| {
                    active.cooldowns.load_catalog(&skills);
                    active.session.load_skills(&skills);
                });
                if reply.send(result).is_err() {
                    debug!("LoadSkills reply channel closed (caller dropped)");
                }
            }
            Command::DismissError { reply } => {
                if let Some(active) = self.active.as_mut() {
                    active.session.dismiss_error();
                }
                let _ = reply.send(());
            }
            Command::BeginResolution { reply } => {
                let ticket = self
                    .active
                    .as_ref()
                    .and_then(|active| active.session.begin_resolution());
                if reply.send(ticket).is_err() {
                    debug!("BeginResolution reply channel closed (caller dropped)");
                }
            }
            Command::ResolutionFinished { character, result } => {
                if !self.is_current(character) {
                    debug!(%character, "discarding resolution for a previous character");
                    return;
                }
                match result {
                    Ok(resolution) => self.apply_round(resolution, RoundSource::Polling),
                    Err(error) => self.apply_failure(&error),
                }
            }
            Command::Pushed { character, event } => {
                if !self.is_current(character) {
                    debug!(%character, event = event.name(), "discarding push for a previous character");
                    return;
                }
                self.apply_push(event);
            }
            Command::StartFinished {
                character,
                epoch,
                result,
            } => self.on_start_finished(character, epoch, result),
            Command::StopFinished { character, epoch } => {
                if !self.is_current(character) {
                    return;
                }
                if let Some(active) = self.active.as_mut()
                    && let Some(change) = active.session.acknowledge_stop(epoch)
                {
                    self.publish_phase(character, change);
                }
            }
            Command::MapEntered {
                character,
                map,
                ticket,
                result,
                reply,
            } => {
                let result = self.on_map_entered(character, map, ticket, result);
                if reply.send(result).is_err() {
                    debug!("Resume reply channel closed (caller dropped)");
                }
            }
            Command::Shutdown => {}
        }
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession> {
        self.active.as_mut().ok_or(RuntimeError::NoCharacter)
    }

    fn current_character(&self) -> Option<CharacterId> {
        self.active
            .as_ref()
            .map(|active| active.session.character_id())
    }

    fn is_current(&self, character: CharacterId) -> bool {
        self.current_character() == Some(character)
    }

    fn select_character(
        &mut self,
        character: CharacterId,
        snapshot: Option<CharacterSnapshot>,
    ) -> SessionSnapshot {
        if let Some(previous) = self.current_character()
            && previous != character
        {
            info!(%previous, %character, "switching character");
        }

        let engine = self.config.engine();
        let session = CombatSession::new(character, snapshot, &engine);
        let active = self.active.insert(ActiveSession {
            session,
            cooldowns: CooldownTracker::new(engine.default_skill_cooldown),
        });
        active.session.snapshot(Vec::new())
    }

    fn start(&mut self) -> Result<()> {
        let active = self.active_mut()?;
        let intent = active.session.start()?;
        let Some(change) = intent.phase_change else {
            trace!(character = %intent.character, "start ignored, intent already set");
            return Ok(());
        };

        info!(character = %intent.character, skills = ?intent.skills, "auto-combat started");
        self.publish_phase(intent.character, change);

        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            let result = api.start_combat(intent.character, &intent.skills).await;
            Some(Command::StartFinished {
                character: intent.character,
                epoch: intent.epoch,
                result,
            })
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<bool> {
        let active = self.active_mut()?;
        let cancelled = active.session.cancel_resume();
        let Some(intent) = active.session.stop() else {
            if cancelled {
                info!(character = %active.session.character_id(), "pending map entry cancelled");
                return Ok(true);
            }
            trace!("stop ignored, no intent to clear");
            return Ok(false);
        };

        info!(character = %intent.character, "auto-combat stopping");
        if let Some(change) = intent.phase_change {
            self.publish_phase(intent.character, change);
        }

        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            if let Err(error) = api.stop_combat(intent.character).await {
                warn!(character = %intent.character, %error, "stop call failed");
            }
            // acknowledged either way; the local intent is already cleared
            Some(Command::StopFinished {
                character: intent.character,
                epoch: intent.epoch,
            })
        });
        Ok(true)
    }

    fn resume(&mut self, map: MapId, reply: oneshot::Sender<Result<()>>) {
        let Some(active) = self.active.as_mut() else {
            let _ = reply.send(Err(RuntimeError::NoCharacter));
            return;
        };
        let character = active.session.character_id();
        let ticket = active.session.request_resume();

        debug!(%character, %map, ticket, "entering map");
        let api = Arc::clone(&self.api);
        self.spawn_call(async move {
            let result = api.enter_map(character, map).await;
            Some(Command::MapEntered {
                character,
                map,
                ticket,
                result,
                reply,
            })
        });
    }

    fn on_map_entered(
        &mut self,
        character: CharacterId,
        map: MapId,
        ticket: u64,
        result: std::result::Result<Option<CharacterSnapshot>, TransportError>,
    ) -> Result<()> {
        if !self.is_current(character) {
            return Err(RuntimeError::CharacterChanged {
                expected: character,
                current: self.current_character(),
            });
        }

        let wanted = self.active_mut()?.session.take_resume(ticket);
        match result {
            Ok(snapshot) if !wanted => {
                // stopped (or superseded) while the map was loading
                let active = self.active_mut()?;
                let depleted = snapshot
                    .as_ref()
                    .and_then(|snapshot| active.session.apply_character(snapshot));
                info!(%character, %map, "entered map, auto-combat not resumed");
                if let Some(change) = depleted {
                    self.publish_phase(character, change);
                }
                Ok(())
            }
            Ok(snapshot) => {
                let active = self.active_mut()?;
                let intent = active.session.resume();
                let depleted = snapshot
                    .as_ref()
                    .and_then(|snapshot| active.session.apply_character(snapshot));

                info!(%character, %map, "entered map, auto-combat resumed");
                for change in [intent.phase_change, depleted].into_iter().flatten() {
                    self.publish_phase(character, change);
                }
                Ok(())
            }
            Err(error) => {
                self.apply_failure(&error);
                Err(error.into())
            }
        }
    }

    fn on_start_finished(
        &mut self,
        character: CharacterId,
        epoch: u64,
        result: std::result::Result<(), TransportError>,
    ) {
        let Err(error) = result else {
            debug!(%character, "server accepted combat start");
            return;
        };
        let current = self
            .active
            .as_ref()
            .filter(|active| active.session.character_id() == character)
            .is_some_and(|active| active.session.epoch() == epoch);
        if !current {
            debug!(%character, %error, "ignoring failure of a superseded start");
            return;
        }
        self.apply_failure(&error);
    }

    fn toggle_skill(&mut self, skill: SkillId) -> Result<bool> {
        let active = self.active_mut()?;
        let toggle = active.session.toggle_skill(skill);
        debug!(character = %toggle.character, %skill, enabled = toggle.enabled, "skill toggled");

        if toggle.fighting {
            let api = Arc::clone(&self.api);
            let enabled = toggle.enabled;
            tokio::spawn(async move {
                if let Err(error) = api
                    .update_skills(toggle.character, toggle.skill, &toggle.skills)
                    .await
                {
                    warn!(character = %toggle.character, skill = %toggle.skill, %error, "skill sync failed");
                }
            });
            return Ok(enabled);
        }
        Ok(toggle.enabled)
    }

    fn apply_round(&mut self, resolution: RoundResolution, source: RoundSource) {
        let now = Instant::now().into_std();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let character = active.session.character_id();

        match active.session.apply_round(resolution, source, now) {
            RoundApplication::Duplicate(round_id) => {
                trace!(%character, %round_id, %source, "duplicate round dropped");
            }
            RoundApplication::Suppressed => {
                debug!(%character, %source, "id-less round suppressed");
            }
            RoundApplication::Admitted(admitted) => {
                active.cooldowns.on_round_admitted(&admitted.record, now);
                debug!(
                    %character,
                    round_id = ?admitted.record.round_id,
                    %source,
                    victory = admitted.record.victory,
                    "round admitted"
                );

                self.event_bus
                    .publish(Event::Combat(CombatEvent::RoundAdmitted {
                        character,
                        round_id: admitted.record.round_id,
                        source,
                    }));
                if let Some(change) = admitted.phase_change {
                    self.publish_phase(character, change);
                }
                if admitted.inventory_refresh {
                    self.event_bus
                        .publish(Event::Combat(CombatEvent::InventoryRefreshRequested {
                            character,
                        }));
                }
                self.event_bus
                    .publish(Event::Notification(admitted.notification));
            }
        }
    }

    fn apply_push(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::RoundResolved(resolution) => {
                self.apply_round(resolution, RoundSource::Push);
            }
            ServerEvent::LootDropped(loot) => {
                if let Some(active) = self.active.as_mut() {
                    let notification = active.session.apply_loot(&loot);
                    self.event_bus.publish(Event::Notification(notification));
                }
            }
            ServerEvent::LevelUp(level_up) => {
                if let Some(active) = self.active.as_mut() {
                    let notification = active.session.apply_level_up(&level_up);
                    info!(character = %notification.character(), level = level_up.level, "level up");
                    self.event_bus.publish(Event::Notification(notification));
                }
            }
        }
    }

    fn apply_failure(&mut self, error: &TransportError) {
        let failure: ResolutionFailure = error.to_failure();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let character = active.session.character_id();

        match failure.class {
            FailureClass::Transient => warn!(%character, %error, "transient combat failure"),
            FailureClass::AuthoritativeStop => {
                info!(%character, current_hp = ?failure.current_hp, "server stopped auto-combat")
            }
            FailureClass::Malformed => warn!(%character, %error, "malformed combat response"),
        }

        let outcome = active.session.apply_failure(&failure);
        self.event_bus
            .publish(Event::Combat(CombatEvent::FailureReported {
                character,
                class: failure.class,
                message: failure.message,
            }));
        if let Some(change) = outcome.phase_change {
            self.publish_phase(character, change);
        }
        if let Some(notification) = outcome.notification {
            self.event_bus.publish(Event::Notification(notification));
        }
    }

    fn publish_phase(&self, character: CharacterId, change: PhaseChange) {
        self.event_bus
            .publish(Event::Combat(CombatEvent::PhaseChanged { character, change }));
    }

    /// Runs a server call off the worker and feeds its outcome back in.
    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Option<Command>> + Send + 'static,
    {
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let Some(command) = call.await else {
                return;
            };
            let Some(command_tx) = command_tx.upgrade() else {
                trace!("session worker gone, dropping call result");
                return;
            };
            if command_tx.send(command).await.is_err() {
                trace!("session worker gone, dropping call result");
            }
        });
    }

    /// Publishes the snapshot and the derived watches after every command.
    fn sync(&mut self) {
        let now = Instant::now();
        let snapshot = self.active.as_mut().map(|active| {
            let cooldowns = active.cooldowns.refresh(now.into_std());
            active.session.snapshot(cooldowns)
        });

        let cooling = self
            .active
            .as_ref()
            .is_some_and(|active| active.cooldowns.is_active());
        match (cooling, self.cooldown_ticker.is_some()) {
            (true, false) => {
                let period = self.config.cooldown_refresh_interval;
                let mut ticker = time::interval_at(now + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.cooldown_ticker = Some(ticker);
            }
            (false, true) => self.cooldown_ticker = None,
            _ => {}
        }

        let polling = self
            .active
            .as_ref()
            .filter(|active| active.session.polls())
            .map(|active| active.session.character_id());
        let character = self.current_character();

        replace_if_changed(&self.channels.polling, polling);
        replace_if_changed(&self.channels.character, character);
        self.channels.snapshot.send_replace(snapshot);
    }
}

fn replace_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) {
    tx.send_if_modified(|current| {
        if *current == value {
            return false;
        }
        *current = value;
        true
    });
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
