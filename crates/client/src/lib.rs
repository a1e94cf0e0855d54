//! Headless auto-combat client.
//!
//! # Architecture
//!
//! ```text
//! Client (composition root)
//!   ├─→ CombatRuntime (session worker, polling driver, push adapter)
//!   ├─→ HttpCombatApi (request/response seam)
//!   └─→ PusherTransport (optional push seam)
//! ```
//!
//! The client selects the configured character, loads its skills, starts
//! fighting and reports events until interrupted. Everything it does goes
//! through [`SessionHandle`], the same surface a UI would use.

mod builder;
pub mod config;
pub mod logging;

pub use builder::ClientBuilder;
pub use config::{ClientConfig, SessionPlan};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use combat_core::{CharacterId, Notification, RoundNotice, SessionPhase, SkillId};
use combat_runtime::{
    CombatApi, CombatEvent, CombatRuntime, ConnectionEvent, Event, SessionHandle, Topic,
};

/// How long shutdown waits for the server to confirm a stop.
const STOP_ACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Top-level client container.
pub struct Client {
    runtime: CombatRuntime,
    api: Arc<dyn CombatApi>,
    plan: SessionPlan,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Runs the session until `shutdown` resolves, then stops combat and
    /// winds the runtime down.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let handle = self.runtime.handle();
        let reporter = tokio::spawn(report_events(handle.clone()));

        let session = match self.plan.character {
            Some(character) => prepare(&handle, self.api.as_ref(), character, &self.plan).await,
            None => Err(anyhow!("no character configured (set COMBAT_CHARACTER_ID)")),
        };

        match session {
            Ok(()) => shutdown.await,
            Err(error) => warn!("could not start auto-combat: {error:#}"),
        }

        if handle.stop().await.unwrap_or(false) {
            wait_for_stop(&handle).await;
        }
        reporter.abort();
        self.runtime
            .shutdown()
            .await
            .context("runtime did not shut down cleanly")
    }
}

async fn prepare(
    handle: &SessionHandle,
    api: &dyn CombatApi,
    character: CharacterId,
    plan: &SessionPlan,
) -> Result<()> {
    let snapshot = match api.fetch_character(character).await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(%character, %error, "character fetch failed, continuing without snapshot");
            None
        }
    };
    let selected = handle.select_character(character, snapshot).await?;
    info!(
        %character,
        hp = ?selected.current_hp,
        max_hp = selected.current_max_hp,
        "character selected"
    );

    match api.fetch_skills(character).await {
        Ok(skills) => handle.load_skills(skills).await?,
        Err(error) => warn!(%character, %error, "skill catalog unavailable, using default cooldowns"),
    }
    if !plan.skills.is_empty() {
        apply_skill_plan(handle, &plan.skills).await?;
    }

    match plan.map {
        Some(map) => handle
            .resume(map)
            .await
            .with_context(|| format!("failed to enter map {map}"))?,
        None => handle.start().await.context("failed to start auto-combat")?,
    }
    Ok(())
}

/// Waits until the server call behind a stop has been acknowledged.
async fn wait_for_stop(handle: &SessionHandle) {
    let mut snapshots = handle.watch();
    let settled = snapshots.wait_for(|snapshot| {
        snapshot
            .as_ref()
            .is_none_or(|snapshot| snapshot.phase != SessionPhase::Stopping)
    });
    match tokio::time::timeout(STOP_ACK_TIMEOUT, settled).await {
        Ok(Ok(_)) => info!("auto-combat stopped"),
        Ok(Err(_)) => debug!("session worker gone before the stop was acknowledged"),
        Err(_) => warn!(timeout = ?STOP_ACK_TIMEOUT, "server did not acknowledge the stop"),
    }
}

/// Toggles skills until exactly `wanted` is enabled.
async fn apply_skill_plan(handle: &SessionHandle, wanted: &[SkillId]) -> Result<()> {
    let wanted: BTreeSet<SkillId> = wanted.iter().copied().collect();
    let enabled: BTreeSet<SkillId> = handle
        .snapshot()
        .map(|snapshot| snapshot.enabled_skills.into_iter().collect())
        .unwrap_or_default();

    for skill in enabled.symmetric_difference(&wanted) {
        handle.toggle_skill(*skill).await?;
    }
    debug!(skills = ?wanted, "skill plan applied");
    Ok(())
}

/// Logs what happens in the session until the runtime shuts down.
async fn report_events(handle: SessionHandle) {
    let mut combat = handle.subscribe(Topic::Combat);
    let mut notifications = handle.subscribe(Topic::Notification);
    let mut connection = handle.subscribe(Topic::Connection);

    loop {
        let event = tokio::select! {
            event = combat.recv() => event,
            event = notifications.recv() => event,
            event = connection.recv() => event,
        };
        match event {
            Ok(event) => report(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn report(event: &Event) {
    match event {
        Event::Notification(Notification::Round {
            round_id, notice, loot, ..
        }) => match notice {
            RoundNotice::Victory => info!(?round_id, ?loot, "victory"),
            RoundNotice::Defeat => warn!(?round_id, "defeated, auto-combat stopped"),
            RoundNotice::Hit => debug!(?round_id, "round resolved"),
        },
        Event::Notification(Notification::Defeated { message, .. }) => {
            warn!(%message, "auto-combat stopped by server");
        }
        Event::Notification(Notification::LootDropped { item, currency, .. }) => {
            info!(?item, currency, "loot dropped");
        }
        Event::Notification(Notification::LevelUp { level, .. }) => info!(level, "level up"),
        Event::Combat(CombatEvent::PhaseChanged { change, .. }) => {
            info!(from = %change.from, to = %change.to, "phase");
        }
        Event::Combat(CombatEvent::InventoryRefreshRequested { .. }) => {
            debug!("potion consumed, inventory is stale");
        }
        Event::Combat(CombatEvent::FailureReported { class, message, .. }) => {
            debug!(%class, %message, "failure reported");
        }
        Event::Combat(CombatEvent::RoundAdmitted { .. }) => {}
        Event::Connection(ConnectionEvent::SubscribeFailed { character, error }) => {
            warn!(%character, %error, "push subscribe failed");
        }
        Event::Connection(event) => debug!(character = %event.character(), ?event, "push channel"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use combat_core::{CharacterSnapshot, MapId, RoundResolution, SkillDefinition};
    use combat_runtime::TransportError;

    /// Backend whose stop call takes a while to answer.
    #[derive(Clone, Default)]
    struct SlowStopApi {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl SlowStopApi {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl CombatApi for SlowStopApi {
        async fn start_combat(
            &self,
            _character: CharacterId,
            _skills: &[SkillId],
        ) -> Result<(), TransportError> {
            self.record("start");
            Ok(())
        }

        async fn resolve_round(
            &self,
            _character: CharacterId,
            _skills: &[SkillId],
        ) -> Result<RoundResolution, TransportError> {
            Err(TransportError::Timeout)
        }

        async fn stop_combat(&self, _character: CharacterId) -> Result<(), TransportError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            self.record("stop");
            Ok(())
        }

        async fn update_skills(
            &self,
            _character: CharacterId,
            _skill: SkillId,
            _skills: &[SkillId],
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn enter_map(
            &self,
            _character: CharacterId,
            _map: MapId,
        ) -> Result<Option<CharacterSnapshot>, TransportError> {
            Ok(None)
        }

        async fn fetch_character(
            &self,
            _character: CharacterId,
        ) -> Result<Option<CharacterSnapshot>, TransportError> {
            Ok(None)
        }

        async fn fetch_skills(
            &self,
            _character: CharacterId,
        ) -> Result<Vec<SkillDefinition>, TransportError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_stop_call() {
        let api = SlowStopApi::default();
        let client = Client::builder()
            .api(api.clone())
            .plan(SessionPlan {
                character: Some(CharacterId(42)),
                ..SessionPlan::default()
            })
            .build()
            .unwrap();

        client.run(async {}).await.unwrap();

        assert!(api.calls.lock().unwrap().contains(&"stop"));
    }
}
