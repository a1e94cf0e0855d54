//! Scripted transports and helpers shared by the runtime integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Notify, mpsc, oneshot};

use combat_core::{
    CharacterId, CharacterSnapshot, MapId, RoundId, RoundRecord, RoundResolution,
    SessionSnapshot, SkillDefinition, SkillId, SkillUsage,
};
use combat_runtime::{
    CombatApi, CombatRuntime, PushFrame, PushSubscription, PushTransport, RuntimeConfig,
    SessionHandle, TransportError,
};

pub const HERO: CharacterId = CharacterId(42);
pub const ALT: CharacterId = CharacterId(7);
pub const WAIT: Duration = Duration::from_secs(120);

// ============================================================================
// Record builders
// ============================================================================

pub fn snapshot(character: CharacterId, hp: i64) -> CharacterSnapshot {
    let mut snapshot = CharacterSnapshot::new(character);
    snapshot.current_hp = Some(hp);
    snapshot.max_hp = Some(100);
    snapshot
}

pub fn victory(id: u64, hp: i64) -> RoundResolution {
    let mut record = RoundRecord::new(Some(RoundId(id)));
    record.victory = true;
    record.damage_dealt = 12;
    record.resulting_hp = Some(hp);
    RoundResolution::new(record)
}

pub fn defeat(id: u64) -> RoundResolution {
    let mut record = RoundRecord::new(Some(RoundId(id)));
    record.defeat = true;
    record.auto_stopped = true;
    record.damage_taken = 30;
    record.resulting_hp = Some(0);
    RoundResolution::new(record)
}

pub fn using_skill(mut resolution: RoundResolution, skill: u64) -> RoundResolution {
    resolution.record.skills_used.push(SkillUsage {
        skill_id: SkillId(skill),
        name: format!("skill-{skill}"),
        use_count: 1,
    });
    resolution
}

pub fn skill(id: u64, cooldown_rounds: u32) -> SkillDefinition {
    SkillDefinition {
        id: SkillId(id),
        name: format!("skill-{id}"),
        active: true,
        learned: true,
        cooldown_rounds,
    }
}

/// `combat.update` payload as the broadcaster sends it.
pub fn combat_update(combat_log_id: u64, character: CharacterId, hp: i64) -> String {
    json!({
        "victory": true,
        "monster": {"name": "Zombie", "type": "normal", "level": 2},
        "damage_dealt": 12,
        "damage_taken": 3,
        "experience_gained": 5,
        "copper_gained": 2,
        "loot": {"copper": 2},
        "character": {"id": character.0, "current_hp": hp},
        "combat_log_id": combat_log_id,
    })
    .to_string()
}

pub fn auto_stop_rejection() -> TransportError {
    TransportError::Rejected {
        status: 400,
        message: "HP too low, auto-combat stopped".into(),
        auto_stopped: true,
        current_hp: Some(0),
    }
}

// ============================================================================
// Scripted combat API
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Start {
        character: CharacterId,
        skills: Vec<SkillId>,
    },
    Resolve {
        character: CharacterId,
        skills: Vec<SkillId>,
    },
    Stop {
        character: CharacterId,
    },
    UpdateSkills {
        character: CharacterId,
        skill: SkillId,
        skills: Vec<SkillId>,
    },
    EnterMap {
        character: CharacterId,
        map: MapId,
    },
    FetchCharacter {
        character: CharacterId,
    },
    FetchSkills {
        character: CharacterId,
    },
}

type Resolution = Result<RoundResolution, TransportError>;
type MapEntry = Result<Option<CharacterSnapshot>, TransportError>;

enum Scripted<T> {
    Ready(T),
    Gated(oneshot::Receiver<T>),
}

impl<T> Scripted<T> {
    fn gated() -> (Gate<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Gate(tx), Scripted::Gated(rx))
    }

    async fn resolve(self) -> Result<T, TransportError> {
        match self {
            Scripted::Ready(result) => Ok(result),
            Scripted::Gated(rx) => rx.await.map_err(|_| TransportError::Closed),
        }
    }
}

/// Releases a gated call.
pub struct Gate<T>(oneshot::Sender<T>);

impl<T> Gate<T> {
    pub fn release(self, result: T) {
        let _ = self.0.send(result);
    }
}

#[derive(Default)]
struct ApiState {
    resolutions: Mutex<VecDeque<Scripted<Resolution>>>,
    enter_map: Mutex<VecDeque<Scripted<MapEntry>>>,
    start_failures: Mutex<VecDeque<TransportError>>,
    calls: Mutex<Vec<ApiCall>>,
    notify: Notify,
}

/// In-memory backend. Unscripted resolution calls time out, which the
/// session treats as a transient failure.
#[derive(Clone, Default)]
pub struct MockApi {
    state: Arc<ApiState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, result: Resolution) -> &Self {
        self.state
            .resolutions
            .lock()
            .unwrap()
            .push_back(Scripted::Ready(result));
        self
    }

    pub fn script_round(&self, resolution: RoundResolution) -> &Self {
        self.script(Ok(resolution))
    }

    /// Queues a resolution call that blocks until the gate is released.
    pub fn script_gated(&self) -> Gate<Resolution> {
        let (gate, scripted) = Scripted::gated();
        self.state.resolutions.lock().unwrap().push_back(scripted);
        gate
    }

    pub fn script_enter_map(&self, result: MapEntry) {
        self.state
            .enter_map
            .lock()
            .unwrap()
            .push_back(Scripted::Ready(result));
    }

    /// Queues a map entry that blocks until the gate is released.
    pub fn script_enter_map_gated(&self) -> Gate<MapEntry> {
        let (gate, scripted) = Scripted::gated();
        self.state.enter_map.lock().unwrap().push_back(scripted);
        gate
    }

    pub fn fail_next_start(&self, error: TransportError) {
        self.state.start_failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn resolve_calls(&self) -> usize {
        self.count(|call| matches!(call, ApiCall::Resolve { .. }))
    }

    pub fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.state.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Waits until `pred` holds for the recorded calls.
    pub async fn wait_for_calls(&self, pred: impl Fn(&[ApiCall]) -> bool) {
        let wait = async {
            loop {
                let notified = self.state.notify.notified();
                if pred(&self.state.calls.lock().unwrap()) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(WAIT, wait)
            .await
            .expect("timed out waiting for api calls");
    }

    fn record(&self, call: ApiCall) {
        self.state.calls.lock().unwrap().push(call);
        self.state.notify.notify_waiters();
    }
}

#[async_trait]
impl CombatApi for MockApi {
    async fn start_combat(
        &self,
        character: CharacterId,
        skills: &[SkillId],
    ) -> Result<(), TransportError> {
        self.record(ApiCall::Start {
            character,
            skills: skills.to_vec(),
        });
        match self.state.start_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn resolve_round(
        &self,
        character: CharacterId,
        skills: &[SkillId],
    ) -> Result<RoundResolution, TransportError> {
        self.record(ApiCall::Resolve {
            character,
            skills: skills.to_vec(),
        });
        let next = self.state.resolutions.lock().unwrap().pop_front();
        match next {
            Some(scripted) => scripted.resolve().await?,
            None => Err(TransportError::Timeout),
        }
    }

    async fn stop_combat(&self, character: CharacterId) -> Result<(), TransportError> {
        self.record(ApiCall::Stop { character });
        Ok(())
    }

    async fn update_skills(
        &self,
        character: CharacterId,
        skill: SkillId,
        skills: &[SkillId],
    ) -> Result<(), TransportError> {
        self.record(ApiCall::UpdateSkills {
            character,
            skill,
            skills: skills.to_vec(),
        });
        Ok(())
    }

    async fn enter_map(
        &self,
        character: CharacterId,
        map: MapId,
    ) -> Result<Option<CharacterSnapshot>, TransportError> {
        self.record(ApiCall::EnterMap { character, map });
        let next = self.state.enter_map.lock().unwrap().pop_front();
        match next {
            Some(scripted) => scripted.resolve().await?,
            None => Ok(None),
        }
    }

    async fn fetch_character(
        &self,
        character: CharacterId,
    ) -> Result<Option<CharacterSnapshot>, TransportError> {
        self.record(ApiCall::FetchCharacter { character });
        Ok(Some(snapshot(character, 100)))
    }

    async fn fetch_skills(
        &self,
        character: CharacterId,
    ) -> Result<Vec<SkillDefinition>, TransportError> {
        self.record(ApiCall::FetchSkills { character });
        Ok(Vec::new())
    }
}

// ============================================================================
// Scripted push transport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushCall {
    Subscribe(CharacterId),
    Unsubscribe(CharacterId),
}

#[derive(Default)]
struct PushState {
    channels: Mutex<HashMap<CharacterId, mpsc::Sender<PushFrame>>>,
    failures: Mutex<u32>,
    calls: Mutex<Vec<PushCall>>,
    notify: Notify,
}

#[derive(Clone, Default)]
pub struct MockPush {
    state: Arc<PushState>,
}

impl MockPush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_subscribes(&self, count: u32) {
        *self.state.failures.lock().unwrap() = count;
    }

    pub fn calls(&self) -> Vec<PushCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub async fn wait_for_calls(&self, pred: impl Fn(&[PushCall]) -> bool) {
        let wait = async {
            loop {
                let notified = self.state.notify.notified();
                if pred(&self.state.calls.lock().unwrap()) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(WAIT, wait)
            .await
            .expect("timed out waiting for push calls");
    }

    pub async fn wait_subscribed(&self, character: CharacterId, times: usize) {
        self.wait_for_calls(|calls| {
            calls
                .iter()
                .filter(|call| **call == PushCall::Subscribe(character))
                .count()
                >= times
        })
        .await;
    }

    /// Delivers an event on `character`'s channel.
    pub async fn push(&self, character: CharacterId, event: &str, data: String) {
        self.push_tagged(character, character, event, data).await;
    }

    /// Delivers an event on `channel` tagged as coming from `tag`.
    pub async fn push_tagged(
        &self,
        channel: CharacterId,
        tag: CharacterId,
        event: &str,
        data: String,
    ) {
        let sender = self
            .state
            .channels
            .lock()
            .unwrap()
            .get(&channel)
            .cloned()
            .expect("channel not subscribed");
        sender
            .send(PushFrame {
                character: tag,
                event: event.to_string(),
                data,
            })
            .await
            .expect("subscriber gone");
    }

    /// Simulates a dropped connection.
    pub fn disconnect(&self, character: CharacterId) {
        self.state.channels.lock().unwrap().remove(&character);
    }

    fn record(&self, call: PushCall) {
        self.state.calls.lock().unwrap().push(call);
        self.state.notify.notify_waiters();
    }
}

#[async_trait]
impl PushTransport for MockPush {
    async fn subscribe(&self, character: CharacterId) -> Result<PushSubscription, TransportError> {
        self.record(PushCall::Subscribe(character));
        {
            let mut failures = self.state.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Network("connection refused".into()));
            }
        }

        let (tx, rx) = mpsc::channel(16);
        self.state.channels.lock().unwrap().insert(character, tx);
        Ok(PushSubscription::new(character, rx))
    }

    async fn unsubscribe(&self, subscription: PushSubscription) -> Result<(), TransportError> {
        self.state
            .channels
            .lock()
            .unwrap()
            .remove(&subscription.character);
        self.record(PushCall::Unsubscribe(subscription.character));
        Ok(())
    }
}

// ============================================================================
// Runtime helpers
// ============================================================================

pub fn runtime(api: &MockApi, push: Option<&MockPush>) -> CombatRuntime {
    let mut builder = CombatRuntime::builder()
        .config(RuntimeConfig::default())
        .api(api.clone());
    if let Some(push) = push {
        builder = builder.push_transport(push.clone());
    }
    builder.build().expect("runtime should build")
}

/// Waits until the published snapshot satisfies `pred`.
pub async fn wait_until(
    handle: &SessionHandle,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = handle.watch();
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(|s| s.as_ref().is_some_and(&pred)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session worker stopped")
        .clone();
    snapshot.expect("snapshot present")
}

pub fn log_ids(snapshot: &SessionSnapshot) -> Vec<u64> {
    snapshot
        .log
        .iter()
        .filter_map(|entry| entry.record.round_id)
        .map(|id| id.0)
        .collect()
}
