//! Polling driver: issues one resolution call per tick while armed.
//!
//! The first call goes out one full interval after arming, never at once.
//!
//! Ticks never overlap: the next call is only issued after the previous one
//! reported back, and missed ticks are skipped rather than bunched. The arm
//! condition is re-checked by the session worker at the start of every call,
//! so a stop that lands between the tick and the call wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use combat_core::CharacterId;

use super::session::Command;
use crate::api::CombatApi;

pub struct PollingWorker {
    api: Arc<dyn CombatApi>,
    command_tx: mpsc::Sender<Command>,
    armed_rx: watch::Receiver<Option<CharacterId>>,
    poll_interval: Duration,
}

impl PollingWorker {
    pub fn new(
        api: Arc<dyn CombatApi>,
        command_tx: mpsc::Sender<Command>,
        armed_rx: watch::Receiver<Option<CharacterId>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            command_tx,
            armed_rx,
            poll_interval,
        }
    }

    /// Main worker loop. Ends when the session worker goes away.
    pub async fn run(mut self) {
        loop {
            if self.armed_rx.wait_for(Option::is_some).await.is_err() {
                break;
            }
            debug!("polling armed");

            let first = Instant::now() + self.poll_interval;
            let mut ticker = time::interval_at(first, self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !self.poll_once().await {
                            debug!("polling worker stopped");
                            return;
                        }
                    }
                    changed = self.armed_rx.changed() => {
                        if changed.is_err() {
                            debug!("polling worker stopped");
                            return;
                        }
                        if self.armed_rx.borrow_and_update().is_none() {
                            debug!("polling disarmed");
                            break;
                        }
                    }
                }
            }
        }

        debug!("polling worker stopped");
    }

    /// Returns false once the session worker is unreachable.
    async fn poll_once(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::BeginResolution { reply: reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        let Ok(ticket) = reply_rx.await else {
            return false;
        };
        let Some(intent) = ticket else {
            trace!("tick skipped, polling no longer armed");
            return true;
        };

        trace!(character = %intent.character, skills = ?intent.skills, "resolving round");
        let result = self
            .api
            .resolve_round(intent.character, &intent.skills)
            .await;

        self.command_tx
            .send(Command::ResolutionFinished {
                character: intent.character,
                result,
            })
            .await
            .is_ok()
    }
}
