//! Push channel adapter: keeps one subscription for the selected character.
//!
//! Retargeting always unsubscribes the previous channel before subscribing
//! the next one, and every frame is checked against the character it was
//! subscribed for. Dropped connections are retried on a fixed interval; the
//! deduplicator absorbs anything replayed after a reconnect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use combat_core::{CharacterId, WireError, wire};

use super::session::Command;
use crate::api::{PushFrame, PushSubscription, PushTransport};
use crate::events::{ConnectionEvent, Event, EventBus};

pub struct PushWorker {
    transport: Arc<dyn PushTransport>,
    command_tx: mpsc::Sender<Command>,
    character_rx: watch::Receiver<Option<CharacterId>>,
    event_bus: EventBus,
    reconnect_interval: Duration,

    target: Option<CharacterId>,
    subscription: Option<PushSubscription>,
    reconnect_at: Option<Instant>,
}

impl PushWorker {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        command_tx: mpsc::Sender<Command>,
        character_rx: watch::Receiver<Option<CharacterId>>,
        event_bus: EventBus,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            transport,
            command_tx,
            character_rx,
            event_bus,
            reconnect_interval,
            target: None,
            subscription: None,
            reconnect_at: None,
        }
    }

    /// Main worker loop. Ends when the session worker goes away.
    pub async fn run(mut self) {
        let initial = *self.character_rx.borrow_and_update();
        self.retarget(initial).await;

        loop {
            tokio::select! {
                changed = self.character_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = *self.character_rx.borrow_and_update();
                    self.retarget(next).await;
                }
                frame = next_frame(&mut self.subscription) => match frame {
                    Some(frame) => {
                        if !self.dispatch(frame).await {
                            break;
                        }
                    }
                    None => self.on_disconnect(),
                },
                _ = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    if let Some(character) = self.target {
                        debug!(%character, "reconnecting push channel");
                        self.connect(character).await;
                    }
                }
            }
        }

        self.teardown().await;
        debug!("push worker stopped");
    }

    async fn retarget(&mut self, next: Option<CharacterId>) {
        if next == self.target {
            return;
        }
        self.teardown().await;
        self.target = next;
        self.reconnect_at = None;
        if let Some(character) = next {
            self.connect(character).await;
        }
    }

    async fn connect(&mut self, character: CharacterId) {
        match self.transport.subscribe(character).await {
            Ok(subscription) => {
                info!(%character, "push channel subscribed");
                self.subscription = Some(subscription);
                self.publish(ConnectionEvent::Subscribed { character });
            }
            Err(error) => {
                warn!(%character, %error, "push subscribe failed, retrying later");
                self.reconnect_at = Some(Instant::now() + self.reconnect_interval);
                self.publish(ConnectionEvent::SubscribeFailed {
                    character,
                    error: error.to_string(),
                });
            }
        }
    }

    /// Unsubscribes the current channel, if any, and waits for it.
    async fn teardown(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        let character = subscription.character;
        if let Err(error) = self.transport.unsubscribe(subscription).await {
            warn!(%character, %error, "push unsubscribe failed");
        }
        debug!(%character, "push channel unsubscribed");
        self.publish(ConnectionEvent::Unsubscribed { character });
    }

    fn on_disconnect(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        let character = subscription.character;
        warn!(%character, "push channel disconnected");
        self.publish(ConnectionEvent::Disconnected { character });
        if self.target == Some(character) {
            self.reconnect_at = Some(Instant::now() + self.reconnect_interval);
        }
    }

    /// Decodes a frame and forwards it. Returns false once the session
    /// worker is unreachable.
    async fn dispatch(&self, frame: PushFrame) -> bool {
        if self.target != Some(frame.character) {
            debug!(character = %frame.character, event = %frame.event, "dropping frame for another character");
            return true;
        }

        let event = match wire::decode_push(&frame.event, frame.data.as_bytes()) {
            Ok(event) => event,
            Err(WireError::UnknownEvent(name)) => {
                trace!(character = %frame.character, event = %name, "ignoring push event");
                return true;
            }
            Err(error) => {
                warn!(character = %frame.character, %error, "malformed push payload dropped");
                return true;
            }
        };

        self.command_tx
            .send(Command::Pushed {
                character: frame.character,
                event,
            })
            .await
            .is_ok()
    }

    fn publish(&self, event: ConnectionEvent) {
        self.event_bus.publish(Event::Connection(event));
    }
}

async fn next_frame(subscription: &mut Option<PushSubscription>) -> Option<PushFrame> {
    match subscription {
        Some(subscription) => subscription.frames.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
