//! WebSocket push transport.
//!
//! One connection per subscription: [`PusherTransport::subscribe`] connects,
//! waits for the handshake, subscribes to `game.{id}` and hands the frames to
//! a pump task. [`PusherTransport::unsubscribe`] tells the pump to leave the
//! channel and waits until the socket is closed.
use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use combat_core::CharacterId;
use combat_runtime::{PushFrame, PushSubscription, PushTransport, TransportError};

use crate::config::TransportConfig;
use crate::protocol::{self, Inbound};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Result<T> = std::result::Result<T, TransportError>;

const FRAME_BUFFER: usize = 64;

struct Connection {
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// [`PushTransport`] speaking the Pusher protocol.
pub struct PusherTransport {
    config: TransportConfig,
    connections: Mutex<HashMap<CharacterId, Connection>>,
}

impl PusherTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    async fn open(&self, character: CharacterId) -> Result<Socket> {
        let url = self.config.socket_url();
        let (mut socket, _) = time::timeout(self.config.request_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(socket_error)?;

        let socket_id = time::timeout(self.config.request_timeout, handshake(&mut socket))
            .await
            .map_err(|_| TransportError::Timeout)??;
        debug!(%character, %socket_id, "push connection established");

        socket
            .send(Message::Text(protocol::subscribe(character)))
            .await
            .map_err(socket_error)?;
        Ok(socket)
    }

    async fn close(&self, character: CharacterId) {
        let Some(connection) = self.connections.lock().await.remove(&character) else {
            return;
        };
        let _ = connection.close_tx.send(());
        match time::timeout(self.config.request_timeout, connection.task).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(%character, %error, "push pump task failed"),
            Err(_) => warn!(%character, "push connection did not close in time"),
        }
    }
}

#[async_trait]
impl PushTransport for PusherTransport {
    async fn subscribe(&self, character: CharacterId) -> Result<PushSubscription> {
        // a leftover socket for the same channel would deliver every frame twice
        self.close(character).await;

        let socket = self.open(character).await?;
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(pump(socket, character, frames_tx, close_rx));

        self.connections
            .lock()
            .await
            .insert(character, Connection { close_tx, task });
        info!(channel = %protocol::channel_name(character), "subscribed");
        Ok(PushSubscription::new(character, frames_rx))
    }

    async fn unsubscribe(&self, subscription: PushSubscription) -> Result<()> {
        let character = subscription.character;
        drop(subscription);
        self.close(character).await;
        Ok(())
    }
}

/// Reads frames until the server's handshake arrives.
async fn handshake(socket: &mut Socket) -> Result<String> {
    while let Some(message) = socket.next().await {
        let text = match message.map_err(socket_error)? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(TransportError::Closed),
            _ => continue,
        };
        match protocol::parse_frame(&text) {
            Ok(Inbound::ConnectionEstablished { socket_id }) => return Ok(socket_id),
            Ok(Inbound::Error { message }) => return Err(TransportError::Network(message)),
            Ok(other) => trace!(?other, "frame before handshake"),
            Err(error) => return Err(TransportError::Decode(error.to_string())),
        }
    }
    Err(TransportError::Closed)
}

/// Forwards channel events until closed from either side. Dropping
/// `frames_tx` on exit ends the subscription stream.
async fn pump(
    socket: Socket,
    character: CharacterId,
    frames_tx: mpsc::Sender<PushFrame>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                if let Err(error) = sink.send(Message::Text(protocol::unsubscribe(character))).await {
                    debug!(%character, %error, "unsubscribe frame not sent");
                }
                let _ = sink.close().await;
                break;
            }
            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        debug!(%character, ?frame, "server closed push connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        warn!(%character, %error, "push connection error");
                        break;
                    }
                    None => break,
                };

                match protocol::parse_frame(&text) {
                    Ok(Inbound::Event { channel, event, data }) => {
                        let Some(source) = protocol::character_of(&channel) else {
                            trace!(%channel, %event, "event on foreign channel");
                            continue;
                        };
                        let frame = PushFrame { character: source, event, data };
                        if frames_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(Inbound::Ping) => {
                        if let Err(error) = sink.send(Message::Text(protocol::pong())).await {
                            warn!(%character, %error, "pong failed");
                            break;
                        }
                    }
                    Ok(Inbound::SubscriptionSucceeded { channel }) => {
                        debug!(%channel, "subscription confirmed");
                    }
                    Ok(Inbound::Error { message }) => {
                        warn!(%character, %message, "broadcaster reported an error");
                    }
                    Ok(other) => trace!(?other, "protocol frame ignored"),
                    Err(error) => warn!(%character, %error, "unparseable push frame"),
                }
            }
        }
    }

    debug!(%character, "push pump stopped");
}

fn socket_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::Network(other.to_string()),
    }
}
