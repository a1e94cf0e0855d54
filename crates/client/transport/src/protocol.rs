//! Pusher wire protocol, as spoken by the game's broadcaster.
//!
//! Frames are JSON objects `{event, channel?, data}`. `data` is usually a
//! JSON document encoded as a string, but some servers send it inline; both
//! forms are normalized to a string here.
use serde::Deserialize;
use serde_json::{Value, json};

use combat_core::CharacterId;

const CHANNEL_PREFIX: &str = "game.";

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Established {
    socket_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorData {
    message: Option<String>,
    code: Option<u16>,
}

/// Decoded server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    ConnectionEstablished { socket_id: String },
    SubscriptionSucceeded { channel: String },
    Ping,
    Error { message: String },
    /// Application event on a channel. `data` is still undecoded JSON.
    Event {
        channel: String,
        event: String,
        data: String,
    },
    /// Protocol frame this client does not act on.
    Other(String),
}

pub fn parse_frame(text: &str) -> serde_json::Result<Inbound> {
    let frame: RawFrame = serde_json::from_str(text)?;
    let data = into_text(frame.data);

    let inbound = match frame.event.as_str() {
        "pusher:connection_established" => {
            let established: Established = serde_json::from_str(&data)?;
            Inbound::ConnectionEstablished {
                socket_id: established.socket_id,
            }
        }
        "pusher_internal:subscription_succeeded" => Inbound::SubscriptionSucceeded {
            channel: frame.channel.unwrap_or_default(),
        },
        "pusher:ping" => Inbound::Ping,
        "pusher:error" => {
            let error: ErrorData = serde_json::from_str(&data).unwrap_or_default();
            let message = error.message.unwrap_or_else(|| "unknown error".to_string());
            Inbound::Error {
                message: match error.code {
                    Some(code) => format!("{message} ({code})"),
                    None => message,
                },
            }
        }
        name if name.starts_with("pusher") => Inbound::Other(frame.event),
        _ => match frame.channel {
            Some(channel) => Inbound::Event {
                channel,
                event: frame.event,
                data,
            },
            None => Inbound::Other(frame.event),
        },
    };
    Ok(inbound)
}

fn into_text(data: Value) -> String {
    match data {
        Value::String(text) => text,
        Value::Null => String::from("{}"),
        other => other.to_string(),
    }
}

pub fn channel_name(character: CharacterId) -> String {
    format!("{CHANNEL_PREFIX}{character}")
}

/// Character a `game.{id}` channel belongs to.
pub fn character_of(channel: &str) -> Option<CharacterId> {
    channel
        .strip_prefix(CHANNEL_PREFIX)?
        .parse::<u64>()
        .ok()
        .map(CharacterId)
}

pub fn subscribe(character: CharacterId) -> String {
    json!({
        "event": "pusher:subscribe",
        "data": {"channel": channel_name(character)},
    })
    .to_string()
}

pub fn unsubscribe(character: CharacterId) -> String {
    json!({
        "event": "pusher:unsubscribe",
        "data": {"channel": channel_name(character)},
    })
    .to_string()
}

pub fn pong() -> String {
    json!({"event": "pusher:pong", "data": {}}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_carries_socket_id_in_string_data() {
        let text = r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"123.456\",\"activity_timeout\":30}"}"#;
        assert_eq!(
            parse_frame(text).unwrap(),
            Inbound::ConnectionEstablished {
                socket_id: "123.456".into()
            }
        );
    }

    #[test]
    fn channel_event_keeps_raw_payload() {
        let text = r#"{"event":"combat.update","channel":"game.42","data":"{\"combat_log_id\":7}"}"#;
        let Inbound::Event {
            channel,
            event,
            data,
        } = parse_frame(text).unwrap()
        else {
            panic!("expected channel event");
        };
        assert_eq!(character_of(&channel), Some(CharacterId(42)));
        assert_eq!(event, "combat.update");
        assert_eq!(data, r#"{"combat_log_id":7}"#);
    }

    #[test]
    fn inline_object_data_is_normalized() {
        let text = r#"{"event":"level.up","channel":"game.1","data":{"level":3}}"#;
        let Inbound::Event { data, .. } = parse_frame(text).unwrap() else {
            panic!("expected channel event");
        };
        let value: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(value["level"], 3);
    }

    #[test]
    fn protocol_frames() {
        assert_eq!(
            parse_frame(r#"{"event":"pusher:ping","data":{}}"#).unwrap(),
            Inbound::Ping
        );
        assert_eq!(
            parse_frame(r#"{"event":"pusher:error","data":{"message":"Over capacity","code":4100}}"#)
                .unwrap(),
            Inbound::Error {
                message: "Over capacity (4100)".into()
            }
        );
        assert!(matches!(
            parse_frame(r#"{"event":"pusher_internal:subscription_succeeded","channel":"game.9"}"#)
                .unwrap(),
            Inbound::SubscriptionSucceeded { channel } if channel == "game.9"
        ));
        assert!(parse_frame("not json").is_err());
    }

    #[test]
    fn channel_names_round_trip() {
        assert_eq!(channel_name(CharacterId(5)), "game.5");
        assert_eq!(character_of("game.5"), Some(CharacterId(5)));
        assert_eq!(character_of("private-game.5"), None);
        assert_eq!(character_of("game.abc"), None);

        let frame: Value = serde_json::from_str(&subscribe(CharacterId(5))).unwrap();
        assert_eq!(frame["event"], "pusher:subscribe");
        assert_eq!(frame["data"]["channel"], "game.5");
    }
}
