//! JSON API client for the combat backend.
//!
//! Every call is a POST or GET against the game API with the selected
//! character in the body or query. Response bodies are handed to
//! `combat_core::wire` so HTTP and push share one normalization path.
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::{debug, trace};

use combat_core::{
    CharacterId, CharacterSnapshot, MapId, RoundResolution, SkillDefinition, SkillId, WireError,
    wire,
};
use combat_runtime::{CombatApi, TransportError};

use crate::config::TransportConfig;

type Result<T> = std::result::Result<T, TransportError>;

#[derive(Serialize)]
struct CharacterBody {
    character_id: CharacterId,
}

#[derive(Serialize)]
struct CombatBody<'a> {
    character_id: CharacterId,
    #[serde(skip_serializing_if = "<[SkillId]>::is_empty")]
    skill_ids: &'a [SkillId],
}

#[derive(Serialize)]
struct SkillSyncBody<'a> {
    character_id: CharacterId,
    skill_id: SkillId,
    skill_ids: &'a [SkillId],
}

/// [`CombatApi`] over HTTP.
pub struct HttpCombatApi {
    config: TransportConfig,
    client: reqwest::Client,
}

impl HttpCombatApi {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| TransportError::Network(error.to_string()))?;
        Ok(Self { config, client })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, self.config.endpoint(path))
            .header(ACCEPT, "application/json")
            .header("X-Requested-With", "XMLHttpRequest");
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>> {
        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(request_error)?;
        trace!(%status, bytes = body.len(), "api response");

        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(rejection(status, &body))
        }
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<Vec<u8>> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn get(&self, path: &str, character: CharacterId) -> Result<Vec<u8>> {
        self.send(
            self.request(Method::GET, path)
                .query(&[("character_id", character.0)]),
        )
        .await
    }
}

#[async_trait]
impl CombatApi for HttpCombatApi {
    async fn start_combat(&self, character: CharacterId, skills: &[SkillId]) -> Result<()> {
        debug!(%character, ?skills, "POST combat/start");
        self.post(
            "rpg/combat/start",
            &CombatBody {
                character_id: character,
                skill_ids: skills,
            },
        )
        .await
        .map(drop)
    }

    async fn resolve_round(
        &self,
        character: CharacterId,
        skills: &[SkillId],
    ) -> Result<RoundResolution> {
        let body = self
            .post(
                "rpg/combat/execute",
                &CombatBody {
                    character_id: character,
                    skill_ids: skills,
                },
            )
            .await?;
        wire::decode_resolution(&body).map_err(decode_error)
    }

    async fn stop_combat(&self, character: CharacterId) -> Result<()> {
        debug!(%character, "POST combat/stop");
        self.post(
            "rpg/combat/stop",
            &CharacterBody {
                character_id: character,
            },
        )
        .await
        .map(drop)
    }

    async fn update_skills(
        &self,
        character: CharacterId,
        skill: SkillId,
        skills: &[SkillId],
    ) -> Result<()> {
        self.post(
            "rpg/combat/skills",
            &SkillSyncBody {
                character_id: character,
                skill_id: skill,
                skill_ids: skills,
            },
        )
        .await
        .map(drop)
    }

    async fn enter_map(
        &self,
        character: CharacterId,
        map: MapId,
    ) -> Result<Option<CharacterSnapshot>> {
        debug!(%character, %map, "POST maps/enter");
        let body = self
            .post(
                &format!("rpg/maps/{map}/enter"),
                &CharacterBody {
                    character_id: character,
                },
            )
            .await?;
        wire::decode_enter_map(&body).map_err(decode_error)
    }

    async fn fetch_character(&self, character: CharacterId) -> Result<Option<CharacterSnapshot>> {
        let body = self.get("rpg/character", character).await?;
        wire::decode_character(&body).map_err(decode_error)
    }

    async fn fetch_skills(&self, character: CharacterId) -> Result<Vec<SkillDefinition>> {
        let body = self.get("rpg/skills", character).await?;
        wire::decode_skills(&body).map_err(decode_error)
    }
}

fn request_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(error.to_string())
    }
}

fn decode_error(error: WireError) -> TransportError {
    TransportError::Decode(error.to_string())
}

/// Maps a non-success response, keeping the auto-stop report if present.
fn rejection(status: StatusCode, body: &[u8]) -> TransportError {
    let parsed = wire::decode_error_body(body).unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .map_or_else(|| format!("request failed ({})", status.as_u16()), str::to_string)
    });

    TransportError::Rejected {
        status: status.as_u16(),
        message,
        auto_stopped: parsed.auto_stopped,
        current_hp: parsed.current_hp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_stop_body_is_preserved() {
        let body = br#"{"message": "HP depleted", "auto_stopped": true, "current_hp": 0}"#;
        let error = rejection(StatusCode::BAD_REQUEST, body);
        let TransportError::Rejected {
            status,
            message,
            auto_stopped,
            current_hp,
        } = error
        else {
            panic!("expected rejection");
        };
        assert_eq!(status, 400);
        assert_eq!(message, "HP depleted");
        assert!(auto_stopped);
        assert_eq!(current_hp, Some(0));
    }

    #[test]
    fn non_json_rejection_uses_status_text() {
        let error = rejection(StatusCode::BAD_GATEWAY, b"<html>upstream</html>");
        assert!(matches!(
            error,
            TransportError::Rejected {
                status: 502,
                auto_stopped: false,
                ref message,
                ..
            } if message == "Bad Gateway"
        ));
    }

    #[test]
    fn empty_skill_list_is_omitted() {
        let body = serde_json::to_value(CombatBody {
            character_id: CharacterId(3),
            skill_ids: &[],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"character_id": 3}));

        let body = serde_json::to_value(CombatBody {
            character_id: CharacterId(3),
            skill_ids: &[SkillId(1), SkillId(4)],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"character_id": 3, "skill_ids": [1, 4]}));
    }
}
