//! Client configuration loaded from the process environment.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use client_transport::TransportConfig;
use combat_core::{CharacterId, MapId, SkillId};
use combat_runtime::RuntimeConfig;

/// Everything the binary needs to run one auto-combat session.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub runtime: RuntimeConfig,
    pub session: SessionPlan,
    pub enable_push: bool,
    pub log_dir: Option<PathBuf>,
}

/// What to do once connected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionPlan {
    pub character: Option<CharacterId>,
    /// Enter this map before fighting; otherwise fight where the character stands.
    pub map: Option<MapId>,
    /// Skills to enable. Empty keeps the learned active skills.
    pub skills: Vec<SkillId>,
}

impl ClientConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `COMBAT_API_URL` - Game API base URL (required)
    /// - `COMBAT_WS_URL` - Broadcaster WebSocket URL (required unless push is disabled)
    /// - `COMBAT_APP_KEY` - Broadcaster application key
    /// - `COMBAT_API_TOKEN` - Bearer token for API calls
    /// - `COMBAT_CHARACTER_ID` - Character to fight with
    /// - `COMBAT_MAP_ID` - Map to enter before fighting
    /// - `COMBAT_SKILL_IDS` - Comma-separated skill ids to enable
    /// - `COMBAT_POLL_INTERVAL_MS` - Resolution call period (default: 4000)
    /// - `COMBAT_RECONNECT_INTERVAL_MS` - Push reconnect delay (default: 5000)
    /// - `COMBAT_REQUEST_TIMEOUT_MS` - Per-request timeout (default: 10000)
    /// - `COMBAT_DISABLE_PUSH` - Poll only
    /// - `COMBAT_LOG_DIR` - Log directory (default: platform cache dir)
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("COMBAT_API_URL").context("COMBAT_API_URL is not set")?;

        let enable_push = cfg!(feature = "push") && !read_flag("COMBAT_DISABLE_PUSH");
        let ws_url = match env::var("COMBAT_WS_URL") {
            Ok(url) => url,
            Err(_) if !enable_push => String::new(),
            Err(_) => anyhow::bail!("COMBAT_WS_URL is not set (set COMBAT_DISABLE_PUSH to poll only)"),
        };
        let app_key = env::var("COMBAT_APP_KEY").unwrap_or_default();

        let mut transport = TransportConfig::new(api_url, ws_url, app_key);
        if let Ok(token) = env::var("COMBAT_API_TOKEN") {
            transport = transport.with_token(token);
        }
        if let Some(ms) = read_env::<u64>("COMBAT_REQUEST_TIMEOUT_MS") {
            transport = transport.with_request_timeout(Duration::from_millis(ms.max(1)));
        }

        let mut runtime = RuntimeConfig::default();
        if let Some(ms) = read_env::<u64>("COMBAT_POLL_INTERVAL_MS") {
            runtime.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = read_env::<u64>("COMBAT_RECONNECT_INTERVAL_MS") {
            runtime.reconnect_interval = Duration::from_millis(ms.max(1));
        }

        let skills = match env::var("COMBAT_SKILL_IDS") {
            Ok(list) => parse_ids(&list).context("COMBAT_SKILL_IDS must be comma-separated ids")?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            transport,
            runtime,
            session: SessionPlan {
                character: read_env::<u64>("COMBAT_CHARACTER_ID").map(CharacterId),
                map: read_env::<u64>("COMBAT_MAP_ID").map(MapId),
                skills,
            },
            enable_push,
            log_dir: env::var("COMBAT_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

fn parse_ids(list: &str) -> Result<Vec<SkillId>, std::num::ParseIntError> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| id.parse::<u64>().map(SkillId))
        .collect()
}

/// Accepts `1`/`true`, or the variable being set without a value.
fn read_flag(key: &str) -> bool {
    match env::var(key) {
        Ok(value) => value.is_empty() || value.parse::<bool>().unwrap_or(value == "1"),
        Err(_) => false,
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_list_parsing() {
        assert_eq!(
            parse_ids("3, 7,,11").unwrap(),
            vec![SkillId(3), SkillId(7), SkillId(11)]
        );
        assert!(parse_ids("").unwrap().is_empty());
        assert!(parse_ids("3,x").is_err());
    }
}
