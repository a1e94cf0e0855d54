//! Endpoint configuration for the network transports.
use std::time::Duration;

/// Where the combat backend and its broadcaster live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Base URL of the JSON API, without a trailing slash.
    pub api_url: String,
    /// WebSocket host of the broadcaster, e.g. `wss://ws.example.com`.
    pub ws_url: String,
    /// Application key the broadcaster expects in the connection path.
    pub app_key: String,
    /// Bearer token sent with every API call.
    pub token: Option<String>,
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(api_url: impl Into<String>, ws_url: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            api_url: trim_slash(api_url.into()),
            ws_url: trim_slash(ws_url.into()),
            app_key: app_key.into(),
            token: None,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    /// Connection URL in the Pusher protocol format.
    pub(crate) fn socket_url(&self) -> String {
        format!(
            "{}/app/{}?protocol=7&client=rust&version={}",
            self.ws_url,
            self.app_key,
            env!("CARGO_PKG_VERSION")
        )
    }
}

fn trim_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
