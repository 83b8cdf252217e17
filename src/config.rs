// src/config.rs
//
// Connection settings shared by the REST clients and the websocket session.
// The access token is passed to the websocket as a query parameter because
// the connection handshake cannot carry custom headers.

use url::Url;

use crate::Error;

pub const ENV_API_BASE: &str = "LINKCHAT_API_BASE";
pub const ENV_ACCESS_TOKEN: &str = "LINKCHAT_ACCESS_TOKEN";

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// HTTP(S) base of the backend, without a trailing slash.
    pub api_base: String,
    /// Bearer token for REST calls; also the `?token=` websocket parameter.
    pub access_token: String,
}

impl ChatConfig {
    pub fn new(api_base: impl Into<String>, access_token: impl Into<String>) -> Result<Self, Error> {
        let api_base = api_base.into();
        let parsed = Url::parse(&api_base)
            .map_err(|e| Error::Config(format!("invalid api base {:?}: {}", api_base, e)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Config(format!(
                    "api base must be http(s), got scheme {:?}",
                    other
                )));
            }
        }
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// Reads `LINKCHAT_API_BASE` and `LINKCHAT_ACCESS_TOKEN`, honoring a
    /// local `.env` file if present.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        let api_base = std::env::var(ENV_API_BASE)
            .map_err(|_| Error::Config(format!("{} is not set", ENV_API_BASE)))?;
        let access_token = std::env::var(ENV_ACCESS_TOKEN)
            .map_err(|_| Error::Config(format!("{} is not set", ENV_ACCESS_TOKEN)))?;
        Self::new(api_base, access_token)
    }

    /// Websocket base derived from the HTTP base (`https` → `wss`, `http` → `ws`).
    pub fn ws_base(&self) -> String {
        if let Some(rest) = self.api_base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.api_base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            // new() rejects other schemes; kept as a harmless fallback
            format!("ws://{}", self.api_base)
        }
    }
}
