// src/history.rs
//
// Bounded, paginated history fetch for a conversation key. Returns data for
// the caller to apply to the timeline; never mutates shared state itself.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::http::{DefaultHttpTransport, HttpTransport};
use crate::protocol::{ConversationKey, Message, RestMessage};
use crate::Error;

pub const DEFAULT_LIMIT: u32 = 100;

/// How a history fetch failed. Permission denials are classified apart from
/// everything else: the caller renders them as a silently-empty timeline,
/// never as an error state.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("permission denied for this conversation")]
    PermissionDenied,

    #[error("transport failure: {0}")]
    Transport(#[from] Error),

    #[error("malformed history body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One page of historical messages, with the pagination parameters echoed
/// back for continuation.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub chat_id: i64,
    pub key: ConversationKey,
    pub messages: Vec<Message>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Deserialize)]
struct HistoryBody {
    #[serde(default)]
    chat_id: i64,
    messages: Vec<RestMessage>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

pub struct HistoryClient {
    config: Arc<ChatConfig>,
    transport: Arc<dyn HttpTransport>,
}

impl HistoryClient {
    pub fn new(config: Arc<ChatConfig>) -> Self {
        Self::with_transport(config, Arc::new(DefaultHttpTransport::new()))
    }

    pub fn with_transport(config: Arc<ChatConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    /// First page with the default limit.
    pub async fn fetch_initial(&self, key: &ConversationKey) -> Result<HistoryPage, HistoryError> {
        self.fetch(key, DEFAULT_LIMIT, 0).await
    }

    pub async fn fetch(
        &self,
        key: &ConversationKey,
        limit: u32,
        offset: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let url = format!(
            "{}{}?limit={}&offset={}",
            self.config.api_base,
            key.history_path(),
            limit,
            offset
        );
        debug!("loading history for {} (limit={}, offset={})", key, limit, offset);

        let response = self
            .transport
            .get(&url, Some(&self.config.access_token))
            .await?;

        if response.status == 403 {
            debug!("history fetch for {} denied, treating as empty", key);
            return Err(HistoryError::PermissionDenied);
        }
        if !response.is_success() {
            warn!("history fetch for {} failed: HTTP {}", key, response.status);
            return Err(HistoryError::Transport(Error::Transport(format!(
                "history fetch returned HTTP {}",
                response.status
            ))));
        }

        let body: HistoryBody = serde_json::from_str(&response.body)?;
        Ok(HistoryPage {
            chat_id: body.chat_id,
            key: *key,
            messages: body.messages.into_iter().map(Message::from_rest).collect(),
            limit: body.limit.unwrap_or(limit),
            offset: body.offset.unwrap_or(offset),
        })
    }
}
