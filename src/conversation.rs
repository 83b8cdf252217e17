// src/conversation.rs
//
// View-state owner for the active conversation: which key is selected, its
// timeline, and the one live session. Selecting a key tears down whatever
// was there before (close the old session, clear the timeline) and only
// then loads history and opens a new session. A switch never goes straight
// from Ready to Ready without passing through that teardown.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::history::{HistoryClient, HistoryError};
use crate::protocol::{ConversationKey, InboundFrame, Message, MessageType};
use crate::session::{ChatSession, ConnectionStatus, SessionEvent};
use crate::timeline::Timeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    NoSelection,
    Loading,
    Ready,
}

/// Who the local user is, for stamping optimistic entries.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub user_id: i64,
    pub display_name: Option<String>,
}

pub struct ConversationView {
    config: Arc<ChatConfig>,
    history: HistoryClient,
    identity: LocalIdentity,

    state: SelectionState,
    active_key: Option<ConversationKey>,
    session: Option<ChatSession>,
    timeline: Timeline,
    /// Set when the history load failed for a reason other than a
    /// permission denial (which renders as silently empty instead).
    load_failed: bool,
    /// Bumped on every select/deselect; a history response carrying a stale
    /// generation is discarded instead of populating the wrong timeline.
    generation: u64,
}

impl ConversationView {
    pub fn new(config: Arc<ChatConfig>, identity: LocalIdentity) -> Self {
        let history = HistoryClient::new(config.clone());
        Self::with_history_client(config, history, identity)
    }

    pub fn with_history_client(
        config: Arc<ChatConfig>,
        history: HistoryClient,
        identity: LocalIdentity,
    ) -> Self {
        Self {
            config,
            history,
            identity,
            state: SelectionState::NoSelection,
            active_key: None,
            session: None,
            timeline: Timeline::new(),
            load_failed: false,
            generation: 0,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn active_key(&self) -> Option<ConversationKey> {
        self.active_key
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn load_failed(&self) -> bool {
        self.load_failed
    }

    pub fn session_status(&self) -> Option<ConnectionStatus> {
        self.session.as_ref().map(|s| s.status())
    }

    /// Takes the live session's event receiver for the owner to pump into
    /// [`handle_event`](Self::handle_event).
    pub fn take_session_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.session.as_mut().and_then(|s| s.take_events())
    }

    /// Makes `key` the active conversation: teardown of any previous state,
    /// then history load, then a fresh session. All failures are absorbed
    /// here: a permission denial leaves the timeline silently empty, any
    /// other load failure raises `load_failed`, and a session that cannot
    /// connect still leaves the view Ready (with no live socket).
    pub async fn select(&mut self, key: ConversationKey) {
        self.teardown();
        self.generation += 1;
        let generation = self.generation;

        self.active_key = Some(key);
        self.state = SelectionState::Loading;
        info!("selecting conversation {}", key);

        match self.history.fetch_initial(&key).await {
            Ok(page) => {
                // guard against a stale response landing after a switch
                if self.generation == generation && self.active_key == Some(key) {
                    self.timeline.extend(page.messages);
                } else {
                    debug!("discarding stale history response for {}", key);
                    return;
                }
            }
            Err(HistoryError::PermissionDenied) => {
                debug!("no access to {}, showing empty timeline", key);
            }
            Err(e) => {
                warn!("history load for {} failed: {}", key, e);
                self.load_failed = true;
            }
        }

        if self.generation != generation {
            return;
        }

        match ChatSession::open(&self.config, key).await {
            Ok(session) => {
                if self.generation == generation {
                    self.session = Some(session);
                } else {
                    session.close();
                    return;
                }
            }
            Err(e) => warn!("could not open session for {}: {}", key, e),
        }

        self.state = SelectionState::Ready;
    }

    /// Clears the selection. Idempotent; the session is closed before the
    /// state is dropped so nothing dangles.
    pub fn deselect(&mut self) {
        self.teardown();
        self.generation += 1;
        self.active_key = None;
        self.state = SelectionState::NoSelection;
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.timeline.clear();
        self.load_failed = false;
    }

    /// Routes one session event into the timeline. Frame-level failures stay
    /// local to the one message involved; a closed or failed transport tears
    /// the session down while the rest of the view stays usable.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Frame(InboundFrame::Message(wire)) => {
                self.timeline.push(Message::from_wire(wire));
            }
            SessionEvent::Frame(InboundFrame::MessageSent { message_id, sent_at }) => {
                self.timeline.resolve_optimistic(message_id, sent_at.as_deref());
            }
            SessionEvent::Frame(InboundFrame::Error { message }) => {
                warn!("chat error from server: {}", message.as_deref().unwrap_or("unknown"));
            }
            SessionEvent::Frame(InboundFrame::Connection { .. })
            | SessionEvent::Frame(InboundFrame::Unknown) => {}
            SessionEvent::Closed { code, reason } => {
                info!(
                    "session closed (code={:?}, reason={:?})",
                    code,
                    reason.as_deref().unwrap_or("")
                );
                if let Some(session) = self.session.take() {
                    session.close();
                }
            }
            SessionEvent::TransportError(e) => {
                warn!("session transport error: {}", e);
                if let Some(session) = self.session.take() {
                    session.close();
                }
            }
        }
    }

    /// Sends a text message: optimistic insert first, then the wire send.
    /// Returns the temporary id of the optimistic entry, or `None` when
    /// there was nothing to send.
    pub fn send_text(&mut self, body: &str) -> Option<i64> {
        if body.trim().is_empty() {
            return None;
        }
        self.send_raw(body.to_string(), MessageType::Text)
    }

    /// Sends an attachment message whose body was produced by the upload
    /// relay (a bare URL for image/audio, `{url, filename}` JSON for file).
    pub fn send_attachment(&mut self, body: String, message_type: MessageType) -> Option<i64> {
        self.send_raw(body, message_type)
    }

    fn send_raw(&mut self, body: String, message_type: MessageType) -> Option<i64> {
        if self.active_key.is_none() {
            warn!("send with no active conversation; dropped");
            return None;
        }

        let local_id = self.timeline.push_optimistic(
            self.identity.user_id,
            self.identity.display_name.clone(),
            body.clone(),
            message_type,
        );

        match &self.session {
            // the session logs its own warning when it is not open
            Some(session) => session.send(body, message_type),
            None => warn!("no live session; message not sent (optimistic entry kept)"),
        }
        Some(local_id)
    }
}
