// src/protocol.rs
//
// Shared vocabulary of the chat subsystem: conversation keys, message kinds,
// the two wire envelopes (inbound socket frame, outbound send frame), and
// the typed payloads derived from a message body.
//
// Status-change announcements (order/complaint lifecycle transitions) arrive
// as stringified JSON inside the generic body field; they are lifted into a
// typed variant at this boundary so nothing downstream re-parses strings.

use serde::{Deserialize, Serialize};

/// Identifies one chat scope: either a company-to-company linking or an
/// order-scoped thread. Switching keys is always a full teardown/rebuild of
/// both the session and the timeline, never a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Linking(i64),
    Order(i64),
}

impl ConversationKey {
    /// REST path of the history endpoint for this scope.
    pub fn history_path(&self) -> String {
        match self {
            ConversationKey::Linking(id) => format!("/chat/messages/{}", id),
            ConversationKey::Order(id) => format!("/chat/messages/order/{}", id),
        }
    }

    /// Websocket path for this scope (token goes in the query string).
    pub fn ws_path(&self) -> String {
        match self {
            ConversationKey::Linking(id) => format!("/chat/ws/{}", id),
            ConversationKey::Order(id) => format!("/chat/ws/order/{}", id),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationKey::Linking(id) => write!(f, "linking:{}", id),
            ConversationKey::Order(id) => write!(f, "order:{}", id),
        }
    }
}

/// Closed set of message kinds. `order` and `complaint` are additive
/// extensions layered onto the same envelope as chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Audio,
    Order,
    Complaint,
}

impl MessageType {
    pub fn is_text(&self) -> bool {
        matches!(self, MessageType::Text)
    }
}

/// Message fields as they appear inside an inbound `message` socket frame.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub message_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub body: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub sent_at: String,
}

/// Message fields as the history endpoint returns them. Same shape as
/// [`WireMessage`] except the kind field is named `type`.
#[derive(Debug, Clone, Deserialize)]
pub struct RestMessage {
    pub message_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub body: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    pub sent_at: String,
}

/// Inbound socket frame, tagged by `type`. Unknown tags deserialize to
/// [`InboundFrame::Unknown`] and must be treated as no-ops so the protocol
/// can grow without breaking older clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundFrame {
    #[serde(rename = "connection")]
    Connection {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(rename = "message")]
    Message(WireMessage),
    /// Server acknowledgment for a message this client sent; carries the
    /// authoritative id (and timestamp, when the server echoes one).
    #[serde(rename = "message_sent")]
    MessageSent {
        message_id: i64,
        #[serde(default)]
        sent_at: Option<String>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Outbound send frame. `type` is omitted for plain text, which the server
/// treats as the default.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    pub body: String,
    #[serde(rename = "type", skip_serializing_if = "MessageType::is_text")]
    pub message_type: MessageType,
}

/// Whether a status-change announcement came from an order or a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Order,
    Complaint,
}

/// Parsed status-change descriptor. A `null` old_status means the entity
/// was just created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub entity: String,
    pub id: i64,
    #[serde(default)]
    pub old_status: Option<String>,
    pub new_status: String,
}

impl StatusChange {
    pub fn is_creation(&self) -> bool {
        self.old_status.is_none()
    }
}

/// An `order`/`complaint` announcement. `change` is `None` when the body did
/// not parse as a status-change descriptor; `raw` keeps the original body so
/// a degraded rendering is still possible.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub kind: EventKind,
    pub change: Option<StatusChange>,
    pub raw: String,
}

impl StatusEvent {
    /// Display label, falling back to a generic string when the payload did
    /// not parse.
    pub fn label(&self) -> String {
        match &self.change {
            Some(change) => match &change.old_status {
                Some(old) => format!(
                    "{} #{} moved from {} to {}",
                    change.entity, change.id, old, change.new_status
                ),
                None => format!("{} #{} created ({})", change.entity, change.id, change.new_status),
            },
            None if !self.raw.trim().is_empty() => self.raw.clone(),
            None => "status updated".to_string(),
        }
    }
}

/// Typed interpretation of a message body, keyed by the wire `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Image { url: String },
    Audio { url: String },
    /// `file` bodies are JSON `{url, filename}`; a bare-URL legacy body
    /// falls back to deriving the filename from the last path segment.
    File { url: String, filename: String },
    Event(StatusEvent),
}

impl MessageContent {
    pub fn parse(message_type: MessageType, body: &str) -> Self {
        match message_type {
            MessageType::Text => MessageContent::Text(body.to_string()),
            MessageType::Image => MessageContent::Image { url: body.to_string() },
            MessageType::Audio => MessageContent::Audio { url: body.to_string() },
            MessageType::File => parse_file_body(body),
            MessageType::Order => MessageContent::Event(parse_event_body(EventKind::Order, body)),
            MessageType::Complaint => {
                MessageContent::Event(parse_event_body(EventKind::Complaint, body))
            }
        }
    }

    /// Canonical body for sending a `file` message.
    pub fn file_body(url: &str, filename: &str) -> String {
        serde_json::json!({ "url": url, "filename": filename }).to_string()
    }
}

#[derive(Deserialize)]
struct FileBody {
    url: String,
    filename: String,
}

fn parse_file_body(body: &str) -> MessageContent {
    match serde_json::from_str::<FileBody>(body) {
        Ok(file) => MessageContent::File {
            url: file.url,
            filename: file.filename,
        },
        // legacy shape: the body is the URL itself
        Err(_) => MessageContent::File {
            url: body.to_string(),
            filename: filename_from_url(body),
        },
    }
}

fn parse_event_body(kind: EventKind, body: &str) -> StatusEvent {
    let change = serde_json::from_str::<StatusChange>(body).ok();
    if change.is_none() {
        tracing::debug!("unparseable {:?} event body, rendering degraded", kind);
    }
    StatusEvent {
        kind,
        change,
        raw: body.to_string(),
    }
}

fn filename_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|segment| segment.split('?').next().unwrap_or(segment))
        .filter(|segment| !segment.is_empty())
        .unwrap_or("file")
        .to_string()
}

/// A chat message as the rest of the subsystem sees it: the raw envelope
/// fields plus the typed payload. Immutable once delivered; optimistic
/// entries are the one exception (their id is rewritten when the server
/// acknowledgment arrives).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Server-assigned for delivered messages; negative for optimistic
    /// local entries so the two id spaces can never collide.
    pub message_id: i64,
    pub sender_id: i64,
    /// Absent for the caller's own messages, which render without a label.
    pub sender_name: Option<String>,
    /// Raw wire body, kept alongside the parsed content.
    pub body: String,
    pub message_type: MessageType,
    /// ISO-8601 timestamp string; the sole ordering key for the timeline.
    pub sent_at: String,
    pub content: MessageContent,
}

impl Message {
    pub fn new(
        message_id: i64,
        sender_id: i64,
        sender_name: Option<String>,
        body: String,
        message_type: MessageType,
        sent_at: String,
    ) -> Self {
        let content = MessageContent::parse(message_type, &body);
        Self {
            message_id,
            sender_id,
            sender_name,
            body,
            message_type,
            sent_at,
            content,
        }
    }

    pub fn from_wire(wire: WireMessage) -> Self {
        Self::new(
            wire.message_id,
            wire.sender_id,
            wire.sender_name,
            wire.body,
            wire.message_type,
            wire.sent_at,
        )
    }

    pub fn from_rest(rest: RestMessage) -> Self {
        Self::new(
            rest.message_id,
            rest.sender_id,
            rest.sender_name,
            rest.body,
            rest.message_type,
            rest.sent_at,
        )
    }

    /// Status-change announcements render centered and unattributed, never
    /// as a bubble belonging to a sender.
    pub fn is_announcement(&self) -> bool {
        matches!(self.content, MessageContent::Event(_))
    }

    /// True for locally-originated entries that have not been acknowledged.
    pub fn is_optimistic(&self) -> bool {
        self.message_id < 0
    }
}
