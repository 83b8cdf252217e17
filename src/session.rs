// src/session.rs
//
// Websocket session bound to exactly one conversation key. The session is an
// explicit owned resource: whoever owns the active conversation holds it and
// closes it, so two UI surfaces can each run their own session safely. It
// carries no message storage, only the delivery channel.
//
// There is no automatic reconnect and no outbox: a send while the session is
// not open is dropped with a logged warning, and the owner re-opens a fresh
// session after observing `SessionEvent::Closed`.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::protocol::{ConversationKey, InboundFrame, MessageType, OutboundFrame};
use crate::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
}

/// Delivered on the session's event channel. Exactly one of `Closed` or
/// `TransportError` terminates the stream; both drive the same teardown.
#[derive(Debug)]
pub enum SessionEvent {
    Frame(InboundFrame),
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
    TransportError(String),
}

enum Command {
    Frame(OutboundFrame),
    Close,
}

pub struct ChatSession {
    key: ConversationKey,
    session_id: Uuid,
    outgoing: mpsc::UnboundedSender<Command>,

    /// Inbound events; stored as an Option so the owner can `take()` it and
    /// pump it from wherever is convenient.
    pub events: Option<mpsc::UnboundedReceiver<SessionEvent>>,

    status: Arc<Mutex<ConnectionStatus>>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl ChatSession {
    /// Connects the websocket for `key` and spawns the read/write tasks.
    /// The token travels as a query parameter: the handshake cannot carry
    /// custom headers.
    pub async fn open(config: &ChatConfig, key: ConversationKey) -> Result<Self, Error> {
        let session_id = Uuid::new_v4();
        let url = format!(
            "{}{}?token={}",
            config.ws_base(),
            key.ws_path(),
            config.access_token
        );

        let status = Arc::new(Mutex::new(ConnectionStatus::Connecting));
        let (ws, _) = connect_async(url.as_str()).await?;
        info!("[{}] session {} connected", key, session_id);
        *status.lock() = ConnectionStatus::Open;

        let (write_half, read_half) = ws.split();
        let (tx_outgoing, rx_outgoing) = mpsc::unbounded_channel::<Command>();
        let (tx_events, rx_events) = mpsc::unbounded_channel::<SessionEvent>();

        let write_task = tokio::spawn(Self::writer_loop(write_half, rx_outgoing, key));
        let read_task = tokio::spawn(Self::reader_loop(
            read_half,
            tx_events,
            status.clone(),
            key,
        ));

        Ok(Self {
            key,
            session_id,
            outgoing: tx_outgoing,
            events: Some(rx_events),
            status,
            read_task,
            write_task,
        })
    }

    async fn reader_loop(
        mut read_half: SplitStream<WsStream>,
        tx_events: mpsc::UnboundedSender<SessionEvent>,
        status: Arc<Mutex<ConnectionStatus>>,
        key: ConversationKey,
    ) {
        let terminal = loop {
            match read_half.next().await {
                Some(Ok(msg)) => {
                    if msg.is_ping() || msg.is_pong() {
                        continue;
                    }
                    match msg {
                        WsMessage::Close(frame) => {
                            let (code, reason) = match frame {
                                Some(f) => (Some(u16::from(f.code)), Some(f.reason.to_string())),
                                None => (None, None),
                            };
                            break SessionEvent::Closed { code, reason };
                        }
                        WsMessage::Text(txt) => {
                            debug!("[{}] << {}", key, txt);
                            match serde_json::from_str::<InboundFrame>(txt.as_str()) {
                                Ok(frame) => {
                                    let _ = tx_events.send(SessionEvent::Frame(frame));
                                }
                                Err(e) => {
                                    warn!("[{}] dropping unparseable frame: {}", key, e);
                                }
                            }
                        }
                        other => trace!("[{}] ignoring non-text frame: {:?}", key, other),
                    }
                }
                Some(Err(e)) => break SessionEvent::TransportError(e.to_string()),
                // stream ended without a close frame
                None => break SessionEvent::Closed { code: None, reason: None },
            }
        };

        *status.lock() = ConnectionStatus::Closed;
        match &terminal {
            SessionEvent::TransportError(e) => warn!("[{}] websocket error: {}", key, e),
            _ => info!("[{}] websocket closed", key),
        }
        let _ = tx_events.send(terminal);
    }

    async fn writer_loop(
        mut write_half: SplitSink<WsStream, WsMessage>,
        mut rx_outgoing: mpsc::UnboundedReceiver<Command>,
        key: ConversationKey,
    ) {
        while let Some(cmd) = rx_outgoing.recv().await {
            match cmd {
                Command::Frame(frame) => {
                    let txt = match serde_json::to_string(&frame) {
                        Ok(txt) => txt,
                        Err(e) => {
                            warn!("[{}] could not encode outbound frame: {}", key, e);
                            continue;
                        }
                    };
                    debug!("[{}] >> {}", key, txt);
                    if let Err(e) = write_half.send(WsMessage::Text(txt.into())).await {
                        error!("[{}] websocket write error: {}", key, e);
                        break;
                    }
                }
                Command::Close => {
                    let _ = write_half.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
        let _ = write_half.close().await;
    }

    pub fn key(&self) -> ConversationKey {
        self.key
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Takes the inbound event receiver. Returns `None` if already taken.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    /// Queues an outbound frame. No-op with a logged warning when the
    /// session is not open; callers must not assume delivery.
    pub fn send(&self, body: impl Into<String>, message_type: MessageType) {
        if !self.is_open() {
            warn!("[{}] send on a session that is not open; message dropped", self.key);
            return;
        }
        let frame = OutboundFrame {
            body: body.into(),
            message_type,
        };
        if self.outgoing.send(Command::Frame(frame)).is_err() {
            warn!("[{}] writer task gone; message dropped", self.key);
        }
    }

    /// Initiates a close. Idempotent: closing an already-closed session is a
    /// safe no-op.
    pub fn close(&self) {
        {
            let mut status = self.status.lock();
            if *status == ConnectionStatus::Closed {
                return;
            }
            *status = ConnectionStatus::Closed;
        }
        info!("[{}] closing session {}", self.key, self.session_id);
        let _ = self.outgoing.send(Command::Close);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.read_task.abort();
        self.write_task.abort();
    }
}
