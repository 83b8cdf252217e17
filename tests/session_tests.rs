// tests/session_tests.rs
//
// Exercises the session lifecycle against a real websocket listener on a
// loopback port.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use linkchat::protocol::{ConversationKey, InboundFrame, MessageType};
use linkchat::session::{ChatSession, ConnectionStatus, SessionEvent};
use linkchat::ChatConfig;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Clone, Default)]
struct ServerBehavior {
    /// Raw text frames pushed to the client right after the handshake.
    greetings: Vec<String>,
    /// Reply to every inbound text with a `message_sent` acknowledgment.
    ack: bool,
    /// Close the connection right after the greetings.
    close_after_greetings: bool,
}

struct TestServer {
    addr: std::net::SocketAddr,
    active: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    fn config(&self) -> ChatConfig {
        ChatConfig::new(format!("http://{}", self.addr), "test-token").unwrap()
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

async fn spawn_server(behavior: ServerBehavior) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let next_id = Arc::new(AtomicI64::new(100));

    {
        let active = active.clone();
        let received = received.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let behavior = behavior.clone();
                let active = active.clone();
                let received = received.clone();
                let next_id = next_id.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    active.fetch_add(1, Ordering::SeqCst);
                    for greeting in &behavior.greetings {
                        let _ = ws.send(WsMessage::Text(greeting.clone().into())).await;
                    }
                    if behavior.close_after_greetings {
                        let _ = ws.send(WsMessage::Close(None)).await;
                    } else {
                        while let Some(Ok(msg)) = ws.next().await {
                            match msg {
                                WsMessage::Text(txt) => {
                                    received.lock().unwrap().push(txt.to_string());
                                    if behavior.ack {
                                        let id = next_id.fetch_add(1, Ordering::SeqCst);
                                        let ack = format!(
                                            r#"{{"type":"message_sent","message_id":{}}}"#,
                                            id
                                        );
                                        let _ = ws.send(WsMessage::Text(ack.into())).await;
                                    }
                                }
                                WsMessage::Close(_) => break,
                                _ => {}
                            }
                        }
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
    }

    TestServer { addr, active, received }
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    cond()
}

async fn next_event(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
) -> SessionEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

#[tokio::test]
async fn open_send_and_receive() {
    init_tracing();
    let server = spawn_server(ServerBehavior {
        greetings: vec![
            r#"{"type":"connection","message":"ok"}"#.to_string(),
            r#"{"type":"message","message_id":7,"sender_id":2,"sender_name":"Acme",
                "body":"welcome","message_type":"text","sent_at":"2025-03-01T10:00:00Z"}"#
                .to_string(),
        ],
        ack: true,
        ..Default::default()
    })
    .await;

    let mut session = ChatSession::open(&server.config(), ConversationKey::Linking(5))
        .await
        .expect("open should succeed");
    assert_eq!(session.status(), ConnectionStatus::Open);
    assert_eq!(session.key(), ConversationKey::Linking(5));

    let mut events = session.take_events().expect("events not yet taken");
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Frame(InboundFrame::Connection { .. })
    ));
    match next_event(&mut events).await {
        SessionEvent::Frame(InboundFrame::Message(wire)) => {
            assert_eq!(wire.message_id, 7);
            assert_eq!(wire.body, "welcome");
        }
        other => panic!("expected message frame, got {:?}", other),
    }

    session.send("hello there", MessageType::Text);
    match next_event(&mut events).await {
        SessionEvent::Frame(InboundFrame::MessageSent { message_id, .. }) => {
            assert_eq!(message_id, 100);
        }
        other => panic!("expected acknowledgment, got {:?}", other),
    }
    assert_eq!(server.received(), vec![r#"{"body":"hello there"}"#.to_string()]);

    session.close();
    assert!(wait_until(|| server.active.load(Ordering::SeqCst) == 0).await);
}

#[tokio::test]
async fn send_after_close_is_a_logged_noop() {
    let server = spawn_server(ServerBehavior::default()).await;
    let session = ChatSession::open(&server.config(), ConversationKey::Linking(1))
        .await
        .expect("open should succeed");

    session.close();
    assert_eq!(session.status(), ConnectionStatus::Closed);

    // must not panic, must not reach the server
    session.send("too late", MessageType::Text);
    assert!(wait_until(|| server.active.load(Ordering::SeqCst) == 0).await);
    assert!(server.received().is_empty());
}

#[tokio::test]
async fn close_is_idempotent() {
    let server = spawn_server(ServerBehavior::default()).await;
    let session = ChatSession::open(&server.config(), ConversationKey::Order(3))
        .await
        .expect("open should succeed");

    session.close();
    session.close();
    session.close();
    assert_eq!(session.status(), ConnectionStatus::Closed);
}

#[tokio::test]
async fn remote_close_surfaces_as_closed_event() {
    let server = spawn_server(ServerBehavior {
        close_after_greetings: true,
        ..Default::default()
    })
    .await;

    let mut session = ChatSession::open(&server.config(), ConversationKey::Linking(1))
        .await
        .expect("open should succeed");
    let mut events = session.take_events().unwrap();

    assert!(matches!(next_event(&mut events).await, SessionEvent::Closed { .. }));
    assert!(wait_until(|| session.status() == ConnectionStatus::Closed).await);
}

#[tokio::test]
async fn unparseable_frames_are_dropped_not_fatal() {
    let server = spawn_server(ServerBehavior {
        greetings: vec![
            "this is not json".to_string(),
            r#"{"type":"presence","who":"someone"}"#.to_string(),
            r#"{"type":"message","message_id":9,"sender_id":2,"body":"still here",
                "message_type":"text","sent_at":"2025-03-01T10:00:00Z"}"#
                .to_string(),
        ],
        ..Default::default()
    })
    .await;

    let mut session = ChatSession::open(&server.config(), ConversationKey::Linking(1))
        .await
        .expect("open should succeed");
    let mut events = session.take_events().unwrap();

    // the garbage frame is swallowed; the unknown tag arrives as Unknown;
    // the real message still comes through
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Frame(InboundFrame::Unknown)
    ));
    match next_event(&mut events).await {
        SessionEvent::Frame(InboundFrame::Message(wire)) => assert_eq!(wire.message_id, 9),
        other => panic!("expected message frame, got {:?}", other),
    }
}

#[tokio::test]
async fn connect_failure_is_an_error_not_a_panic() {
    // a base nobody listens on
    let config = ChatConfig::new("http://127.0.0.1:9", "test-token").unwrap();
    let result = ChatSession::open(&config, ConversationKey::Linking(1)).await;
    assert!(result.is_err());
}
