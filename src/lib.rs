// src/lib.rs

pub mod config;
pub mod conversation;
pub mod error;
pub mod history;
pub mod http;
pub mod protocol;
pub mod session;
pub mod timeline;
pub mod upload;

pub use config::ChatConfig;
pub use conversation::{ConversationView, LocalIdentity, SelectionState};
pub use error::Error;
pub use http::{DefaultHttpTransport, HttpTransport};
pub use protocol::{ConversationKey, Message, MessageContent, MessageType};
pub use session::{ChatSession, ConnectionStatus, SessionEvent};
pub use timeline::Timeline;
