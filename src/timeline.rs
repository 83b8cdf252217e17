// src/timeline.rs
//
// Per-conversation merge of three message streams: the history page, socket
// deliveries, and locally-originated optimistic entries. The collection is
// keyed by (sent_at, message_id) in a BTreeMap, so the displayed sequence is
// ascending by timestamp after every single insertion, whatever order things
// arrived in. Message ids are dedupe/display keys only, never ordering keys.
//
// Optimistic entries get ids from a decrementing negative counter, a
// namespace the server can never collide with; the oldest pending entry is
// promoted to the authoritative id when the server acknowledgment arrives.

use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::protocol::{Message, MessageType};

type OrderingKey = (DateTime<Utc>, i64);

pub struct Timeline {
    entries: BTreeMap<OrderingKey, Message>,
    seen_ids: HashSet<i64>,
    /// Optimistic ids awaiting a server acknowledgment, oldest first.
    pending_optimistic: VecDeque<i64>,
    next_local_id: i64,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            seen_ids: HashSet::new(),
            pending_optimistic: VecDeque::new(),
            next_local_id: -1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts one message, keeping chronological order. Duplicate ids are
    /// dropped. Returns whether the message was added.
    pub fn push(&mut self, message: Message) -> bool {
        if !self.seen_ids.insert(message.message_id) {
            debug!("duplicate message {} dropped", message.message_id);
            return false;
        }
        let key = (parse_sent_at(&message.sent_at), message.message_id);
        self.entries.insert(key, message);
        true
    }

    /// Inserts a batch, e.g. a loaded history page.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.push(message);
        }
    }

    /// Inserts a locally-originated entry before any server confirmation and
    /// returns its temporary (negative) id.
    pub fn push_optimistic(
        &mut self,
        sender_id: i64,
        sender_name: Option<String>,
        body: String,
        message_type: MessageType,
    ) -> i64 {
        let local_id = self.next_local_id;
        self.next_local_id -= 1;

        let message = Message::new(
            local_id,
            sender_id,
            sender_name,
            body,
            message_type,
            Utc::now().to_rfc3339(),
        );
        self.pending_optimistic.push_back(local_id);
        self.push(message);
        local_id
    }

    /// Promotes the oldest pending optimistic entry to the server-assigned
    /// id (and timestamp, when the server echoes one). If the authoritative
    /// copy already arrived over the socket, the local entry is simply
    /// removed. Returns whether an entry was resolved.
    pub fn resolve_optimistic(&mut self, server_id: i64, sent_at: Option<&str>) -> bool {
        let Some(local_id) = self.pending_optimistic.pop_front() else {
            debug!("acknowledgment for {} with nothing pending", server_id);
            return false;
        };
        let Some(key) = self.key_of(local_id) else {
            // cleared or replaced since the send
            return false;
        };

        let mut message = match self.entries.remove(&key) {
            Some(m) => m,
            None => return false,
        };
        self.seen_ids.remove(&local_id);

        if self.seen_ids.contains(&server_id) {
            debug!("authoritative copy of {} already present, dropping local entry", server_id);
            return true;
        }

        message.message_id = server_id;
        if let Some(sent_at) = sent_at {
            message.sent_at = sent_at.to_string();
        }
        self.push(message);
        true
    }

    /// The reconciled sequence, ascending by `sent_at`.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    /// Full reset for a conversation switch.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen_ids.clear();
        self.pending_optimistic.clear();
        self.next_local_id = -1;
    }

    fn key_of(&self, message_id: i64) -> Option<OrderingKey> {
        self.entries
            .iter()
            .find(|(_, m)| m.message_id == message_id)
            .map(|(key, _)| *key)
    }
}

/// Ordering timestamp from the wire string. Accepts RFC 3339 and the naive
/// ISO-8601 shape some backends emit (assumed UTC). A message with an
/// unparseable timestamp stays in the timeline, ordered at the epoch; a
/// malformed entry must never blank the whole view.
fn parse_sent_at(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    warn!("unparseable sent_at {:?}, ordering at epoch", raw);
    DateTime::<Utc>::UNIX_EPOCH
}
