//! Push channel contract and the decoding of its change payloads.
//!
//! Change events mirror the `messages` table: `insert` and `update` carry the
//! new row as JSON with snake_case columns and RFC 3339 timestamps.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::BackendError;
use crate::model::{Message, MessagePatch};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RealtimeTopic {
    /// Row changes on `messages` filtered to one conversation.
    Messages { conversation_id: String },
    /// Ephemeral broadcast topic; the channel never echoes a sender's own
    /// broadcasts back to it.
    Typing { conversation_id: String },
}

impl RealtimeTopic {
    pub fn messages(conversation_id: &str) -> Self {
        Self::Messages {
            conversation_id: conversation_id.to_string(),
        }
    }

    pub fn typing(conversation_id: &str) -> Self {
        Self::Typing {
            conversation_id: conversation_id.to_string(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Messages { conversation_id } => format!("chat:{conversation_id}"),
            Self::Typing { conversation_id } => format!("typing:{conversation_id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RealtimeEvent {
    Insert { record: Value },
    Update { record: Value },
    Broadcast { event: String, sender_id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A live subscription. Dropping the channel's sender side (on unsubscribe)
/// ends the event stream.
#[derive(Debug)]
pub struct RealtimeSubscription {
    pub id: SubscriptionId,
    pub events: flume::Receiver<RealtimeEvent>,
}

pub trait RealtimeChannel: Send + Sync + 'static {
    fn subscribe(
        &self,
        topic: &RealtimeTopic,
        viewer_id: &str,
    ) -> Result<RealtimeSubscription, BackendError>;

    /// Must be idempotent; unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    fn broadcast(
        &self,
        topic: &RealtimeTopic,
        event: &str,
        sender_id: &str,
    ) -> Result<(), BackendError>;
}

#[derive(Debug, Deserialize)]
struct MessageRow {
    id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    is_read: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    SelfEcho,
    OtherConversation,
    NotAMessageEvent,
    Malformed(String),
}

/// What the merge unit should do with one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Merge {
    Insert(Message),
    Update(MessagePatch),
    Ignore(IgnoreReason),
}

pub fn classify(event: &RealtimeEvent, conversation_id: &str, viewer_id: &str) -> Merge {
    match event {
        RealtimeEvent::Insert { record } => classify_insert(record, conversation_id, viewer_id),
        RealtimeEvent::Update { record } => classify_update(record, conversation_id),
        RealtimeEvent::Broadcast { .. } => Merge::Ignore(IgnoreReason::NotAMessageEvent),
    }
}

fn decode_row(record: &Value) -> Result<MessageRow, IgnoreReason> {
    MessageRow::deserialize(record).map_err(|e| IgnoreReason::Malformed(e.to_string()))
}

fn classify_insert(record: &Value, conversation_id: &str, viewer_id: &str) -> Merge {
    let row = match decode_row(record) {
        Ok(row) => row,
        Err(reason) => return Merge::Ignore(reason),
    };
    if row
        .conversation_id
        .as_deref()
        .is_some_and(|c| c != conversation_id)
    {
        return Merge::Ignore(IgnoreReason::OtherConversation);
    }
    let Some(sender_id) = row.sender_id else {
        return Merge::Ignore(IgnoreReason::Malformed("missing sender_id".into()));
    };
    // Our own sends are already on screen through the optimistic path.
    if sender_id == viewer_id {
        return Merge::Ignore(IgnoreReason::SelfEcho);
    }
    let Some(created_at) = row.created_at.as_deref().and_then(parse_timestamp_ms) else {
        return Merge::Ignore(IgnoreReason::Malformed("bad created_at".into()));
    };
    Merge::Insert(Message {
        id: row.id,
        conversation_id: conversation_id.to_string(),
        sender_id,
        text: row.text.unwrap_or_default(),
        created_at,
        is_read: row.is_read.unwrap_or(false),
    })
}

fn classify_update(record: &Value, conversation_id: &str) -> Merge {
    let row = match decode_row(record) {
        Ok(row) => row,
        Err(reason) => return Merge::Ignore(reason),
    };
    if row
        .conversation_id
        .as_deref()
        .is_some_and(|c| c != conversation_id)
    {
        return Merge::Ignore(IgnoreReason::OtherConversation);
    }
    Merge::Update(MessagePatch {
        id: row.id,
        text: row.text,
        is_read: row.is_read,
    })
}

/// Accepts RFC 3339 and Postgres' `timestamptz` text form
/// (`2024-05-01 10:00:00.123+00`).
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.timestamp_millis());
    }
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
        .ok()
        .map(|ts| ts.timestamp_millis())
}

pub fn format_timestamp_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Row payload for `message` as the channel delivers it.
pub fn message_record(message: &Message) -> Value {
    json!({
        "id": message.id,
        "conversation_id": message.conversation_id,
        "sender_id": message.sender_id,
        "text": message.text,
        "created_at": format_timestamp_ms(message.created_at),
        "is_read": message.is_read,
    })
}
