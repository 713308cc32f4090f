//! Domain records shared by the stream store, the pager and the collaborators.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A server-confirmed message. Only `is_read` (and, rarely, `text`) change after
/// confirmation, and only through [`MessagePatch`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    /// Unix milliseconds.
    pub created_at: i64,
    pub is_read: bool,
}

/// Partial update carried by a realtime `update` event. Absent fields are left
/// untouched when merged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub id: String,
    pub text: Option<String>,
    pub is_read: Option<bool>,
}

/// Locally generated correlation id for one send attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(u64);

impl TempId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// Hands out temp ids from a monotonic clock reading (microseconds since the
/// generator was created). Two attempts in the same microsecond get consecutive
/// values, so ids are strictly increasing for the whole session.
#[derive(Debug)]
pub struct TempIdGenerator {
    origin: Instant,
    last: u64,
}

impl TempIdGenerator {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: 0,
        }
    }

    pub fn next_id(&mut self) -> TempId {
        let reading = self.origin.elapsed().as_micros() as u64;
        self.last = if reading <= self.last {
            self.last + 1
        } else {
            reading
        };
        TempId(self.last)
    }
}

impl Default for TempIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A message shown before the server confirmed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionalMessage {
    pub temp_id: TempId,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: i64,
}

/// Identity of a stream entry. Temp ids and server ids live in different
/// variants so they can never be confused.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Pending { temp_id: TempId },
    Confirmed { id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub about: Option<String>,
    pub photo_url: Option<String>,
}
