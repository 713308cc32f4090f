// Reverse pagination: page cursor bookkeeping + fetch helpers.

use crate::backend::ChatBackend;
use crate::error::BackendError;
use crate::model::{ConversationPage, Message};

/// Cursor state for one conversation. Only one older-page fetch may be in
/// flight; further requests while one is pending are dropped, not queued.
#[derive(Debug, Default)]
pub struct Pager {
    cursor: u32,
    in_flight: bool,
}

impl Pager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// The initial load covers page 0, so the next older page is 1.
    pub fn on_initial_loaded(&mut self) {
        self.cursor = 1;
        self.in_flight = false;
    }

    /// Claim the single fetch slot. Returns the cursor to request, or `None`
    /// if a fetch is already pending.
    pub fn begin_older(&mut self) -> Option<u32> {
        if self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(self.cursor)
    }

    /// Release the slot after a successful fetch. The cursor only advances
    /// when the page had content.
    pub fn finish_older(&mut self, fetched: usize) {
        self.in_flight = false;
        if fetched > 0 {
            self.cursor += 1;
        }
    }

    /// Release the slot after a failed fetch; the same cursor is retried next.
    pub fn abort_older(&mut self) {
        self.in_flight = false;
    }
}

pub async fn fetch_initial(
    backend: &dyn ChatBackend,
    conversation_id: &str,
    viewer_id: &str,
) -> Result<ConversationPage, BackendError> {
    backend
        .get_conversation_details(conversation_id, viewer_id)
        .await
}

pub async fn fetch_older(
    backend: &dyn ChatBackend,
    conversation_id: &str,
    cursor: u32,
) -> Result<Vec<Message>, BackendError> {
    backend.get_messages(conversation_id, cursor).await
}
