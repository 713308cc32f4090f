//! Optimistic send tracking.
//!
//! Each attempt is `Pending` until the request resolves, then either
//! `Confirmed` or `Failed`. Both are terminal; failed sends are not retried.

use std::collections::HashMap;

use crate::model::{ProvisionalMessage, TempId, TempIdGenerator};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Confirmed { id: String },
    /// Carries the original input so it can go back into the compose box.
    Failed { text: String },
}

#[derive(Debug)]
struct PendingSend {
    text: String,
}

#[derive(Debug, Default)]
pub struct Outbox {
    ids: TempIdGenerator,
    pending: HashMap<TempId, PendingSend>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an attempt. Blank input is rejected. Concurrent attempts are
    /// fine: each gets its own temp id.
    pub fn begin_send(
        &mut self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
        now_ms: i64,
    ) -> Option<ProvisionalMessage> {
        if text.trim().is_empty() {
            return None;
        }
        let temp_id = self.ids.next_id();
        self.pending.insert(
            temp_id,
            PendingSend {
                text: text.to_string(),
            },
        );
        Some(ProvisionalMessage {
            temp_id,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            created_at: now_ms,
        })
    }

    /// Pending -> Confirmed. `None` if the attempt is unknown or already resolved.
    pub fn confirm(&mut self, temp_id: TempId, id: &str) -> Option<SendOutcome> {
        self.pending.remove(&temp_id).map(|_| SendOutcome::Confirmed {
            id: id.to_string(),
        })
    }

    /// Pending -> Failed. `None` if the attempt is unknown or already resolved.
    pub fn fail(&mut self, temp_id: TempId) -> Option<SendOutcome> {
        self.pending
            .remove(&temp_id)
            .map(|p| SendOutcome::Failed { text: p.text })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
