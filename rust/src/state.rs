use crate::scroll::ScrollAnchor;

#[derive(uniffi::Record, Clone, Debug, serde::Serialize)]
pub struct AppState {
    pub rev: u64,
    pub viewer_id: String,
    pub conversation: Option<ConversationViewState>,
    pub peer_profile: Option<PeerProfileState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty(viewer_id: &str) -> Self {
        Self {
            rev: 0,
            viewer_id: viewer_id.to_string(),
            conversation: None,
            peer_profile: None,
            toast: None,
        }
    }
}

/// Everything the conversation screen renders.
///
/// Scroll position and focus stay native, but the in-flight flags live here so
/// the host never has to guess when a spinner should stop.
#[derive(uniffi::Record, Clone, Debug, serde::Serialize)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub messages: Vec<MessageEntry>,
    pub loading: bool,
    pub loading_more: bool,
    pub has_more: bool,
    pub peer_is_typing: bool,
    pub draft: String,
    /// Set while a prepend is waiting for the host to restore its offset.
    pub scroll_anchor: Option<ScrollAnchor>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, serde::Serialize)]
pub struct MessageEntry {
    /// Server id, or `tmp-<n>` for a send that is still pending.
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: i64,
    pub is_read: bool,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
    /// First message of a UTC calendar day (date separator goes above it).
    pub starts_new_day: bool,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Read,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PeerProfileState {
    pub user_id: String,
    pub name: String,
    pub about: Option<String>,
    pub photo_url: Option<String>,
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// UTC calendar day of a millisecond timestamp, as days since the epoch.
pub fn utc_day(ms: i64) -> i64 {
    ms.div_euclid(86_400_000)
}
