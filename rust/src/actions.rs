use crate::scroll::ViewportMetrics;

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Conversation
    OpenConversation {
        conversation_id: String,
    },
    CloseConversation,
    LoadOlderMessages,
    ViewportScrolled {
        viewport: ViewportMetrics,
    },
    ScrollAnchorRestored,

    // Compose
    UpdateDraft {
        text: String,
    },
    SendMessage,

    // Profile
    OpenPeerProfile {
        user_id: String,
    },
    ClosePeerProfile,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Conversation
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::LoadOlderMessages => "LoadOlderMessages",
            AppAction::ViewportScrolled { .. } => "ViewportScrolled",
            AppAction::ScrollAnchorRestored => "ScrollAnchorRestored",

            // Compose
            AppAction::UpdateDraft { .. } => "UpdateDraft",
            AppAction::SendMessage => "SendMessage",

            // Profile
            AppAction::OpenPeerProfile { .. } => "OpenPeerProfile",
            AppAction::ClosePeerProfile => "ClosePeerProfile",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
