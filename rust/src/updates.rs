use crate::error::BackendError;
use crate::model::{ConversationPage, Message, Profile, TempId};
use crate::realtime::RealtimeEvent;
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Results of async work, fed back into the actor.
///
/// Conversation-scoped events carry the session `token` they were issued
/// under; the actor drops any whose token is no longer current.
#[derive(Debug)]
pub enum InternalEvent {
    InitialLoadFetched {
        token: u64,
        result: Result<ConversationPage, BackendError>,
    },
    OlderPageFetched {
        token: u64,
        cursor: u32,
        result: Result<Vec<Message>, BackendError>,
    },
    SendFinished {
        token: u64,
        temp_id: TempId,
        result: Result<Message, BackendError>,
    },
    Realtime {
        token: u64,
        event: RealtimeEvent,
    },
    TypingExpired {
        token: u64,
        generation: u64,
    },
    ProfileFetched {
        user_id: String,
        result: Result<Option<Profile>, BackendError>,
    },
}
