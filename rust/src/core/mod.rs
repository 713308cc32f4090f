mod config;
mod conversation;
mod live;
mod send;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::backend::ChatBackend;
use crate::outbox::Outbox;
use crate::pager::Pager;
use crate::realtime::{RealtimeChannel, RealtimeEvent, SubscriptionId};
use crate::scroll::ScrollController;
use crate::state::{
    utc_day, AppState, ConversationViewState, MessageDeliveryState, MessageEntry,
    PeerProfileState,
};
use crate::stream::{MessageStream, StreamEntry};
use crate::typing::{TypingIndicator, TypingThrottle};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use config::default_app_config_json;

/// Per-screen state. Everything here dies with the conversation screen: the
/// token goes stale, `alive` flips, subscriptions are released and the decay
/// timer is aborted.
struct ConversationSession {
    conversation_id: String,
    token: u64,
    alive: Arc<AtomicBool>,

    stream: MessageStream,
    pager: Pager,
    outbox: Outbox,
    scroll: ScrollController,
    typing_throttle: TypingThrottle,
    typing: TypingIndicator,
    typing_timer: Option<tokio::task::JoinHandle<()>>,
    subscriptions: Vec<SubscriptionId>,

    loading: bool,
    draft: String,
    // Realtime events that raced the initial load; replayed once it lands.
    early_events: Vec<RealtimeEvent>,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    viewer_id: String,
    backend: Arc<dyn ChatBackend>,
    realtime: Arc<dyn RealtimeChannel>,

    session: Option<ConversationSession>,
    session_seq: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        viewer_id: String,
        shared_state: Arc<RwLock<AppState>>,
        backend: Arc<dyn ChatBackend>,
        realtime: Arc<dyn RealtimeChannel>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty(&viewer_id);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            viewer_id,
            backend,
            realtime,
            session: None,
            session_seq: 0,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Re-project the session into `state.conversation` and publish.
    fn emit_conversation(&mut self) {
        let view = self.session.as_ref().map(|s| self.project(s));
        self.state.conversation = view;
        self.emit_state();
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep toast in state until the UI explicitly clears it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn project(&self, session: &ConversationSession) -> ConversationViewState {
        let mut prev_day: Option<i64> = None;
        let messages = session
            .stream
            .entries()
            .iter()
            .map(|entry| {
                let day = utc_day(entry.created_at());
                let starts_new_day = prev_day != Some(day);
                prev_day = Some(day);
                self.entry_view(entry, starts_new_day)
            })
            .collect();

        ConversationViewState {
            conversation_id: session.conversation_id.clone(),
            messages,
            loading: session.loading,
            loading_more: session.pager.in_flight() || session.scroll.pending().is_some(),
            has_more: session.stream.has_more(),
            peer_is_typing: session.typing.peer_is_typing(),
            draft: session.draft.clone(),
            // Only surfaced once the older page is in the list, i.e. when the
            // host's next layout pass is the one to restore against.
            scroll_anchor: session
                .scroll
                .pending()
                .filter(|_| !session.pager.in_flight()),
        }
    }

    fn entry_view(&self, entry: &StreamEntry, starts_new_day: bool) -> MessageEntry {
        let (id, delivery) = match entry {
            StreamEntry::Confirmed(m) => (
                m.id.clone(),
                if m.is_read {
                    MessageDeliveryState::Read
                } else {
                    MessageDeliveryState::Sent
                },
            ),
            StreamEntry::Provisional(p) => (p.temp_id.to_string(), MessageDeliveryState::Pending),
        };
        MessageEntry {
            id,
            sender_id: entry.sender_id().to_string(),
            text: entry.text().to_string(),
            created_at: entry.created_at(),
            is_read: entry.is_read(),
            is_mine: entry.sender_id() == self.viewer_id,
            delivery,
            starts_new_day,
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: drafts carry message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::OpenConversation { conversation_id } => {
                let conversation_id = conversation_id.trim().to_string();
                if conversation_id.is_empty() {
                    self.toast("Conversation not found");
                    return;
                }
                self.open_conversation(conversation_id);
            }
            AppAction::CloseConversation => {
                if self.session.is_some() {
                    self.close_conversation();
                    self.emit_conversation();
                }
            }
            AppAction::LoadOlderMessages => self.load_older(None),
            AppAction::ViewportScrolled { viewport } => self.viewport_scrolled(viewport),
            AppAction::ScrollAnchorRestored => self.scroll_anchor_restored(),
            AppAction::UpdateDraft { text } => self.update_draft(text),
            AppAction::SendMessage => self.send_draft(),
            AppAction::OpenPeerProfile { user_id } => self.open_peer_profile(user_id),
            AppAction::ClosePeerProfile => {
                if self.state.peer_profile.take().is_some() {
                    self.emit_state();
                }
            }
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::InitialLoadFetched { token, result } => {
                self.initial_load_fetched(token, result)
            }
            InternalEvent::OlderPageFetched {
                token,
                cursor,
                result,
            } => self.older_page_fetched(token, cursor, result),
            InternalEvent::SendFinished {
                token,
                temp_id,
                result,
            } => self.send_finished(token, temp_id, result),
            InternalEvent::Realtime { token, event } => self.realtime_event(token, event),
            InternalEvent::TypingExpired { token, generation } => {
                self.typing_expired(token, generation)
            }
            InternalEvent::ProfileFetched { user_id, result } => match result {
                Ok(Some(profile)) => {
                    self.state.peer_profile = Some(PeerProfileState {
                        user_id: profile.id,
                        name: profile.name,
                        about: profile.about,
                        photo_url: profile.photo_url,
                    });
                    self.emit_state();
                }
                Ok(None) => {
                    tracing::info!(%user_id, "profile not found");
                    self.toast("Could not load profile.");
                }
                Err(e) => {
                    tracing::warn!(%e, %user_id, "profile fetch failed");
                    self.toast("Could not load profile.");
                }
            },
        }
    }

    fn open_peer_profile(&mut self, user_id: String) {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            self.toast("Could not load profile.");
            return;
        }
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.get_profile(&user_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ProfileFetched {
                user_id,
                result,
            })));
        });
    }
}

impl Drop for AppCore {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.close_conversation();
        }
    }
}

/// The open session, but only if `token` still identifies it. Takes the slot
/// rather than `&mut AppCore` so callers can keep using the runtime and
/// senders while holding the session.
fn live(slot: &mut Option<ConversationSession>, token: u64) -> Option<&mut ConversationSession> {
    slot.as_mut().filter(|s| s.token == token)
}

/// Checked by spawned tasks before reporting back.
fn is_alive(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}
