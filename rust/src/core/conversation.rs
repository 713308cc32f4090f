// Conversation lifecycle + history paging.

use super::*;
use crate::error::BackendError;
use crate::model::{ConversationPage, Message};
use crate::pager;
use crate::scroll::ViewportMetrics;

impl AppCore {
    pub(super) fn open_conversation(&mut self, conversation_id: String) {
        // Tear down any existing screen first.
        self.close_conversation();

        self.session_seq = self.session_seq.wrapping_add(1);
        let token = self.session_seq;
        tracing::info!(%conversation_id, token, "open_conversation");

        self.session = Some(ConversationSession {
            conversation_id,
            token,
            alive: Arc::new(AtomicBool::new(true)),
            stream: MessageStream::new(),
            pager: Pager::new(),
            outbox: Outbox::new(),
            scroll: ScrollController::new(self.load_older_threshold()),
            typing_throttle: TypingThrottle::new(self.typing_throttle()),
            typing: TypingIndicator::new(self.typing_decay()),
            typing_timer: None,
            subscriptions: vec![],
            loading: true,
            draft: String::new(),
            early_events: vec![],
        });
        self.state.peer_profile = None;

        // Subscribe before fetching so nothing lands in the gap between the two.
        self.subscribe_live();
        self.spawn_initial_load();
        self.emit_conversation();
    }

    /// Release everything the screen holds. Does not emit.
    pub(super) fn close_conversation(&mut self) {
        let Some(mut sess) = self.session.take() else {
            return;
        };
        tracing::info!(
            conversation_id = %sess.conversation_id,
            token = sess.token,
            pending_sends = sess.outbox.pending_count(),
            "close_conversation"
        );
        sess.alive.store(false, Ordering::SeqCst);
        for id in sess.subscriptions.drain(..) {
            self.realtime.unsubscribe(id);
        }
        if let Some(timer) = sess.typing_timer.take() {
            timer.abort();
        }
        sess.typing.reset();
    }

    fn spawn_initial_load(&self) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let token = sess.token;
        let alive = sess.alive.clone();
        let conversation_id = sess.conversation_id.clone();
        let viewer_id = self.viewer_id.clone();
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = pager::fetch_initial(backend.as_ref(), &conversation_id, &viewer_id).await;
            if !is_alive(&alive) {
                tracing::debug!(%conversation_id, "initial load finished after close");
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::InitialLoadFetched { token, result },
            )));
        });
    }

    pub(super) fn initial_load_fetched(
        &mut self,
        token: u64,
        result: Result<ConversationPage, BackendError>,
    ) {
        let mark_read = self.mark_read_on_open();
        let Some(sess) = live(&mut self.session, token) else {
            tracing::debug!(token, "stale initial load dropped");
            return;
        };
        sess.loading = false;

        match result {
            Ok(ConversationPage { messages, has_more }) => {
                let count = messages.len();
                sess.stream.apply_initial_load(messages);
                if !has_more {
                    sess.stream.mark_history_exhausted();
                }
                sess.pager.on_initial_loaded();
                let conversation_id = sess.conversation_id.clone();
                let early = std::mem::take(&mut sess.early_events);
                tracing::info!(
                    %conversation_id,
                    count,
                    replayed = early.len(),
                    "initial_load_applied"
                );

                for event in &early {
                    self.merge_realtime(token, event);
                }
                if mark_read {
                    self.spawn_mark_read(&conversation_id);
                }
                self.emit_conversation();
            }
            Err(e) => {
                tracing::warn!(%e, conversation_id = %sess.conversation_id, "initial load failed");
                sess.early_events.clear();
                self.state.toast = Some("Failed to load conversation".to_string());
                self.emit_conversation();
            }
        }
    }

    /// Fire-and-forget; never blocks the list and only logs on failure.
    pub(super) fn spawn_mark_read(&self, conversation_id: &str) {
        let conversation_id = conversation_id.to_string();
        let viewer_id = self.viewer_id.clone();
        let backend = self.backend.clone();
        self.runtime.spawn(async move {
            if let Err(e) = backend
                .mark_messages_as_read(&conversation_id, &viewer_id)
                .await
            {
                tracing::warn!(%e, %conversation_id, "mark_messages_as_read failed");
            }
        });
    }

    pub(super) fn viewport_scrolled(&mut self, viewport: ViewportMetrics) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        if sess.loading
            || !sess
                .scroll
                .should_load_older(viewport, sess.stream.has_more(), sess.pager.in_flight())
        {
            return;
        }
        self.load_older(Some(viewport));
    }

    /// Start an older-page fetch. With a viewport, the anchor is captured so
    /// the host can keep its position once the page renders.
    pub(super) fn load_older(&mut self, viewport: Option<ViewportMetrics>) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.loading || !sess.stream.has_more() || sess.scroll.pending().is_some() {
            return;
        }
        let Some(cursor) = sess.pager.begin_older() else {
            tracing::debug!("older page already in flight; trigger dropped");
            return;
        };
        if let Some(viewport) = viewport {
            sess.scroll.capture_anchor(viewport);
        }

        let token = sess.token;
        let alive = sess.alive.clone();
        let conversation_id = sess.conversation_id.clone();
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        tracing::info!(%conversation_id, cursor, "load_older");
        self.runtime.spawn(async move {
            let result = pager::fetch_older(backend.as_ref(), &conversation_id, cursor).await;
            if !is_alive(&alive) {
                return;
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::OlderPageFetched {
                token,
                cursor,
                result,
            })));
        });
        self.emit_conversation();
    }

    pub(super) fn older_page_fetched(
        &mut self,
        token: u64,
        cursor: u32,
        result: Result<Vec<Message>, BackendError>,
    ) {
        let Some(sess) = live(&mut self.session, token) else {
            tracing::debug!(token, cursor, "stale older page dropped");
            return;
        };

        match result {
            Ok(messages) => {
                let fetched = messages.len();
                let change = sess.stream.apply_older_page(messages);
                sess.pager.finish_older(fetched);
                if !change.is_prepend() {
                    // Nothing new above the viewport: no restore needed.
                    sess.scroll.complete();
                }
                tracing::info!(
                    cursor,
                    fetched,
                    ?change,
                    next_cursor = sess.pager.cursor(),
                    has_more = sess.stream.has_more(),
                    "older_page_applied"
                );
                self.emit_conversation();
            }
            Err(e) => {
                tracing::warn!(%e, cursor, "older page fetch failed");
                sess.pager.abort_older();
                sess.scroll.complete();
                self.state.toast = Some("Failed to load older messages".to_string());
                self.emit_conversation();
            }
        }
    }

    pub(super) fn scroll_anchor_restored(&mut self) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.pager.in_flight() {
            return;
        }
        if sess.scroll.complete().is_some() {
            self.emit_conversation();
        }
    }
}
