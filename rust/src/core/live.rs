// Realtime wiring: the message change feed and typing broadcasts.

use std::time::Instant;

use super::*;
use crate::realtime::{classify, IgnoreReason, Merge, RealtimeSubscription, RealtimeTopic};
use crate::typing::TYPING_EVENT;

impl AppCore {
    pub(super) fn subscribe_live(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let token = sess.token;
        let alive = sess.alive.clone();
        let topics = [
            RealtimeTopic::messages(&sess.conversation_id),
            RealtimeTopic::typing(&sess.conversation_id),
        ];

        let mut ids = Vec::with_capacity(topics.len());
        for topic in topics {
            match self.realtime.subscribe(&topic, &self.viewer_id) {
                Ok(sub) => {
                    tracing::info!(topic = %topic.name(), "realtime_subscribed");
                    ids.push(sub.id);
                    self.forward_events(token, alive.clone(), sub);
                }
                Err(e) => {
                    // The screen still works from fetches alone; it just won't be live.
                    tracing::warn!(%e, topic = %topic.name(), "realtime subscribe failed");
                }
            }
        }
        if let Some(sess) = self.session.as_mut() {
            sess.subscriptions = ids;
        }
    }

    fn forward_events(&self, token: u64, alive: Arc<AtomicBool>, sub: RealtimeSubscription) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            while let Ok(event) = sub.events.recv_async().await {
                if !is_alive(&alive) {
                    break;
                }
                let msg = CoreMsg::Internal(Box::new(InternalEvent::Realtime { token, event }));
                if tx.send(msg).is_err() {
                    break;
                }
            }
            tracing::debug!(token, subscription = sub.id.0, "realtime forwarder stopped");
        });
    }

    pub(super) fn realtime_event(&mut self, token: u64, event: RealtimeEvent) {
        if let RealtimeEvent::Broadcast { event: name, sender_id } = &event {
            if name == TYPING_EVENT && *sender_id != self.viewer_id {
                self.typing_signal(token);
            }
            return;
        }

        let Some(sess) = live(&mut self.session, token) else {
            tracing::debug!(token, "realtime event after teardown ignored");
            return;
        };
        if sess.loading {
            sess.early_events.push(event);
            return;
        }
        if self.merge_realtime(token, &event) {
            self.emit_conversation();
        }
    }

    /// Fold one change event into the stream. Returns true if it changed.
    pub(super) fn merge_realtime(&mut self, token: u64, event: &RealtimeEvent) -> bool {
        let viewer_id = self.viewer_id.clone();
        let Some(sess) = live(&mut self.session, token) else {
            return false;
        };

        match classify(event, &sess.conversation_id, &viewer_id) {
            Merge::Insert(message) => {
                let id = message.id.clone();
                if !sess.stream.apply_realtime_insert(message).is_change() {
                    tracing::debug!(%id, "duplicate insert ignored");
                    return false;
                }
                tracing::info!(%id, "realtime_insert");
                // The viewer is on the screen, so the new message is seen.
                let conversation_id = sess.conversation_id.clone();
                self.spawn_mark_read(&conversation_id);
                true
            }
            Merge::Update(patch) => {
                let id = patch.id.clone();
                let changed = sess.stream.apply_realtime_update(patch).is_change();
                if !changed {
                    tracing::debug!(%id, "stale or unknown update ignored");
                }
                changed
            }
            Merge::Ignore(IgnoreReason::Malformed(reason)) => {
                tracing::warn!(%reason, "malformed realtime row dropped");
                false
            }
            Merge::Ignore(reason) => {
                tracing::debug!(?reason, "realtime event ignored");
                false
            }
        }
    }

    fn typing_signal(&mut self, token: u64) {
        let tx = self.core_sender.clone();
        let Some(sess) = live(&mut self.session, token) else {
            return;
        };
        let was_typing = sess.typing.peer_is_typing();
        let generation = sess.typing.signal_received();
        let decay = sess.typing.decay();
        if let Some(timer) = sess.typing_timer.take() {
            timer.abort();
        }
        let alive = sess.alive.clone();
        sess.typing_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(decay).await;
            if is_alive(&alive) {
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::TypingExpired {
                    token,
                    generation,
                })));
            }
        }));
        if !was_typing {
            self.emit_conversation();
        }
    }

    pub(super) fn typing_expired(&mut self, token: u64, generation: u64) {
        let Some(sess) = live(&mut self.session, token) else {
            return;
        };
        if sess.typing.expire(generation) {
            sess.typing_timer = None;
            self.emit_conversation();
        }
    }

    pub(super) fn update_draft(&mut self, text: String) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        sess.draft = text;
        let should_signal = sess.typing_throttle.should_send(Instant::now());
        let topic = RealtimeTopic::typing(&sess.conversation_id);
        self.emit_conversation();

        if should_signal {
            // Lost signals self-heal on the next keystroke; never retried.
            if let Err(e) = self
                .realtime
                .broadcast(&topic, TYPING_EVENT, &self.viewer_id)
            {
                tracing::debug!(%e, "typing broadcast failed");
            }
        }
    }
}
