// Optimistic send flow.

use super::*;
use crate::error::BackendError;
use crate::model::{Message, TempId};
use crate::outbox::SendOutcome;
use crate::state::now_millis;

impl AppCore {
    pub(super) fn send_draft(&mut self) {
        let viewer_id = self.viewer_id.clone();
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let Some(provisional) =
            sess.outbox
                .begin_send(&sess.conversation_id, &viewer_id, &sess.draft, now_millis())
        else {
            return;
        };

        let temp_id = provisional.temp_id;
        let text = provisional.text.clone();
        sess.draft.clear();
        sess.stream.apply_optimistic_append(provisional);

        let token = sess.token;
        let conversation_id = sess.conversation_id.clone();
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        tracing::info!(%conversation_id, %temp_id, "send_started");

        // Show the pending entry before the request goes out.
        self.emit_conversation();

        // No alive check: the send completes even if the screen closes; the
        // actor drops the result by token.
        self.runtime.spawn(async move {
            let result = backend
                .send_message(&conversation_id, &text, &viewer_id)
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendFinished {
                token,
                temp_id,
                result,
            })));
        });
    }

    pub(super) fn send_finished(
        &mut self,
        token: u64,
        temp_id: TempId,
        result: Result<Message, BackendError>,
    ) {
        let Some(sess) = live(&mut self.session, token) else {
            tracing::info!(%temp_id, ok = result.is_ok(), "send finished after close");
            return;
        };

        match result {
            Ok(message) => {
                match sess.outbox.confirm(temp_id, &message.id) {
                    Some(SendOutcome::Confirmed { id }) => {
                        let change = sess.stream.apply_confirmation(temp_id, message);
                        tracing::info!(%temp_id, %id, ?change, "send_confirmed");
                    }
                    _ => {
                        tracing::warn!(%temp_id, id = %message.id, "confirmation for unknown send");
                        sess.stream.apply_confirmation(temp_id, message);
                    }
                }
                self.emit_conversation();
            }
            Err(e) => {
                tracing::warn!(%e, %temp_id, "send failed");
                sess.stream.apply_optimistic_revert(temp_id);
                // Never lose what the user typed.
                if let Some(SendOutcome::Failed { text }) = sess.outbox.fail(temp_id) {
                    sess.draft = text;
                }
                self.state.toast = Some("Failed to send message".to_string());
                self.emit_conversation();
            }
        }
    }
}
