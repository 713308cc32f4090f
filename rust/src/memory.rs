//! In-process backend and push channel.
//!
//! Backs the CLI demo and the integration tests. Pages are counted back from
//! the newest message, inserts and read-receipts are published to subscribers
//! the way a hosted change feed would, and every request path can be made to
//! fail on demand.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::ChatBackend;
use crate::error::BackendError;
use crate::model::{ConversationPage, Message, Profile};
use crate::realtime::{
    message_record, RealtimeChannel, RealtimeEvent, RealtimeSubscription, RealtimeTopic,
    SubscriptionId,
};
use crate::state::now_millis;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InitialLoad,
    OlderPage,
    Send,
    Profile,
    Subscribe,
}

struct Subscriber {
    topic: RealtimeTopic,
    viewer_id: String,
    tx: flume::Sender<RealtimeEvent>,
}

#[derive(Default)]
struct Inner {
    /// Ascending by `created_at` per conversation.
    conversations: HashMap<String, Vec<Message>>,
    profiles: HashMap<String, Profile>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    failing: HashSet<FailPoint>,
    send_delay: Option<Duration>,
    requested_cursors: Vec<u32>,
    mark_read_calls: Vec<(String, String)>,
    typing_broadcasts: Vec<(String, String)>,
}

pub struct MemoryBackend {
    page_size: usize,
    next_subscription: AtomicU64,
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            next_subscription: AtomicU64::new(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store a message without publishing it.
    pub fn seed_message(&self, message: Message) {
        let mut inner = self.inner.lock();
        insert_sorted(
            inner
                .conversations
                .entry(message.conversation_id.clone())
                .or_default(),
            message,
        );
    }

    /// Seed `count` alternating messages between `a` and `b`, one minute apart
    /// and ending at `end_ms`. Returns them oldest first.
    pub fn seed_history(
        &self,
        conversation_id: &str,
        a: &str,
        b: &str,
        count: usize,
        end_ms: i64,
    ) -> Vec<Message> {
        let seeded: Vec<Message> = (0..count)
            .map(|i| {
                let back = (count - 1 - i) as i64;
                Message {
                    id: format!("{conversation_id}-m{i}"),
                    conversation_id: conversation_id.to_string(),
                    sender_id: if i % 2 == 0 { a } else { b }.to_string(),
                    text: format!("message {i}"),
                    created_at: end_ms - back * 60_000,
                    is_read: true,
                }
            })
            .collect();
        for message in &seeded {
            self.seed_message(message.clone());
        }
        seeded
    }

    pub fn add_profile(&self, profile: Profile) {
        self.inner.lock().profiles.insert(profile.id.clone(), profile);
    }

    /// A message from someone else: stored, then published as an insert.
    pub fn deliver_peer_message(&self, conversation_id: &str, sender_id: &str, text: &str) -> Message {
        let message = Message {
            id: new_message_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            created_at: now_millis(),
            is_read: false,
        };
        self.seed_message(message.clone());
        self.publish(
            &RealtimeTopic::messages(conversation_id),
            RealtimeEvent::Insert {
                record: message_record(&message),
            },
        );
        message
    }

    /// Push a raw event to every subscriber of `topic`.
    pub fn publish(&self, topic: &RealtimeTopic, event: RealtimeEvent) {
        let inner = self.inner.lock();
        for sub in inner.subscribers.values().filter(|s| &s.topic == topic) {
            let _ = sub.tx.send(event.clone());
        }
    }

    pub fn set_failing(&self, point: FailPoint, failing: bool) {
        let mut inner = self.inner.lock();
        if failing {
            inner.failing.insert(point);
        } else {
            inner.failing.remove(&point);
        }
    }

    pub fn set_send_delay(&self, delay: Option<Duration>) {
        self.inner.lock().send_delay = delay;
    }

    pub fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.inner
            .lock()
            .conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn requested_cursors(&self) -> Vec<u32> {
        self.inner.lock().requested_cursors.clone()
    }

    pub fn mark_read_calls(&self) -> Vec<(String, String)> {
        self.inner.lock().mark_read_calls.clone()
    }

    /// `(topic name, sender)` for every typing broadcast received.
    pub fn typing_broadcasts(&self) -> Vec<(String, String)> {
        self.inner.lock().typing_broadcasts.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    fn check(&self, point: FailPoint) -> Result<(), BackendError> {
        if self.inner.lock().failing.contains(&point) {
            return Err(BackendError::Unavailable);
        }
        Ok(())
    }

    fn page(&self, conversation_id: &str, cursor: u32) -> Vec<Message> {
        let inner = self.inner.lock();
        let Some(all) = inner.conversations.get(conversation_id) else {
            return Vec::new();
        };
        let skip = self.page_size.saturating_mul(cursor as usize);
        let end = all.len().saturating_sub(skip);
        let start = end.saturating_sub(self.page_size);
        all[start..end].to_vec()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn get_conversation_details(
        &self,
        conversation_id: &str,
        _viewer_id: &str,
    ) -> Result<ConversationPage, BackendError> {
        self.check(FailPoint::InitialLoad)?;
        let total = self
            .inner
            .lock()
            .conversations
            .get(conversation_id)
            .map_or(0, Vec::len);
        Ok(ConversationPage {
            messages: self.page(conversation_id, 0),
            has_more: total > self.page_size,
        })
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        page_cursor: u32,
    ) -> Result<Vec<Message>, BackendError> {
        self.inner.lock().requested_cursors.push(page_cursor);
        self.check(FailPoint::OlderPage)?;
        Ok(self.page(conversation_id, page_cursor))
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        viewer_id: &str,
    ) -> Result<Message, BackendError> {
        let delay = self.inner.lock().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(FailPoint::Send)?;
        let message = Message {
            id: new_message_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: viewer_id.to_string(),
            text: text.to_string(),
            created_at: now_millis(),
            is_read: false,
        };
        self.seed_message(message.clone());
        // The change feed echoes the sender's own insert too.
        self.publish(
            &RealtimeTopic::messages(conversation_id),
            RealtimeEvent::Insert {
                record: message_record(&message),
            },
        );
        Ok(message)
    }

    async fn mark_messages_as_read(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<(), BackendError> {
        let changed: Vec<Message> = {
            let mut inner = self.inner.lock();
            inner
                .mark_read_calls
                .push((conversation_id.to_string(), viewer_id.to_string()));
            let Some(all) = inner.conversations.get_mut(conversation_id) else {
                return Ok(());
            };
            all.iter_mut()
                .filter(|m| m.sender_id != viewer_id && !m.is_read)
                .map(|m| {
                    m.is_read = true;
                    m.clone()
                })
                .collect()
        };
        let topic = RealtimeTopic::messages(conversation_id);
        for message in &changed {
            self.publish(
                &topic,
                RealtimeEvent::Update {
                    record: message_record(message),
                },
            );
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        self.check(FailPoint::Profile)?;
        Ok(self.inner.lock().profiles.get(user_id).cloned())
    }
}

impl RealtimeChannel for MemoryBackend {
    fn subscribe(
        &self,
        topic: &RealtimeTopic,
        viewer_id: &str,
    ) -> Result<RealtimeSubscription, BackendError> {
        self.check(FailPoint::Subscribe)?;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, events) = flume::unbounded();
        self.inner.lock().subscribers.insert(
            id,
            Subscriber {
                topic: topic.clone(),
                viewer_id: viewer_id.to_string(),
                tx,
            },
        );
        tracing::debug!(topic = %topic.name(), id = id.0, "memory: subscribed");
        Ok(RealtimeSubscription { id, events })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.inner.lock().subscribers.remove(&id).is_some() {
            tracing::debug!(id = id.0, "memory: unsubscribed");
        }
    }

    fn broadcast(
        &self,
        topic: &RealtimeTopic,
        event: &str,
        sender_id: &str,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner
            .typing_broadcasts
            .push((topic.name(), sender_id.to_string()));
        for sub in inner
            .subscribers
            .values()
            .filter(|s| &s.topic == topic && s.viewer_id != sender_id)
        {
            let _ = sub.tx.send(RealtimeEvent::Broadcast {
                event: event.to_string(),
                sender_id: sender_id.to_string(),
            });
        }
        Ok(())
    }
}

fn insert_sorted(messages: &mut Vec<Message>, message: Message) {
    if let Some(existing) = messages.iter_mut().find(|m| m.id == message.id) {
        *existing = message;
        return;
    }
    let at = messages.partition_point(|m| m.created_at <= message.created_at);
    messages.insert(at, message);
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
