//! The ordered in-memory message collection for one conversation.
//!
//! Every other component proposes mutations through the `apply_*` methods; the
//! collection itself is never handed out mutably. After every call:
//!
//! - ids are unique (confirmed ids, and temp ids separately),
//! - entries are sorted ascending by `created_at`, ties in arrival order,
//! - `is_read` never goes from true back to false.

use std::collections::HashSet;

use crate::model::{EntryKey, Message, MessagePatch, ProvisionalMessage, TempId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEntry {
    Confirmed(Message),
    Provisional(ProvisionalMessage),
}

impl StreamEntry {
    pub fn key(&self) -> EntryKey {
        match self {
            StreamEntry::Confirmed(m) => EntryKey::Confirmed { id: m.id.clone() },
            StreamEntry::Provisional(p) => EntryKey::Pending { temp_id: p.temp_id },
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            StreamEntry::Confirmed(m) => m.created_at,
            StreamEntry::Provisional(p) => p.created_at,
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            StreamEntry::Confirmed(m) => &m.sender_id,
            StreamEntry::Provisional(p) => &p.sender_id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            StreamEntry::Confirmed(m) => &m.text,
            StreamEntry::Provisional(p) => &p.text,
        }
    }

    pub fn confirmed_id(&self) -> Option<&str> {
        match self {
            StreamEntry::Confirmed(m) => Some(&m.id),
            StreamEntry::Provisional(_) => None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, StreamEntry::Provisional(_))
    }

    pub fn is_read(&self) -> bool {
        match self {
            StreamEntry::Confirmed(m) => m.is_read,
            StreamEntry::Provisional(_) => false,
        }
    }
}

/// What a mutation did. Observers use this to tell prepends apart from the
/// rest (the scroll controller only cares about `Prepended`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamChange {
    Reset { count: usize },
    Prepended { count: usize },
    Inserted { index: usize },
    Replaced { index: usize },
    Updated { index: usize },
    Removed { index: usize },
    Unchanged,
}

impl StreamChange {
    pub fn is_prepend(self) -> bool {
        matches!(self, StreamChange::Prepended { count } if count > 0)
    }

    pub fn is_change(self) -> bool {
        self != StreamChange::Unchanged
    }
}

#[derive(Debug, Default)]
pub struct MessageStream {
    entries: Vec<StreamEntry>,
    has_more: bool,
}

impl MessageStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// The backend said nothing older exists even though the page had content.
    pub fn mark_history_exhausted(&mut self) {
        self.has_more = false;
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.position_of_id(id).is_some()
    }

    fn position_of_id(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.confirmed_id() == Some(id))
    }

    fn position_of_temp(&self, temp_id: TempId) -> Option<usize> {
        self.entries.iter().position(
            |e| matches!(e, StreamEntry::Provisional(p) if p.temp_id == temp_id),
        )
    }

    /// First index whose entry is strictly newer than `created_at`. Inserting
    /// there keeps the sort stable: equal timestamps stay in arrival order.
    fn insertion_index(&self, created_at: i64) -> usize {
        self.entries
            .partition_point(|e| e.created_at() <= created_at)
    }

    /// Lift the provisional entries after `index` so none is older than what
    /// precedes it. Returns false, changing nothing, if a confirmed entry
    /// further down is older: server timestamps are never rewritten.
    fn lift_pending_after(&mut self, index: usize) -> bool {
        let mut floor = self.entries[index].created_at();
        for entry in &self.entries[index + 1..] {
            match entry {
                StreamEntry::Provisional(p) => floor = floor.max(p.created_at),
                StreamEntry::Confirmed(m) if m.created_at < floor => return false,
                StreamEntry::Confirmed(m) => floor = m.created_at,
            }
        }

        let mut floor = self.entries[index].created_at();
        for entry in &mut self.entries[index + 1..] {
            if let StreamEntry::Provisional(p) = entry {
                p.created_at = p.created_at.max(floor);
            }
            floor = entry.created_at();
        }
        true
    }

    fn insert_sorted(&mut self, entry: StreamEntry) -> usize {
        let index = self.insertion_index(entry.created_at());
        self.entries.insert(index, entry);
        index
    }

    /// Replace everything with the newest page.
    pub fn apply_initial_load(&mut self, messages: Vec<Message>) -> StreamChange {
        let mut seen = HashSet::new();
        let mut entries: Vec<StreamEntry> = messages
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .map(StreamEntry::Confirmed)
            .collect();
        entries.sort_by_key(StreamEntry::created_at);
        self.has_more = !entries.is_empty();
        let count = entries.len();
        self.entries = entries;
        StreamChange::Reset { count }
    }

    /// Put an older page ahead of what is already loaded. Entries already
    /// present are skipped, so replaying a page is harmless.
    pub fn apply_older_page(&mut self, messages: Vec<Message>) -> StreamChange {
        if messages.is_empty() {
            self.has_more = false;
            return StreamChange::Unchanged;
        }

        let mut seen: HashSet<String> = self
            .entries
            .iter()
            .filter_map(|e| e.confirmed_id().map(str::to_string))
            .collect();
        let mut batch: Vec<StreamEntry> = messages
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .map(StreamEntry::Confirmed)
            .collect();
        if batch.is_empty() {
            return StreamChange::Unchanged;
        }

        let count = batch.len();
        batch.append(&mut self.entries);
        // Stable: on equal timestamps the older page stays ahead of what was loaded.
        batch.sort_by_key(StreamEntry::created_at);
        self.entries = batch;
        StreamChange::Prepended { count }
    }

    /// Append a pending local send after the current tail.
    ///
    /// The provisional timestamp is lifted to the tail's if the local clock is
    /// behind, so the list stays sorted with the new entry last.
    pub fn apply_optimistic_append(&mut self, mut provisional: ProvisionalMessage) -> StreamChange {
        if self.position_of_temp(provisional.temp_id).is_some() {
            return StreamChange::Unchanged;
        }
        if let Some(tail) = self.entries.last() {
            provisional.created_at = provisional.created_at.max(tail.created_at());
        }
        self.entries.push(StreamEntry::Provisional(provisional));
        StreamChange::Inserted {
            index: self.entries.len() - 1,
        }
    }

    /// Swap the provisional entry for the server's copy.
    ///
    /// The confirmed message takes the provisional entry's slot. A server time
    /// older than the predecessor is lifted to it (the optimistic-append
    /// clamp), and pending sends queued behind are lifted past a newer server
    /// time, so the user's own messages never swap. It only moves when a
    /// confirmed message behind the slot is older than the server time. If the
    /// provisional entry is gone (a full reload evicted it) the confirmed
    /// message is inserted instead: a confirmed send is never dropped.
    pub fn apply_confirmation(&mut self, temp_id: TempId, confirmed: Message) -> StreamChange {
        let slot = self.position_of_temp(temp_id);

        if self.contains_id(&confirmed.id) {
            // The server copy already arrived through another path.
            return match slot {
                Some(index) => {
                    self.entries.remove(index);
                    StreamChange::Removed { index }
                }
                None => StreamChange::Unchanged,
            };
        }

        match slot {
            Some(index) => {
                let mut confirmed = confirmed;
                if let Some(prev) = index.checked_sub(1).map(|i| self.entries[i].created_at()) {
                    confirmed.created_at = confirmed.created_at.max(prev);
                }
                self.entries[index] = StreamEntry::Confirmed(confirmed);
                if self.lift_pending_after(index) {
                    return StreamChange::Replaced { index };
                }
                let entry = self.entries.remove(index);
                let index = self.insert_sorted(entry);
                StreamChange::Replaced { index }
            }
            None => {
                let index = self.insert_sorted(StreamEntry::Confirmed(confirmed));
                StreamChange::Inserted { index }
            }
        }
    }

    pub fn apply_optimistic_revert(&mut self, temp_id: TempId) -> StreamChange {
        match self.position_of_temp(temp_id) {
            Some(index) => {
                self.entries.remove(index);
                StreamChange::Removed { index }
            }
            None => StreamChange::Unchanged,
        }
    }

    /// Insert a pushed message unless its id is already present.
    pub fn apply_realtime_insert(&mut self, message: Message) -> StreamChange {
        if self.contains_id(&message.id) {
            return StreamChange::Unchanged;
        }
        let index = self.insert_sorted(StreamEntry::Confirmed(message));
        StreamChange::Inserted { index }
    }

    /// Merge the fields present in `patch`. A read receipt is never undone.
    pub fn apply_realtime_update(&mut self, patch: MessagePatch) -> StreamChange {
        let Some(index) = self.position_of_id(&patch.id) else {
            return StreamChange::Unchanged;
        };
        let StreamEntry::Confirmed(message) = &mut self.entries[index] else {
            return StreamChange::Unchanged;
        };

        let mut changed = false;
        if let Some(text) = patch.text {
            if message.text != text {
                message.text = text;
                changed = true;
            }
        }
        if patch.is_read == Some(true) && !message.is_read {
            message.is_read = true;
            changed = true;
        }

        if changed {
            StreamChange::Updated { index }
        } else {
            StreamChange::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TempIdGenerator;

    fn msg(id: &str, created_at: i64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "peer".to_string(),
            text: format!("text {id}"),
            created_at,
            is_read: false,
        }
    }

    fn provisional(ids: &mut TempIdGenerator, text: &str, created_at: i64) -> ProvisionalMessage {
        ProvisionalMessage {
            temp_id: ids.next_id(),
            conversation_id: "c1".to_string(),
            sender_id: "me".to_string(),
            text: text.to_string(),
            created_at,
        }
    }

    fn keys(stream: &MessageStream) -> Vec<EntryKey> {
        stream.entries().iter().map(StreamEntry::key).collect()
    }

    #[test]
    fn initial_load_sorts_and_sets_has_more() {
        let mut s = MessageStream::new();
        let change = s.apply_initial_load(vec![msg("b", 20), msg("a", 10)]);
        assert_eq!(change, StreamChange::Reset { count: 2 });
        assert!(s.has_more());
        assert_eq!(s.entries()[0].confirmed_id(), Some("a"));

        s.apply_initial_load(vec![]);
        assert!(!s.has_more());
        assert!(s.is_empty());
    }

    #[test]
    fn older_page_prepends_and_dedupes() {
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("c", 30), msg("d", 40)]);
        let change = s.apply_older_page(vec![msg("a", 10), msg("b", 20), msg("c", 30)]);
        assert_eq!(change, StreamChange::Prepended { count: 2 });
        let ids: Vec<_> = s.entries().iter().filter_map(|e| e.confirmed_id()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        // Replaying the same page is a no-op.
        assert_eq!(
            s.apply_older_page(vec![msg("a", 10), msg("b", 20)]),
            StreamChange::Unchanged
        );
        assert!(s.has_more());
    }

    #[test]
    fn empty_older_page_clears_has_more() {
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10)]);
        assert_eq!(s.apply_older_page(vec![]), StreamChange::Unchanged);
        assert!(!s.has_more());
    }

    #[test]
    fn confirmation_replaces_in_place() {
        let mut ids = TempIdGenerator::new();
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10), msg("b", 20)]);
        let p = provisional(&mut ids, "hello", 30);
        let temp_id = p.temp_id;
        s.apply_optimistic_append(p);
        assert_eq!(s.len(), 3);

        let change = s.apply_confirmation(temp_id, msg("server-1", 31));
        assert_eq!(change, StreamChange::Replaced { index: 2 });
        assert_eq!(s.len(), 3);
        assert_eq!(s.entries()[2].confirmed_id(), Some("server-1"));
        assert!(!s.entries().iter().any(StreamEntry::is_provisional));
    }

    #[test]
    fn confirmation_after_eviction_is_inserted() {
        let mut ids = TempIdGenerator::new();
        let mut s = MessageStream::new();
        let p = provisional(&mut ids, "hello", 30);
        let temp_id = p.temp_id;
        s.apply_optimistic_append(p);
        s.apply_initial_load(vec![msg("a", 10)]);

        let change = s.apply_confirmation(temp_id, msg("server-1", 31));
        assert_eq!(change, StreamChange::Inserted { index: 1 });
        assert!(s.contains_id("server-1"));
    }

    #[test]
    fn confirmation_after_echo_does_not_duplicate() {
        let mut ids = TempIdGenerator::new();
        let mut s = MessageStream::new();
        let p = provisional(&mut ids, "hello", 30);
        let temp_id = p.temp_id;
        s.apply_optimistic_append(p);
        s.apply_realtime_insert(msg("server-1", 31));

        s.apply_confirmation(temp_id, msg("server-1", 31));
        assert_eq!(s.len(), 1);
        assert_eq!(s.entries()[0].confirmed_id(), Some("server-1"));
    }

    #[test]
    fn confirmation_keeps_slot_when_server_clock_lags() {
        let mut ids = TempIdGenerator::new();
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10), msg("b", 50)]);
        let p = provisional(&mut ids, "hello", 60);
        let temp_id = p.temp_id;
        s.apply_optimistic_append(p);

        // Server clock says the send happened before "b".
        let change = s.apply_confirmation(temp_id, msg("server-1", 40));
        assert_eq!(change, StreamChange::Replaced { index: 2 });
        let ids: Vec<_> = s.entries().iter().filter_map(|e| e.confirmed_id()).collect();
        assert_eq!(ids, vec!["a", "b", "server-1"]);
        assert_eq!(s.entries()[2].created_at(), 50);
    }

    #[test]
    fn confirmation_with_later_pending_send_keeps_both_slots() {
        let mut ids = TempIdGenerator::new();
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 500)]);
        let first = provisional(&mut ids, "one", 1000);
        let second = provisional(&mut ids, "two", 1001);
        let (first_id, second_id) = (first.temp_id, second.temp_id);
        s.apply_optimistic_append(first);
        s.apply_optimistic_append(second);

        // The server stamps the first send after the second one's local time.
        let change = s.apply_confirmation(first_id, msg("srv-1", 2000));
        assert_eq!(change, StreamChange::Replaced { index: 1 });
        assert_eq!(
            keys(&s),
            vec![
                EntryKey::Confirmed { id: "a".into() },
                EntryKey::Confirmed { id: "srv-1".into() },
                EntryKey::Pending { temp_id: second_id },
            ]
        );
        assert_eq!(s.entries()[2].created_at(), 2000);

        let change = s.apply_confirmation(second_id, msg("srv-2", 2001));
        assert_eq!(change, StreamChange::Replaced { index: 2 });
        let ids: Vec<_> = s.entries().iter().filter_map(|e| e.confirmed_id()).collect();
        assert_eq!(ids, vec!["a", "srv-1", "srv-2"]);
    }

    #[test]
    fn confirmation_yields_to_newer_server_message_behind_it() {
        let mut ids = TempIdGenerator::new();
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10)]);
        let p = provisional(&mut ids, "hello", 20);
        let temp_id = p.temp_id;
        s.apply_optimistic_append(p);
        s.apply_realtime_insert(msg("peer", 30));

        let change = s.apply_confirmation(temp_id, msg("server-1", 40));
        assert_eq!(change, StreamChange::Replaced { index: 2 });
        let ids: Vec<_> = s.entries().iter().filter_map(|e| e.confirmed_id()).collect();
        assert_eq!(ids, vec!["a", "peer", "server-1"]);
        assert_eq!(s.entries()[2].created_at(), 40);
    }

    #[test]
    fn revert_restores_previous_list() {
        let mut ids = TempIdGenerator::new();
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10)]);
        let before = keys(&s);
        let p = provisional(&mut ids, "hello", 30);
        let temp_id = p.temp_id;
        s.apply_optimistic_append(p);
        assert_eq!(s.apply_optimistic_revert(temp_id), StreamChange::Removed { index: 1 });
        assert_eq!(keys(&s), before);
        assert_eq!(s.apply_optimistic_revert(temp_id), StreamChange::Unchanged);
    }

    #[test]
    fn optimistic_append_stays_at_tail_when_clock_lags() {
        let mut ids = TempIdGenerator::new();
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 100)]);
        s.apply_optimistic_append(provisional(&mut ids, "hi", 5));
        assert!(s.entries()[1].is_provisional());
        assert_eq!(s.entries()[1].created_at(), 100);
    }

    #[test]
    fn realtime_insert_ignores_known_ids() {
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10)]);
        assert_eq!(s.apply_realtime_insert(msg("a", 10)), StreamChange::Unchanged);
        assert_eq!(
            s.apply_realtime_insert(msg("b", 20)),
            StreamChange::Inserted { index: 1 }
        );
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn late_realtime_insert_lands_in_order() {
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10), msg("c", 30)]);
        s.apply_realtime_insert(msg("b", 20));
        let ids: Vec<_> = s.entries().iter().filter_map(|e| e.confirmed_id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn read_state_never_regresses() {
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10)]);
        let change = s.apply_realtime_update(MessagePatch {
            id: "a".into(),
            is_read: Some(true),
            ..Default::default()
        });
        assert_eq!(change, StreamChange::Updated { index: 0 });

        let change = s.apply_realtime_update(MessagePatch {
            id: "a".into(),
            is_read: Some(false),
            ..Default::default()
        });
        assert_eq!(change, StreamChange::Unchanged);
        assert!(s.entries()[0].is_read());
    }

    #[test]
    fn update_for_unknown_id_is_noop() {
        let mut s = MessageStream::new();
        s.apply_initial_load(vec![msg("a", 10)]);
        let change = s.apply_realtime_update(MessagePatch {
            id: "zzz".into(),
            is_read: Some(true),
            ..Default::default()
        });
        assert_eq!(change, StreamChange::Unchanged);
    }
}
