//! Property tests for the message stream: whatever order pages, pushes and
//! send outcomes arrive in, the list stays sorted and never shows a message
//! twice.

use std::collections::HashSet;

use chatsync_core::model::{EntryKey, Message, MessagePatch, ProvisionalMessage, TempId, TempIdGenerator};
use chatsync_core::stream::{MessageStream, StreamEntry};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Older(Vec<(u8, i64)>),
    Insert(u8, i64),
    MarkRead(u8),
    Append(i64),
    Confirm(usize, u8, i64),
    Revert(usize),
}

fn message(id: u8, created_at: i64) -> Message {
    Message {
        id: format!("m{id}"),
        conversation_id: "c1".into(),
        sender_id: if id % 2 == 0 { "alice" } else { "bob" }.into(),
        text: format!("text {id}"),
        created_at,
        is_read: false,
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    // Small id and time ranges so collisions are common.
    let id = 0u8..24;
    let ts = 0i64..50;
    prop_oneof![
        prop::collection::vec((id.clone(), ts.clone()), 0..6).prop_map(Op::Older),
        (id.clone(), ts.clone()).prop_map(|(i, t)| Op::Insert(i, t)),
        id.clone().prop_map(Op::MarkRead),
        ts.clone().prop_map(Op::Append),
        (0usize..4, id, ts).prop_map(|(k, i, t)| Op::Confirm(k, i, t)),
        (0usize..4).prop_map(Op::Revert),
    ]
}

fn assert_invariants(stream: &MessageStream) {
    let entries = stream.entries();
    assert!(
        entries
            .windows(2)
            .all(|w| w[0].created_at() <= w[1].created_at()),
        "not sorted: {entries:?}"
    );
    let mut seen = HashSet::new();
    for entry in entries {
        assert!(seen.insert(entry.key()), "duplicate entry: {entry:?}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn stream_stays_sorted_and_unique(
        initial in prop::collection::vec((0u8..24, 0i64..50), 0..8),
        ops in prop::collection::vec(op_strategy(), 0..40),
    ) {
        let mut stream = MessageStream::new();
        stream.apply_initial_load(initial.iter().map(|&(i, t)| message(i, t)).collect());
        assert_invariants(&stream);

        let mut ids = TempIdGenerator::new();
        let mut pending: Vec<TempId> = Vec::new();
        let mut confirmed: HashSet<String> = HashSet::new();

        for op in ops {
            match op {
                Op::Older(page) => {
                    stream.apply_older_page(page.into_iter().map(|(i, t)| message(i, t)).collect());
                }
                Op::Insert(i, t) => {
                    stream.apply_realtime_insert(message(i, t));
                }
                Op::MarkRead(i) => {
                    stream.apply_realtime_update(MessagePatch {
                        id: format!("m{i}"),
                        is_read: Some(true),
                        ..Default::default()
                    });
                    if stream.contains_id(&format!("m{i}")) {
                        let entry = stream
                            .entries()
                            .iter()
                            .find(|e| e.confirmed_id() == Some(format!("m{i}").as_str()));
                        prop_assert!(entry.is_some_and(StreamEntry::is_read));
                    }
                }
                Op::Append(t) => {
                    let temp_id = ids.next_id();
                    stream.apply_optimistic_append(ProvisionalMessage {
                        temp_id,
                        conversation_id: "c1".into(),
                        sender_id: "alice".into(),
                        text: "draft".into(),
                        created_at: t,
                    });
                    pending.push(temp_id);
                    let tail = stream.entries().last().map(StreamEntry::key);
                    let expected = Some(EntryKey::Pending { temp_id });
                    prop_assert_eq!(tail, expected);
                }
                Op::Confirm(k, i, t) => {
                    if pending.is_empty() {
                        continue;
                    }
                    let temp_id = pending.remove(k % pending.len());
                    let m = message(i, t);
                    confirmed.insert(m.id.clone());
                    stream.apply_confirmation(temp_id, m);
                }
                Op::Revert(k) => {
                    if pending.is_empty() {
                        continue;
                    }
                    let temp_id = pending.remove(k % pending.len());
                    stream.apply_optimistic_revert(temp_id);
                    let gone = stream
                        .entries()
                        .iter()
                        .all(|e| e.key() != EntryKey::Pending { temp_id });
                    prop_assert!(gone);
                }
            }
            assert_invariants(&stream);
        }

        // A confirmed send is never dropped.
        for id in &confirmed {
            prop_assert!(stream.contains_id(id), "lost confirmed {}", id);
        }
        prop_assert_eq!(
            stream.entries().iter().filter(|e| e.is_provisional()).count(),
            pending.len()
        );
    }
}
