//! Property-based tests for conversation store ordering
//!
//! A replacement followed by appends must read back as the replacement's
//! messages in their given order, then every appended message in call order.

use peerchat_core::{
    backend::{HistoryRecord, WireTimestamp},
    ConversationStore, Message, Origin, SessionId,
};
use proptest::prelude::*;

/// Generate a non-blank identity
fn arb_session_id() -> impl Strategy<Value = SessionId> {
    "[a-z0-9]{1,12}".prop_map(|s| SessionId::new(s).unwrap())
}

/// Generate message bodies with at least one visible character
fn arb_body() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-zA-Z0-9.,!?][a-zA-Z0-9 .,!?]{0,63}").unwrap()
}

fn arb_message(local: SessionId, remote: SessionId) -> impl Strategy<Value = Message> {
    (arb_body(), any::<bool>()).prop_map(move |(body, outgoing)| {
        if outgoing {
            Message::local(local.clone(), remote.clone(), body)
        } else {
            Message::remote(remote.clone(), local.clone(), body)
        }
    })
}

/// Operations applied to a store before and after the single replacement
#[derive(Debug, Clone)]
enum Op {
    Append(Message),
    Replace(Vec<Message>),
}

proptest! {
    /// Property: replace then appends yields replacement order followed by append order
    #[test]
    fn replace_then_appends_keep_call_order(
        history in prop::collection::vec(arb_message(SessionId::new("L").unwrap(), SessionId::new("R").unwrap()), 0..20),
        live in prop::collection::vec(arb_message(SessionId::new("L").unwrap(), SessionId::new("R").unwrap()), 0..20),
    ) {
        let mut store = ConversationStore::new();
        store.replace_all(SessionId::new("R").unwrap(), history.clone());
        for message in &live {
            store.append(message.clone());
        }

        let expected: Vec<Message> = history.iter().chain(live.iter()).cloned().collect();
        prop_assert_eq!(store.messages(), expected.as_slice());
    }

    /// Property: appends made before a replacement never survive it
    #[test]
    fn replacement_discards_earlier_appends(
        before in prop::collection::vec(arb_body(), 0..10),
        ops in prop::collection::vec(
            prop_oneof![
                arb_body().prop_map(|b| Op::Append(Message::local(SessionId::new("L").unwrap(), SessionId::new("R").unwrap(), b))),
                prop::collection::vec(arb_body(), 0..5).prop_map(|bodies| Op::Replace(
                    bodies.into_iter().map(|b| Message::remote(SessionId::new("R").unwrap(), SessionId::new("L").unwrap(), b)).collect()
                )),
            ],
            0..30,
        ),
    ) {
        let local = SessionId::new("L").unwrap();
        let remote = SessionId::new("R").unwrap();
        let mut store = ConversationStore::new();
        for body in before {
            store.append(Message::local(local.clone(), remote.clone(), body));
        }

        let mut model: Option<Vec<Message>> = None;
        for op in &ops {
            match op {
                Op::Append(m) => {
                    store.append(m.clone());
                    if let Some(model) = model.as_mut() {
                        model.push(m.clone());
                    }
                }
                Op::Replace(messages) => {
                    store.replace_all(remote.clone(), messages.clone());
                    model = Some(messages.clone());
                }
            }
        }

        if let Some(model) = model {
            prop_assert_eq!(store.messages(), model.as_slice());
            prop_assert!(store.is_scoped_to(&remote));
        }
    }

    /// Property: history mapping tags origin by comparing the sender with the local identity
    #[test]
    fn history_origin_follows_sender(
        local in arb_session_id(),
        remote in arb_session_id(),
        outgoing in prop::collection::vec(any::<bool>(), 0..20),
    ) {
        prop_assume!(local != remote);

        let records: Vec<HistoryRecord> = outgoing
            .iter()
            .enumerate()
            .map(|(i, &out)| HistoryRecord {
                sender_id: if out { local.clone() } else { remote.clone() },
                receiver_id: if out { remote.clone() } else { local.clone() },
                message: format!("m{}", i),
                timestamp: Some(WireTimestamp::Millis(1_700_000_000_000 + i as u64)),
            })
            .collect();

        let messages: Vec<Message> = records.into_iter().map(|r| r.into_message(&local)).collect();
        prop_assert_eq!(messages.len(), outgoing.len());
        for (i, (message, out)) in messages.iter().zip(outgoing.iter()).enumerate() {
            let expected = if *out { Origin::Local } else { Origin::Remote };
            prop_assert_eq!(message.origin, expected);
            prop_assert_eq!(&message.body, &format!("m{}", i));
        }
    }
}
