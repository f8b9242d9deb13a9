//! Property-based tests for the session controller
//!
//! These drive the controller with arbitrary interleavings of user sends,
//! connection events and timer firings, and check the invariants that must hold
//! for every interleaving.

use super::testing::{FakeTimer, FakeTransport, controller};
use super::{SessionController, SessionState};
use crate::protocol::{self, NORMAL_CLOSURE};
use crate::transport::{TransportEvent, TransportEventKind};
use proptest::prelude::*;

type Session = SessionController<FakeTransport, FakeTimer>;

#[derive(Debug, Clone)]
enum Action {
    Send(String),
    /// The current connection completes its handshake (only while connecting).
    Open,
    Close(u16),
    /// An inbound frame; `true` for a well-formed reply.
    Inbound(bool),
    FireTimer,
    /// A late event from the previous generation.
    Stale,
}

fn arb_close_code() -> impl Strategy<Value = u16> {
    prop_oneof![
        Just(NORMAL_CLOSURE),
        Just(1001u16),
        Just(1006u16),
        Just(1011u16),
        4000u16..5000,
    ]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(Action::Send),
        Just(Action::Open),
        arb_close_code().prop_map(Action::Close),
        any::<bool>().prop_map(Action::Inbound),
        Just(Action::FireTimer),
        Just(Action::Stale),
    ]
}

fn arb_quiet_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        any::<bool>().prop_map(Action::Inbound),
        Just(Action::FireTimer),
        Just(Action::Stale),
    ]
}

fn inbound_frame(well_formed: bool) -> &'static str {
    if well_formed {
        r#"{"response":"ok"}"#
    } else {
        "garbage"
    }
}

fn apply(session: &mut Session, action: &Action) {
    let generation = session.generation();
    match action {
        Action::Send(text) => {
            session.send_user_message(text);
        }
        Action::Open => {
            if session.state() == SessionState::Connecting {
                session.transport_mut().open = true;
                session.handle_event(TransportEvent::new(generation, TransportEventKind::Opened));
            }
        }
        Action::Close(code) => {
            session.transport_mut().open = false;
            session.handle_event(TransportEvent::new(
                generation,
                TransportEventKind::Closed {
                    code: *code,
                    reason: String::new(),
                },
            ));
        }
        Action::Inbound(well_formed) => {
            session.handle_event(TransportEvent::new(
                generation,
                TransportEventKind::Message(inbound_frame(*well_formed).to_string()),
            ));
        }
        Action::FireTimer => {
            if let Some(handle) = session.pending_reconnect() {
                session.on_reconnect_due(handle);
            }
        }
        Action::Stale => {
            if generation > 1 {
                let stale = generation - 1;
                session.handle_event(TransportEvent::new(stale, TransportEventKind::Opened));
                session.handle_event(TransportEvent::new(
                    stale,
                    TransportEventKind::Message(inbound_frame(true).to_string()),
                ));
            }
        }
    }
}

fn sends(actions: &[Action]) -> Vec<String> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::Send(text) => Some(protocol::encode_query(text)),
            _ => None,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Appends are exactly one per user send and one per well-formed reply.
    #[test]
    fn prop_log_grows_by_sends_plus_replies(actions in proptest::collection::vec(arb_action(), 0..40)) {
        let mut session = controller();
        session.start();
        let before = session.log().len();

        for action in &actions {
            apply(&mut session, action);
        }

        let m = actions.iter().filter(|a| matches!(a, Action::Send(_))).count();
        let n = actions.iter().filter(|a| matches!(a, Action::Inbound(true))).count();
        prop_assert_eq!(session.log().len(), before + n + m);

        let ids: Vec<u64> = session.log().entries().iter().map(|e| e.id).collect();
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    // What reached the wire is always the oldest sends, in order, each once.
    #[test]
    fn prop_transmission_is_fifo_prefix(actions in proptest::collection::vec(arb_action(), 0..40)) {
        let mut session = controller();
        session.start();
        for action in &actions {
            apply(&mut session, action);
        }

        let expected = sends(&actions);
        let sent = &session.transport().sent;
        prop_assert!(sent.len() <= expected.len());
        prop_assert_eq!(&expected[..sent.len()], &sent[..]);
        prop_assert_eq!(sent.len() + session.queue().len(), expected.len());
    }

    // Once the connection comes back, every queued message goes out in order.
    #[test]
    fn prop_queue_drains_on_next_open(actions in proptest::collection::vec(arb_action(), 0..40)) {
        let mut session = controller();
        session.start();
        for action in &actions {
            apply(&mut session, action);
        }

        let mut expected = sends(&actions);
        if session.state() == SessionState::Disconnected {
            match session.pending_reconnect() {
                Some(handle) => session.on_reconnect_due(handle),
                None => {
                    session.send_user_message("flush");
                    expected.push(protocol::encode_query("flush"));
                }
            }
        }
        prop_assert_ne!(session.state(), SessionState::Disconnected);
        apply(&mut session, &Action::Open);

        prop_assert_eq!(session.state(), SessionState::Open);
        prop_assert!(session.queue().is_empty());
        prop_assert_eq!(&session.transport().sent, &expected);
    }

    // Abnormal closures always lead back to connecting.
    #[test]
    fn prop_abnormal_close_always_reconnects(
        codes in proptest::collection::vec(arb_close_code().prop_filter("abnormal", |c| *c != NORMAL_CLOSURE), 1..20),
        open_between in proptest::collection::vec(any::<bool>(), 20),
    ) {
        let mut session = controller();
        session.start();
        for (i, code) in codes.iter().enumerate() {
            if open_between[i] {
                apply(&mut session, &Action::Open);
            }
            apply(&mut session, &Action::Close(*code));
            prop_assert_eq!(session.state(), SessionState::Disconnected);
            let handle = session.pending_reconnect();
            prop_assert!(handle.is_some());
            apply(&mut session, &Action::FireTimer);
            prop_assert_eq!(session.state(), SessionState::Connecting);
        }
    }

    // A normal closure is never followed by an automatic connect.
    #[test]
    fn prop_normal_close_stays_down(
        prefix in proptest::collection::vec(arb_action(), 0..20),
        suffix in proptest::collection::vec(arb_quiet_action(), 0..20),
    ) {
        let mut session = controller();
        session.start();
        for action in &prefix {
            apply(&mut session, action);
        }
        if session.state() == SessionState::Disconnected {
            match session.pending_reconnect() {
                Some(handle) => session.on_reconnect_due(handle),
                None => {
                    session.send_user_message("again");
                }
            }
        }
        prop_assert!(matches!(session.state(), SessionState::Open | SessionState::Connecting));

        apply(&mut session, &Action::Close(NORMAL_CLOSURE));
        let connects = session.transport().connects.len();
        prop_assert!(session.pending_reconnect().is_none());
        for action in &suffix {
            apply(&mut session, action);
        }
        prop_assert_eq!(session.transport().connects.len(), connects);
        prop_assert_eq!(session.state(), SessionState::Disconnected);
    }

    // Nothing changes after shutdown, whatever arrives late.
    #[test]
    fn prop_shutdown_is_terminal(
        prefix in proptest::collection::vec(arb_action(), 0..20),
        suffix in proptest::collection::vec(arb_action(), 0..20),
    ) {
        let mut session = controller();
        session.start();
        for action in &prefix {
            apply(&mut session, action);
        }
        session.shutdown();

        let log_len = session.log().len();
        let connects = session.transport().connects.len();
        let sent = session.transport().sent.len();
        let scheduled = session.timer().scheduled.len();

        for action in &suffix {
            apply(&mut session, action);
        }
        for generation in 0..=session.generation() {
            session.handle_event(TransportEvent::new(generation, TransportEventKind::Opened));
            session.handle_event(TransportEvent::new(
                generation,
                TransportEventKind::Message(inbound_frame(true).to_string()),
            ));
        }

        prop_assert_eq!(session.state(), SessionState::Disconnected);
        prop_assert_eq!(session.log().len(), log_len);
        prop_assert_eq!(session.transport().connects.len(), connects);
        prop_assert_eq!(session.transport().sent.len(), sent);
        prop_assert_eq!(session.timer().scheduled.len(), scheduled);
        prop_assert!(!session.bot_composing());
    }
}
