//! Property tests for send and delivery ordering.

use npjwi::config::ClientConfig;
use npjwi::engine::{Effect, Engine};
use npjwi::events::ClientEvent;
use npjwi::protocol::Request;
use npjwi::transport::ExchangeOutcome;
use proptest::prelude::*;
use serde_json::json;

fn connected() -> (Engine, u64) {
    let mut engine = Engine::new(ClientConfig::with_endpoint("http://localhost:9000/"));
    engine.start().unwrap();
    engine.take_effects();
    engine.on_send_complete(ExchangeOutcome::ok(
        json!({"responseType": "SessionStarted", "sessionID": "S1"}).to_string(),
    ));
    let generation = engine
        .take_effects()
        .into_iter()
        .find_map(|e| match e {
            Effect::Poll { generation, .. } => Some(generation),
            _ => None,
        })
        .unwrap();
    (engine, generation)
}

fn pushed_ids(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Send(Request::PushClientMessage(push)) => Some(push.client_message_id.clone()),
            _ => None,
        })
        .collect()
}

proptest! {
    /// Whatever is submitted while a send is in flight goes out in
    /// submission order, one exchange at a time.
    #[test]
    fn prop_send_queue_fifo(texts in prop::collection::vec("[a-z]{1,8}", 1..20)) {
        let (mut engine, _) = connected();

        let submitted: Vec<String> = texts
            .iter()
            .map(|text| engine.send_text(text).unwrap())
            .collect();

        let mut transmitted = pushed_ids(&engine.take_effects());
        prop_assert_eq!(transmitted.len(), 1);

        for _ in 1..submitted.len() {
            engine.on_send_complete(ExchangeOutcome::ok(
                json!({"responseType": "ReceivedClientMessage", "sessionID": "S1"}).to_string(),
            ));
            let next = pushed_ids(&engine.take_effects());
            prop_assert_eq!(next.len(), 1);
            transmitted.extend(next);
        }

        prop_assert_eq!(transmitted, submitted);
        prop_assert_eq!(engine.snapshot().queue_len, 0);
    }

    /// Agent messages are delivered in arrival order, partials are
    /// absorbed, and every poll carries the latest message id.
    #[test]
    fn prop_delivery_order_and_cursor(kinds in prop::collection::vec(
        prop_oneof![Just("Complete"), Just("Asynch"), Just("Partial")],
        1..25,
    )) {
        let (mut engine, mut generation) = connected();
        let mut delivered = Vec::new();
        let mut expected = Vec::new();

        for (n, kind) in kinds.iter().enumerate() {
            let id = format!("A{n}");
            if *kind != "Partial" {
                expected.push(id.clone());
            }

            engine.on_poll_complete(generation, ExchangeOutcome::ok(
                json!({
                    "responseType": "AgentMessage",
                    "sessionID": "S1",
                    "agentMessageID": id,
                    "agentMessageType": kind,
                })
                .to_string(),
            ));
            prop_assert_eq!(engine.cursor(), id.as_str());

            let mut next_poll = None;
            for effect in engine.take_effects() {
                match effect {
                    Effect::Emit(ClientEvent::AgentMessage(message)) => {
                        delivered.push(message.agent_message_id);
                    }
                    Effect::Poll { generation, request: Request::PullAgentMessage(pull) } => {
                        prop_assert_eq!(&pull.agent_message_id, &id);
                        next_poll = Some(generation);
                    }
                    _ => {}
                }
            }
            generation = next_poll.expect("poll reissued");
        }

        prop_assert_eq!(delivered, expected);
    }

    /// Replaying quiet long polls never moves the cursor or stops the loop
    #[test]
    fn prop_timeout_no_message_is_idempotent(
        cursor_set in any::<bool>(),
        replays in 1usize..40,
    ) {
        let (mut engine, mut generation) = connected();
        let expected = if cursor_set { "A7" } else { "" };

        if cursor_set {
            engine.on_poll_complete(generation, ExchangeOutcome::ok(
                json!({
                    "responseType": "AgentMessage",
                    "sessionID": "S1",
                    "agentMessageID": "A7",
                    "agentMessageType": "Asynch",
                })
                .to_string(),
            ));
            generation = next_poll(&engine.take_effects()).expect("poll reissued").0;
        }

        for _ in 0..replays {
            engine.on_poll_complete(generation, ExchangeOutcome::ok(
                json!({"responseType": "TimeoutNoMessage", "sessionID": "S1"}).to_string(),
            ));
            let effects = engine.take_effects();
            let (next, cursor) = next_poll(&effects).expect("poll reissued");

            prop_assert_eq!(cursor.as_str(), expected);
            prop_assert_eq!(engine.cursor(), expected);
            prop_assert!(engine.snapshot().receive_active);
            prop_assert_eq!(engine.snapshot().consecutive_receive_errors, 0);
            generation = next;
        }
    }
}

/// Generation and cursor of the poll in `effects`
fn next_poll(effects: &[Effect]) -> Option<(u64, String)> {
    effects.iter().find_map(|e| match e {
        Effect::Poll {
            generation,
            request: Request::PullAgentMessage(pull),
        } => Some((*generation, pull.agent_message_id.clone())),
        _ => None,
    })
}
