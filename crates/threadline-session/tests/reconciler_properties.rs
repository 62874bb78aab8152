use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use threadline_session::{MessageReconciler, ReconcileEvent};
use threadline_types::{Message, MessageRole, ParticipantRole};

fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

#[derive(Debug, Clone)]
enum Step {
    Stream(String),
    Complete { content: String, offset: Option<i64> },
    Remote { user: &'static str, content: String, offset: Option<i64> },
    LocalSend(String),
}

fn content_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("  ".to_string()),
        "[a-z]{1,6}",
    ]
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        content_strategy().prop_map(Step::Stream),
        (content_strategy(), prop::option::of(-50i64..50))
            .prop_map(|(content, offset)| Step::Complete { content, offset }),
        (
            prop_oneof![Just("u1"), Just("u2"), Just("u3")],
            content_strategy(),
            prop::option::of(-50i64..50),
        )
            .prop_map(|(user, content, offset)| Step::Remote { user, content, offset }),
        content_strategy().prop_map(Step::LocalSend),
    ]
}

/// Turn a generated step into an event arriving at `now`. Server timestamps
/// may lie anywhere around the arrival time.
fn to_event(step: Step, index: usize, now: DateTime<Utc>) -> ReconcileEvent {
    let at = |offset: Option<i64>| offset.map(|s| now + Duration::seconds(s));
    match step {
        Step::Stream(content) => ReconcileEvent::Stream { content },
        Step::Complete { content, offset } => ReconcileEvent::Complete {
            id: Some(format!("agent-{}", index)),
            content,
            created_at: at(offset),
        },
        Step::Remote { user, content, offset } => ReconcileEvent::Remote {
            id: Some(format!("srv-{}", index)),
            client_id: None,
            user_id: user.to_string(),
            content,
            role: MessageRole::User,
            user_role: Some(ParticipantRole::Contributor),
            timestamp: at(offset),
        },
        Step::LocalSend(content) => ReconcileEvent::LocalSend(Message::optimistic(
            "t1",
            content,
            "u1",
            Some(ParticipantRole::Contributor),
            now,
        )),
    }
}

fn is_sorted(messages: &[Message]) -> bool {
    messages.windows(2).all(|w| w[0].created_at <= w[1].created_at)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    #[test]
    fn proptest_list_stays_sorted_with_one_streaming_element(
        steps in prop::collection::vec(step_strategy(), 0..40),
    ) {
        let reconciler = MessageReconciler::new("t1", "u1");
        let mut messages: Vec<Message> = Vec::new();

        for (index, step) in steps.into_iter().enumerate() {
            let now = base_time() + Duration::seconds(index as i64);
            messages = reconciler.apply(&messages, to_event(step, index, now), now);

            prop_assert!(is_sorted(&messages));
            prop_assert!(messages.iter().filter(|m| m.is_streaming).count() <= 1);
            prop_assert!(messages
                .iter()
                .filter(|m| !m.is_streaming)
                .all(|m| !m.content.trim().is_empty()));
        }
    }

    #[test]
    fn proptest_snapshots_then_complete_leave_one_message(
        snapshots in prop::collection::vec("[a-z]{1,8}", 1..10),
        finale in "[a-z]{1,8}",
    ) {
        let reconciler = MessageReconciler::new("t1", "u1");
        let now = base_time();

        let mut messages = Vec::new();
        for snapshot in snapshots {
            messages = reconciler.apply(&messages, ReconcileEvent::Stream { content: snapshot }, now);
            prop_assert_eq!(messages.len(), 1);
        }
        messages = reconciler.apply(
            &messages,
            ReconcileEvent::Complete { id: None, content: finale.clone(), created_at: None },
            now,
        );

        prop_assert_eq!(messages.len(), 1);
        prop_assert_eq!(&messages[0].content, &finale);
        prop_assert!(!messages[0].is_streaming);
    }
}
