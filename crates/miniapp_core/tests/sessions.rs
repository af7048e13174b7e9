mod common;

use common::{envelope, harness, install, wait_for_pending, CollectingBoundary};
use miniapp_core::{ErrorCode, Outbound, PendingKind};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn responses_reach_only_the_sending_app() {
    let h = harness();
    let a = Arc::new(CollectingBoundary::default());
    let b = Arc::new(CollectingBoundary::default());
    h.kernel.attach("a", a.clone());
    h.kernel.attach("b", b.clone());

    h.kernel
        .receive("a", envelope("from-a", "auth:getPermissions", json!({})))
        .await
        .expect("receive task");
    h.kernel
        .receive("b", envelope("from-b", "wallet:drain", json!({})))
        .await
        .expect("receive task");

    let a_messages = a.messages();
    assert_eq!(a_messages.len(), 1);
    let Outbound::Response(response) = &a_messages[0] else {
        panic!("expected a response");
    };
    assert_eq!(response.id, "from-a");
    assert!(response.success);

    let b_messages = b.messages();
    assert_eq!(b_messages.len(), 1);
    let Outbound::Response(response) = &b_messages[0] else {
        panic!("expected a response");
    };
    assert_eq!(response.id, "from-b");
    assert_eq!(response.error_code(), Some(ErrorCode::UnknownCapability));
}

#[tokio::test]
async fn concurrent_calls_are_correlated_by_id() {
    let h = harness();
    install(&h, "demo", &["storage:read", "storage:write"]);
    let boundary = Arc::new(CollectingBoundary::default());
    h.kernel.attach("demo", boundary.clone());

    let handles: Vec<_> = (0..5)
        .map(|n| {
            h.kernel.receive(
                "demo",
                envelope(
                    &format!("set-{n}"),
                    "storage:set",
                    json!({"key": format!("k{n}"), "value": n}),
                ),
            )
        })
        .collect();
    for handle in handles {
        handle.await.expect("receive task");
    }

    let mut ids: Vec<String> = boundary
        .messages()
        .into_iter()
        .filter_map(|message| match message {
            Outbound::Response(response) if response.success => Some(response.id),
            _ => None,
        })
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["set-0", "set-1", "set-2", "set-3", "set-4"]);
    assert_eq!(h.kernel.storage().keys("demo").expect("keys").len(), 5);
}

#[tokio::test]
async fn host_events_go_to_subscribers_until_close() {
    let h = harness();
    install(&h, "a", &["events:subscribe", "events:emit"]);
    install(&h, "b", &[]);
    let a = Arc::new(CollectingBoundary::default());
    let b = Arc::new(CollectingBoundary::default());
    h.kernel.attach("a", a.clone());
    h.kernel.attach("b", b.clone());

    let subscribed = h
        .kernel
        .dispatch("a", envelope("s", "events:subscribe", json!({"event": "cart:updated"})))
        .await;
    assert_eq!(subscribed.data, Some(json!(true)));

    let delivered = h.kernel.publish_event("cart:updated", json!({"items": 3}));
    assert_eq!(delivered, 1);
    assert!(matches!(
        a.messages().as_slice(),
        [Outbound::Event(event)] if event.event == "cart:updated" && event.data == json!({"items": 3})
    ));
    assert!(b.messages().is_empty());

    let emitted = h
        .kernel
        .dispatch("a", envelope("e", "events:emit", json!({"event": "checkout", "data": 1})))
        .await;
    assert!(emitted.success);
    assert_eq!(h.ui.events().len(), 1);

    h.kernel.close("a");
    assert_eq!(h.kernel.publish_event("cart:updated", json!({})), 0);
}

#[tokio::test]
async fn responses_after_close_are_dropped() {
    let h = harness();
    let boundary = Arc::new(CollectingBoundary::default());
    h.kernel.attach("demo", boundary.clone());
    h.kernel.close("demo");

    h.kernel
        .receive("demo", envelope("late", "auth:getPermissions", json!({})))
        .await
        .expect("receive task");
    assert!(boundary.messages().is_empty());
}

#[tokio::test]
async fn stale_replies_never_reach_a_reattached_surface() {
    let h = harness();
    install(&h, "demo", &["ui:modal"]);
    let old = Arc::new(CollectingBoundary::default());
    h.kernel.attach("demo", old.clone());

    let in_flight = h.kernel.receive(
        "demo",
        envelope("old-confirm", "ui:showConfirm", json!({"message": "Sure?"})),
    );
    wait_for_pending(&h.kernel, PendingKind::Confirm).await;
    h.kernel.close("demo");
    let fresh = Arc::new(CollectingBoundary::default());
    h.kernel.attach("demo", fresh.clone());
    in_flight.await.expect("receive task");

    assert!(old.messages().is_empty());
    assert!(fresh.messages().is_empty());

    h.kernel
        .receive("demo", envelope("fresh-call", "auth:getPermissions", json!({})))
        .await
        .expect("receive task");
    let messages = fresh.messages();
    assert!(matches!(
        messages.as_slice(),
        [Outbound::Response(response)] if response.id == "fresh-call"
    ));
}
