//! End-to-end: a new-format killmail arrives, gets enriched, stored, and
//! broadcast to a matching system subscriber (spec.md §8 scenario S1).

mod support;

use std::time::Duration;

use tokio::sync::watch;
use wk_test_support::{fixtures, MockUpstream};

#[tokio::test]
async fn accepted_killmail_is_stored_and_broadcast_to_system_subscriber() {
    let zkb = MockUpstream::start().await;
    let esi = MockUpstream::start().await;
    zkb.push_package(fixtures::new_format_package(123, 30000142, "2024-01-01T12:00:00Z"));

    let config = support::test_config(&zkb.base_url(), &esi.base_url());
    let app = wanderer_kills::build(&config).unwrap();

    let mut rx = app.subscriptions.broadcaster().subscribe("system:30000142");

    let (_tx, shutdown_rx) = watch::channel(false);
    let poller = app.poller.clone();
    tokio::spawn(async move { poller.run(shutdown_rx).await });

    let delivered = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
    assert!(delivered.is_ok(), "expected a broadcast within the timeout");

    let km = app.store.get(123).expect("killmail 123 should be stored");
    assert_eq!(km.system_id, 30000142);
    assert_eq!(km.total_value, 10_000_000.0);
    assert!(!km.npc);
    assert_eq!(km.victim.character_id, Some(95465499));
}
