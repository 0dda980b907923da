//! End-to-end: a kill older than the acceptance cutoff is skipped, never
//! stored, and never dispatched (spec.md §8 scenario S2), while a kill
//! inside the window is accepted as in S1.

mod support;

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use wk_test_support::MockUpstream;

fn package(killmail_id: u64, kill_time: chrono::DateTime<Utc>) -> serde_json::Value {
    json!({
        "killID": killmail_id,
        "killmail": {
            "killmail_id": killmail_id,
            "killmail_time": kill_time.to_rfc3339(),
            "solar_system_id": 30000142,
            "victim": {"character_id": 95465499, "ship_type_id": 670},
            "attackers": [{"character_id": 90379338}],
        },
        "zkb": {"totalValue": 1_000_000.0, "npc": false, "hash": "h"},
    })
}

#[tokio::test]
async fn killmail_older_than_cutoff_is_skipped_but_a_recent_one_is_accepted() {
    let zkb = MockUpstream::start().await;
    let esi = MockUpstream::start().await;
    let now = Utc::now();
    zkb.push_package(package(200, now - chrono::Duration::hours(25)));
    zkb.push_package(package(201, now - chrono::Duration::minutes(5)));

    // since_hours=24: the first kill is just past the cutoff, the second is
    // well inside it.
    let config = support::test_config_with_since_hours(&zkb.base_url(), &esi.base_url(), 24);
    let app = wanderer_kills::build(&config).unwrap();

    let (_tx, shutdown_rx) = watch::channel(false);
    let poller = app.poller.clone();
    tokio::spawn(async move { poller.run(shutdown_rx).await });

    let accepted = support::wait_until(Duration::from_secs(2), || app.store.get(201).is_some()).await;
    assert!(accepted, "the recent killmail should have been accepted");
    assert!(app.store.get(200).is_none(), "the too-old killmail must never be stored");
}
