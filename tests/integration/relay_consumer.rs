#![allow(missing_docs)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use edgestore::{
    relay::{
        feed_lines, process_message, MemoryBroker, RelayAction, RelayConsumer, RelayOutcome,
        RelayStats,
    },
    server, Edge, EdgeStatus, EdgeStore, StoreOptions,
};
use serde_json::json;
use tempfile::{tempdir, TempDir};
use tokio::sync::watch;
use tower::ServiceExt;

fn open_store(name: &str) -> (TempDir, EdgeStore) {
    let dir = tempdir().expect("tempdir");
    let store = EdgeStore::open(StoreOptions::new(dir.path().join(name))).expect("open store");
    (dir, store)
}

fn rows(store: &EdgeStore, sql: &str) -> Vec<Edge> {
    store.run_query(sql).expect("query")
}

#[tokio::test]
async fn relay_and_http_produce_identical_rows() {
    let edges = json!([
        {"name": "follow", "src_id": 1, "dest_id": 2, "score": 1.5,
         "updated": "2024-02-01T10:00:00Z"},
        {"name": "block", "src_id": 9, "dest_id": 1, "data": {"reason": "spam"},
         "updated": "2024-02-01T10:00:00Z"}
    ]);

    let (_http_dir, via_http) = open_store("http.db");
    let (_relay_dir, via_relay) = open_store("relay.db");
    for store in [&via_http, &via_relay] {
        store.ensure_type("follow").expect("ensure");
        store.ensure_type("block").expect("ensure");
    }

    let response = server::build_router(via_http.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/edges/save")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"edges": edges}).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let message = json!({"action": "/edges/save", "payload": edges}).to_string();
    let outcome = process_message(&via_relay, message.as_bytes()).await;
    assert!(
        matches!(outcome, RelayOutcome::Applied { action: RelayAction::Save, report } if report.groups == 2),
        "{outcome:?}"
    );

    for table in ["follow", "block"] {
        let sql = format!("SELECT * FROM {table} ORDER BY id");
        assert_eq!(rows(&via_http, &sql), rows(&via_relay, &sql), "{table}");
    }
}

#[tokio::test]
async fn message_timestamp_fills_missing_updated() {
    let (_dir, store) = open_store("stamp.db");
    store.ensure_type("follow").expect("ensure");
    let message = json!({
        "action": "/edges/save",
        "payload": [{"name": "follow", "src_id": 1, "dest_id": 2}],
        "timestamp": "2023-07-04T12:00:00Z"
    })
    .to_string();
    let outcome = process_message(&store, message.as_bytes()).await;
    assert!(outcome.should_ack(), "{outcome:?}");

    let row = &rows(&store, "SELECT * FROM follow")[0];
    assert_eq!(row.updated, Some(time::macros::datetime!(2023-07-04 12:00 UTC)));
    assert_eq!(row.status, Some(EdgeStatus::Active));
}

#[tokio::test]
async fn outcomes_decide_acknowledgement() {
    let (_dir, store) = open_store("outcomes.db");
    store.ensure_type("follow").expect("ensure");

    let undecodable = process_message(&store, b"{not json").await;
    assert!(matches!(undecodable, RelayOutcome::Dropped(_)));
    assert!(undecodable.should_ack());

    let unknown = process_message(&store, br#"{"action":"/edges/purge","payload":[]}"#).await;
    assert!(matches!(unknown, RelayOutcome::Dropped(_)));

    let invalid =
        process_message(&store, br#"{"action":"/edges/save","payload":[{"name":"follow"}]}"#)
            .await;
    assert!(matches!(invalid, RelayOutcome::Rejected(_)));
    assert!(!invalid.should_ack());

    let missing_table = process_message(
        &store,
        br#"{"action":"/edges/save","payload":[{"name":"ghost","src_id":1,"dest_id":2}]}"#,
    )
    .await;
    assert!(matches!(missing_table, RelayOutcome::Failed(_)));
    assert!(!missing_table.should_ack());
}

#[tokio::test]
async fn consumer_redelivers_until_storage_recovers() {
    let (_dir, store) = open_store("consumer.db");
    store.ensure_type("follow").expect("ensure");
    let broker = MemoryBroker::new(Duration::from_secs(20), Duration::from_millis(20));

    broker.publish(r#"{"action":"/edges/save","payload":[{"name":"follow","src_id":1,"dest_id":2}]}"#);
    broker.publish("garbage");
    broker.publish(r#"{"action":"/edges/save","payload":[{"name":"later","src_id":5,"dest_id":6}]}"#);

    let consumer = RelayConsumer::new(store.clone(), 2);
    let (_stop_tx, stop_rx) = watch::channel(false);
    let run = tokio::spawn({
        let consumer = consumer.clone();
        let subscription = broker.subscribe();
        async move { consumer.run(subscription, stop_rx).await }
    });

    for _ in 0..200 {
        if consumer.stats().failed > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(consumer.stats().failed > 0, "storage failure should be nacked");
    assert!(broker.redelivered() > 0);

    store.ensure_type("later").expect("ensure later");
    for _ in 0..200 {
        if broker.outstanding() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    broker.close();
    let stats: RelayStats = run.await.expect("join");

    assert_eq!(stats.applied, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(broker.acked(), 3);
    assert_eq!(rows(&store, "SELECT * FROM later").len(), 1);
}

#[tokio::test]
async fn feed_lines_publishes_and_closes() {
    let (_dir, store) = open_store("feed.db");
    store.ensure_type("follow").expect("ensure");
    let broker = MemoryBroker::default();
    let input = concat!(
        r#"{"action":"/edges/save","payload":[{"name":"follow","src_id":1,"dest_id":2}]}"#,
        "\n\n",
        r#"{"action":"/edges/delete","payload":[{"name":"follow","src_id":1,"dest_id":2}]}"#,
        "\n"
    );
    let published = feed_lines(input.as_bytes(), &broker).await.expect("feed");
    assert_eq!(published, 2);

    let consumer = RelayConsumer::new(store.clone(), 1);
    let (_stop_tx, stop_rx) = watch::channel(false);
    let stats = consumer.run(broker.subscribe(), stop_rx).await;
    assert_eq!(stats.applied, 2);

    let row = &rows(&store, "SELECT * FROM follow")[0];
    assert_eq!(row.status, Some(EdgeStatus::Deleted));
}

#[tokio::test]
async fn shutdown_stops_an_idle_consumer() {
    let (_dir, store) = open_store("shutdown.db");
    let broker = MemoryBroker::default();
    let consumer = RelayConsumer::new(store, 4);
    let (stop_tx, stop_rx) = watch::channel(false);
    let run = tokio::spawn({
        let subscription = broker.subscribe();
        async move { consumer.run(subscription, stop_rx).await }
    });
    stop_tx.send(true).expect("send");
    let stats = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("consumer stopped")
        .expect("join");
    assert_eq!(stats, RelayStats::default());
}
