#![allow(missing_docs)]

use edgestore::{
    storage::schema::{self, EdgeTypeName},
    EdgeError, EdgeStore, StoreOptions,
};
use rusqlite::Connection;
use tempfile::{tempdir, TempDir};

fn open_store(name: &str) -> (TempDir, EdgeStore) {
    let dir = tempdir().expect("tempdir");
    let store = EdgeStore::open(StoreOptions::new(dir.path().join(name))).expect("open store");
    (dir, store)
}

#[test]
fn init_creates_table_and_five_indexes() {
    let (dir, store) = open_store("schema.db");
    let created = store.ensure_type("follow").expect("ensure");
    assert_eq!(created.as_str(), "follow");
    assert!(store.type_exists("follow").expect("exists"));

    let conn = Connection::open(dir.path().join("schema.db")).expect("raw connection");
    let mut indexes = schema::index_names(&conn, &created).expect("indexes");
    indexes.sort();
    assert_eq!(
        indexes,
        vec![
            "follow:combi",
            "follow:dest_id",
            "follow:score",
            "follow:src_id",
            "follow:status",
        ]
    );
}

#[test]
fn type_names_that_look_like_index_names_can_be_created() {
    let (_dir, store) = open_store("clash.db");
    store.ensure_type("follow").expect("follow");
    store.ensure_type("follow_score").expect("follow_score after follow");
    store.ensure_type("tag_status").expect("tag_status");
    store.ensure_type("tag").expect("tag after tag_status");
    for name in ["follow", "follow_score", "tag_status", "tag"] {
        assert!(store.type_exists(name).expect("exists"), "{name}");
    }
}

#[test]
fn type_lookup_matches_sqlite_identifier_case() {
    let (_dir, store) = open_store("case.db");
    store.ensure_type("follow").expect("ensure");
    assert!(store.type_exists("Follow").expect("exists"));
    assert!(store.type_exists("FOLLOW").expect("exists"));
    store.ensure_type("Follow").expect("ensure again in another case");
}

#[test]
fn init_is_idempotent_and_keeps_rows() {
    let (_dir, store) = open_store("idempotent.db");
    store.ensure_type("likes").expect("first ensure");
    store
        .save_many(&[edgestore::Edge::new("likes", 1, 2)
            .updated(time::macros::datetime!(2023-01-01 0:00 UTC))])
        .expect("save");
    store.ensure_type("likes").expect("second ensure");
    store.ensure_type("likes").expect("third ensure");

    let rows = store.run_query("SELECT * FROM likes").expect("query");
    assert_eq!(rows.len(), 1);
}

#[test]
fn drop_removes_type_and_tolerates_missing_tables() {
    let (_dir, store) = open_store("drop.db");
    store.ensure_type("block").expect("ensure");
    store.drop_type("block").expect("drop");
    assert!(!store.type_exists("block").expect("exists"));
    store.drop_type("block").expect("drop twice");
}

#[test]
fn unsafe_type_names_never_reach_sql() {
    let (_dir, store) = open_store("names.db");
    let too_long = "x".repeat(64);
    for raw in [
        "",
        "follow; DROP TABLE x",
        "1follow",
        "has space",
        "quote\"d",
        "sqlite_master",
        "SQLITE_temp",
        too_long.as_str(),
    ] {
        let err = store.ensure_type(raw).expect_err(raw);
        match err {
            EdgeError::Validation(violation) => assert_eq!(violation.fields, vec!["name"]),
            other => panic!("expected validation error for {raw:?}, got {other:?}"),
        }
    }
    assert!(EdgeTypeName::parse(&"x".repeat(63)).is_ok());
}
