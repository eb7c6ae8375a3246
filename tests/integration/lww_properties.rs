#![allow(missing_docs)]

use std::collections::BTreeMap;

use edgestore::{Edge, EdgeStatus, EdgeStore, StoreOptions};
use proptest::prelude::*;
use time::{Duration, OffsetDateTime};

const EPOCH: i64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct Write {
    dest: i64,
    offset: i64,
    score: i64,
}

fn arb_writes() -> impl Strategy<Value = Vec<Write>> {
    prop::collection::btree_map((1i64..=4, 0i64..=50_000), -1_000i64..1_000, 1..24)
        .prop_map(|writes| {
            writes
                .into_iter()
                .map(|((dest, offset), score)| Write {
                    dest,
                    offset,
                    score,
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn stamp(offset: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(EPOCH).expect("epoch") + Duration::milliseconds(offset)
}

fn edge(write: &Write) -> Edge {
    Edge::new("follow", 1, write.dest)
        .score(write.score as f64)
        .status(EdgeStatus::Active)
        .updated(stamp(write.offset))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_final_row_is_latest_write_in_any_order(
        writes in arb_writes(),
        batch in 1usize..4,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EdgeStore::open(StoreOptions::new(dir.path().join("lww.db")).pool_size(1))
            .expect("open");
        store.ensure_type("follow").expect("ensure");

        for chunk in writes.chunks(batch) {
            let edges: Vec<Edge> = chunk.iter().map(edge).collect();
            store.save_many(&edges).expect("save");
        }

        let mut latest: BTreeMap<i64, &Write> = BTreeMap::new();
        for write in &writes {
            let slot = latest.entry(write.dest).or_insert(write);
            if write.offset > slot.offset {
                *slot = write;
            }
        }

        let rows = store
            .run_query("SELECT * FROM follow ORDER BY dest_id")
            .expect("query");
        prop_assert_eq!(rows.len(), latest.len());
        for (row, (dest, write)) in rows.iter().zip(latest) {
            prop_assert_eq!(row.dest_id, dest);
            prop_assert_eq!(row.score, Some(write.score as f64));
            prop_assert_eq!(row.updated, Some(stamp(write.offset)));
        }
    }
}
