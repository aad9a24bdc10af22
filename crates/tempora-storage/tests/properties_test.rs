//! Property-based tests: random interleavings of puts and deletes are
//! checked against a naive model, and the persisted layout is checked
//! against the store's structural invariants.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;
use tempfile::TempDir;
use tempora_core::{latest, SegmentValue, VersionedRecord};
use tempora_storage::{MemoryEngine, StoreConfig, StoreContext, VersionedStore};

const SEGMENT_INTERVAL: i64 = 10;

/// (key id, timestamp, value byte or tombstone)
type Op = (u8, i64, Option<u8>);

/// key -> timestamp -> version (None = tombstone)
type Model = BTreeMap<Vec<u8>, BTreeMap<i64, Option<Vec<u8>>>>;

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        (0u8..3, 0i64..300, prop::option::weighted(0.8, any::<u8>())),
        1..40,
    )
}

fn key_bytes(key: u8) -> Vec<u8> {
    format!("key-{key}").into_bytes()
}

fn value_bytes(value: u8) -> Vec<u8> {
    vec![value, value.wrapping_add(1)]
}

fn open_store(engine: &Arc<MemoryEngine>) -> (VersionedStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let context = Arc::new(StoreContext::new(dir.path()));
    // Retention far beyond the generated timestamps: nothing expires, so
    // the naive model is exact.
    let config = StoreConfig {
        history_retention_ms: 10_000,
        segment_interval_ms: SEGMENT_INTERVAL,
    };
    let store = VersionedStore::open("orders", config, engine.clone(), context).unwrap();
    (store, dir)
}

fn apply(store: &mut VersionedStore, ops: &[Op]) {
    for (key, ts, value) in ops {
        let value = value.map(value_bytes);
        store
            .put(&key_bytes(*key), value.as_deref(), *ts)
            .unwrap();
    }
}

fn model_of(ops: &[Op]) -> Model {
    let mut model = Model::new();
    for (key, ts, value) in ops {
        model
            .entry(key_bytes(*key))
            .or_default()
            .insert(*ts, value.map(value_bytes));
    }
    model
}

fn expected_as_of(model: &Model, key: &[u8], as_of: i64) -> Option<VersionedRecord> {
    let versions = model.get(key)?;
    let (ts, value) = versions.range(..=as_of).next_back()?;
    value
        .as_ref()
        .map(|v| VersionedRecord::new(Bytes::copy_from_slice(v), *ts))
}

/// Timestamps worth probing: every written timestamp and its neighbors.
fn probes(ops: &[Op]) -> BTreeSet<i64> {
    let mut probes = BTreeSet::from([0, 305]);
    for (_, ts, _) in ops {
        probes.extend([ts - 1, *ts, ts + 1].iter().filter(|t| **t >= 0));
    }
    probes
}

proptest! {
    /// Round-trip: as-of reads agree with the naive model at every
    /// interesting timestamp, and current reads agree with the newest
    /// model version.
    #[test]
    fn prop_reads_match_model(ops in arb_ops()) {
        let engine = Arc::new(MemoryEngine::new());
        let (mut store, _dir) = open_store(&engine);
        apply(&mut store, &ops);
        let model = model_of(&ops);

        for key in model.keys() {
            let newest = model[key].iter().next_back().unwrap();
            let expected_current = newest
                .1
                .as_ref()
                .map(|v| VersionedRecord::new(Bytes::copy_from_slice(v), *newest.0));
            prop_assert_eq!(store.get(key).unwrap(), expected_current);

            for as_of in probes(&ops) {
                prop_assert_eq!(
                    store.get_as_of(key, as_of).unwrap(),
                    expected_as_of(&model, key, as_of),
                    "key {:?} as of {}",
                    key,
                    as_of
                );
            }
        }
    }

    /// Structural invariants of the persisted layout:
    /// - every version's valid-to falls inside its segment's time range
    /// - per key, valid-from timestamps are strictly increasing across
    ///   segment order and the latest tier (zero-width tombstones aside)
    /// - a key sits in the latest tier exactly when its newest version is
    ///   not a tombstone
    #[test]
    fn prop_persisted_layout_invariants(ops in arb_ops()) {
        let engine = Arc::new(MemoryEngine::new());
        let (mut store, _dir) = open_store(&engine);
        apply(&mut store, &ops);
        let model = model_of(&ops);
        let snapshot = engine.snapshot();

        // key -> [(segment id, valid_from, valid_to)]
        let mut history: BTreeMap<Vec<u8>, Vec<(i64, i64, i64)>> = BTreeMap::new();
        for (keyspace, data) in &snapshot {
            let Some(id) = keyspace.strip_prefix("orders.segments.") else {
                continue;
            };
            let id: i64 = id.parse().unwrap();
            let start = id * SEGMENT_INTERVAL;
            for (key, raw) in data {
                let sv = SegmentValue::deserialize(Bytes::copy_from_slice(raw)).unwrap();
                for rec in sv.records().unwrap() {
                    prop_assert!(rec.valid_from <= rec.valid_to);
                    prop_assert!(
                        start <= rec.valid_to && rec.valid_to < start + SEGMENT_INTERVAL,
                        "valid_to {} outside segment {} range",
                        rec.valid_to,
                        id
                    );
                    if rec.valid_from < rec.valid_to {
                        history.entry(key.clone()).or_default().push((
                            id,
                            rec.valid_from,
                            rec.valid_to,
                        ));
                    }
                }
            }
        }

        let latest_tier = snapshot.get("orders.latestValues").cloned().unwrap_or_default();
        for (key, versions) in &model {
            let mut intervals = history.remove(key).unwrap_or_default();
            intervals.sort();
            if let Some(raw) = latest_tier.get(key) {
                let ts = latest::timestamp(raw).unwrap();
                intervals.push((i64::MAX, ts, i64::MAX));
            }
            for pair in intervals.windows(2) {
                prop_assert!(
                    pair[0].1 < pair[1].1,
                    "key {:?}: valid_from not strictly increasing: {:?}",
                    key,
                    pair
                );
            }

            let newest_is_value = versions.iter().next_back().unwrap().1.is_some();
            prop_assert_eq!(latest_tier.contains_key(key), newest_is_value);
        }
    }

    /// Replay idempotence: re-applying a tombstone-free sequence
    /// leaves the persisted bytes untouched.
    #[test]
    fn prop_value_replay_is_byte_identical(ops in arb_ops()) {
        let ops: Vec<Op> = ops
            .into_iter()
            .map(|(k, ts, v)| (k, ts, Some(v.unwrap_or(7))))
            .collect();

        let engine_once = Arc::new(MemoryEngine::new());
        let (mut store_once, _dir1) = open_store(&engine_once);
        apply(&mut store_once, &ops);

        let engine_twice = Arc::new(MemoryEngine::new());
        let (mut store_twice, _dir2) = open_store(&engine_twice);
        apply(&mut store_twice, &ops);
        apply(&mut store_twice, &ops);

        prop_assert_eq!(engine_once.snapshot(), engine_twice.snapshot());
    }

    /// Replaying sequences that include deletions may rewrite implicit
    /// tombstones as explicit ones, but never changes what queries see.
    #[test]
    fn prop_replay_preserves_reads(ops in arb_ops()) {
        let engine = Arc::new(MemoryEngine::new());
        let (mut store, _dir) = open_store(&engine);
        apply(&mut store, &ops);
        apply(&mut store, &ops);
        let model = model_of(&ops);

        for key in model.keys() {
            for as_of in probes(&ops) {
                prop_assert_eq!(
                    store.get_as_of(key, as_of).unwrap(),
                    expected_as_of(&model, key, as_of),
                    "key {:?} as of {} after replay",
                    key,
                    as_of
                );
            }
        }
    }
}
