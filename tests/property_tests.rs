#![cfg(feature = "native")]

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::*;
use netabase_shelf::prelude::*;
use quickcheck::{QuickCheck, TestResult};

fn codec_round_trips<C: Codec>(codec: C, value: &(String, Vec<u64>, Option<i32>, BTreeSet<u8>)) -> bool {
    let bytes = codec.encode(value).unwrap();
    codec.decode::<(String, Vec<u64>, Option<i32>, BTreeSet<u8>)>(&bytes).unwrap() == *value
}

#[test]
fn prop_codecs_round_trip() {
    fn prop(value: (String, Vec<u64>, Option<i32>, BTreeSet<u8>)) -> bool {
        codec_round_trips(BincodeCodec, &value) && codec_round_trips(JsonCodec, &value)
    }
    QuickCheck::new().tests(200).quickcheck(prop as fn(_) -> bool);
}

#[test]
fn prop_set_then_get_returns_value() {
    fn prop(entries: Vec<(String, Vec<i64>)>) -> bool {
        let shelf: Shelf<String, Vec<i64>, MemoryStore> = Shelf::in_memory(ShelfConfig::default());
        for (key, value) in &entries {
            shelf.set(key, value).unwrap();
            if *shelf.get(key).unwrap().read() != *value {
                return false;
            }
        }
        true
    }
    QuickCheck::new().tests(100).quickcheck(prop as fn(_) -> bool);
}

#[test]
fn prop_shelf_matches_btreemap() {
    // replay a random series of sets and deletes against both and compare
    fn prop(ops: Vec<(u8, Option<u32>)>) -> TestResult {
        if ops.len() > 200 {
            return TestResult::discard();
        }
        let shelf: Shelf<u8, u32, MemoryStore> = Shelf::in_memory(ShelfConfig::default());
        let mut model = BTreeMap::new();

        for (key, op) in ops {
            match op {
                Some(value) => {
                    shelf.set(&key, &value).unwrap();
                    model.insert(key, value);
                }
                None => {
                    let removed = shelf.delete(&key);
                    if removed.is_ok() != model.remove(&key).is_some() {
                        return TestResult::failed();
                    }
                }
            }
        }

        let stored: BTreeMap<u8, u32> = shelf.items().unwrap().map(Result::unwrap).collect();
        TestResult::from_bool(stored == model && shelf.len().unwrap() == model.len())
    }
    QuickCheck::new().tests(100).quickcheck(prop as fn(_) -> TestResult);
}

#[test]
fn prop_tracked_mutation_persists() {
    init_logging();
    fn prop(start: Vec<u32>, pushed: Vec<u32>) -> bool {
        let (store, shelf) = tracked_memory_shelf::<u8, Vec<u32>>();
        shelf.set(&0, &start).unwrap();
        let writes = store.writes();

        shelf.get(&0).unwrap().modify(|v| v.extend(pushed.iter().copied()));

        let expected: Vec<u32> = start.iter().chain(pushed.iter()).copied().collect();
        let wrote = store.writes() - writes;
        *shelf.get(&0).unwrap().read() == expected && wrote == u64::from(!pushed.is_empty())
    }
    QuickCheck::new().tests(100).quickcheck(prop as fn(_, _) -> bool);
}
