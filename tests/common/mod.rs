// Common test utilities and helpers
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;

use netabase_shelf::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dog {
    pub name: String,
    pub number: u32,
    pub tricks: Vec<String>,
}

impl Dog {
    pub fn numbered(number: u32) -> Self {
        Self {
            name: format!("dog-{number}"),
            number,
            tricks: Vec::new(),
        }
    }
}

/// Keys of mixed shape, stored side by side in one shelf
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    Name(String),
    Number(u64),
}

/// Values of mixed shape, stored side by side in one shelf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Text(String),
    Numbers(BTreeSet<u32>),
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Backends that persist to disk in this build
pub fn file_backends() -> Vec<BackendKind> {
    BackendKind::iter()
        .filter(|kind| *kind != BackendKind::Memory)
        .collect()
}

/// File configuration for `kind` inside `dir`
pub fn file_config(dir: &Path, kind: BackendKind) -> FileConfig {
    FileConfig::new(dir.join(format!("shelf.{kind}")))
}

pub fn open<K, V>(dir: &Path, kind: BackendKind, config: ShelfConfig) -> Shelf<K, V, Box<dyn Backend>> {
    Shelf::open(kind, file_config(dir, kind), config).unwrap()
}

/// A tracking shelf over a memory store, plus a handle on the store for inspection
pub fn tracked_memory_shelf<K, V>() -> (MemoryStore, Shelf<K, V, MemoryStore>) {
    let store = MemoryStore::new();
    let shelf = Shelf::from_backend(store.clone(), BincodeCodec, ShelfConfig::tracking());
    (store, shelf)
}

pub fn dogs(count: u32) -> Vec<(u32, Dog)> {
    (0..count).map(|i| (i, Dog::numbered(i))).collect()
}
