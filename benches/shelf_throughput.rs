use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use netabase_shelf::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub author_id: u64,
}

fn article(i: u64) -> Article {
    Article {
        id: i,
        title: format!("Article {}", i),
        content: format!("Content {}", i),
        author_id: i % 10,
    }
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [100u64, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("raw_sled", size), size, |b, &size| {
            b.iter(|| {
                let db = sled::Config::new().temporary(true).open().unwrap();
                for i in 0..size {
                    let key = bincode::serde::encode_to_vec(i, bincode::config::standard()).unwrap();
                    let value = bincode::serde::encode_to_vec(article(i), bincode::config::standard()).unwrap();
                    db.insert(key, value).unwrap();
                }
                black_box(db.len());
            });
        });

        group.bench_with_input(BenchmarkId::new("shelf_sled", size), size, |b, &size| {
            b.iter(|| {
                let shelf: Shelf<u64, Article, SledStore> =
                    Shelf::from_backend(SledStore::temp().unwrap(), BincodeCodec, ShelfConfig::default());
                for i in 0..size {
                    shelf.set(&i, &article(i)).unwrap();
                }
                black_box(shelf.len().unwrap());
            });
        });

        group.bench_with_input(BenchmarkId::new("shelf_batch", size), size, |b, &size| {
            b.iter(|| {
                let shelf: Shelf<u64, Article, SledStore> =
                    Shelf::from_backend(SledStore::temp().unwrap(), BincodeCodec, ShelfConfig::default());
                let written = shelf.update((0..size).map(|i| (i, article(i))).collect::<MappingSource<_, _>>());
                black_box(written.unwrap());
            });
        });
    }

    group.finish();
}

fn bench_get_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_release");
    let size = 1000u64;

    for (name, config) in [
        ("untracked", ShelfConfig::default()),
        ("tracked_unchanged", ShelfConfig::tracking()),
    ] {
        let shelf: Shelf<u64, Article, MemoryStore> = Shelf::in_memory(config);
        shelf.update((0..size).map(|i| (i, article(i))).collect::<Vec<_>>()).unwrap();

        group.bench_function(BenchmarkId::new(name, size), |b| {
            b.iter(|| {
                for i in 0..size {
                    let tracked = shelf.get(&i).unwrap();
                    black_box(tracked.read().author_id);
                }
            });
        });
    }

    let shelf: Shelf<u64, Article, MemoryStore> = Shelf::in_memory(ShelfConfig::tracking());
    shelf.update((0..size).map(|i| (i, article(i))).collect::<Vec<_>>()).unwrap();
    group.bench_function(BenchmarkId::new("tracked_modified", size), |b| {
        b.iter(|| {
            for i in 0..size {
                shelf.get(&i).unwrap().modify(|a| a.author_id += 1);
            }
        });
    });

    group.finish();
}

fn bench_close_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("close_drain");

    for size in [100u64, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("memory", size), size, |b, &size| {
            b.iter(|| {
                let shelf: Shelf<u64, Article, MemoryStore> = Shelf::in_memory(ShelfConfig::tracking());
                shelf.update((0..size).map(|i| (i, article(i))).collect::<Vec<_>>()).unwrap();
                let held: Vec<_> = (0..size).map(|i| shelf.get(&i).unwrap()).collect();
                for tracked in &held {
                    tracked.modify(|a| a.id = size - a.id);
                }
                shelf.close().unwrap();
                black_box(held.len());
            });
        });
    }

    group.finish();
}

fn configure_criterion() -> Criterion {
    let _ = env_logger::builder().is_test(true).try_init();
    Criterion::default().sample_size(20)
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = bench_insert, bench_get_release, bench_close_drain
}
criterion_main!(benches);
