//! Benchmarks for change detection over scoreboard feeds

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use scoresync::change::{self, Entity, Phase};
use serde::Serialize;
use std::hint::black_box;

#[derive(Clone, Serialize)]
struct Game {
    id: String,
    home: u32,
    away: u32,
    clock: String,
    phase: Phase,
}

impl Entity for Game {
    fn entity_id(&self) -> String {
        self.id.clone()
    }

    fn signature(&self) -> String {
        format!("{}:{}:{}:{}", self.id, self.home, self.away, self.phase.as_str())
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

fn feed(size: usize) -> Vec<Game> {
    (0..size)
        .map(|i| Game {
            id: format!("g{i}"),
            home: (i % 40) as u32,
            away: (i % 31) as u32,
            clock: "12:00".to_string(),
            phase: if i % 3 == 0 { Phase::InProgress } else { Phase::Final },
        })
        .collect()
}

fn bench_has_changed(c: &mut Criterion) {
    let mut group = c.benchmark_group("has_changed");

    for size in [16, 256] {
        let a = feed(size);
        let b = a.clone();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("identical_{size}"), |bench| {
            bench.iter(|| change::has_changed(black_box(Some(&a)), black_box(Some(&b))));
        });
    }

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_entities");

    for size in [16, 256] {
        let before = change::snapshot(&feed(size));
        let mut after = feed(size);
        after[size / 2].home += 3;
        after.pop();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("one_changed_{size}"), |bench| {
            bench.iter(|| change::diff_entities(black_box(Some(&before)), black_box(&after)));
        });
        group.bench_function(format!("feed_signature_{size}"), |bench| {
            bench.iter(|| change::feed_signature(black_box(&after)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_has_changed, bench_diff);
criterion_main!(benches);
