//! Propagation benchmarks
//!
//! Run with: cargo bench -p ripple-core

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{Computed, Runtime, Signal, WatchHandle, WatchOptions};

// =============================================================================
// SIGNALS
// =============================================================================

fn bench_signal_set_with_effect(c: &mut Criterion) {
    let rt = Runtime::new();
    let s = rt.signal(0u64);
    let sink = Rc::new(Cell::new(0u64));
    let _effect = rt.effect({
        let (s, sink) = (s.clone(), sink.clone());
        move || sink.set(s.get())
    });

    let mut next = 0u64;
    c.bench_function("signal_set_with_effect", |b| {
        b.iter(|| {
            next += 1;
            s.set(black_box(next));
        })
    });
}

fn bench_signal_set_same_value(c: &mut Criterion) {
    let rt = Runtime::new();
    let s = rt.signal(42u64);
    let _effect = rt.effect({
        let s = s.clone();
        move || {
            black_box(s.get());
        }
    });

    c.bench_function("signal_set_same_value", |b| b.iter(|| s.set(black_box(42))));
}

// =============================================================================
// GRAPH SHAPES
// =============================================================================

/// A chain of `len` computeds ending in one effect.
fn bench_deep_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_chain");
    for len in [10usize, 100, 1000] {
        let rt = Runtime::new();
        let head = rt.signal(0u64);
        let mut tail: Computed<u64> = rt.computed({
            let head = head.clone();
            move || head.get() + 1
        });
        for _ in 1..len {
            let previous = tail.clone();
            tail = rt.computed(move || previous.get() + 1);
        }
        let _effect = rt.effect({
            let tail = tail.clone();
            move || {
                black_box(tail.get());
            }
        });

        let mut next = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                next += 1;
                head.set(next);
            })
        });
    }
    group.finish();
}

/// One signal read by `width` computeds, all summed by one effect.
fn bench_wide_diamond(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_diamond");
    for width in [10usize, 100, 1000] {
        let rt = Runtime::new();
        let head = rt.signal(0u64);
        let branches: Vec<Computed<u64>> = (0..width as u64)
            .map(|offset| {
                let head = head.clone();
                rt.computed(move || head.get() + offset)
            })
            .collect();
        let _effect = rt.effect(move || {
            black_box(branches.iter().map(Computed::get).sum::<u64>());
        });

        let mut next = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                next += 1;
                head.set(next);
            })
        });
    }
    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let rt = Runtime::new();
    let signals: Vec<Signal<u64>> = (0..100).map(|_| rt.signal(0)).collect();
    let _effect = rt.effect({
        let signals = signals.clone();
        move || {
            black_box(signals.iter().map(Signal::get).sum::<u64>());
        }
    });

    let mut next = 0u64;
    c.bench_function("batch_100_writes", |b| {
        b.iter(|| {
            next += 1;
            rt.batch(|| {
                for s in &signals {
                    s.set(next);
                }
            })
        })
    });
}

// =============================================================================
// WATCHERS
// =============================================================================

fn bench_deep_watch(c: &mut Criterion) {
    let rt = Runtime::new();
    let leaves: Vec<Signal<u64>> = (0..100).map(|_| rt.signal(0)).collect();
    let root = rt.signal(leaves.clone());
    let _handle = rt.watch(
        root,
        |items: &Vec<Signal<u64>>, _old: Option<&Vec<Signal<u64>>>, _stop: &WatchHandle| {
            black_box(items.len());
        },
        WatchOptions::new().deep(),
    );

    let mut next = 0u64;
    c.bench_function("deep_watch_leaf_write", |b| {
        b.iter(|| {
            next += 1;
            leaves[50].set(next);
        })
    });
}

criterion_group!(
    benches,
    bench_signal_set_with_effect,
    bench_signal_set_same_value,
    bench_deep_chain,
    bench_wide_diamond,
    bench_batched_writes,
    bench_deep_watch,
);
criterion_main!(benches);
