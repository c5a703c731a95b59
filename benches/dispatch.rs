//! Hot-path benchmark suite.
//!
//! Benchmarks the work done per event and per send:
//! - Listener fan-out at different listener counts
//! - Backoff delay computation
//! - Outbound queue push and drain
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use reconnecting_socket::socket::OutboundQueue;
use reconnecting_socket::socket::listeners::{ListenerRegistry, invoke};
use reconnecting_socket::{Backoff, Event, EventKind, Listener, Message};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LISTENER_COUNTS: &[usize] = &[1, 10, 100];
const QUEUE_SIZES: &[usize] = &[16, 1024];

// ============================================================================
// Benchmark: Listener Dispatch
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let event = Event::Message(Message::text("payload"));

    for &count in LISTENER_COUNTS {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ListenerRegistry::new();
        for _ in 0..count {
            let hits = Arc::clone(&hits);
            registry.add(
                EventKind::Message,
                Listener::new(move |_| {
                    hits.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }

        group.bench_with_input(BenchmarkId::new("listeners", count), &count, |b, _| {
            b.iter(|| {
                let handlers = registry.handlers(EventKind::Message);
                black_box(invoke(&handlers, black_box(&event)))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Backoff
// ============================================================================

fn bench_backoff(c: &mut Criterion) {
    let backoff = Backoff::new(Duration::from_millis(1000), Duration::from_millis(5000), 0.5);

    c.bench_function("backoff_delay", |b| {
        let mut attempt = 0u32;
        b.iter(|| {
            attempt = attempt.wrapping_add(1) % 16;
            black_box(backoff.delay(black_box(attempt)))
        });
    });
}

// ============================================================================
// Benchmark: Outbound Queue
// ============================================================================

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    for &size in QUEUE_SIZES {
        group.bench_with_input(BenchmarkId::new("fill_drain", size), &size, |b, &size| {
            b.iter(|| {
                let mut queue = OutboundQueue::new(size);
                for i in 0..size {
                    queue.push(Message::binary(vec![0u8; i % 64]));
                }
                black_box(queue.drain())
            });
        });
    }

    group.finish();
}

// ============================================================================
// Main
// ============================================================================

criterion_group!(benches, bench_dispatch, bench_backoff, bench_queue);
criterion_main!(benches);
