//! Realtime-side costs of the send path: queue handoff with eviction, bundle
//! pooling and frame conversion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use jack_net_bridge::audio::{
    from_network_frame, to_network_frame, BundlePool, GainSpec, HandoffQueue, NetworkFrame,
};

fn bench_push_evicting(c: &mut Criterion) {
    let queue = HandoffQueue::new(1);
    c.bench_function("push_evicting", |b| {
        b.iter(|| black_box(queue.push(black_box(7u64))))
    });
}

fn bench_pooled_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("pooled_cycle");
    for frames in [64usize, 256, 1024] {
        let pool = Arc::new(BundlePool::new(3, 2, frames));
        let queue = HandoffQueue::new(1);
        let left = vec![0.25f32; frames];
        let right = vec![-0.25f32; frames];
        let mut sequence = 0u64;

        group.bench_with_input(BenchmarkId::from_parameter(frames), &frames, |b, &frames| {
            b.iter(|| {
                if let Some(mut bundle) = pool.acquire() {
                    bundle.fill(&[&left[..], &right[..]], frames, sequence);
                    sequence += 1;
                    queue.push_with(bundle, |old| pool.release(old));
                }
                // the worker side hands the bundle back
                if let Some(bundle) = queue.pop_if_any() {
                    pool.release(bundle);
                }
            })
        });
    }
    group.finish();
}

fn bench_convert(c: &mut Criterion) {
    let frames = 256;
    let left = vec![0.5f32; frames];
    let right = vec![-0.5f32; frames];
    let gains = [0.8f32, 0.6];

    c.bench_function("to_network_frame", |b| {
        b.iter(|| {
            to_network_frame(
                black_box(&[&left[..], &right[..]]),
                frames,
                48_000,
                2,
                GainSpec::UNITY,
            )
        })
    });

    let frame = to_network_frame(&[&left[..], &right[..]], frames, 48_000, 2, GainSpec::UNITY);
    let mut out_left = vec![0.0f32; frames];
    let mut out_right = vec![0.0f32; frames];
    c.bench_function("from_network_frame_gain", |b| {
        b.iter(|| {
            let gain = GainSpec {
                master: 0.5,
                channel: &gains,
            };
            from_network_frame(
                black_box(&frame),
                &mut [&mut out_left[..], &mut out_right[..]],
                gain,
            )
        })
    });

    let mut reused = NetworkFrame::with_capacity(2, frames);
    c.bench_function("frame_prepare", |b| {
        b.iter(|| reused.prepare(48_000, 2, black_box(frames)))
    });
}

criterion_group!(benches, bench_push_evicting, bench_pooled_cycle, bench_convert);
criterion_main!(benches);
