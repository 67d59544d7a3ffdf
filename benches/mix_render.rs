//! Mix Render Benchmarks
//!
//! Cost of summing N track nodes and the click bus into one device block.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use multitake::audio::{DecodedBuffer, RenderBlock, RenderSource};
use multitake::metronome::{ClickBus, ClickKind};
use multitake::mix::MixGraph;

const SAMPLE_RATE: u32 = 48_000;
const BLOCK_FRAMES: usize = 512;
const TRACK_COUNTS: &[usize] = &[1, 4, 8, 16];

fn take(seconds: usize, seed: u32) -> Arc<DecodedBuffer> {
    let frames = seconds * SAMPLE_RATE as usize;
    let mut state = seed;
    let samples = (0..frames * 2)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
        })
        .collect();
    Arc::new(DecodedBuffer::new(samples, 2, SAMPLE_RATE))
}

fn block() -> RenderBlock {
    RenderBlock {
        start: 1.0,
        sample_rate: SAMPLE_RATE,
        channels: 2,
    }
}

fn bench_mix_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("mix_graph");
    group.throughput(Throughput::Elements(BLOCK_FRAMES as u64));

    for &tracks in TRACK_COUNTS {
        let buffers: Vec<_> = (0..tracks).map(|i| take(4, i as u32 + 1)).collect();

        group.bench_with_input(BenchmarkId::new("same_rate", tracks), &tracks, |b, _| {
            b.iter_batched(
                || {
                    let graph = MixGraph::new(1.0);
                    for (id, buffer) in buffers.iter().enumerate() {
                        graph.add_node(id as u64, buffer.clone(), 0.0, 0.0, 0.5);
                    }
                    (graph, vec![0.0f32; BLOCK_FRAMES * 2])
                },
                |(graph, mut out)| {
                    graph.render(&block(), &mut out);
                    black_box(out)
                },
                BatchSize::SmallInput,
            )
        });
    }

    // 44.1 kHz takes played on a 48 kHz device
    let resampled: Vec<_> = (0..8)
        .map(|i| {
            let buffer = take(4, i + 1);
            Arc::new(DecodedBuffer::new(buffer.samples().to_vec(), 2, 44_100))
        })
        .collect();
    group.bench_function("resampled/8", |b| {
        b.iter_batched(
            || {
                let graph = MixGraph::new(1.0);
                for (id, buffer) in resampled.iter().enumerate() {
                    graph.add_node(id as u64, buffer.clone(), 0.0, 0.0, 0.5);
                }
                (graph, vec![0.0f32; BLOCK_FRAMES * 2])
            },
            |(graph, mut out)| {
                graph.render(&block(), &mut out);
                black_box(out)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_click_bus(c: &mut Criterion) {
    c.bench_function("click_bus/downbeat", |b| {
        b.iter_batched(
            || {
                let bus = ClickBus::new(0.5);
                bus.trigger(ClickKind::Downbeat, 1.0);
                (bus, vec![0.0f32; BLOCK_FRAMES * 2])
            },
            |(bus, mut out)| {
                bus.render(&block(), &mut out);
                black_box(out)
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_mix_graph, bench_click_bus);
criterion_main!(benches);
