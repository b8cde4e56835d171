use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pipe_line::{from_iter, noop, noop_consumer, Batch, Line, Many, Message, ShardMany};
use std::time::Duration;

fn messages(count: usize) -> Vec<Message> {
    (0..count).map(|i| Message::Bytes(vec![i as u8; 64])).collect()
}

fn benchmark_single_stage_throughput(c: &mut Criterion) {
    let input = messages(1000);
    c.bench_function("single_stage_1000_msgs", |b| {
        b.iter(|| {
            Line::new()
                .producer(from_iter(black_box(input.clone())))
                .add(noop)
                .consumer(noop_consumer)
                .run()
                .expect("Run failed");
        });
    });
}

fn benchmark_three_stage_throughput(c: &mut Criterion) {
    let input = messages(1000);
    c.bench_function("three_stage_1000_msgs", |b| {
        b.iter(|| {
            Line::new()
                .producer(from_iter(black_box(input.clone())))
                .add(noop)
                .add(noop)
                .add(noop)
                .consumer(noop_consumer)
                .run()
                .expect("Run failed");
        });
    });
}

fn benchmark_many_workers(c: &mut Criterion) {
    let input = messages(5000);
    c.bench_function("many_4_workers_5000_msgs", |b| {
        b.iter(|| {
            Line::new()
                .producer(from_iter(black_box(input.clone())))
                .add(Many::new(noop, 4).expect("Many"))
                .consumer(noop_consumer)
                .run()
                .expect("Run failed");
        });
    });
}

fn benchmark_shard_many(c: &mut Criterion) {
    let input = messages(5000);
    c.bench_function("shard_many_4_5000_msgs", |b| {
        b.iter(|| {
            let shards = ShardMany::builder()
                .concurrency(4)
                .stage(noop)
                .key(|m| match m {
                    Message::Bytes(bytes) => bytes[..1].to_vec(),
                    other => other.text().into_bytes(),
                })
                .build()
                .expect("ShardMany");
            Line::new()
                .producer(from_iter(black_box(input.clone())))
                .add(shards)
                .consumer(noop_consumer)
                .run()
                .expect("Run failed");
        });
    });
}

fn benchmark_batching(c: &mut Criterion) {
    let input = messages(5000);
    c.bench_function("batch_100_5000_msgs", |b| {
        b.iter(|| {
            Line::new()
                .producer(from_iter(black_box(input.clone())))
                .add(Batch::new(100))
                .consumer(noop_consumer)
                .run()
                .expect("Run failed");
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_single_stage_throughput, benchmark_three_stage_throughput,
        benchmark_many_workers, benchmark_shard_many, benchmark_batching
);
criterion_main!(benches);
