use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pipe_line::{consumer_fn, from_iter, noop, Buffer, Line, Message};
use std::time::Duration;

fn slow_consumer() -> impl pipe_line::Consumer {
    consumer_fn(|input, _errs| {
        for msg in input.iter() {
            black_box(msg);
            std::thread::sleep(Duration::from_micros(100));
        }
    })
}

fn messages() -> Vec<Message> {
    (0..1000).map(|i| Message::Bytes(vec![i as u8; 64])).collect()
}

fn benchmark_rendezvous_slow_consumer(c: &mut Criterion) {
    let input = messages();
    c.bench_function("rendezvous_slow_consumer_1000_msgs", |b| {
        b.iter(|| {
            Line::new()
                .producer(from_iter(input.clone()))
                .add(noop)
                .consumer(slow_consumer())
                .run()
                .expect("Run failed");
        });
    });
}

fn benchmark_buffered_slow_consumer(c: &mut Criterion) {
    let input = messages();
    c.bench_function("buffer_100_slow_consumer_1000_msgs", |b| {
        b.iter(|| {
            Line::new()
                .producer(from_iter(input.clone()))
                .add(Buffer::new(100))
                .consumer(slow_consumer())
                .run()
                .expect("Run failed");
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(15));
    targets = benchmark_rendezvous_slow_consumer, benchmark_buffered_slow_consumer
);
criterion_main!(benches);
