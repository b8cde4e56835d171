//! Number processing pipeline demonstrating filtering and transformations
//!
//! Pipeline:
//! 1. Generate: Produces numbers 1-100
//! 2. Filter: Keep only even numbers
//! 3. Transform: Multiply by 10, on four workers
//! 4. Sort: Restore order within a small window
//! 5. Aggregate: Sum all numbers
//!
//! Usage: cargo run --example filter_pipeline --release

use pipe_line::{
    consumer_fn, filter, inline, producer_fn, Count, Line, Many, Message, PipelineError, Sort,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn number(m: &Message) -> u64 {
    m.text().parse().unwrap_or_default()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Number Processing Pipeline");
    println!("==========================");

    let start = Instant::now();
    let sum = Arc::new(AtomicU64::new(0));
    let total = Arc::clone(&sum);
    let count = Count::new().silent();
    let processed = count.clone();

    Line::new()
        .producer(producer_fn(|out, _errs| {
            for n in 1..=100u64 {
                if out.send(Message::Text(n.to_string())).is_err() {
                    return;
                }
            }
        }))
        .add(filter(|m| number(m) % 2 == 0))
        .add(Many::new(
            inline(|m| {
                let n: u64 = m
                    .text()
                    .parse()
                    .map_err(|e| PipelineError::stage(format!("not a number: {e}")))?;
                Ok(Some(Message::Text((n * 10).to_string())))
            }),
            4,
        )?)
        .add(Sort::new(8, |a, b| number(a).cmp(&number(b)))?)
        .add(count)
        .consumer(consumer_fn(move |input, _errs| {
            for msg in input.iter() {
                total.fetch_add(number(&msg), Ordering::Relaxed);
            }
        }))
        .run()?;

    let snapshot = processed.snapshot();
    println!("Sum of even numbers * 10: {}", sum.load(Ordering::Relaxed));
    println!("{}", snapshot.format());
    println!("Completed in {:.2?}", start.elapsed());

    Ok(())
}
