//! Word frequency counter pipeline
//!
//! Reads lines from stdin, splits into words, counts frequencies, and prints top-N words.
//!
//! Usage: cargo run --example word_count --release
//!        (Then type lines of text and press Ctrl-D to finish)
//!
//! Set `RUST_LOG=pipe_line=debug` to watch the stages start and stop.

use parking_lot::Mutex;
use pipe_line::{consumer_fn, inline, transformer_fn, Batch, Count, Line, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn get_top_n(counts: &HashMap<String, usize>, n: usize) -> Vec<(String, usize)> {
    let mut items: Vec<_> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.into_iter().take(n).collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    println!("Word Frequency Counter Pipeline");
    println!("================================");
    println!("Enter lines of text (Ctrl-D to finish):");
    println!();

    let counts: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
    let words = Count::new();
    let seen = words.clone();

    let totals = Arc::clone(&counts);
    Line::new()
        // split lines into lowercase words
        .add(transformer_fn(|input, out, _errs| {
            for line in input.iter() {
                for word in line.text().split_whitespace() {
                    if out.send(Message::Text(word.to_lowercase())).is_err() {
                        return;
                    }
                }
            }
        }))
        // keep alphanumerics, drop short words
        .add(inline(|m| {
            let cleaned: String = m.text().chars().filter(|c| c.is_alphanumeric()).collect();
            Ok((cleaned.len() > 2).then_some(Message::Text(cleaned)))
        }))
        .add(words)
        .add(Batch::new(100))
        .consumer(consumer_fn(move |input, _errs| {
            for batch in input.iter() {
                let mut counts = totals.lock();
                for word in batch.constituents().unwrap_or_default() {
                    *counts.entry(word.text()).or_insert(0) += 1;
                }
                println!("\n=== Top 10 Words (after {} words) ===", seen.value());
                for (i, (word, count)) in get_top_n(&counts, 10).iter().enumerate() {
                    println!("{:2}. {} ({})", i + 1, word, count);
                }
            }
        }))
        .run()?;

    println!("\n\nProcessing complete!");

    Ok(())
}
