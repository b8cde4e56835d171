//! A stream-processing pipeline built from composable stages.
//!
//! A [`Line`] wires one producer, any number of transformers and one consumer
//! with rendezvous channels, runs every stage on its own thread and returns
//! once the stream has drained end to end. Per-message failures travel a
//! separate error channel and never stop the line.
//!
//! # Features
//!
//! - Closure or struct stages through the [`Producer`], [`Transformer`] and
//!   [`Consumer`] traits, with context-aware variants for cancellation
//! - A closed [`Message`] model with stringify, acknowledge, key/value and
//!   unwrap capabilities
//! - Combinators: [`Many`], [`Batch`], [`Group`], [`Fanout`], [`ShardMany`],
//!   [`Sort`], [`RateLimit`], [`If`], [`Tee`], [`ErrorHandler`], [`Buffer`],
//!   [`Head`], [`Tail`], [`Tap`], [`Cap`] and [`Count`]
//! - Sub-pipelines embedded as a single stage with [`Line::embed`]
//! - serde configs with humantime durations for the tunable combinators
//!
//! # Example
//!
//! ```no_run
//! use pipe_line::{from_iter, map, Batch, Line, Message, Stdout};
//!
//! Line::new()
//!     .producer(from_iter(["a", "b", "c"]))
//!     .add(map(|m| Ok(Some(Message::Text(m.text().to_uppercase())))))
//!     .add(Batch::new(2))
//!     .consumer(Stdout)
//!     .run()?;
//! # Ok::<(), pipe_line::PipelineError>(())
//! ```

pub mod batch;
pub mod branch;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod error_handler;
pub mod fanout;
pub mod flow;
pub mod group;
pub mod many;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod shard;
pub mod sort;
pub mod stage;
pub mod tee;

// Re-exports for convenience
pub use batch::{Batch, BatchCloser};
pub use branch::{if_else, if_then, only_if, If};
pub use buffer::Buffer;
pub use channel::{CloseSignal, ErrorOutlet, Inlet, Outlet};
pub use config::{BatchConfig, ManyConfig, RateLimitConfig, ShardConfig, SortConfig};
pub use context::Context;
pub use error::{PipelineError, Result};
pub use error_handler::{ErrorHandler, Failed};
pub use fanout::{Fanout, FanoutWorker};
pub use flow::{Cap, Head, Tail, Tap};
pub use group::Group;
pub use many::Many;
pub use message::{
    Acknowledge, GroupMessage, KeyValue, Message, Record, Stringify, Tracked, Unwrap,
};
pub use metrics::{Count, CountSnapshot};
pub use pipeline::{Embedded, ErrorSink, Line};
pub use rate_limit::RateLimit;
pub use shard::{shard_index, ShardMany, ShardManyBuilder};
pub use sort::{Sort, SortWindow};
pub use stage::{
    consumer_fn, context_fn, filter, for_each, from_iter, inline, map, map_context, noop,
    noop_consumer, producer_fn, stdin, transformer_fn, AckConsumer, Consumer, ContextProducer,
    ContextTransformer, Inline, Map, Messages, Producer, ReadLines, Stdout, Transformer,
};
pub use tee::Tee;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
