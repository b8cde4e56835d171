use crate::channel::{rendezvous, ErrorOutlet, Inlet, Outlet};
use crate::config::ShardConfig;
use crate::error::{PipelineError, Result};
use crate::message::Message;
use crate::stage::Transformer;
use std::thread;

type KeyFn = dyn Fn(&Message) -> Vec<u8> + Send + Sync;

/// Partitions a stream by key across `concurrency` copies of one stage.
///
/// A message's shard is the CRC-32 (IEEE) of its key modulo the
/// concurrency, so messages sharing a key always reach the same worker and
/// are processed in arrival order, while different keys proceed in
/// parallel. Changing the concurrency re-partitions every key.
pub struct ShardMany {
    concurrency: usize,
    stage: Box<dyn Transformer>,
    key: Box<KeyFn>,
}

impl ShardMany {
    pub fn builder() -> ShardManyBuilder {
        ShardManyBuilder::default()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Build from a validated config
    pub fn from_config<F>(
        config: &ShardConfig,
        stage: impl Transformer + 'static,
        key: F,
    ) -> Result<Self>
    where
        F: Fn(&Message) -> Vec<u8> + Send + Sync + 'static,
    {
        config.validate()?;
        Self::builder()
            .concurrency(config.concurrency)
            .stage(stage)
            .key(key)
            .build()
    }

    /// Shard index for `key`
    pub fn shard_for(&self, key: &[u8]) -> usize {
        bucket(key, self.concurrency)
    }
}

/// Shard index of `key` among `shards` partitions
pub fn shard_index(key: &[u8], shards: usize) -> Result<usize> {
    if shards == 0 {
        return Err(PipelineError::InvalidConcurrency(shards));
    }
    Ok(bucket(key, shards))
}

// `shards` must be non-zero
fn bucket(key: &[u8], shards: usize) -> usize {
    (u64::from(crc32fast::hash(key)) % shards as u64) as usize
}

/// Builder for [`ShardMany`]; every field is required
#[derive(Default)]
pub struct ShardManyBuilder {
    concurrency: usize,
    stage: Option<Box<dyn Transformer>>,
    key: Option<Box<KeyFn>>,
}

impl ShardManyBuilder {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn stage(mut self, stage: impl Transformer + 'static) -> Self {
        self.stage = Some(Box::new(stage));
        self
    }

    pub fn key<F>(mut self, key: F) -> Self
    where
        F: Fn(&Message) -> Vec<u8> + Send + Sync + 'static,
    {
        self.key = Some(Box::new(key));
        self
    }

    /// Validate and build; nothing is started on failure
    pub fn build(self) -> Result<ShardMany> {
        if self.concurrency < 1 {
            return Err(PipelineError::InvalidConcurrency(self.concurrency));
        }
        let stage = self.stage.ok_or(PipelineError::MissingStage("ShardMany"))?;
        let key = self.key.ok_or(PipelineError::MissingKeyFunction)?;
        Ok(ShardMany {
            concurrency: self.concurrency,
            stage,
            key,
        })
    }
}

impl Transformer for ShardMany {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        tracing::debug!(shards = self.concurrency, "starting shards");
        thread::scope(|s| {
            let mut shards = Vec::with_capacity(self.concurrency);
            for idx in 0..self.concurrency {
                let (tx, rx) = rendezvous();
                shards.push(tx);
                let stage = &self.stage;
                let spawned = thread::Builder::new()
                    .name(format!("shard-{idx}"))
                    .spawn_scoped(s, move || stage.transform(&rx, out, errs));
                if let Err(e) = spawned {
                    crate::channel::report(
                        errs,
                        PipelineError::Spawn {
                            name: format!("shard-{idx}"),
                            source: e,
                        },
                    );
                    return;
                }
            }

            for msg in input.iter() {
                let idx = self.shard_for(&(self.key)(&msg));
                tracing::trace!(shard = idx, "routing message");
                let _ = shards[idx].send(msg);
            }

            drop(shards);
        });
    }

    fn name(&self) -> &str {
        "shard-many"
    }
}
