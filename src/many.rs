use crate::channel::{ErrorOutlet, Inlet, Outlet};
use crate::config::ManyConfig;
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::stage::{ContextTransformer, StageFn, Transformer};
use std::thread;

/// Unordered worker pool around a single stage.
///
/// `concurrency` copies of the stage read the same input and write the same
/// output, so each message goes to whichever worker is ready first and the
/// relative order of messages across workers is lost.
pub struct Many {
    stage: StageFn,
    concurrency: usize,
}

impl Many {
    pub fn new(stage: impl Transformer + 'static, concurrency: usize) -> Result<Self> {
        Self::build(StageFn::Plain(Box::new(stage)), concurrency)
    }

    /// Pool of context-aware workers
    pub fn context(stage: impl ContextTransformer + 'static, concurrency: usize) -> Result<Self> {
        Self::build(StageFn::Context(Box::new(stage)), concurrency)
    }

    pub fn from_config(stage: impl Transformer + 'static, config: &ManyConfig) -> Result<Self> {
        config.validate()?;
        Self::new(stage, config.concurrency)
    }

    fn build(stage: StageFn, concurrency: usize) -> Result<Self> {
        if concurrency < 1 {
            return Err(PipelineError::InvalidConcurrency(concurrency));
        }
        Ok(Self { stage, concurrency })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn run(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        if self.concurrency == 1 {
            self.stage.run(ctx, input, out, errs);
            return;
        }

        tracing::debug!(
            stage = self.stage.name(),
            workers = self.concurrency,
            "starting worker pool"
        );
        thread::scope(|s| {
            for _ in 0..self.concurrency {
                s.spawn(|| self.stage.run(ctx, input, out, errs));
            }
        });
    }
}

impl Transformer for Many {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        self.run(&Context::background(), input, out, errs)
    }

    fn name(&self) -> &str {
        "many"
    }

    fn as_context(&self) -> Option<&dyn ContextTransformer> {
        Some(self)
    }
}

impl ContextTransformer for Many {
    fn transform(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        self.run(ctx, input, out, errs)
    }

    fn name(&self) -> &str {
        "many"
    }
}
