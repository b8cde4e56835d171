use crate::channel::{rendezvous, ErrorOutlet, Inlet, Outlet};
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::stage::{
    stdin, AckConsumer, Consumer, ContextProducer, ContextTransformer, Producer, ProducerFn,
    StageFn, Transformer,
};
use crossbeam::channel::Receiver;
use crossbeam::sync::WaitGroup;
use std::io::Write;
use std::thread::{self, Scope, ScopedJoinHandle};

/// Caller-owned error channel.
///
/// The pipeline hands clones of `errs` to its stages and drops them once
/// every stage has finished; it never closes the channel on the caller's
/// behalf. `drained` is released by the caller's drain loop when it is done,
/// and [`Line::run`] waits on it before returning.
pub struct ErrorSink {
    errs: ErrorOutlet,
    drained: WaitGroup,
}

impl ErrorSink {
    pub fn new(errs: ErrorOutlet, drained: WaitGroup) -> Self {
        Self { errs, drained }
    }
}

/// Builder for a pipeline: one producer, any number of transformers, one consumer.
///
/// Running a `Line` consumes it, so a built pipeline runs exactly once.
pub struct Line {
    producer: ProducerFn,
    transformers: Vec<StageFn>,
    consumer: Box<dyn Consumer>,
    errors: Option<ErrorSink>,
}

impl Line {
    /// Create a pipeline reading lines from standard input and acknowledging
    /// whatever reaches the end
    pub fn new() -> Self {
        Self {
            producer: ProducerFn::Plain(Box::new(stdin())),
            transformers: Vec::new(),
            consumer: Box::new(AckConsumer),
            errors: None,
        }
    }

    /// Set the producer
    pub fn producer(mut self, producer: impl Producer + 'static) -> Self {
        self.producer = ProducerFn::Plain(Box::new(producer));
        self
    }

    /// Set a producer that receives the run context
    pub fn producer_context(mut self, producer: impl ContextProducer + 'static) -> Self {
        self.producer = ProducerFn::Context(Box::new(producer));
        self
    }

    /// Append a transformer
    pub fn add(mut self, stage: impl Transformer + 'static) -> Self {
        self.transformers.push(StageFn::Plain(Box::new(stage)));
        self
    }

    /// Append a transformer that receives the run context
    pub fn add_context(mut self, stage: impl ContextTransformer + 'static) -> Self {
        self.transformers.push(StageFn::Context(Box::new(stage)));
        self
    }

    /// Set the consumer
    pub fn consumer(mut self, consumer: impl Consumer + 'static) -> Self {
        self.consumer = Box::new(consumer);
        self
    }

    /// Route errors to a caller-owned sink instead of standard error
    pub fn errors(mut self, sink: ErrorSink) -> Self {
        self.errors = Some(sink);
        self
    }

    /// Number of transformers
    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Run the pipeline to completion
    pub fn run(self) -> Result<()> {
        self.run_context(Context::background())
    }

    /// Run the pipeline, handing `ctx` to every context-aware stage.
    ///
    /// Returns once the consumer has drained its input and every stage thread
    /// has finished, and after the error channel has been drained.
    pub fn run_context(self, ctx: Context) -> Result<()> {
        let Line {
            producer,
            transformers,
            consumer,
            errors,
        } = self;

        match errors {
            Some(ErrorSink { errs, drained }) => {
                let result = thread::scope(|s| {
                    wire(
                        s,
                        &ctx,
                        |out, errs| producer.run(&ctx, out, errs),
                        producer.name(),
                        &transformers,
                        |input, errs| consumer.consume(input, errs),
                        consumer.name(),
                        errs,
                    )
                });
                drained.wait();
                result
            }
            None => {
                let (errs, rx) = crate::channel::errors();
                thread::scope(|s| {
                    let drain = thread::Builder::new()
                        .name("line-errors".into())
                        .spawn_scoped(s, move || write_errors(rx, std::io::stderr()))
                        .map_err(|source| PipelineError::Spawn {
                            name: "line-errors".into(),
                            source,
                        })?;

                    let result = wire(
                        s,
                        &ctx,
                        |out, errs| producer.run(&ctx, out, errs),
                        producer.name(),
                        &transformers,
                        |input, errs| consumer.consume(input, errs),
                        consumer.name(),
                        errs,
                    );
                    // every sender clone is gone by now, so the drain loop ends
                    drain
                        .join()
                        .map_err(|_| PipelineError::StagePanicked("line-errors".into()))?;
                    result
                })
            }
        }
    }

    /// Turn the pipeline into a transformer of a parent pipeline.
    ///
    /// The producer and consumer are replaced by adapters reading the
    /// parent's input and writing the parent's output, and errors go straight
    /// to the parent's error channel.
    pub fn embed(self) -> Embedded {
        Embedded {
            transformers: self.transformers,
        }
    }
}

impl Default for Line {
    fn default() -> Self {
        Self::new()
    }
}

/// A sub-pipeline acting as one transformer; see [`Line::embed`]
pub struct Embedded {
    transformers: Vec<StageFn>,
}

impl Embedded {
    fn run(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        let result = thread::scope(|s| {
            wire(
                s,
                ctx,
                |sub_out, _| {
                    for msg in input.iter() {
                        if sub_out.send(msg).is_err() {
                            return;
                        }
                    }
                },
                "embed-in",
                &self.transformers,
                |sub_in, _| {
                    for msg in sub_in.iter() {
                        if out.send(msg).is_err() {
                            return;
                        }
                    }
                },
                "embed-out",
                errs.clone(),
            )
        });
        if let Err(e) = result {
            crate::channel::report(errs, e);
        }
    }
}

impl Transformer for Embedded {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        self.run(&Context::background(), input, out, errs)
    }

    fn name(&self) -> &str {
        "embed"
    }

    fn as_context(&self) -> Option<&dyn ContextTransformer> {
        Some(self)
    }
}

impl ContextTransformer for Embedded {
    fn transform(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        self.run(ctx, input, out, errs)
    }

    fn name(&self) -> &str {
        "embed"
    }
}

/// Spawn one thread per stage, consumer included, chain them with
/// rendezvous channels and join them all.
///
/// Each stage's output sender is owned by its thread, so the channel closes
/// exactly when the stage returns; closure therefore travels downstream one
/// stage at a time after the producer finishes. A stage that panics drops
/// its channel ends while unwinding, which lets its neighbours finish.
/// `errs` is consumed: the last clone is dropped before this returns.
#[allow(clippy::too_many_arguments)]
fn wire<'scope, 'env, P, C>(
    s: &'scope Scope<'scope, 'env>,
    ctx: &'scope Context,
    producer: P,
    producer_name: &str,
    transformers: &'scope [StageFn],
    consumer: C,
    consumer_name: &str,
    errs: ErrorOutlet,
) -> Result<()>
where
    P: FnOnce(&Outlet, &ErrorOutlet) + Send + 'scope,
    C: FnOnce(&Inlet, &ErrorOutlet) + Send + 'scope,
{
    let mut handles: Vec<(String, ScopedJoinHandle<'scope, ()>)> = Vec::new();
    let mut spawn_error = None;

    let (out, mut input): (Outlet, Inlet) = rendezvous();
    let name = format!("line-0-{producer_name}");
    let producer_errs = errs.clone();
    match spawn_stage(s, &name, move || {
        producer(&out, &producer_errs);
    }) {
        Ok(h) => handles.push((name, h)),
        Err(e) => spawn_error = Some(e),
    }

    for (idx, stage) in transformers.iter().enumerate() {
        if spawn_error.is_some() {
            break;
        }
        let (out, next) = rendezvous();
        let stage_in = std::mem::replace(&mut input, next);
        let stage_errs = errs.clone();
        let name = format!("line-{}-{}", idx + 1, stage.name());
        match spawn_stage(s, &name, move || {
            stage.run(ctx, &stage_in, &out, &stage_errs);
        }) {
            Ok(h) => handles.push((name, h)),
            Err(e) => spawn_error = Some(e),
        }
    }

    if spawn_error.is_none() {
        let name = format!("line-{}-{consumer_name}", transformers.len() + 1);
        let consumer_errs = errs.clone();
        match spawn_stage(s, &name, move || {
            consumer(&input, &consumer_errs);
        }) {
            Ok(h) => handles.push((name, h)),
            Err(e) => spawn_error = Some(e),
        }
    } else {
        // unblock the stages already running
        drop(input);
    }
    drop(errs);

    let mut result = spawn_error.map_or(Ok(()), Err);
    for (name, handle) in handles {
        match handle.join() {
            Ok(()) => tracing::debug!(stage = %name, "stage closed"),
            Err(_) => {
                tracing::warn!(stage = %name, "stage panicked");
                if result.is_ok() {
                    result = Err(PipelineError::StagePanicked(name));
                }
            }
        }
    }
    result
}

fn spawn_stage<'scope, 'env, F>(
    s: &'scope Scope<'scope, 'env>,
    name: &str,
    f: F,
) -> Result<ScopedJoinHandle<'scope, ()>>
where
    F: FnOnce() + Send + 'scope,
{
    tracing::debug!(stage = %name, "spawning stage");
    thread::Builder::new()
        .name(name.to_string())
        .spawn_scoped(s, f)
        .map_err(|source| PipelineError::Spawn {
            name: name.to_string(),
            source,
        })
}

/// Default error sink: one line per error until every sender is gone
fn write_errors<W: Write>(rx: Receiver<PipelineError>, mut w: W) {
    for err in rx.iter() {
        if let Err(e) = writeln!(w, "{err}") {
            tracing::warn!(error = %e, "failed to write pipeline error");
        }
    }
}
