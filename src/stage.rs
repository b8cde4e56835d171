//! Stage contracts and the stock stages built on them.
//!
//! Every higher-level behaviour in this crate is a [`Producer`], a
//! [`Transformer`] or a [`Consumer`]. A stage owns nothing but the channel
//! ends it is handed: it reads its input until the channel closes, writes
//! zero or more messages per input, and reports per-message failures on the
//! error channel without stopping.

use crate::channel::{report, ErrorOutlet, Inlet, Outlet};
use crate::context::Context;
use crate::error::Result;
use crate::message::{Message, Stringify};
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, Write};

/// Emits messages, never reads
pub trait Producer: Send + Sync {
    fn produce(&self, out: &Outlet, errs: &ErrorOutlet);

    fn name(&self) -> &str {
        "producer"
    }
}

/// Reads until its input closes and emits zero or more messages per input
pub trait Transformer: Send + Sync {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet);

    fn name(&self) -> &str {
        "transformer"
    }

    /// The context-aware form of this stage, if it has one.
    ///
    /// A pipeline runs that form instead, so a stage added as a plain
    /// transformer still observes the run context.
    fn as_context(&self) -> Option<&dyn ContextTransformer> {
        None
    }
}

/// Terminal sink
pub trait Consumer: Send + Sync {
    fn consume(&self, input: &Inlet, errs: &ErrorOutlet);

    fn name(&self) -> &str {
        "consumer"
    }
}

/// Producer that also receives the run's cancellation context
pub trait ContextProducer: Send + Sync {
    fn produce(&self, ctx: &Context, out: &Outlet, errs: &ErrorOutlet);

    fn name(&self) -> &str {
        "producer"
    }
}

/// Transformer that also receives the run's cancellation context
pub trait ContextTransformer: Send + Sync {
    fn transform(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet);

    fn name(&self) -> &str {
        "transformer"
    }
}

impl<F> Producer for F
where
    F: Fn(&Outlet, &ErrorOutlet) + Send + Sync,
{
    fn produce(&self, out: &Outlet, errs: &ErrorOutlet) {
        self(out, errs)
    }
}

impl<F> Transformer for F
where
    F: Fn(&Inlet, &Outlet, &ErrorOutlet) + Send + Sync,
{
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        self(input, out, errs)
    }
}

impl<F> Consumer for F
where
    F: Fn(&Inlet, &ErrorOutlet) + Send + Sync,
{
    fn consume(&self, input: &Inlet, errs: &ErrorOutlet) {
        self(input, errs)
    }
}

impl<F> ContextProducer for F
where
    F: Fn(&Context, &Outlet, &ErrorOutlet) + Send + Sync,
{
    fn produce(&self, ctx: &Context, out: &Outlet, errs: &ErrorOutlet) {
        self(ctx, out, errs)
    }
}

impl<F> ContextTransformer for F
where
    F: Fn(&Context, &Inlet, &Outlet, &ErrorOutlet) + Send + Sync,
{
    fn transform(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        self(ctx, input, out, errs)
    }
}

// The helpers below pin a closure's argument types so it can be written
// inline without annotations.

pub fn producer_fn<F>(f: F) -> F
where
    F: Fn(&Outlet, &ErrorOutlet) + Send + Sync,
{
    f
}

pub fn transformer_fn<F>(f: F) -> F
where
    F: Fn(&Inlet, &Outlet, &ErrorOutlet) + Send + Sync,
{
    f
}

pub fn consumer_fn<F>(f: F) -> F
where
    F: Fn(&Inlet, &ErrorOutlet) + Send + Sync,
{
    f
}

pub fn context_fn<F>(f: F) -> F
where
    F: Fn(&Context, &Inlet, &Outlet, &ErrorOutlet) + Send + Sync,
{
    f
}

/// A transformer slot: plain or context-aware
pub(crate) enum StageFn {
    Plain(Box<dyn Transformer>),
    Context(Box<dyn ContextTransformer>),
}

impl StageFn {
    pub(crate) fn run(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        match self {
            StageFn::Plain(t) => match t.as_context() {
                Some(aware) => aware.transform(ctx, input, out, errs),
                None => t.transform(input, out, errs),
            },
            StageFn::Context(t) => t.transform(ctx, input, out, errs),
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            StageFn::Plain(t) => t.name(),
            StageFn::Context(t) => t.name(),
        }
    }
}

/// A producer slot: plain or context-aware
pub(crate) enum ProducerFn {
    Plain(Box<dyn Producer>),
    Context(Box<dyn ContextProducer>),
}

impl ProducerFn {
    pub(crate) fn run(&self, ctx: &Context, out: &Outlet, errs: &ErrorOutlet) {
        match self {
            ProducerFn::Plain(p) => p.produce(out, errs),
            ProducerFn::Context(p) => p.produce(ctx, out, errs),
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            ProducerFn::Plain(p) => p.name(),
            ProducerFn::Context(p) => p.name(),
        }
    }
}

type MapFn = dyn Fn(&Context, Message) -> Result<Option<Message>> + Send + Sync;

/// Single-message transform that checks its context before every message.
///
/// `Ok(Some(msg))` emits `msg`, `Ok(None)` emits nothing and `Err` is sent to
/// the error channel. Once the context is done the stage reports why and
/// stops reading; stages up- and downstream are not told.
pub struct Map {
    name: &'static str,
    f: Box<MapFn>,
}

impl Map {
    fn run(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        for msg in input.iter() {
            if let Some(err) = ctx.err() {
                tracing::debug!(stage = self.name, error = %err, "context done, stopping");
                report(errs, err);
                return;
            }

            match (self.f)(ctx, msg) {
                Ok(Some(next)) => {
                    if out.send(next).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => report(errs, e),
            }
        }
    }
}

impl ContextTransformer for Map {
    fn transform(&self, ctx: &Context, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        self.run(ctx, input, out, errs)
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl Transformer for Map {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        self.run(&Context::background(), input, out, errs)
    }

    fn name(&self) -> &str {
        self.name
    }

    fn as_context(&self) -> Option<&dyn ContextTransformer> {
        Some(self)
    }
}

/// Replace each message with the function's result
pub fn map<F>(f: F) -> Map
where
    F: Fn(Message) -> Result<Option<Message>> + Send + Sync + 'static,
{
    Map {
        name: "map",
        f: Box::new(move |_: &Context, msg: Message| f(msg)),
    }
}

/// Like [`map`], with the context passed to the function
pub fn map_context<F>(f: F) -> Map
where
    F: Fn(&Context, Message) -> Result<Option<Message>> + Send + Sync + 'static,
{
    Map {
        name: "map",
        f: Box::new(f),
    }
}

/// Run a side effect per message and forward the original on success
pub fn for_each<F>(f: F) -> Map
where
    F: Fn(&Message) -> Result<()> + Send + Sync + 'static,
{
    Map {
        name: "for_each",
        f: Box::new(move |_: &Context, msg: Message| {
            f(&msg)?;
            Ok(Some(msg))
        }),
    }
}

/// Forward only the messages the predicate accepts
pub fn filter<F>(f: F) -> Map
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    Map {
        name: "filter",
        f: Box::new(move |_: &Context, msg: Message| Ok(f(&msg).then_some(msg))),
    }
}

type InlineFn = dyn Fn(Message) -> Result<Option<Message>> + Send + Sync;

/// Context-free single-message transform
pub struct Inline {
    f: Box<InlineFn>,
}

impl Transformer for Inline {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        for msg in input.iter() {
            match (self.f)(msg) {
                Ok(Some(next)) => {
                    if out.send(next).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => report(errs, e),
            }
        }
    }

    fn name(&self) -> &str {
        "inline"
    }
}

pub fn inline<F>(f: F) -> Inline
where
    F: Fn(Message) -> Result<Option<Message>> + Send + Sync + 'static,
{
    Inline { f: Box::new(f) }
}

/// Pass every message through unchanged
pub fn noop(input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
    for msg in input.iter() {
        if out.send(msg).is_err() {
            return;
        }
    }
}

/// Drain the input and discard it
pub fn noop_consumer(input: &Inlet, _errs: &ErrorOutlet) {
    for _ in input.iter() {}
}

/// Default consumer: acknowledges every message that can be acknowledged
#[derive(Debug, Default)]
pub struct AckConsumer;

impl Consumer for AckConsumer {
    fn consume(&self, input: &Inlet, _errs: &ErrorOutlet) {
        for msg in input.iter() {
            if let Some(acker) = msg.acknowledger() {
                acker.ack();
            }
        }
    }

    fn name(&self) -> &str {
        "ack"
    }
}

/// Emits a fixed list of messages; can be run any number of times
#[derive(Debug, Clone, Default)]
pub struct Messages(Vec<Message>);

impl Producer for Messages {
    fn produce(&self, out: &Outlet, _errs: &ErrorOutlet) {
        for msg in &self.0 {
            if out.send(msg.clone()).is_err() {
                return;
            }
        }
    }

    fn name(&self) -> &str {
        "messages"
    }
}

pub fn from_iter<I, M>(items: I) -> Messages
where
    I: IntoIterator<Item = M>,
    M: Into<Message>,
{
    Messages(items.into_iter().map(Into::into).collect())
}

/// Emits one text message per line of a reader
pub struct ReadLines<R> {
    reader: Mutex<R>,
}

impl<R: BufRead + Send> ReadLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

impl<R: BufRead + Send> Producer for ReadLines<R> {
    fn produce(&self, out: &Outlet, errs: &ErrorOutlet) {
        let mut reader = self.reader.lock();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return,
                Ok(_) => {
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if out.send(Message::Text(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    report(errs, e.into());
                    return;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "lines"
    }
}

/// Line-by-line reader of standard input, the default producer
pub fn stdin() -> ReadLines<BufReader<io::Stdin>> {
    ReadLines::new(BufReader::new(io::stdin()))
}

/// Prints each message's text on its own line of standard output
#[derive(Debug, Default)]
pub struct Stdout;

impl Stdout {
    fn print(msg: &Message, errs: &ErrorOutlet) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", msg.stringify()) {
            report(errs, e.into());
        }
    }
}

impl Transformer for Stdout {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        for msg in input.iter() {
            Self::print(&msg, errs);
            if out.send(msg).is_err() {
                return;
            }
        }
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

impl Consumer for Stdout {
    fn consume(&self, input: &Inlet, errs: &ErrorOutlet) {
        for msg in input.iter() {
            Self::print(&msg, errs);
        }
    }

    fn name(&self) -> &str {
        "stdout"
    }
}
