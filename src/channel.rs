use crate::error::PipelineError;
use crate::message::Message;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receiving end of a stage's input
pub type Inlet = Receiver<Message>;

/// Sending end of a stage's output
pub type Outlet = Sender<Message>;

/// Sending end of the shared error channel
pub type ErrorOutlet = Sender<PipelineError>;

/// Unbuffered channel: every send waits for a matching receive
pub fn rendezvous() -> (Outlet, Inlet) {
    channel::bounded(0)
}

/// Channel holding up to `capacity` in-flight messages
pub fn buffered(capacity: usize) -> (Outlet, Inlet) {
    channel::bounded(capacity)
}

/// Unbuffered error channel
pub fn errors() -> (ErrorOutlet, Receiver<PipelineError>) {
    channel::bounded(0)
}

/// Report a per-message error.
///
/// A closed error channel means nobody is listening any more; the error is
/// dropped rather than failing the stage.
pub fn report(errs: &ErrorOutlet, err: PipelineError) {
    if let Err(e) = errs.send(err) {
        tracing::warn!(error = %e.into_inner(), "error channel closed, dropping error");
    }
}

/// One-shot signal that may be fired any number of times.
///
/// Only the first [`CloseSignal::close`] is delivered; the rest are no-ops.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
    fired: Arc<AtomicBool>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self {
            tx,
            rx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fire the signal. Returns false if it had already been fired.
    pub fn close(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Receiver to `select!` on
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}
