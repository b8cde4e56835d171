use crate::error::PipelineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ContextInner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

/// Cooperative cancellation carried by context-aware stages.
///
/// Stages check it between messages; a message already in flight is never
/// interrupted. Cancelling a context only affects the stages holding it.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// A context that can be cancelled explicitly
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// A context that is never done unless cancelled
    pub fn background() -> Self {
        Self::new()
    }

    /// A context that becomes done after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(Instant::now() + timeout), None)
    }

    /// A child that is done when this context is done or when it is cancelled itself
    pub fn child(&self) -> Self {
        Self::build(None, Some(self.clone()))
    }

    fn build(deadline: Option<Instant>, parent: Option<Context>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the context is done, or `None` while it is live
    pub fn err(&self) -> Option<PipelineError> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Some(PipelineError::Cancelled);
        }
        if matches!(self.inner.deadline, Some(d) if Instant::now() >= d) {
            return Some(PipelineError::DeadlineExceeded);
        }
        self.inner.parent.as_ref().and_then(Context::err)
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
