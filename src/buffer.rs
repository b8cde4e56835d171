use crate::channel::{buffered, ErrorOutlet, Inlet, Outlet};
use crate::stage::Transformer;
use std::thread;

/// Decouples upstream from downstream by up to `n` messages.
///
/// A forwarding thread drains the input into a bounded queue so a slow
/// consumer only stalls the producer once `n` messages are waiting. Order is
/// preserved. `n == 0` degrades to a plain hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    n: usize,
}

impl Buffer {
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    pub fn capacity(&self) -> usize {
        self.n
    }
}

impl Transformer for Buffer {
    fn transform(&self, input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
        thread::scope(|s| {
            let (tx, rx) = buffered(self.n);
            s.spawn(move || {
                for msg in input.iter() {
                    if tx.send(msg).is_err() {
                        return;
                    }
                }
            });

            // the queue is dropped on return so a forwarder blocked on a
            // full queue sees the close and exits
            for msg in rx {
                if out.send(msg).is_err() {
                    tracing::debug!("downstream closed, dropping buffered messages");
                    return;
                }
            }
        });
    }

    fn name(&self) -> &str {
        "buffer"
    }
}
