//! Count, size and time windowed batching.
//!
//! A [`Batch`] collects messages into one [`Message::Batch`] and emits it when
//! the first of these happens:
//!
//! - the batch holds `size` messages;
//! - adding the next message would push the batch past `byte_limit` bytes of
//!   text (the batch is emitted without it, and the message starts the next);
//! - `timeout` elapsed since the last emission;
//! - the external [`BatchCloser`] fired;
//! - the input closed.
//!
//! An empty batch is never emitted.

use crate::channel::{CloseSignal, ErrorOutlet, Inlet, Outlet};
use crate::config::BatchConfig;
use crate::error::Result;
use crate::message::Message;
use crate::stage::Transformer;
use crossbeam::channel::{at, never, select};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Windowed aggregator; see the module docs for its triggers
#[derive(Debug, Clone)]
pub struct Batch {
    size: usize,
    timeout: Option<Duration>,
    byte_limit: usize,
    close: CloseSignal,
}

/// Handle that forces a running [`Batch`] to emit what it holds and stop
#[derive(Debug, Clone)]
pub struct BatchCloser {
    signal: CloseSignal,
}

impl BatchCloser {
    /// Flush and stop the batch. Later calls do nothing.
    pub fn close(&self) {
        if self.signal.close() {
            tracing::debug!("batch close requested");
        }
    }
}

impl Batch {
    /// Batch of up to `size` messages; zero means no count limit
    pub fn new(size: usize) -> Self {
        Self {
            size,
            timeout: None,
            byte_limit: 0,
            close: CloseSignal::new(),
        }
    }

    /// Emit a partial batch once `timeout` passes without an emission
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Cap the total text length of a batch; zero means no cap
    pub fn with_byte_limit(mut self, byte_limit: usize) -> Self {
        self.byte_limit = byte_limit;
        self
    }

    pub fn from_config(config: &BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.size)
            .with_timeout(config.timeout)
            .with_byte_limit(config.byte_limit))
    }

    pub fn closer(&self) -> BatchCloser {
        BatchCloser {
            signal: self.close.clone(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Pending messages of one batch
struct Accumulator {
    pending: Vec<Message>,
    bytes: usize,
}

impl Accumulator {
    fn take(&mut self) -> Option<Vec<Message>> {
        self.bytes = 0;
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

struct Run<'a> {
    batch: &'a Batch,
    acc: Mutex<Accumulator>,
    out: &'a Outlet,
    deadline: Option<Instant>,
}

impl Run<'_> {
    /// Emit whatever is pending and restart the timer.
    /// Returns false once downstream is gone.
    fn flush(&mut self) -> bool {
        self.deadline = self.batch.timeout.map(|t| Instant::now() + t);
        let ready = self.acc.lock().take();
        match ready {
            Some(items) => {
                tracing::trace!(len = items.len(), "emitting batch");
                self.out.send(Message::Batch(items)).is_ok()
            }
            None => true,
        }
    }

    fn push(&mut self, msg: Message) -> bool {
        if self.batch.byte_limit > 0 {
            let len = msg.byte_len();
            let over = {
                let acc = self.acc.lock();
                acc.bytes + len > self.batch.byte_limit
            };
            if over && !self.flush() {
                return false;
            }
            self.acc.lock().bytes += len;
        }

        let full = {
            let mut acc = self.acc.lock();
            acc.pending.push(msg);
            acc.pending.len() == self.batch.size
        };
        if full {
            return self.flush();
        }
        true
    }
}

impl Transformer for Batch {
    fn transform(&self, input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
        let mut run = Run {
            batch: self,
            acc: Mutex::new(Accumulator {
                pending: Vec::new(),
                bytes: 0,
            }),
            out,
            deadline: self.timeout.map(|t| Instant::now() + t),
        };
        let closed = self.close.receiver();

        loop {
            let timer = match run.deadline {
                Some(deadline) => at(deadline),
                None => never(),
            };

            select! {
                recv(input) -> msg => match msg {
                    Ok(msg) => {
                        if !run.push(msg) {
                            return;
                        }
                    }
                    Err(_) => break,
                },
                recv(closed) -> _ => break,
                recv(timer) -> _ => {
                    if !run.flush() {
                        return;
                    }
                }
            }
        }

        run.flush();
    }

    fn name(&self) -> &str {
        "batch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{errors, rendezvous};
    use std::thread;

    fn sizes(batch: &Batch, msgs: Vec<&'static str>) -> Vec<usize> {
        let (in_tx, in_rx) = rendezvous();
        let (out_tx, out_rx) = rendezvous();
        let (err_tx, _err_rx) = errors();
        thread::scope(|s| {
            s.spawn(move || {
                for m in msgs {
                    in_tx.send(m.into()).unwrap();
                }
            });
            let collected = s.spawn(move || {
                out_rx
                    .iter()
                    .map(|m| m.constituents().map_or(0, |c| c.len()))
                    .collect::<Vec<_>>()
            });
            batch.transform(&in_rx, &out_tx, &err_tx);
            drop(out_tx);
            collected.join().unwrap()
        })
    }

    #[test]
    fn test_count_trigger_with_tail() {
        assert_eq!(sizes(&Batch::new(3), vec!["foo"; 4]), vec![3, 1]);
    }

    #[test]
    fn test_even_split() {
        assert_eq!(sizes(&Batch::new(2), vec!["a"; 6]), vec![2, 2, 2]);
    }

    #[test]
    fn test_byte_limit_excludes_overflowing_message() {
        let batch = Batch::new(4).with_byte_limit(10);
        assert_eq!(sizes(&batch, vec!["foo"; 10]), vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_empty_input_emits_nothing() {
        assert!(sizes(&Batch::new(3), vec![]).is_empty());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let batch = Batch::new(3).with_timeout(Duration::ZERO);
        assert!(batch.timeout.is_none());
    }

    #[test]
    fn test_closer_flushes_partial_batch() {
        let batch = Batch::new(10);
        let closer = batch.closer();
        let (in_tx, in_rx) = rendezvous();
        let (out_tx, out_rx) = rendezvous();
        let (err_tx, _err_rx) = errors();

        thread::scope(|s| {
            s.spawn(|| batch.transform(&in_rx, &out_tx, &err_tx));
            in_tx.send("a".into()).unwrap();
            in_tx.send("b".into()).unwrap();
            closer.close();
            closer.close();
            let flushed = out_rx.recv().unwrap();
            assert_eq!(flushed.constituents().map(|c| c.len()), Some(2));
        });
        // the stage stopped on the close signal, not on input closure
        drop(in_tx);
    }
}
