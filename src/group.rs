use crate::batch::Batch;
use crate::channel::{rendezvous, ErrorOutlet, Inlet, Outlet};
use crate::message::{GroupMessage, Message};
use crate::stage::Transformer;
use dashmap::DashMap;
use std::thread::{self, Scope};

type GroupByFn = dyn Fn(&Message) -> Vec<String> + Send + Sync;
type ReduceFn = dyn Fn(Message, Message) -> Message + Send + Sync;

/// Groups messages by caller-derived names.
///
/// The key function may return several names for one message, in which case
/// the message joins every one of those groups. Without a reducer each group
/// is a fixed-size batch emitted as [`Message::Group`]; with one, each group
/// folds its messages into a single value that is emitted when the input
/// closes. Every live group is flushed exactly once at the end.
pub struct Group {
    by: Box<GroupByFn>,
    size: usize,
    reduce: Option<Box<ReduceFn>>,
}

enum Accumulator {
    Batch(Outlet),
    Reduce(Option<Message>),
}

impl Group {
    /// Batch each group into lists of `size` messages
    pub fn new<F>(size: usize, by: F) -> Self
    where
        F: Fn(&Message) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            by: Box::new(by),
            size,
            reduce: None,
        }
    }

    /// Fold each group with `reduce`; the first message seeds the memo
    pub fn reduce<F, R>(by: F, reduce: R) -> Self
    where
        F: Fn(&Message) -> Vec<String> + Send + Sync + 'static,
        R: Fn(Message, Message) -> Message + Send + Sync + 'static,
    {
        Self {
            by: Box::new(by),
            size: 0,
            reduce: Some(Box::new(reduce)),
        }
    }

    fn open<'scope>(
        &'scope self,
        s: &'scope Scope<'scope, '_>,
        name: String,
        out: &'scope Outlet,
        errs: &'scope ErrorOutlet,
    ) -> Accumulator {
        tracing::debug!(group = %name, "opening group");
        if self.reduce.is_some() {
            return Accumulator::Reduce(None);
        }

        let (tx, rx) = rendezvous();
        let (batch_tx, batch_rx) = rendezvous();
        let size = self.size;
        s.spawn(move || Batch::new(size).transform(&rx, &batch_tx, errs));
        s.spawn(move || {
            for batch in batch_rx.iter() {
                let Message::Batch(items) = batch else {
                    continue;
                };
                if out
                    .send(Message::Group(GroupMessage::new(name.clone(), items)))
                    .is_err()
                {
                    return;
                }
            }
        });
        Accumulator::Batch(tx)
    }
}

impl Transformer for Group {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        let registry: DashMap<String, Accumulator> = DashMap::new();

        thread::scope(|s| {
            'input: for msg in input.iter() {
                for name in (self.by)(&msg) {
                    let mut slot = registry
                        .entry(name.clone())
                        .or_insert_with(|| self.open(s, name, out, errs));

                    match slot.value_mut() {
                        Accumulator::Batch(tx) => {
                            // a closed group means downstream is gone
                            if tx.send(msg.clone()).is_err() {
                                tracing::debug!("downstream closed, stopping group");
                                break 'input;
                            }
                        }
                        Accumulator::Reduce(memo) => {
                            let next = match (memo.take(), &self.reduce) {
                                (Some(prev), Some(reduce)) => reduce(prev, msg.clone()),
                                _ => msg.clone(),
                            };
                            *memo = Some(next);
                        }
                    }
                }
            }

            tracing::debug!(groups = registry.len(), "input closed, flushing groups");
            for (_, acc) in registry {
                match acc {
                    // dropping the sender makes the group's batch flush its tail
                    Accumulator::Batch(tx) => drop(tx),
                    Accumulator::Reduce(Some(memo)) => {
                        let _ = out.send(memo);
                    }
                    Accumulator::Reduce(None) => {}
                }
            }
        });
    }

    fn name(&self) -> &str {
        "group"
    }
}
