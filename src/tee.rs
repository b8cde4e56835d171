use crate::channel::{rendezvous, ErrorOutlet, Inlet, Outlet};
use crate::stage::Transformer;
use std::thread;

/// Broadcasts every message to side-effect stages and forwards it unchanged.
///
/// Each target reads a private copy of the stream; whatever it emits is
/// discarded. Targets see a message before it goes downstream, and the stage
/// returns only after every target has drained its closed input.
pub struct Tee {
    targets: Vec<Box<dyn Transformer>>,
}

impl Tee {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
        }
    }

    pub fn target(mut self, stage: impl Transformer + 'static) -> Self {
        self.targets.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for Tee {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for Tee {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        tracing::debug!(targets = self.targets.len(), "starting tee");
        thread::scope(|s| {
            let mut inlets = Vec::with_capacity(self.targets.len());
            for target in &self.targets {
                let (tx, rx) = rendezvous();
                let (discard_tx, discard_rx) = rendezvous();
                inlets.push(tx);
                s.spawn(move || {
                    target.transform(&rx, &discard_tx, errs);
                });
                s.spawn(move || for _ in discard_rx.iter() {});
            }

            for msg in input.iter() {
                for tx in &inlets {
                    let _ = tx.send(msg.clone());
                }
                if out.send(msg).is_err() {
                    break;
                }
            }

            drop(inlets);
        });
    }

    fn name(&self) -> &str {
        "tee"
    }
}
