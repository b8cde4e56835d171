use crate::channel::{rendezvous, ErrorOutlet, Inlet, Outlet};
use crate::message::Message;
use crate::stage::Transformer;
use std::collections::{HashMap, HashSet};
use std::thread;

type ClassifyFn = dyn Fn(&Message) -> Vec<String> + Send + Sync;

/// One replica of a [`Fanout`], optionally restricted to some message types
pub struct FanoutWorker {
    stage: Box<dyn Transformer>,
    interests: Option<HashSet<String>>,
}

impl FanoutWorker {
    /// Worker that receives every message
    pub fn new(stage: impl Transformer + 'static) -> Self {
        Self {
            stage: Box::new(stage),
            interests: None,
        }
    }

    /// Only deliver messages classified as one of `types`
    pub fn interested_in<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests = Some(types.into_iter().map(Into::into).collect());
        self
    }
}

/// Replicates every input message to a set of concurrently running workers.
///
/// Without a classifier each worker receives every message. With one, a
/// message goes once to every worker whose interests intersect the message's
/// types, and to every worker that declared no interests at all. All workers
/// share the downstream output and error channels.
pub struct Fanout {
    workers: Vec<FanoutWorker>,
    classify: Option<Box<ClassifyFn>>,
}

impl Fanout {
    pub fn new(workers: Vec<FanoutWorker>) -> Self {
        Self {
            workers,
            classify: None,
        }
    }

    /// Classify messages into zero or more types for interest matching
    pub fn classify<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message) -> Vec<String> + Send + Sync + 'static,
    {
        self.classify = Some(Box::new(f));
        self
    }

    /// Worker indexes that should receive `msg`
    fn targets(&self, msg: &Message, by_type: &HashMap<&str, Vec<usize>>) -> Vec<usize> {
        let Some(classify) = &self.classify else {
            return (0..self.workers.len()).collect();
        };

        let mut targets: Vec<usize> = self
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.interests.is_none())
            .map(|(i, _)| i)
            .collect();

        if by_type.is_empty() {
            return targets;
        }

        let mut seen = HashSet::new();
        for kind in classify(msg) {
            for &idx in by_type.get(kind.as_str()).into_iter().flatten() {
                if seen.insert(idx) {
                    targets.push(idx);
                }
            }
        }
        targets
    }
}

impl Transformer for Fanout {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        let mut by_type: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, worker) in self.workers.iter().enumerate() {
            for kind in worker.interests.iter().flatten() {
                by_type.entry(kind.as_str()).or_default().push(idx);
            }
        }

        tracing::debug!(workers = self.workers.len(), "starting fanout");
        thread::scope(|s| {
            let mut inlets = Vec::with_capacity(self.workers.len());
            for worker in &self.workers {
                let (tx, rx) = rendezvous();
                inlets.push(tx);
                s.spawn(move || worker.stage.transform(&rx, out, errs));
            }

            for msg in input.iter() {
                for idx in self.targets(&msg, &by_type) {
                    // a worker that stopped reading just misses the rest
                    let _ = inlets[idx].send(msg.clone());
                }
            }

            // closing the private inputs lets every worker drain and return
            drop(inlets);
        });
    }

    fn name(&self) -> &str {
        "fanout"
    }
}
