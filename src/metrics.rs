use crate::channel::{ErrorOutlet, Inlet, Outlet};
use crate::stage::Transformer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Forwards messages while counting them.
///
/// Clones share one counter, so keep a clone to read the total after the
/// line that owns the stage has run.
#[derive(Debug, Clone)]
pub struct Count {
    /// Messages seen so far
    seen: Arc<AtomicU64>,
    /// Scale applied to the reported value, e.g. the batch size when
    /// counting batches
    multiplier: u64,
    /// Skip the final log line
    silent: bool,
    /// Creation time for throughput calculation
    start_time: Instant,
}

impl Count {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(AtomicU64::new(0)),
            multiplier: 1,
            silent: false,
            start_time: Instant::now(),
        }
    }

    /// Multiply the reported value; zero is treated as one
    pub fn with_multiplier(mut self, multiplier: u64) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Don't log the total when the input closes
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Current count, multiplier applied
    pub fn value(&self) -> u64 {
        self.seen.load(Ordering::Relaxed).saturating_mul(self.multiplier)
    }

    /// Messages per second since the counter was created
    pub fn throughput_mps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.value() as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> CountSnapshot {
        CountSnapshot {
            total: self.value(),
            throughput_mps: self.throughput_mps(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for Count {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for Count {
    fn transform(&self, input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
        for msg in input.iter() {
            self.seen.fetch_add(1, Ordering::Relaxed);
            if out.send(msg).is_err() {
                break;
            }
        }

        if !self.silent {
            let snapshot = self.snapshot();
            tracing::info!(
                total = snapshot.total,
                throughput_mps = snapshot.throughput_mps,
                "count finished"
            );
        }
    }

    fn name(&self) -> &str {
        "count"
    }
}

/// A count at a point in time
#[derive(Debug, Clone)]
pub struct CountSnapshot {
    pub total: u64,
    pub throughput_mps: f64,
    pub elapsed: Duration,
}

impl CountSnapshot {
    /// Format as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Counted: {}, Throughput: {:.2} msg/s, Elapsed: {:.2}s",
            self.total,
            self.throughput_mps,
            self.elapsed.as_secs_f64()
        )
    }
}
