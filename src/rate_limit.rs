use crate::channel::{ErrorOutlet, Inlet, Outlet};
use crate::config::RateLimitConfig;
use crate::error::Result;
use crate::stage::Transformer;
use std::thread;
use std::time::{Duration, Instant};

/// Limits throughput to `n` messages per `per`.
///
/// In burst mode the first `n - 1` messages of a window pass immediately and
/// the `n`th waits out whatever is left of `per` since the last paced
/// message. Smooth mode spaces every message `per / n` apart instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    n: u32,
    per: Duration,
}

impl RateLimit {
    /// Burst limiter; `n == 0` is treated as one message per interval
    pub fn new(n: u32, per: Duration) -> Self {
        Self { n: n.max(1), per }
    }

    /// Evenly spaced limiter with the same average rate
    pub fn smooth(n: u32, per: Duration) -> Self {
        let n = n.max(1);
        Self { n: 1, per: per / n }
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        config.validate()?;
        let n = u32::try_from(config.n).unwrap_or(u32::MAX);
        Ok(if config.smooth {
            Self::smooth(n, config.per)
        } else {
            Self::new(n, config.per)
        })
    }

    pub fn burst(&self) -> u32 {
        self.n
    }

    pub fn interval(&self) -> Duration {
        self.per
    }
}

impl Transformer for RateLimit {
    fn transform(&self, input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
        let mut last = Instant::now();
        let mut burst = 0u32;

        for msg in input.iter() {
            burst += 1;
            if burst >= self.n {
                burst = 0;
                let wait = self.per.saturating_sub(last.elapsed());
                if !wait.is_zero() {
                    tracing::trace!(?wait, "rate limited");
                    thread::sleep(wait);
                }
                last = Instant::now();
            }

            if out.send(msg).is_err() {
                return;
            }
        }
    }

    fn name(&self) -> &str {
        "rate-limit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{errors, rendezvous};
    use crate::message::Message;

    fn emit_times(limit: RateLimit, count: usize) -> Vec<Instant> {
        let (in_tx, in_rx) = rendezvous();
        let (out_tx, out_rx) = rendezvous();
        let (err_tx, _err_rx) = errors();
        thread::scope(|s| {
            s.spawn(move || {
                for i in 0..count {
                    in_tx.send(Message::Text(i.to_string())).unwrap();
                }
            });
            let times = s.spawn(move || out_rx.iter().map(|_| Instant::now()).collect::<Vec<_>>());
            limit.transform(&in_rx, &out_tx, &err_tx);
            drop(out_tx);
            times.join().unwrap()
        })
    }

    #[test]
    fn test_zero_burst_defaults_to_one() {
        assert_eq!(RateLimit::new(0, Duration::from_millis(5)).burst(), 1);
    }

    #[test]
    fn test_smooth_spreads_budget() {
        let limit = RateLimit::smooth(4, Duration::from_millis(100));
        assert_eq!(limit.burst(), 1);
        assert_eq!(limit.interval(), Duration::from_millis(25));
    }

    #[test]
    fn test_single_message_gap() {
        let start = Instant::now();
        let times = emit_times(RateLimit::new(1, Duration::from_millis(1)), 5);
        assert_eq!(times.len(), 5);
        // every message is paced, including the first
        assert!(times[4] - start >= Duration::from_millis(5));
    }

    #[test]
    fn test_every_gap_is_paced() {
        let per = Duration::from_millis(2);
        let times = emit_times(RateLimit::new(1, per), 6);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= per);
        }
    }

    #[test]
    fn test_smooth_paces_every_message() {
        let limit = RateLimit::smooth(5, Duration::from_millis(25));
        let start = Instant::now();
        let times = emit_times(limit, 5);
        // a burst limiter would let the first four straight through
        assert!(times[0] - start >= limit.interval());
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= limit.interval());
        }
    }

    #[test]
    fn test_burst_then_wait() {
        let per = Duration::from_millis(50);
        let start = Instant::now();
        let times = emit_times(RateLimit::new(3, per), 3);
        assert_eq!(times.len(), 3);
        // two pass straight through, the third waits out the interval
        assert!(times[1] - start < per);
        assert!(times[2] - start >= per);
    }

    #[test]
    fn test_from_config() {
        let config = RateLimitConfig {
            n: 10,
            per: Duration::from_secs(1),
            smooth: true,
        };
        let limit = RateLimit::from_config(&config).unwrap();
        assert_eq!(limit.interval(), Duration::from_millis(100));
    }
}
