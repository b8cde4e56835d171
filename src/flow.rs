//! Small stages that shape how much of a stream goes through.

use crate::channel::{ErrorOutlet, Inlet, Outlet};
use crate::message::Message;
use crate::stage::Transformer;
use crossbeam::channel::Sender;
use std::collections::VecDeque;

/// Forwards the first `n` messages, then stops reading.
///
/// Once it returns its input is dropped, so upstream stages see a closed
/// channel and wind down.
#[derive(Debug, Clone, Copy)]
pub struct Head(pub usize);

impl Transformer for Head {
    fn transform(&self, input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
        if self.0 == 0 {
            return;
        }
        for (seen, msg) in input.iter().enumerate() {
            if out.send(msg).is_err() || seen + 1 == self.0 {
                return;
            }
        }
    }

    fn name(&self) -> &str {
        "head"
    }
}

/// Forwards only the last `n` messages, after the input closes
#[derive(Debug, Clone, Copy)]
pub struct Tail(pub usize);

impl Transformer for Tail {
    fn transform(&self, input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
        let mut last: VecDeque<Message> = VecDeque::with_capacity(self.0);
        for msg in input.iter() {
            if self.0 == 0 {
                continue;
            }
            if last.len() == self.0 {
                last.pop_front();
            }
            last.push_back(msg);
        }

        for msg in last {
            if out.send(msg).is_err() {
                return;
            }
        }
    }

    fn name(&self) -> &str {
        "tail"
    }
}

/// Copies every message to another channel before forwarding it
#[derive(Debug, Clone)]
pub struct Tap(pub Sender<Message>);

impl Transformer for Tap {
    fn transform(&self, input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
        for msg in input.iter() {
            if self.0.send(msg.clone()).is_err() {
                tracing::trace!("tap receiver gone");
            }
            if out.send(msg).is_err() {
                return;
            }
        }
    }

    fn name(&self) -> &str {
        "tap"
    }
}

/// Swallows everything; caps an embedded line that should not forward
#[derive(Debug, Clone, Copy, Default)]
pub struct Cap;

impl Transformer for Cap {
    fn transform(&self, input: &Inlet, _out: &Outlet, _errs: &ErrorOutlet) {
        for _ in input.iter() {}
    }

    fn name(&self) -> &str {
        "cap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{buffered, errors, rendezvous};
    use std::thread;

    fn run(stage: &dyn Transformer, count: usize) -> Vec<String> {
        let (in_tx, in_rx) = rendezvous();
        let (out_tx, out_rx) = rendezvous();
        let (err_tx, _err_rx) = errors();
        thread::scope(|s| {
            s.spawn(move || {
                for i in 0..count {
                    if in_tx.send(Message::Text(i.to_string())).is_err() {
                        return;
                    }
                }
            });
            let collected = s.spawn(move || out_rx.iter().map(|m| m.text()).collect::<Vec<_>>());
            stage.transform(&in_rx, &out_tx, &err_tx);
            drop(in_rx);
            drop(out_tx);
            collected.join().unwrap()
        })
    }

    #[test]
    fn test_head_stops_early() {
        assert_eq!(run(&Head(3), 10), vec!["0", "1", "2"]);
        assert_eq!(run(&Head(5), 2), vec!["0", "1"]);
        assert!(run(&Head(0), 4).is_empty());
    }

    #[test]
    fn test_tail_keeps_last() {
        assert_eq!(run(&Tail(2), 5), vec!["3", "4"]);
        assert_eq!(run(&Tail(10), 3), vec!["0", "1", "2"]);
        assert!(run(&Tail(0), 3).is_empty());
    }

    #[test]
    fn test_tap_copies() {
        let (tap_tx, tap_rx) = buffered(16);
        let forwarded = run(&Tap(tap_tx), 3);
        assert_eq!(forwarded, vec!["0", "1", "2"]);
        let tapped: Vec<String> = tap_rx.try_iter().map(|m| m.text()).collect();
        assert_eq!(tapped, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_cap_swallows() {
        assert!(run(&Cap, 4).is_empty());
    }
}
