use crate::channel::{rendezvous, ErrorOutlet, Inlet, Outlet};
use crate::message::Message;
use crate::stage::Transformer;
use std::thread;

type CheckFn = dyn Fn(&Message) -> bool + Send + Sync;

/// What happens to a message that fails the check
enum Otherwise {
    PassThrough,
    Drop,
    Else(Box<dyn Transformer>),
}

/// Routes each message to one of two concurrently running branches.
///
/// Messages passing `check` go to the then-branch. The rest go to the
/// else-branch when there is one, otherwise they are forwarded unchanged or,
/// for [`only_if`], dropped. Both branches write straight to the downstream
/// channel, and the stage returns once both have drained.
pub struct If {
    check: Box<CheckFn>,
    then: Box<dyn Transformer>,
    otherwise: Otherwise,
}

impl If {
    fn with(check: Box<CheckFn>, then: Box<dyn Transformer>, otherwise: Otherwise) -> Self {
        Self {
            check,
            then,
            otherwise,
        }
    }
}

/// Run `stage` on messages passing `check`; forward the rest untouched
pub fn if_then<T, F>(stage: T, check: F) -> If
where
    T: Transformer + 'static,
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    If::with(Box::new(check), Box::new(stage), Otherwise::PassThrough)
}

/// Run `stage` on messages passing `check`; drop the rest
pub fn only_if<T, F>(stage: T, check: F) -> If
where
    T: Transformer + 'static,
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    If::with(Box::new(check), Box::new(stage), Otherwise::Drop)
}

/// Run `then` on messages passing `check` and `otherwise` on the rest
pub fn if_else<T, E, F>(then: T, otherwise: E, check: F) -> If
where
    T: Transformer + 'static,
    E: Transformer + 'static,
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    If::with(
        Box::new(check),
        Box::new(then),
        Otherwise::Else(Box::new(otherwise)),
    )
}

impl Transformer for If {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        thread::scope(|s| {
            let (then_tx, then_rx) = rendezvous();
            s.spawn(move || self.then.transform(&then_rx, out, errs));

            let else_tx = match &self.otherwise {
                Otherwise::Else(stage) => {
                    let (tx, rx) = rendezvous();
                    s.spawn(move || stage.transform(&rx, out, errs));
                    Some(tx)
                }
                _ => None,
            };

            for msg in input.iter() {
                let sent = if (self.check)(&msg) {
                    then_tx.send(msg).is_ok()
                } else {
                    match (&self.otherwise, &else_tx) {
                        (_, Some(tx)) => tx.send(msg).is_ok(),
                        (Otherwise::PassThrough, None) => out.send(msg).is_ok(),
                        _ => {
                            tracing::trace!("check failed, dropping message");
                            true
                        }
                    }
                };
                if !sent {
                    break;
                }
            }

            drop(then_tx);
            drop(else_tx);
        });
    }

    fn name(&self) -> &str {
        "if"
    }
}
