use crate::channel::{rendezvous, ErrorOutlet, Inlet, Outlet};
use crate::error::PipelineError;
use crate::message::Message;
use crate::stage::Transformer;
use std::thread;

/// Failure of a [`ErrorHandler`] try function
#[derive(Debug)]
pub struct Failed {
    pub error: PipelineError,
    /// Result produced despite the error, handed to the handler instead of
    /// the original input
    pub partial: Option<Message>,
}

impl Failed {
    pub fn new(error: PipelineError) -> Self {
        Self {
            error,
            partial: None,
        }
    }

    pub fn with_partial(mut self, partial: Message) -> Self {
        self.partial = Some(partial);
        self
    }
}

impl From<PipelineError> for Failed {
    fn from(error: PipelineError) -> Self {
        Self::new(error)
    }
}

type TryFn = dyn Fn(&Message) -> Result<Message, Failed> + Send + Sync;

/// Runs a fallible transform and routes failures to a handler stage.
///
/// Successful results go downstream. A failed message (or the partial result
/// its failure carried) goes to `handler`, which runs concurrently and shares
/// the downstream output and error channels. The failure itself is logged,
/// not reported; the handler decides what becomes of the message.
pub struct ErrorHandler {
    attempt: Box<TryFn>,
    handler: Box<dyn Transformer>,
}

impl ErrorHandler {
    pub fn new<F, H>(attempt: F, handler: H) -> Self
    where
        F: Fn(&Message) -> Result<Message, Failed> + Send + Sync + 'static,
        H: Transformer + 'static,
    {
        Self {
            attempt: Box::new(attempt),
            handler: Box::new(handler),
        }
    }
}

impl Transformer for ErrorHandler {
    fn transform(&self, input: &Inlet, out: &Outlet, errs: &ErrorOutlet) {
        thread::scope(|s| {
            let (failed_tx, failed_rx) = rendezvous();
            s.spawn(move || self.handler.transform(&failed_rx, out, errs));

            for msg in input.iter() {
                let sent = match (self.attempt)(&msg) {
                    Ok(next) => out.send(next).is_ok(),
                    Err(failed) => {
                        tracing::debug!(error = %failed.error, "routing failed message to handler");
                        failed_tx.send(failed.partial.unwrap_or(msg)).is_ok()
                    }
                };
                if !sent {
                    break;
                }
            }

            drop(failed_tx);
        });
    }

    fn name(&self) -> &str {
        "error-handler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::errors;
    use crate::stage::inline;

    fn parse(m: &Message) -> Result<Message, Failed> {
        let text = m.text();
        match text.parse::<i64>() {
            Ok(v) => Ok(Message::Text((v * 2).to_string())),
            Err(_) if text.ends_with('!') => Err(Failed::new(PipelineError::stage("loud"))
                .with_partial(Message::Text(text.trim_end_matches('!').to_string()))),
            Err(e) => Err(PipelineError::stage(e.to_string()).into()),
        }
    }

    #[test]
    fn test_failures_reach_handler() {
        let handler = inline(|m| Ok(Some(Message::Text(format!("handled:{}", m.text())))));
        let stage = ErrorHandler::new(parse, handler);

        let (in_tx, in_rx) = rendezvous();
        let (out_tx, out_rx) = rendezvous();
        let (err_tx, err_rx) = errors();
        let mut seen = thread::scope(|s| {
            s.spawn(move || {
                for m in ["1", "x", "2", "hey!"] {
                    in_tx.send(Message::from(m)).unwrap();
                }
            });
            let collected = s.spawn(move || out_rx.iter().map(|m| m.text()).collect::<Vec<_>>());
            stage.transform(&in_rx, &out_tx, &err_tx);
            drop(out_tx);
            collected.join().unwrap()
        });
        seen.sort();

        assert_eq!(seen, vec!["2", "4", "handled:hey", "handled:x"]);
        drop(err_tx);
        assert_eq!(err_rx.iter().count(), 0);
    }
}
