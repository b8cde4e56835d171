use crossbeam::channel::unbounded;
use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;
use pipe_line::{
    consumer_fn, context_fn, filter, from_iter, inline, map, noop, producer_fn, Context, ErrorSink,
    Line, Many, Message, PipelineError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn collect_into(sink: Arc<Mutex<Vec<String>>>) -> impl pipe_line::Consumer {
    consumer_fn(move |input, _errs| {
        for msg in input.iter() {
            sink.lock().push(msg.text());
        }
    })
}

#[test]
fn test_single_stage_pipeline() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    Line::new()
        .producer(from_iter(["a", "b", "c"]))
        .add(map(|m| Ok(Some(Message::Text(m.text().to_uppercase())))))
        .consumer(collect_into(Arc::clone(&seen)))
        .run()
        .expect("Run failed");

    assert_eq!(*seen.lock(), vec!["A", "B", "C"]);
}

#[test]
fn test_multi_stage_pipeline_terminates() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut line = Line::new().producer(from_iter((0..100).map(|i| i.to_string())));
    for _ in 0..5 {
        line = line.add(noop);
    }
    line.consumer(collect_into(Arc::clone(&seen)))
        .run()
        .expect("Run failed");

    assert_eq!(seen.lock().len(), 100);
}

#[test]
fn test_filter_stage() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    Line::new()
        .producer(from_iter((0..10).map(|i| i.to_string())))
        .add(filter(|m| m.text().parse::<u32>().map(|v| v % 2 == 0).unwrap_or(false)))
        .consumer(collect_into(Arc::clone(&seen)))
        .run()
        .expect("Run failed");

    assert_eq!(*seen.lock(), vec!["0", "2", "4", "6", "8"]);
}

#[test]
fn test_errors_reach_caller_sink_and_line_continues() {
    let (errs_tx, errs_rx) = unbounded::<PipelineError>();
    let drained = WaitGroup::new();
    let collected = Arc::new(Mutex::new(Vec::new()));

    let drain_guard = drained.clone();
    let sink = Arc::clone(&collected);
    let drain = thread::spawn(move || {
        let _guard = drain_guard;
        for err in errs_rx.iter() {
            sink.lock().push(err.to_string());
        }
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    Line::new()
        .producer(from_iter(["1", "x", "2", "y"]))
        .add(map(|m| {
            m.text()
                .parse::<u32>()
                .map(|v| Some(Message::Text((v * 10).to_string())))
                .map_err(|e| PipelineError::stage(e.to_string()))
        }))
        .consumer(collect_into(Arc::clone(&seen)))
        .errors(ErrorSink::new(errs_tx, drained))
        .run()
        .expect("Run failed");

    drain.join().expect("Drain panicked");
    assert_eq!(*seen.lock(), vec!["10", "20"]);
    assert_eq!(collected.lock().len(), 2);
}

#[test]
fn test_default_error_sink_does_not_block() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    Line::new()
        .producer(from_iter(["bad", "bad", "ok"]))
        .add(map(|m| {
            if m.text() == "bad" {
                Err(PipelineError::stage("bad message"))
            } else {
                Ok(Some(m))
            }
        }))
        .consumer(collect_into(Arc::clone(&seen)))
        .run()
        .expect("Run failed");

    assert_eq!(*seen.lock(), vec!["ok"]);
}

#[test]
fn test_cancelled_context_stops_aware_stage() {
    let ctx = Context::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (errs_tx, errs_rx) = unbounded();
    let drained = WaitGroup::new();

    let cancel = ctx.clone();
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);

    Line::new()
        .producer(producer_fn(|out, _errs| {
            for i in 0..1000 {
                if out.send(Message::Text(i.to_string())).is_err() {
                    return;
                }
            }
        }))
        .add_context(context_fn(move |ctx, input, out, errs| {
            for msg in input.iter() {
                if let Some(err) = ctx.err() {
                    let _ = errs.send(err);
                    return;
                }
                if counter.fetch_add(1, Ordering::SeqCst) == 9 {
                    cancel.cancel();
                }
                if out.send(msg).is_err() {
                    return;
                }
            }
        }))
        .consumer(collect_into(Arc::clone(&seen)))
        .errors(ErrorSink::new(errs_tx, drained))
        .run_context(ctx)
        .expect("Run failed");

    assert_eq!(seen.lock().len(), 10);
    let errors: Vec<PipelineError> = errs_rx.try_iter().collect();
    assert!(errors.iter().any(PipelineError::is_cancellation));
}

#[test]
fn test_map_added_plainly_observes_run_context() {
    let ctx = Context::new();
    ctx.cancel();
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let (errs_tx, errs_rx) = unbounded();

    Line::new()
        .producer(from_iter((0..10).map(|i| i.to_string())))
        .add(map(move |m| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(m))
        }))
        .consumer(pipe_line::noop_consumer)
        .errors(ErrorSink::new(errs_tx, WaitGroup::new()))
        .run_context(ctx)
        .expect("Run failed");

    assert_eq!(processed.load(Ordering::SeqCst), 0);
    let errors: Vec<PipelineError> = errs_rx.try_iter().collect();
    assert!(matches!(errors.as_slice(), [PipelineError::Cancelled]));
}

#[test]
fn test_many_of_filters_observes_run_context() {
    let ctx = Context::new();
    ctx.cancel();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (errs_tx, errs_rx) = unbounded();

    Line::new()
        .producer(from_iter((0..20).map(|i| i.to_string())))
        .add(Many::new(filter(|_| true), 3).expect("Many"))
        .consumer(collect_into(Arc::clone(&seen)))
        .errors(ErrorSink::new(errs_tx, WaitGroup::new()))
        .run_context(ctx)
        .expect("Run failed");

    assert!(seen.lock().is_empty());
    let errors: Vec<PipelineError> = errs_rx.try_iter().collect();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(PipelineError::is_cancellation));
}

#[test]
fn test_consumer_panic_returns_error() {
    let result = Line::new()
        .producer(from_iter(["a", "b"]))
        .add(noop)
        .consumer(consumer_fn(|input, _errs| {
            for msg in input.iter() {
                panic!("cannot handle {msg}");
            }
        }))
        .run();

    assert!(matches!(result, Err(PipelineError::StagePanicked(_))));
}

#[test]
fn test_deadline_context() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    Line::new()
        .producer(producer_fn(|out, _errs| {
            for i in 0..5 {
                thread::sleep(Duration::from_millis(20));
                if out.send(Message::Text(i.to_string())).is_err() {
                    return;
                }
            }
        }))
        .add_context(pipe_line::map_context(|_, m| Ok(Some(m))))
        .consumer(collect_into(Arc::clone(&seen)))
        .run_context(Context::with_timeout(Duration::from_millis(30)))
        .expect("Run failed");

    assert!(seen.lock().len() < 5);
}

#[test]
fn test_many_is_unordered_but_complete() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    Line::new()
        .producer(from_iter((0..200).map(|i| i.to_string())))
        .add(Many::new(inline(|m| Ok(Some(m))), 8).expect("Many"))
        .consumer(collect_into(Arc::clone(&seen)))
        .run()
        .expect("Run failed");

    let mut got: Vec<u32> = seen.lock().iter().map(|s| s.parse().unwrap()).collect();
    got.sort_unstable();
    assert_eq!(got, (0..200).collect::<Vec<_>>());
}

#[test]
fn test_embedded_line() {
    let sub = Line::new()
        .add(map(|m| Ok(Some(Message::Text(format!("{}!", m.text()))))))
        .add(filter(|m| !m.text().starts_with('x')))
        .embed();

    let seen = Arc::new(Mutex::new(Vec::new()));
    Line::new()
        .producer(from_iter(["a", "x", "b"]))
        .add(sub)
        .consumer(collect_into(Arc::clone(&seen)))
        .run()
        .expect("Run failed");

    assert_eq!(*seen.lock(), vec!["a!", "b!"]);
}

#[test]
fn test_embedded_line_under_many() {
    let sub = Line::new()
        .add(map(|m| Ok(Some(Message::Text(m.text().repeat(2))))))
        .embed();

    let seen = Arc::new(Mutex::new(Vec::new()));
    Line::new()
        .producer(from_iter(["a", "b", "c", "d"]))
        .add(Many::new(sub, 2).expect("Many"))
        .consumer(collect_into(Arc::clone(&seen)))
        .run()
        .expect("Run failed");

    let mut got = seen.lock().clone();
    got.sort();
    assert_eq!(got, vec!["aa", "bb", "cc", "dd"]);
}

#[test]
fn test_tracked_messages_acknowledged_by_default_consumer() {
    let acked = Arc::new(AtomicUsize::new(0));
    let msgs: Vec<Message> = (0..4)
        .map(|i| {
            let acked = Arc::clone(&acked);
            Message::tracked(Message::Text(i.to_string()), move || {
                acked.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    Line::new()
        .producer(from_iter(msgs))
        .run()
        .expect("Run failed");

    assert_eq!(acked.load(Ordering::SeqCst), 4);
}
