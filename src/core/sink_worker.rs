//! Per-sink delivery worker
//!
//! Every registered sink is moved onto its own thread together with its
//! formatter. The worker pulls from the sink's private queue, formats,
//! delivers, and reports failures through the error callback. Panics inside
//! the formatter or the sink are caught here so they never cross into the
//! dispatcher or other sinks.

use super::{
    error::LogError, formatter::LogFormatter, log_event::LogEvent, metrics::DispatchMetrics,
    overflow_policy::ErrorCallback, sink::LogSink,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

pub(crate) enum SinkMessage {
    Deliver(Arc<LogEvent>),
    /// Flush, then drop the sender so the waiting caller observes completion
    Flush(Sender<()>),
    SetFormatter(Box<dyn LogFormatter>),
}

pub(crate) struct SinkWorker {
    name: String,
    sink: Box<dyn LogSink>,
    formatter: Box<dyn LogFormatter>,
    metrics: Arc<DispatchMetrics>,
    on_error: ErrorCallback,
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl SinkWorker {
    pub(crate) fn new(
        name: String,
        sink: Box<dyn LogSink>,
        formatter: Box<dyn LogFormatter>,
        metrics: Arc<DispatchMetrics>,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            name,
            sink,
            formatter,
            metrics,
            on_error,
        }
    }

    pub(crate) fn run(mut self, receiver: Receiver<SinkMessage>) {
        let interval = self.sink.tick_interval();
        let mut last_tick = Instant::now();

        loop {
            let message = match interval {
                Some(interval) => {
                    let wait = interval.saturating_sub(last_tick.elapsed());
                    match receiver.recv_timeout(wait) {
                        Ok(message) => Some(message),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match receiver.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                },
            };

            if let Some(message) = message {
                self.handle(message);
            }

            // Ticks also run under steady traffic, not only when idle
            if let Some(interval) = interval {
                if last_tick.elapsed() >= interval {
                    self.guarded("tick", |sink| sink.on_tick());
                    last_tick = Instant::now();
                }
            }
        }

        // Queue closed: the sink was removed or the dispatcher shut down
        self.guarded("flush", |sink| sink.flush());
    }

    fn handle(&mut self, message: SinkMessage) {
        match message {
            SinkMessage::Deliver(event) => self.deliver(&event),
            SinkMessage::Flush(done) => {
                self.guarded("flush", |sink| sink.flush());
                drop(done);
            }
            SinkMessage::SetFormatter(formatter) => self.formatter = formatter,
        }
    }

    fn deliver(&mut self, event: &LogEvent) {
        let formatter = &self.formatter;
        let sink = &mut self.sink;
        let outcome = catch_unwind(AssertUnwindSafe(|| match formatter.format(event) {
            Some(text) => sink.deliver(event, &text).map(|()| true),
            None => Ok(false),
        }));

        match outcome {
            Ok(Ok(true)) => {
                self.metrics.record_delivered();
            }
            Ok(Ok(false)) => {
                self.metrics.record_suppressed();
            }
            Ok(Err(e)) => {
                self.metrics.record_delivery_failure();
                self.report(&e);
            }
            Err(payload) => {
                self.metrics.record_delivery_failure();
                self.report(&LogError::SinkPanicked {
                    sink: self.name.clone(),
                    message: panic_message(payload.as_ref()),
                });
            }
        }
    }

    /// Run a sink operation, routing errors and panics to the callback
    fn guarded<F>(&mut self, operation: &str, f: F)
    where
        F: FnOnce(&mut Box<dyn LogSink>) -> super::error::Result<()>,
    {
        let sink = &mut self.sink;
        match catch_unwind(AssertUnwindSafe(|| f(sink))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(&e),
            Err(payload) => self.report(&LogError::SinkPanicked {
                sink: self.name.clone(),
                message: format!("during {}: {}", operation, panic_message(payload.as_ref())),
            }),
        }
    }

    fn report(&self, error: &LogError) {
        (self.on_error)(&self.name, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MessageFormatter, Result, Severity};
    use crossbeam_channel::unbounded;
    use parking_lot::Mutex;

    struct Recording {
        lines: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl LogSink for Recording {
        fn deliver(&mut self, _event: &LogEvent, formatted: &str) -> Result<()> {
            if Some(formatted) == self.fail_on {
                return Err(LogError::delivery("recording", "refused"));
            }
            if formatted == "boom" {
                panic!("sink exploded");
            }
            self.lines.lock().push(formatted.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_worker_isolates_errors_and_panics() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = Arc::clone(&errors);
        let metrics = Arc::new(DispatchMetrics::new());

        let worker = SinkWorker::new(
            "recording".to_string(),
            Box::new(Recording {
                lines: Arc::clone(&lines),
                fail_on: Some("bad"),
            }),
            Box::new(MessageFormatter),
            Arc::clone(&metrics),
            Arc::new(move |sink: &str, err: &LogError| {
                errors_clone.lock().push(format!("{}: {}", sink, err));
            }),
        );

        let (tx, rx) = unbounded();
        for message in ["one", "bad", "boom", "two"] {
            tx.send(SinkMessage::Deliver(Arc::new(LogEvent::new(Severity::Info, message))))
                .unwrap();
        }
        drop(tx);
        worker.run(rx);

        assert_eq!(*lines.lock(), vec!["one".to_string(), "two".to_string()]);
        assert_eq!(errors.lock().len(), 2);
        assert!(errors.lock()[1].contains("sink exploded"));
        assert_eq!(metrics.delivered(), 2);
        assert_eq!(metrics.delivery_failures(), 2);
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "Unknown panic");
    }
}
