//! Dispatcher: the coordinator between producers and sinks
//!
//! Producers enqueue into one central queue. A fan-out worker drains it in
//! batches and forwards each event to the private queue of every sink whose
//! threshold accepts it. Each sink runs on its own worker (see
//! [`SinkWorker`](super::sink_worker)), so a slow or broken sink never stalls
//! callers or its siblings.

use super::{
    error::{LogError, Result},
    fields::EventFields,
    formatter::LogFormatter,
    log_event::LogEvent,
    metrics::DispatchMetrics,
    overflow_policy::{ErrorCallback, OverflowCallback, OverflowPolicy},
    severity::Severity,
    sink::LogSink,
    sink_worker::{SinkMessage, SinkWorker},
};
use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default shutdown timeout used when a dispatcher is dropped (5 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the central delivery queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 8192;

const FAN_OUT_BATCH_SIZE: usize = 64;

/// Sentinel for "no sink registered" in the threshold shortcut
const NO_SINKS: u8 = u8::MAX;

/// Handle returned by [`Dispatcher::register_sink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

enum Envelope {
    Event(Arc<LogEvent>),
    Flush(Sender<()>),
    SetFormatter(SinkId, Box<dyn LogFormatter>),
}

struct SinkSlot {
    id: SinkId,
    name: String,
    min_severity: Severity,
    sender: Sender<SinkMessage>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    slots: Vec<SinkSlot>,
    next_id: u64,
}

impl Registry {
    fn position(&self, id: SinkId) -> Result<usize> {
        self.slots
            .iter()
            .position(|slot| slot.id == id)
            .ok_or(LogError::UnknownSink { id: id.as_u64() })
    }
}

/// State shared between the dispatcher handle and its fan-out worker
struct Shared {
    registry: RwLock<Registry>,
    /// Lowest threshold over all registered sinks, or `NO_SINKS`
    lowest_threshold: AtomicU8,
    metrics: Arc<DispatchMetrics>,
    on_error: ErrorCallback,
}

impl Shared {
    fn refresh_threshold(&self, registry: &Registry) {
        let lowest = registry
            .slots
            .iter()
            .map(|slot| slot.min_severity as u8)
            .min()
            .unwrap_or(NO_SINKS);
        self.lowest_threshold.store(lowest, Ordering::Release);
    }

    fn accepts(&self, severity: Severity) -> bool {
        let lowest = self.lowest_threshold.load(Ordering::Acquire);
        lowest != NO_SINKS && severity as u8 >= lowest
    }

    fn fan_out(&self, batch: &mut Vec<Envelope>) {
        let registry = self.registry.read();
        for envelope in batch.drain(..) {
            match envelope {
                Envelope::Event(event) => {
                    for slot in registry
                        .slots
                        .iter()
                        .filter(|slot| slot.min_severity <= event.severity())
                    {
                        let _ = slot.sender.send(SinkMessage::Deliver(Arc::clone(&event)));
                    }
                }
                Envelope::Flush(done) => {
                    for slot in &registry.slots {
                        let _ = slot.sender.send(SinkMessage::Flush(done.clone()));
                    }
                }
                Envelope::SetFormatter(id, formatter) => {
                    if let Some(slot) = registry.slots.iter().find(|slot| slot.id == id) {
                        let _ = slot.sender.send(SinkMessage::SetFormatter(formatter));
                    }
                }
            }
        }
    }

    fn run_fan_out(self: Arc<Self>, receiver: Receiver<Envelope>) {
        let mut batch = Vec::with_capacity(FAN_OUT_BATCH_SIZE);
        while let Ok(first) = receiver.recv() {
            batch.push(first);
            while batch.len() < FAN_OUT_BATCH_SIZE {
                match receiver.try_recv() {
                    Ok(envelope) => batch.push(envelope),
                    Err(_) => break,
                }
            }
            self.fan_out(&mut batch);
        }
    }
}

/// Poll a worker until it finishes or the deadline passes
fn join_until(handle: JoinHandle<()>, deadline: Instant, worker: &str) -> bool {
    loop {
        if handle.is_finished() {
            if let Err(e) = handle.join() {
                eprintln!("[LOGGER ERROR] Worker '{}' panicked during shutdown: {:?}", worker, e);
                return false;
            }
            return true;
        }

        if Instant::now() >= deadline {
            eprintln!(
                "[LOGGER WARNING] Worker '{}' did not finish within timeout. \
                 Some logs may be lost.",
                worker
            );
            return false;
        }

        thread::sleep(Duration::from_millis(10));
    }
}

pub(crate) fn default_error_callback() -> ErrorCallback {
    Arc::new(|sink: &str, error: &LogError| {
        eprintln!("[LOGGER ERROR] Sink '{}' failed: {}", sink, error);
    })
}

/// Routes log events to any number of sinks
///
/// A sink receives an event iff its threshold is at or below the event's
/// severity. Delivery to each sink is asynchronous and in submission order.
///
/// # Example
///
/// ```
/// use rust_log_dispatcher::prelude::*;
///
/// let dispatcher = Dispatcher::new().unwrap();
/// let id = dispatcher
///     .register_sink(ConsoleSink::stderr(), Severity::Warn, TextFormatter::new())
///     .unwrap();
///
/// dispatcher.info("skipped: below every threshold");
/// dispatcher.warn("delivered to the console");
/// dispatcher.flush().unwrap();
///
/// dispatcher.remove_sink(id).unwrap();
/// ```
pub struct Dispatcher {
    shared: Arc<Shared>,
    sender: Option<Sender<Envelope>>,
    fan_out_worker: Option<JoinHandle<()>>,
    overflow_policy: OverflowPolicy,
    on_overflow: Option<OverflowCallback>,
    preserve_errors: bool,
    shutdown_timeout: Duration,
}

impl Dispatcher {
    /// Dispatcher with a bounded queue of [`DEFAULT_QUEUE_CAPACITY`] and no sinks
    pub fn new() -> Result<Self> {
        DispatcherBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    fn start(
        capacity: Option<usize>,
        overflow_policy: OverflowPolicy,
        on_overflow: Option<OverflowCallback>,
        on_error: ErrorCallback,
        preserve_errors: bool,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        let (sender, receiver) = match capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };

        let shared = Arc::new(Shared {
            registry: RwLock::new(Registry::default()),
            lowest_threshold: AtomicU8::new(NO_SINKS),
            metrics: Arc::new(DispatchMetrics::new()),
            on_error,
        });

        let worker_shared = Arc::clone(&shared);
        let fan_out_worker = thread::Builder::new()
            .name("log-dispatch".to_string())
            .spawn(move || worker_shared.run_fan_out(receiver))
            .map_err(|e| LogError::io_operation("spawn dispatch worker", e.to_string(), e))?;

        Ok(Self {
            shared,
            sender: Some(sender),
            fan_out_worker: Some(fan_out_worker),
            overflow_policy,
            on_overflow,
            preserve_errors,
            shutdown_timeout,
        })
    }

    /// Register a sink with its threshold and formatter
    ///
    /// The sink moves onto a dedicated worker thread named `log-sink-<name>`.
    ///
    /// # Errors
    ///
    /// [`LogError::InvalidConfiguration`] if the sink name is empty or already
    /// registered, or if the dispatcher has been shut down.
    pub fn register_sink<S, F>(&self, sink: S, min_severity: Severity, formatter: F) -> Result<SinkId>
    where
        S: LogSink + 'static,
        F: LogFormatter + 'static,
    {
        self.register_boxed(Box::new(sink), min_severity, Box::new(formatter))
    }

    /// [`register_sink`](Self::register_sink) for already boxed parts
    pub fn register_boxed(
        &self,
        sink: Box<dyn LogSink>,
        min_severity: Severity,
        formatter: Box<dyn LogFormatter>,
    ) -> Result<SinkId> {
        if self.sender.is_none() {
            return Err(LogError::config("Dispatcher", "cannot register a sink after shutdown"));
        }

        let name = sink.name().to_string();
        if name.trim().is_empty() {
            return Err(LogError::config("Dispatcher", "sink name must not be empty"));
        }

        let mut registry = self.shared.registry.write();
        if registry.slots.iter().any(|slot| slot.name == name) {
            return Err(LogError::config(
                "Dispatcher",
                format!("a sink named '{}' is already registered", name),
            ));
        }

        let id = SinkId(registry.next_id);
        registry.next_id += 1;

        let (sender, receiver) = unbounded();
        let worker = SinkWorker::new(
            name.clone(),
            sink,
            formatter,
            Arc::clone(&self.shared.metrics),
            Arc::clone(&self.shared.on_error),
        );
        let handle = thread::Builder::new()
            .name(format!("log-sink-{}", name))
            .spawn(move || worker.run(receiver))
            .map_err(|e| LogError::io_operation("spawn sink worker", e.to_string(), e))?;

        registry.slots.push(SinkSlot {
            id,
            name,
            min_severity,
            sender,
            worker: Some(handle),
        });
        self.shared.refresh_threshold(&registry);

        Ok(id)
    }

    /// Unregister a sink
    ///
    /// Blocks until the sink's worker has delivered what was already queued
    /// for it and flushed. Events still in the central queue are not
    /// delivered to the removed sink.
    pub fn remove_sink(&self, id: SinkId) -> Result<()> {
        let slot = {
            let mut registry = self.shared.registry.write();
            let index = registry.position(id)?;
            let slot = registry.slots.remove(index);
            self.shared.refresh_threshold(&registry);
            slot
        };

        let SinkSlot {
            name,
            sender,
            worker,
            ..
        } = slot;
        drop(sender);
        if let Some(handle) = worker {
            if let Err(e) = handle.join() {
                eprintln!("[LOGGER ERROR] Sink worker '{}' panicked: {:?}", name, e);
            }
        }
        Ok(())
    }

    /// Change a sink's threshold
    ///
    /// Applies to every event fanned out after the call, including events
    /// already waiting in the central queue.
    pub fn set_min_severity(&self, id: SinkId, severity: Severity) -> Result<()> {
        let mut registry = self.shared.registry.write();
        let index = registry.position(id)?;
        registry.slots[index].min_severity = severity;
        self.shared.refresh_threshold(&registry);
        Ok(())
    }

    /// Replace a sink's formatter
    ///
    /// Ordered with `log` calls: events logged before this call are rendered
    /// with the old formatter.
    pub fn set_formatter<F: LogFormatter + 'static>(&self, id: SinkId, formatter: F) -> Result<()> {
        self.shared.registry.read().position(id)?;
        let sender = self.sender.as_ref().ok_or(LogError::DispatcherStopped)?;
        sender
            .send(Envelope::SetFormatter(id, Box::new(formatter)))
            .map_err(|_| LogError::DispatcherStopped)
    }

    pub fn min_severity(&self, id: SinkId) -> Result<Severity> {
        let registry = self.shared.registry.read();
        let index = registry.position(id)?;
        Ok(registry.slots[index].min_severity)
    }

    pub fn sink_ids(&self) -> Vec<SinkId> {
        self.shared.registry.read().slots.iter().map(|slot| slot.id).collect()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.shared
            .registry
            .read()
            .slots
            .iter()
            .map(|slot| slot.name.clone())
            .collect()
    }

    pub fn sink_count(&self) -> usize {
        self.shared.registry.read().slots.len()
    }

    /// True if at least one registered sink accepts `severity`
    pub fn is_enabled(&self, severity: Severity) -> bool {
        self.shared.accepts(severity)
    }

    /// Lowest threshold over all sinks, `None` when no sink is registered
    pub fn lowest_threshold(&self) -> Option<Severity> {
        Severity::from_u8(self.shared.lowest_threshold.load(Ordering::Acquire))
    }

    /// Submit an event for delivery
    ///
    /// Never blocks beyond enqueueing; see [`OverflowPolicy`] for what
    /// happens when the queue is full.
    pub fn log(&self, event: LogEvent) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };

        let severity = event.severity();
        if !self.shared.accepts(severity) {
            self.shared.metrics.record_filtered();
            return;
        }

        match sender.try_send(Envelope::Event(Arc::new(event))) {
            Ok(()) => {
                self.shared.metrics.record_submitted();
            }
            Err(TrySendError::Full(envelope)) => {
                self.handle_overflow(sender, envelope, severity);
            }
            Err(TrySendError::Disconnected(_)) => {
                // Shutting down
            }
        }
    }

    fn handle_overflow(&self, sender: &Sender<Envelope>, envelope: Envelope, severity: Severity) {
        let metrics = &self.shared.metrics;
        metrics.record_queue_full();

        if self.preserve_errors && severity == Severity::Error {
            metrics.record_block();
            if sender.send(envelope).is_ok() {
                metrics.record_submitted();
            }
            return;
        }

        match &self.overflow_policy {
            OverflowPolicy::DropNewest => {
                metrics.record_dropped();
            }

            OverflowPolicy::Block => {
                metrics.record_block();
                if sender.send(envelope).is_ok() {
                    metrics.record_submitted();
                }
            }

            OverflowPolicy::BlockWithTimeout(timeout) => {
                metrics.record_block();
                match sender.send_timeout(envelope, *timeout) {
                    Ok(()) => {
                        metrics.record_submitted();
                    }
                    Err(SendTimeoutError::Timeout(_)) => self.alert_and_drop(),
                    Err(SendTimeoutError::Disconnected(_)) => {}
                }
            }

            OverflowPolicy::AlertAndDrop => self.alert_and_drop(),
        }
    }

    fn alert_and_drop(&self) {
        let dropped_count = self.shared.metrics.record_dropped();

        // First drop, then every 1000th
        let should_alert = dropped_count == 0 || (dropped_count + 1) % 1000 == 0;
        if should_alert {
            eprintln!(
                "[LOGGER WARNING] Queue full, {} logs dropped. \
                 Consider increasing the queue capacity or using a different overflow policy.",
                dropped_count + 1
            );

            if let Some(ref callback) = self.on_overflow {
                callback(dropped_count + 1);
            }
        }
    }

    pub fn verbose(&self, message: impl Into<String>) {
        self.log(LogEvent::new(Severity::Verbose, message));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogEvent::new(Severity::Debug, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogEvent::new(Severity::Info, message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogEvent::new(Severity::Warn, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogEvent::new(Severity::Error, message));
    }

    pub fn log_with_fields(&self, severity: Severity, message: impl Into<String>, fields: EventFields) {
        self.log(LogEvent::new(severity, message).with_fields(fields));
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.shared.metrics
    }

    /// Block until every event enqueued before this call has been delivered
    /// to every sink and each sink has flushed
    pub fn flush(&self) -> Result<()> {
        let done = self.request_flush()?;
        // Nothing is ever sent; disconnection means every holder has finished
        let _ = done.recv();
        Ok(())
    }

    /// [`flush`](Self::flush) with an upper bound on the wait
    ///
    /// # Errors
    ///
    /// [`LogError::FlushTimeout`] if some sink has not finished in time. The
    /// flush still completes in the background.
    pub fn flush_timeout(&self, timeout: Duration) -> Result<()> {
        let done = self.request_flush()?;
        match done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(LogError::FlushTimeout { waited: timeout }),
            _ => Ok(()),
        }
    }

    fn request_flush(&self) -> Result<Receiver<()>> {
        let sender = self.sender.as_ref().ok_or(LogError::DispatcherStopped)?;
        let (done_tx, done_rx) = bounded::<()>(1);
        // Control messages wait for space regardless of the overflow policy
        sender
            .send(Envelope::Flush(done_tx))
            .map_err(|_| LogError::DispatcherStopped)?;
        Ok(done_rx)
    }

    /// Drain all queues and join all workers
    ///
    /// After shutdown, `log` is a no-op and registration fails. Dropping the
    /// dispatcher calls this with [`DEFAULT_SHUTDOWN_TIMEOUT`] (or the
    /// builder's `shutdown_timeout`).
    ///
    /// Returns `true` if every worker finished within `timeout`.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        drop(self.sender.take());
        let deadline = Instant::now() + timeout;
        let mut clean = true;

        if let Some(handle) = self.fan_out_worker.take() {
            clean &= join_until(handle, deadline, "log-dispatch");
        }

        let slots = {
            let mut registry = self.shared.registry.write();
            let slots = std::mem::take(&mut registry.slots);
            self.shared.refresh_threshold(&registry);
            slots
        };

        for slot in slots {
            drop(slot.sender);
            if let Some(handle) = slot.worker {
                clean &= join_until(handle, deadline, &slot.name);
            }
        }

        let dropped = self.shared.metrics.dropped_count();
        if dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Dispatcher shut down after dropping {} logs.",
                dropped
            );
        }

        clean
    }

    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.sender.is_some() || self.fan_out_worker.is_some() {
            self.shutdown(self.shutdown_timeout);
        }
    }
}

/// Builder for [`Dispatcher`]
///
/// # Example
/// ```
/// use rust_log_dispatcher::prelude::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let dispatcher = Dispatcher::builder()
///     .queue_capacity(1024)
///     .overflow_policy(OverflowPolicy::BlockWithTimeout(Duration::from_millis(50)))
///     .on_overflow(Arc::new(|count: u64| eprintln!("ALERT: {} logs dropped", count)))
///     .sink(ConsoleSink::stdout(), Severity::Debug, TextFormatter::new())
///     .build()
///     .unwrap();
/// assert_eq!(dispatcher.sink_count(), 1);
/// ```
pub struct DispatcherBuilder {
    capacity: Option<usize>,
    overflow_policy: OverflowPolicy,
    on_overflow: Option<OverflowCallback>,
    on_error: Option<ErrorCallback>,
    preserve_errors: bool,
    shutdown_timeout: Duration,
    sinks: Vec<(Box<dyn LogSink>, Severity, Box<dyn LogFormatter>)>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            capacity: Some(DEFAULT_QUEUE_CAPACITY),
            overflow_policy: OverflowPolicy::default(),
            on_overflow: None,
            on_error: None,
            preserve_errors: true,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            sinks: Vec::new(),
        }
    }

    /// Bound the central queue; must be non-zero
    #[must_use = "builder methods return a new value"]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Never drop or block: the central queue grows without limit
    #[must_use = "builder methods return a new value"]
    pub fn unbounded(mut self) -> Self {
        self.capacity = None;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Called with the total drop count on the first drop and every 1000th
    #[must_use = "builder methods return a new value"]
    pub fn on_overflow(mut self, callback: OverflowCallback) -> Self {
        self.on_overflow = Some(callback);
        self
    }

    /// Replace the default stderr reporter for sink failures
    #[must_use = "builder methods return a new value"]
    pub fn on_sink_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// Block instead of dropping Error events on overflow (default `true`)
    #[must_use = "builder methods return a new value"]
    pub fn preserve_errors(mut self, preserve: bool) -> Self {
        self.preserve_errors = preserve;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Register a sink as part of `build`
    #[must_use = "builder methods return a new value"]
    pub fn sink<S, F>(mut self, sink: S, min_severity: Severity, formatter: F) -> Self
    where
        S: LogSink + 'static,
        F: LogFormatter + 'static,
    {
        self.sinks.push((Box::new(sink), min_severity, Box::new(formatter)));
        self
    }

    /// Start the workers and register the configured sinks
    pub fn build(self) -> Result<Dispatcher> {
        if self.capacity == Some(0) {
            return Err(LogError::config("Dispatcher", "queue capacity must be non-zero"));
        }

        let dispatcher = Dispatcher::start(
            self.capacity,
            self.overflow_policy,
            self.on_overflow,
            self.on_error.unwrap_or_else(default_error_callback),
            self.preserve_errors,
            self.shutdown_timeout,
        )?;

        for (sink, min_severity, formatter) in self.sinks {
            dispatcher.register_boxed(sink, min_severity, formatter)?;
        }

        Ok(dispatcher)
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
