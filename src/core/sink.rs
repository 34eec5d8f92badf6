//! Sink trait for log output destinations

use super::{error::Result, log_event::LogEvent};
use std::time::Duration;

/// A destination that durably or visibly outputs formatted log text
///
/// Each registered sink is owned by its own delivery worker, so
/// implementations get `&mut self` and need no internal locking.
pub trait LogSink: Send {
    /// Output one event already rendered by the sink's formatter
    fn deliver(&mut self, event: &LogEvent, formatted: &str) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;

    /// How often [`on_tick`](LogSink::on_tick) should run while idle
    ///
    /// `None` (the default) disables ticking.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    /// Periodic housekeeping: time-based rollover, batch flushes
    fn on_tick(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn deliver(&mut self, event: &LogEvent, formatted: &str) -> Result<()> {
        (**self).deliver(event, formatted)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn tick_interval(&self) -> Option<Duration> {
        (**self).tick_interval()
    }

    fn on_tick(&mut self) -> Result<()> {
        (**self).on_tick()
    }
}
