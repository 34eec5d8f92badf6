//! Console sink: terminal output with optional severity colors

use crate::core::{LogEvent, LogSink, Result, Severity};
use colored::Color;
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};

/// When to wrap output in ANSI color codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Color only if every destination stream is a terminal
    #[default]
    Auto,
    Always,
    Never,
}

/// Which standard stream receives output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleTarget {
    /// Error to stderr, everything else to stdout
    #[default]
    Split,
    Stdout,
    Stderr,
}

pub struct ConsoleSink {
    name: String,
    target: ConsoleTarget,
    color_mode: ColorMode,
    use_colors: bool,
    colors: HashMap<Severity, Color>,
    writer: Option<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_target(ConsoleTarget::Split)
    }

    pub fn stdout() -> Self {
        Self::with_target(ConsoleTarget::Stdout)
    }

    pub fn stderr() -> Self {
        Self::with_target(ConsoleTarget::Stderr)
    }

    pub fn with_target(target: ConsoleTarget) -> Self {
        let mut sink = Self {
            name: "console".to_string(),
            target,
            color_mode: ColorMode::Auto,
            use_colors: false,
            colors: HashMap::new(),
            writer: None,
        };
        sink.resolve_colors();
        sink
    }

    /// Write to `writer` instead of the standard streams
    ///
    /// In [`ColorMode::Auto`] a custom writer is never colored.
    #[must_use]
    pub fn with_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self.resolve_colors();
        self
    }

    #[must_use]
    pub fn with_color_mode(mut self, mode: ColorMode) -> Self {
        self.color_mode = mode;
        self.resolve_colors();
        self
    }

    /// Override the color used for one severity
    ///
    /// ```
    /// use rust_log_dispatcher::sinks::ConsoleSink;
    /// use rust_log_dispatcher::Severity;
    /// use colored::Color;
    ///
    /// let sink = ConsoleSink::new().with_severity_color(Severity::Info, Color::Cyan);
    /// assert_eq!(sink.color_for(Severity::Info), Color::Cyan);
    /// ```
    #[must_use]
    pub fn with_severity_color(mut self, severity: Severity, color: Color) -> Self {
        self.colors.insert(severity, color);
        self
    }

    /// Registration name; distinct console sinks need distinct names
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn uses_colors(&self) -> bool {
        self.use_colors
    }

    pub fn color_for(&self, severity: Severity) -> Color {
        self.colors
            .get(&severity)
            .copied()
            .unwrap_or_else(|| severity.color_code())
    }

    // Decided once here rather than per event
    fn resolve_colors(&mut self) {
        self.use_colors = match self.color_mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => {
                self.writer.is_none()
                    && match self.target {
                        ConsoleTarget::Split => {
                            io::stdout().is_terminal() && io::stderr().is_terminal()
                        }
                        ConsoleTarget::Stdout => io::stdout().is_terminal(),
                        ConsoleTarget::Stderr => io::stderr().is_terminal(),
                    }
            }
        };
    }

    fn render(&self, severity: Severity, formatted: &str) -> String {
        // Written directly; `colored` would re-check stdout and the environment
        if self.use_colors {
            format!("\x1b[{}m{}\x1b[0m", self.color_for(severity).to_fg_str(), formatted)
        } else {
            formatted.to_string()
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for ConsoleSink {
    fn deliver(&mut self, event: &LogEvent, formatted: &str) -> Result<()> {
        let line = self.render(event.severity(), formatted);

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            return Ok(());
        }

        let to_stderr = match self.target {
            ConsoleTarget::Split => event.severity() == Severity::Error,
            ConsoleTarget::Stdout => false,
            ConsoleTarget::Stderr => true,
        };
        if to_stderr {
            writeln!(io::stderr().lock(), "{}", line)?;
        } else {
            writeln!(io::stdout().lock(), "{}", line)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            return Ok(());
        }
        io::stdout().flush()?;
        io::stderr().flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
