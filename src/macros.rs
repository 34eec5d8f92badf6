//! Logging macros that capture the call site
//!
//! Each macro records `file!()`, `line!()`, `module_path!()` and the
//! enclosing function, and formats its arguments like `format!`. The
//! message is only formatted if some sink would accept the severity.
//!
//! # Examples
//!
//! ```
//! use rust_log_dispatcher::prelude::*;
//! use rust_log_dispatcher::{info, warn};
//!
//! let dispatcher = Dispatcher::new().unwrap();
//! dispatcher
//!     .register_sink(ConsoleSink::stdout(), Severity::Info, TextFormatter::new().with_location(true))
//!     .unwrap();
//!
//! let port = 8080;
//! info!(dispatcher, "Server listening on port {}", port);
//! warn!(dispatcher, "Retry {} of {}", 1, 3);
//! ```

/// Name of the enclosing function, module-qualified
#[doc(hidden)]
#[macro_export]
macro_rules! __function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        let name = name.strip_suffix("::f").unwrap_or(name);
        name.trim_end_matches("::{{closure}}")
    }};
}

/// Log at an explicit severity
///
/// ```
/// # use rust_log_dispatcher::prelude::*;
/// # let dispatcher = Dispatcher::new().unwrap();
/// use rust_log_dispatcher::log;
/// log!(dispatcher, Severity::Info, "Simple message");
/// log!(dispatcher, Severity::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($dispatcher:expr, $severity:expr, $($arg:tt)+) => {{
        let dispatcher = &$dispatcher;
        let severity: $crate::Severity = $severity;
        if dispatcher.is_enabled(severity) {
            dispatcher.log(
                $crate::LogEvent::new(severity, format!($($arg)+))
                    .with_location(file!(), line!(), module_path!())
                    .with_function($crate::__function_name!()),
            );
        } else {
            dispatcher.metrics().record_filtered();
        }
    }};
}

#[macro_export]
macro_rules! verbose {
    ($dispatcher:expr, $($arg:tt)+) => {
        $crate::log!($dispatcher, $crate::Severity::Verbose, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($dispatcher:expr, $($arg:tt)+) => {
        $crate::log!($dispatcher, $crate::Severity::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($dispatcher:expr, $($arg:tt)+) => {
        $crate::log!($dispatcher, $crate::Severity::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($dispatcher:expr, $($arg:tt)+) => {
        $crate::log!($dispatcher, $crate::Severity::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! error {
    ($dispatcher:expr, $($arg:tt)+) => {
        $crate::log!($dispatcher, $crate::Severity::Error, $($arg)+)
    };
}

/// Log an error and flush if the condition is false; panics in debug builds
///
/// ```should_panic
/// # use rust_log_dispatcher::prelude::*;
/// # let dispatcher = Dispatcher::new().unwrap();
/// use rust_log_dispatcher::log_assert;
/// let queue_len = 3;
/// log_assert!(dispatcher, queue_len == 0, "queue not drained: {}", queue_len);
/// ```
#[macro_export]
macro_rules! log_assert {
    ($dispatcher:expr, $cond:expr $(,)?) => {
        $crate::log_assert!($dispatcher, $cond, "Assertion failed: {}", stringify!($cond))
    };
    ($dispatcher:expr, $cond:expr, $($arg:tt)+) => {{
        if !$cond {
            let dispatcher = &$dispatcher;
            let message = format!($($arg)+);
            $crate::log!(dispatcher, $crate::Severity::Error, "{}", message);
            let _ = dispatcher.flush();
            debug_assert!(false, "{}", message);
        }
    }};
}
