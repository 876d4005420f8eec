//! Zero-cost logging macros.
//!
//! With the `tracing` feature enabled these forward to the `tracing` crate.
//! Without it they expand to nothing, so arguments are never evaluated.
//!
//! ```bash
//! cargo test -p coral-core --features tracing
//! ```

#[cfg(feature = "tracing")]
#[doc(hidden)]
pub use tracing as __tracing;

/// Trace-level logging (most verbose).
#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        $crate::tracing_helpers::__tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Debug-level logging.
#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::tracing_helpers::__tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Warn-level logging.
#[cfg(feature = "tracing")]
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::tracing_helpers::__tracing::warn!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}
