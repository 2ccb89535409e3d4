//! Kernel logging macros.
//!
//! Thin shims over `defmt`: with the `defmt` feature enabled each
//! level forwards to the matching `defmt` macro, otherwise the
//! invocation vanishes at compile time so kernel code can log without
//! conditional clutter.

/// Trace-level kernel log.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);
    }};
}

/// Debug-level kernel log.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);
    }};
}

/// Info-level kernel log.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::info!($($arg)*);
    }};
}

/// Warning-level kernel log.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::warn!($($arg)*);
    }};
}

/// Error-level kernel log.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::error!($($arg)*);
    }};
}
