//! Diagnostic logging for the scheduler core: a single macro wrapping
//! [`crate::platform::Platform::print`], in the same shape as a
//! `serial_println!`-style macro over a UART/VGA sink rather than a logging
//! framework — this crate has exactly one real output channel, so a `log`-
//! or `tracing`-style dispatcher would be machinery with nothing to
//! dispatch to.
//!
//! Every call site names a `[TAG]` (`SCHED` for dispatcher lifecycle,
//! `TEST` for test-only chatter, `PANIC` for the panic hook) and is compiled
//! out entirely in release builds, so production dispatch loops never pay
//! for formatting a line nobody will read.

/// Writes `[TAG] message` to the installed platform's console sink.
/// A no-op (and the arguments are never formatted) outside debug builds.
macro_rules! scheduler_log {
    ($tag:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        if cfg!(debug_assertions) {
            $crate::platform::platform().print(&format!(concat!("[", $tag, "] ", $fmt) $(, $arg)*));
        }
    };
}

pub(crate) use scheduler_log;
