//! # cpustate utilities
//!
//! Shared logging and configuration helpers for the cpustate workspace.
//!
//! The core crate only emits `tracing` events; this crate decides where they
//! go. Debuggers embedding the register model call [`init_logging`] once at
//! startup, test binaries call [`init_test_logging`].

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_with_level, init_test_logging, LogFormat, LogGuard, LogLevel, LoggingError,
};
pub use tracing::{debug, error, info, trace, warn};
