//! # Error Types
//!
//! Error handling for the register model.
//!
//! Most of this crate cannot fail: unknown register names come back as `None`,
//! partially captured state is tracked with "filled" flags, and out-of-range
//! indices are contract violations that panic. The errors below cover the
//! remaining cases where a caller hands us data we cannot use.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

/// Main error type for register state operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError
{
    /// A byte buffer was shorter than the raw layout it should contain
    ///
    /// This happens when a regset read returns fewer bytes than the layout
    /// requires, e.g. a kernel that does not support a given register set or
    /// an XSAVE area missing its header.
    #[error("Truncated {layout} snapshot: expected at least {expected} bytes, got {actual}")]
    TruncatedSnapshot
    {
        /// Name of the raw layout being decoded
        layout: &'static str,
        /// Minimum number of bytes the layout needs
        expected: usize,
        /// Number of bytes actually supplied
        actual: usize,
    },

    /// No register with the given name exists on this architecture
    #[error("Unknown register: {0}")]
    UnknownRegister(String),

    /// The register exists but cannot be written from a machine word
    ///
    /// x87 data registers and vector registers are wider than 64 bits; use
    /// the dedicated setters (`set_st`, `set_xmm`, ...) for those.
    #[error("Register {0} is wider than a machine word and cannot be set from a scalar")]
    NotScalar(String),
}

/// Convenience type alias for `Result<T, StateError>`
///
/// ```rust
/// use cpustate_core::error::StateResult;
/// fn foo() -> StateResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type StateResult<T> = std::result::Result<T, StateError>;
