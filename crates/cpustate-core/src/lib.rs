//! # cpustate-core
//!
//! Canonical x86 / x86-64 register model for debuggers.
//!
//! This crate provides the register half of a ptrace debugger:
//! - A complete, architecture-generic model of one thread's CPU state
//! - Byte-exact copies of the Linux `ptrace` register layouts
//! - Conversion in both directions, one snapshot at a time
//! - Register lookup and modification by name
//!
//! It makes no system calls. The caller reads the regsets with `ptrace` (or
//! from a core file), hands the bytes here, edits the state, and writes the
//! projected layouts back.
//!
//! ## Architectures
//!
//! Everything is generic over [`types::Arch`]: [`types::X86`] for 32-bit
//! tracees and [`types::X86_64`] for 64-bit ones. [`state::NativeState`] is
//! the state of the architecture the crate was built for.
//!
//! ## Partial State
//!
//! Each category of registers (general, x87, XMM, YMM, ZMM, segment bases,
//! x87 opcode, MXCSR mask) carries its own "filled" flag. Lookups of
//! registers in a category that was never loaded return `None` rather than
//! a stale zero.
//!
//! ## Example
//!
//! ```rust
//! use cpustate_core::prelude::*;
//!
//! let mut state = PlatformState::<X86_64>::new();
//! state.fill_from(&UserRegsX86_64 {
//!     rax: 0xffff_ffff_0000_0000,
//!     ..Default::default()
//! });
//!
//! state.set_register("eax", 0x1234);
//! assert_eq!(state.x86().gpr(Gpr::Ax.index()), 0x1234);
//! ```

pub mod error;
pub mod prelude;
pub mod raw;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use error::{StateError, StateResult};
pub use raw::RawSnapshot;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use state::NativeState;
pub use state::PlatformState;
