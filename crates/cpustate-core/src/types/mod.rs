//! # Types
//!
//! Architecture descriptions and the value types every part of the register
//! model shares.
//!
//! These types let the rest of the crate talk about "a 64-bit word", "an
//! 80-bit x87 value" or "the register called `eax`" without repeating the
//! per-architecture details.

pub mod arch;
pub mod register;
pub mod value;

// Re-export all public types
pub use arch::{
    dbg_index_valid, fpu_index_valid, mmx_index_valid, Arch, X86, X86_64, DBG_REG_COUNT, FPU_REG_COUNT,
    GPR_HIGH_ADDRESSABLE_COUNT, MAX_GPR_COUNT, MAX_ZMM_REG_COUNT, MMX_REG_COUNT, SEG_REG_COUNT,
};
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use arch::NativeArch;
pub(crate) use arch::{dbg_name, mm_name, st_name, xmm_name, ymm_name, zmm_name};
pub use register::{GprSlice, Register, RegisterId, RegisterKind, RegisterValue};
pub use value::{RegisterBytes, Value128, Value256, Value512, Value80};
