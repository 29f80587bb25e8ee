//! Common module for library exports

pub use crate::error::{StateError, StateResult};
pub use crate::raw::xstate::XFeatures;
pub use crate::raw::{RawSnapshot, UserFpRegsX86, UserFpRegsX86_64, UserFpxRegsX86, UserRegsX86, UserRegsX86_64};
pub use crate::state::{
    flags_to_string, EFlags, FpuState, FpuTag, Gpr, PlatformState, RegisterFile, SegmentRegister, VectorState,
};
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use crate::state::NativeState;
pub use crate::types::{Arch, Register, RegisterKind, RegisterValue, Value128, Value256, Value512, Value80, X86, X86_64};
