//! # Raw Register Snapshots
//!
//! Byte-exact copies of the structures Linux exchanges through `ptrace`
//! (`PTRACE_GETREGS`, `PTRACE_GETFPREGS`, `PTRACE_GETFPXREGS` and the matching
//! regsets), and the conversions between them and [`PlatformState`].
//!
//! | Layout | Kernel name | Architecture | Categories |
//! |--------|-------------|--------------|------------|
//! | [`UserRegsX86`] | `user_regs_struct` | x86 | GPRs, segments, flags, IP |
//! | [`UserFpRegsX86`] | `user_fpregs_struct` | x86 | x87 (FSAVE format) |
//! | [`UserFpxRegsX86`] | `user_fpxregs_struct` | x86 | x87, XMM, MXCSR (FXSAVE) |
//! | [`UserRegsX86_64`] | `user_regs_struct` | x86-64 | GPRs, segments, flags, IP, FS/GS base |
//! | [`UserFpRegsX86_64`] | `user_fpregs_struct` | x86-64 | x87, XMM, MXCSR (FXSAVE) |
//!
//! Each layout implements [`RawSnapshot`] only for its own architecture, so
//! loading a 32-bit snapshot into a 64-bit state does not type-check.
//!
//! The variable-size XSAVE area (`NT_X86_XSTATE`) is handled by
//! [`PlatformState::fill_from_xstate`] in [`xstate`].
//!
//! ## References
//!
//! - [arch/x86/include/asm/user_32.h](https://github.com/torvalds/linux/blob/master/arch/x86/include/asm/user_32.h)
//! - [arch/x86/include/asm/user_64.h](https://github.com/torvalds/linux/blob/master/arch/x86/include/asm/user_64.h)

pub mod x86;
pub mod x86_64;
pub mod xstate;

use bytemuck::Pod;

pub use x86::{UserFpRegsX86, UserFpxRegsX86, UserRegsX86};
pub use x86_64::{UserFpRegsX86_64, UserRegsX86_64};

use crate::error::{StateError, StateResult};
use crate::state::PlatformState;
use crate::types::{Arch, Value128, Value80, FPU_REG_COUNT};

/// A kernel register layout for architecture `A`
///
/// Implementors are plain `#[repr(C)]` structs with no padding, so they can be
/// viewed as bytes and copied to and from the buffers ptrace fills.
pub trait RawSnapshot<A: Arch>: Pod
{
    /// Layout name used in logs and errors
    const LAYOUT: &'static str;

    /// Load the categories this layout represents into `state`.
    ///
    /// Sets the filled flags of those categories and nothing else.
    fn fill_state(&self, state: &mut PlatformState<A>);

    /// Write `state` into the fields this layout represents.
    ///
    /// Fields the model does not track (reserved words, padding) keep their
    /// current contents, so start from the last snapshot read from the kernel.
    fn fill_raw(&mut self, state: &PlatformState<A>);

    /// Decode a layout from the start of a regset buffer.
    ///
    /// ## Errors
    ///
    /// `StateError::TruncatedSnapshot` if `bytes` is shorter than the layout.
    fn from_bytes(bytes: &[u8]) -> StateResult<Self>
    {
        let size = std::mem::size_of::<Self>();
        let bytes = bytes.get(..size).ok_or(StateError::TruncatedSnapshot {
            layout: Self::LAYOUT,
            expected: size,
            actual: bytes.len(),
        })?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// The layout as bytes, ready to hand back to the kernel.
    fn as_bytes(&self) -> &[u8]
    {
        bytemuck::bytes_of(self)
    }
}

/// FXSAVE stores `ST(i)` in slot `i`, 16 bytes apart; FSAVE packs them 10
/// bytes apart. `stride` selects which.
pub(crate) fn load_st_space<A: Arch>(state: &mut PlatformState<A>, st_space: &[u8], stride: usize)
{
    let x87 = state.x87_mut();
    for st in 0..FPU_REG_COUNT {
        let value = Value80::from_slice(&st_space[st * stride..]).unwrap_or_default();
        x87.set_st(st, value);
    }
}

/// Inverse of [`load_st_space`]; slot bytes past the 80-bit value are kept.
pub(crate) fn store_st_space<A: Arch>(state: &PlatformState<A>, st_space: &mut [u8], stride: usize)
{
    for st in 0..FPU_REG_COUNT {
        state.x87().st(st).write_to(&mut st_space[st * stride..]);
    }
}

/// Load the first `count` XMM registers from an FXSAVE `xmm_space`.
pub(crate) fn load_xmm_space<A: Arch>(state: &mut PlatformState<A>, xmm_space: &[u8], count: usize)
{
    let avx = state.avx_mut();
    for i in 0..count {
        let value = Value128::from_slice(&xmm_space[i * 16..]).unwrap_or_default();
        avx.set_xmm(i, value);
    }
}

/// Inverse of [`load_xmm_space`].
pub(crate) fn store_xmm_space<A: Arch>(state: &PlatformState<A>, xmm_space: &mut [u8], count: usize)
{
    for i in 0..count {
        state.avx().xmm(i).write_to(&mut xmm_space[i * 16..]);
    }
}
