//! # CPU State
//!
//! [`PlatformState`] is the complete register state of one traced thread. It
//! is made of three parts, each filled independently from whichever kernel
//! snapshots the debugger managed to read:
//!
//! - [`RegisterFile`]: GPRs, segments, flags, IP, debug registers, FS/GS base
//! - [`FpuState`]: x87 data registers, control words, MMX aliases
//! - [`VectorState`]: XMM/YMM/ZMM lanes and MXCSR
//!
//! ## Example
//!
//! ```rust
//! use cpustate_core::raw::UserRegsX86_64;
//! use cpustate_core::state::PlatformState;
//! use cpustate_core::types::X86_64;
//!
//! let raw = UserRegsX86_64 {
//!     rip: 0x40_1000,
//!     rsp: 0x7fff_0000,
//!     ..Default::default()
//! };
//!
//! let mut state = PlatformState::<X86_64>::new();
//! state.fill_from(&raw);
//!
//! assert_eq!(state.instruction_pointer(), 0x40_1000);
//! assert_eq!(state.value("esp").and_then(|r| r.as_u64()), Some(0x7fff_0000));
//! // Nothing has loaded the x87 state yet
//! assert!(state.value("fcw").is_none());
//! ```

pub mod avx;
pub mod flags;
pub mod x86;
pub mod x87;

pub use avx::VectorState;
pub use flags::{flags_to_string, EFlags};
pub use x86::{Gpr, RegisterFile, SegmentRegister};
pub use x87::{FpuState, FpuTag};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::raw::RawSnapshot;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use crate::types::NativeArch;
use crate::types::{Arch, Register, Value128, Value256, Value512, Value80};

/// Register state of one thread on architecture `A`
///
/// `Clone` is a deep copy; the state owns no external resources.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlatformState<A: Arch>
{
    x86: RegisterFile<A>,
    x87: FpuState<A>,
    avx: VectorState<A>,
}

/// State of the architecture this crate was built for
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub type NativeState = PlatformState<NativeArch>;

impl<A: Arch> PlatformState<A>
{
    /// Create a state with every category unfilled.
    #[must_use]
    pub const fn new() -> Self
    {
        Self {
            x86: RegisterFile::new(),
            x87: FpuState::new(),
            avx: VectorState::new(),
        }
    }

    /// Reset all three parts.
    pub fn clear(&mut self)
    {
        self.x86.clear();
        self.x87.clear();
        self.avx.clear();
    }

    #[must_use]
    pub const fn x86(&self) -> &RegisterFile<A>
    {
        &self.x86
    }

    pub fn x86_mut(&mut self) -> &mut RegisterFile<A>
    {
        &mut self.x86
    }

    #[must_use]
    pub const fn x87(&self) -> &FpuState<A>
    {
        &self.x87
    }

    pub fn x87_mut(&mut self) -> &mut FpuState<A>
    {
        &mut self.x87
    }

    #[must_use]
    pub const fn avx(&self) -> &VectorState<A>
    {
        &self.avx
    }

    pub fn avx_mut(&mut self) -> &mut VectorState<A>
    {
        &mut self.avx
    }

    /// Load a kernel snapshot.
    ///
    /// Only the categories `raw` represents are touched; anything loaded
    /// earlier from other snapshots is kept.
    pub fn fill_from<S: RawSnapshot<A>>(&mut self, raw: &S)
    {
        raw.fill_state(self);
    }

    /// Project the state into a kernel snapshot, ready for `PTRACE_SETREGS`
    /// and friends.
    pub fn fill_struct<S: RawSnapshot<A>>(&self, raw: &mut S)
    {
        raw.fill_raw(self);
    }

    /// Load a `NT_PRSTATUS` regset buffer through the architecture's
    /// `user_regs_struct` layout.
    ///
    /// ## Errors
    ///
    /// `StateError::TruncatedSnapshot` if the buffer is shorter than the
    /// layout. The state is left untouched in that case.
    pub fn fill_from_regs_bytes(&mut self, buf: &[u8]) -> StateResult<()>
    {
        let raw = A::GeneralRegs::from_bytes(buf)?;
        self.fill_from(&raw);
        Ok(())
    }

    /// Write the general registers back into a `NT_PRSTATUS` regset buffer.
    ///
    /// Bytes past the layout, and fields the model does not track, keep
    /// their contents.
    ///
    /// ## Errors
    ///
    /// `StateError::TruncatedSnapshot` if the buffer is shorter than the
    /// layout. The buffer is left untouched in that case.
    pub fn fill_regs_bytes(&self, buf: &mut [u8]) -> StateResult<()>
    {
        let mut raw = A::GeneralRegs::from_bytes(buf)?;
        self.fill_struct(&mut raw);
        let bytes = raw.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Look up any register by name (case-insensitive).
    ///
    /// Returns `None` if the name is unknown on this architecture or the
    /// category that owns it has not been filled.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Register>
    {
        let id = A::resolve(name)?;
        self.x86
            .read(id)
            .or_else(|| self.x87.read(id))
            .or_else(|| self.avx.read(id))
    }

    /// Write a scalar register by name.
    ///
    /// Unknown names and registers wider than 64 bits are ignored; the
    /// return value says whether anything was written.
    pub fn set_register(&mut self, name: &str, value: u64) -> bool
    {
        self.try_set_register(name, value).is_ok()
    }

    /// Write a scalar register by name, reporting why nothing was written.
    ///
    /// ## Errors
    ///
    /// - `StateError::UnknownRegister` if the name does not exist on `A`
    /// - `StateError::NotScalar` for `stN`, `xmmN`, `ymmN` and `zmmN`
    pub fn try_set_register(&mut self, name: &str, value: u64) -> StateResult<()>
    {
        let id = A::resolve(name).ok_or_else(|| StateError::UnknownRegister(name.to_string()))?;
        if self.x86.write(id, value) || self.x87.write(id, value) || self.avx.write(id, value) {
            Ok(())
        } else {
            debug!(name, "refused scalar write to wide register");
            Err(StateError::NotScalar(name.to_string()))
        }
    }

    /// GPR `n` as a named register.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= A::GPR_COUNT`.
    #[must_use]
    pub fn gp_register(&self, n: usize) -> Register
    {
        self.x86.gp_register(n)
    }

    #[must_use]
    pub const fn flags(&self) -> u64
    {
        self.x86.flags()
    }

    pub fn set_flags(&mut self, value: u64)
    {
        self.x86.set_flags(value);
    }

    /// Flags rendered by [`flags_to_string`].
    #[must_use]
    pub fn flags_string(&self) -> String
    {
        self.x86.flags_string()
    }

    #[must_use]
    pub const fn instruction_pointer(&self) -> u64
    {
        self.x86.instruction_pointer()
    }

    pub fn set_instruction_pointer(&mut self, value: u64)
    {
        self.x86.set_instruction_pointer(value);
    }

    #[must_use]
    pub const fn frame_pointer(&self) -> u64
    {
        self.x86.frame_pointer()
    }

    #[must_use]
    pub const fn stack_pointer(&self) -> u64
    {
        self.x86.stack_pointer()
    }

    /// Move the stack pointer by `delta` bytes, wrapping at the word width.
    pub fn adjust_stack(&mut self, delta: i64)
    {
        self.x86.adjust_stack(delta);
    }

    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    #[must_use]
    pub fn debug_register(&self, n: usize) -> u64
    {
        self.x86.debug_register(n)
    }

    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    pub fn set_debug_register(&mut self, n: usize, value: u64)
    {
        self.x86.set_debug_register(n, value);
    }

    /// Physical index of `ST(0)`.
    #[must_use]
    pub const fn fpu_stack_pointer(&self) -> usize
    {
        self.x87.stack_pointer()
    }

    /// Logical register `ST(n)`.
    #[must_use]
    pub fn fpu_register(&self, n: usize) -> Value80
    {
        self.x87.st(n)
    }

    /// Set logical register `ST(n)`.
    pub fn set_fpu_register(&mut self, n: usize, value: Value80)
    {
        self.x87.set_st(n, value);
    }

    /// Tag of logical register `ST(n)`.
    #[must_use]
    pub fn fpu_register_tag(&self, n: usize) -> FpuTag
    {
        self.x87.tag(self.x87.st_index_to_r_index(n))
    }

    /// Whether logical register `ST(n)` is tagged empty.
    #[must_use]
    pub fn fpu_register_is_empty(&self, n: usize) -> bool
    {
        self.fpu_register_tag(n) == FpuTag::Empty
    }

    /// Tag of logical register `ST(n)` as text (`"Valid"`, `"Empty"`, ...).
    #[must_use]
    pub fn fpu_register_tag_string(&self, n: usize) -> &'static str
    {
        self.fpu_register_tag(n).as_str()
    }

    #[must_use]
    pub const fn fpu_control_word(&self) -> u16
    {
        self.x87.control_word
    }

    #[must_use]
    pub const fn fpu_status_word(&self) -> u16
    {
        self.x87.status_word
    }

    #[must_use]
    pub const fn fpu_tag_word(&self) -> u16
    {
        self.x87.tag_word
    }

    /// `MMn`, the low 64 bits of physical register `Rn`.
    #[must_use]
    pub fn mmx_register(&self, n: usize) -> u64
    {
        self.x87.mmx(n)
    }

    #[must_use]
    pub fn xmm_register(&self, n: usize) -> Value128
    {
        self.avx.xmm(n)
    }

    #[must_use]
    pub fn ymm_register(&self, n: usize) -> Value256
    {
        self.avx.ymm(n)
    }

    #[must_use]
    pub fn zmm_register(&self, n: usize) -> Value512
    {
        self.avx.zmm(n)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::{X86, X86_64};

    #[test]
    fn test_value_prefers_owner_by_category()
    {
        let mut state = PlatformState::<X86_64>::new();
        state.x86_mut().filled = true;
        state.x87_mut().filled = true;
        state.x87_mut().control_word = 0x37f;

        assert_eq!(state.value("RIP").map(|r| r.name()), Some("rip"));
        assert_eq!(state.value("fcw").and_then(|r| r.as_u64()), Some(0x37f));
        assert!(state.value("xmm0").is_none());
        assert!(state.value("bogus").is_none());
    }

    #[test]
    fn test_try_set_register_errors()
    {
        let mut state = PlatformState::<X86>::new();
        assert_eq!(
            state.try_set_register("rax", 1),
            Err(StateError::UnknownRegister("rax".to_string()))
        );
        assert_eq!(
            state.try_set_register("xmm0", 1),
            Err(StateError::NotScalar("xmm0".to_string()))
        );
        assert_eq!(state.try_set_register("mxcsr", 0x1f80), Ok(()));
        assert_eq!(state.avx().mxcsr, 0x1f80);
    }

    #[test]
    fn test_set_register_unknown_is_noop()
    {
        let mut state = PlatformState::<X86_64>::new();
        let before = state.clone();
        assert!(!state.set_register("nope", 5));
        assert_eq!(state, before);
    }

    #[test]
    fn test_clear_resets_everything()
    {
        let mut state = PlatformState::<X86_64>::new();
        state.set_register("rax", 1);
        state.set_register("fcw", 2);
        state.x86_mut().filled = true;
        state.avx_mut().xmm_filled = true;
        state.clear();
        assert_eq!(state, PlatformState::new());
    }
}
