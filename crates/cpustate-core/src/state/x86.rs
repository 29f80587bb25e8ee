//! # General-Purpose Register File
//!
//! The i386-inherited part of the CPU state (expanded on x86-64): general
//! registers, segment selectors, flags, instruction pointer, debug registers
//! and the FS/GS segment bases.
//!
//! ## Register Aliasing
//!
//! Every GPR is reachable at several widths. Writes through a narrower name
//! follow the hardware rules:
//!
//! - 32-bit names on x86-64 (`eax`, `r8d`) zero-extend into the full register
//! - 16-bit and 8-bit names (`ax`, `al`, `ah`) leave the other bits alone
//!
//! ## Storage
//!
//! Registers are stored as `u64` regardless of architecture. On x86 every
//! write is masked to 32 bits, so the upper half is always zero.

use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use super::flags::flags_to_string;
use crate::types::{
    dbg_index_valid, dbg_name, Arch, GprSlice, Register, RegisterId, RegisterKind, RegisterValue, DBG_REG_COUNT,
    MAX_GPR_COUNT, SEG_REG_COUNT,
};

/// General-purpose register index, in hardware encoding order
///
/// The first eight exist on both architectures (`EAX`/`RAX` etc.);
/// `R8`-`R15` are x86-64 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gpr
{
    /// EAX / RAX
    Ax,
    /// ECX / RCX
    Cx,
    /// EDX / RDX
    Dx,
    /// EBX / RBX
    Bx,
    /// ESP / RSP
    Sp,
    /// EBP / RBP
    Bp,
    /// ESI / RSI
    Si,
    /// EDI / RDI
    Di,
    /// R8 (x86-64 only)
    R8,
    /// R9 (x86-64 only)
    R9,
    /// R10 (x86-64 only)
    R10,
    /// R11 (x86-64 only)
    R11,
    /// R12 (x86-64 only)
    R12,
    /// R13 (x86-64 only)
    R13,
    /// R14 (x86-64 only)
    R14,
    /// R15 (x86-64 only)
    R15,
}

impl Gpr
{
    /// Index into the register array
    #[must_use]
    pub const fn index(self) -> usize
    {
        self as usize
    }
}

/// Segment register, in hardware encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentRegister
{
    /// Extra segment
    Es,
    /// Code segment
    Cs,
    /// Stack segment
    Ss,
    /// Data segment
    Ds,
    /// FS (thread-local storage on Linux x86-64)
    Fs,
    /// GS (thread-local storage on Linux x86)
    Gs,
}

impl SegmentRegister
{
    /// All segment registers, in index order
    pub const ALL: [SegmentRegister; SEG_REG_COUNT] = [
        SegmentRegister::Es,
        SegmentRegister::Cs,
        SegmentRegister::Ss,
        SegmentRegister::Ds,
        SegmentRegister::Fs,
        SegmentRegister::Gs,
    ];

    /// Index into the segment register array
    #[must_use]
    pub const fn index(self) -> usize
    {
        self as usize
    }

    /// Canonical register name
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            SegmentRegister::Es => "es",
            SegmentRegister::Cs => "cs",
            SegmentRegister::Ss => "ss",
            SegmentRegister::Ds => "ds",
            SegmentRegister::Fs => "fs",
            SegmentRegister::Gs => "gs",
        }
    }
}

impl fmt::Display for SegmentRegister
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// General-purpose register state of one thread
///
/// ## Validity
///
/// - `filled`: set once a general-register snapshot has been loaded
/// - `bases_filled`: set once FS/GS bases are known; on x86-64 they arrive with
///   the general registers, on x86 the trace facility supplies them separately
///   through [`set_segment_bases`](Self::set_segment_bases)
///
/// Debug registers are written one by one by the trace facility and carry no
/// flag of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile<A: Arch>
{
    gp_regs: [u64; MAX_GPR_COUNT],
    dbg_regs: [u64; DBG_REG_COUNT],
    seg_regs: [u16; SEG_REG_COUNT],
    orig_ax: u64,
    flags: u64,
    ip: u64,
    fs_base: u64,
    gs_base: u64,
    /// FS/GS bases hold real data
    pub bases_filled: bool,
    /// General registers, segments, flags and IP hold real data
    pub filled: bool,
    _arch: PhantomData<A>,
}

impl<A: Arch> Default for RegisterFile<A>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<A: Arch> RegisterFile<A>
{
    /// Create an empty register file (all zero, nothing filled).
    #[must_use]
    pub const fn new() -> Self
    {
        Self {
            gp_regs: [0; MAX_GPR_COUNT],
            dbg_regs: [0; DBG_REG_COUNT],
            seg_regs: [0; SEG_REG_COUNT],
            orig_ax: 0,
            flags: 0,
            ip: 0,
            fs_base: 0,
            gs_base: 0,
            bases_filled: false,
            filled: false,
            _arch: PhantomData,
        }
    }

    /// Reset every register and validity flag.
    pub fn clear(&mut self)
    {
        *self = Self::new();
    }

    /// Full-width value of GPR `n`.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= A::GPR_COUNT`.
    #[must_use]
    pub fn gpr(&self, n: usize) -> u64
    {
        assert!(A::gpr_index_valid(n), "GPR index {n} out of range for {}", A::NAME);
        self.gp_regs[n]
    }

    /// Set the full-width value of GPR `n` (masked to the word size).
    ///
    /// ## Panics
    ///
    /// Panics if `n >= A::GPR_COUNT`.
    pub fn set_gpr(&mut self, n: usize, value: u64)
    {
        assert!(A::gpr_index_valid(n), "GPR index {n} out of range for {}", A::NAME);
        self.gp_regs[n] = value & A::WORD_MASK;
    }

    /// GPR `n` as a named, full-width [`Register`].
    ///
    /// ## Panics
    ///
    /// Panics if `n >= A::GPR_COUNT`.
    #[must_use]
    pub fn gp_register(&self, n: usize) -> Register
    {
        let value = self.gpr(n);
        Register::new(
            A::GPR_NAMES[n],
            RegisterValue::scalar(value, A::WORD_BITS),
            RegisterKind::GeneralPurpose,
        )
    }

    /// Segment selector value.
    #[must_use]
    pub const fn segment(&self, seg: SegmentRegister) -> u16
    {
        self.seg_regs[seg.index()]
    }

    /// Set a segment selector.
    pub fn set_segment(&mut self, seg: SegmentRegister, value: u16)
    {
        self.seg_regs[seg.index()] = value;
    }

    /// Syscall number saved on syscall entry (`orig_eax`/`orig_rax`).
    #[must_use]
    pub const fn orig_ax(&self) -> u64
    {
        self.orig_ax
    }

    /// Set the saved syscall number.
    pub fn set_orig_ax(&mut self, value: u64)
    {
        self.orig_ax = value & A::WORD_MASK;
    }

    /// The flags register.
    #[must_use]
    pub const fn flags(&self) -> u64
    {
        self.flags
    }

    /// Set the flags register.
    pub fn set_flags(&mut self, value: u64)
    {
        self.flags = value & A::WORD_MASK;
    }

    /// Render the stored flags; see [`flags_to_string`].
    #[must_use]
    pub fn flags_string(&self) -> String
    {
        flags_to_string(self.flags)
    }

    /// The instruction pointer.
    #[must_use]
    pub const fn instruction_pointer(&self) -> u64
    {
        self.ip
    }

    /// Set the instruction pointer.
    pub fn set_instruction_pointer(&mut self, value: u64)
    {
        self.ip = value & A::WORD_MASK;
    }

    /// EBP / RBP
    #[must_use]
    pub const fn frame_pointer(&self) -> u64
    {
        self.gp_regs[Gpr::Bp.index()]
    }

    /// ESP / RSP
    #[must_use]
    pub const fn stack_pointer(&self) -> u64
    {
        self.gp_regs[Gpr::Sp.index()]
    }

    /// Move the stack pointer by `delta` bytes, wrapping at the word size.
    pub fn adjust_stack(&mut self, delta: i64)
    {
        let sp = self.stack_pointer().wrapping_add_signed(delta);
        self.gp_regs[Gpr::Sp.index()] = sp & A::WORD_MASK;
    }

    /// Debug register DRn.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    #[must_use]
    pub fn debug_register(&self, n: usize) -> u64
    {
        assert!(dbg_index_valid(n), "debug register index {n} out of range");
        self.dbg_regs[n]
    }

    /// Set debug register DRn.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    pub fn set_debug_register(&mut self, n: usize, value: u64)
    {
        assert!(dbg_index_valid(n), "debug register index {n} out of range");
        self.dbg_regs[n] = value & A::WORD_MASK;
    }

    /// FS segment base
    #[must_use]
    pub const fn fs_base(&self) -> u64
    {
        self.fs_base
    }

    /// GS segment base
    #[must_use]
    pub const fn gs_base(&self) -> u64
    {
        self.gs_base
    }

    /// Record both segment bases and mark them filled.
    pub fn set_segment_bases(&mut self, fs_base: u64, gs_base: u64)
    {
        self.fs_base = fs_base & A::WORD_MASK;
        self.gs_base = gs_base & A::WORD_MASK;
        self.bases_filled = true;
    }

    /// Look up a register owned by the register file.
    ///
    /// Returns `None` if the name is unknown, belongs to another part of the
    /// CPU state, or names a category that has not been filled yet.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Register>
    {
        self.read(A::resolve(name)?)
    }

    pub(crate) fn read(&self, id: RegisterId) -> Option<Register>
    {
        let word = |v| RegisterValue::scalar(v, A::WORD_BITS);
        let reg = match id {
            RegisterId::Gpr(n, slice) if self.filled => {
                let full = self.gp_regs[n];
                let (name, value) = match slice {
                    GprSlice::Full => (A::GPR_NAMES[n], full),
                    GprSlice::Low32 => (A::GPR32_NAMES[n], full & 0xffff_ffff),
                    GprSlice::Low16 => (A::GPR16_NAMES[n], full & 0xffff),
                    GprSlice::Low8 => (A::GPR8L_NAMES[n], full & 0xff),
                    GprSlice::High8 => (["ah", "ch", "dh", "bh"][n], (full >> 8) & 0xff),
                };
                Register::new(
                    name,
                    RegisterValue::scalar(value, slice.bits(A::WORD_BITS)),
                    RegisterKind::GeneralPurpose,
                )
            }
            RegisterId::Segment(seg) if self.filled => {
                Register::new(seg.name(), RegisterValue::U16(self.segment(seg)), RegisterKind::Segment)
            }
            RegisterId::Flags if self.filled => Register::new(A::FLAGS_NAME, word(self.flags), RegisterKind::Flags),
            RegisterId::InstructionPointer if self.filled => {
                Register::new(A::IP_NAME, word(self.ip), RegisterKind::InstructionPointer)
            }
            RegisterId::OrigAx if self.filled => {
                Register::new(A::ORIG_AX_NAME, word(self.orig_ax), RegisterKind::GeneralPurpose)
            }
            RegisterId::FsBase if self.bases_filled => {
                Register::new("fs_base", word(self.fs_base), RegisterKind::SegmentBase)
            }
            RegisterId::GsBase if self.bases_filled => {
                Register::new("gs_base", word(self.gs_base), RegisterKind::SegmentBase)
            }
            RegisterId::Debug(n) => Register::new(dbg_name(n), word(self.dbg_regs[n]), RegisterKind::Debug),
            _ => return None,
        };
        Some(reg)
    }

    /// Write a register owned by the register file.
    ///
    /// Returns `false` (and changes nothing) if the name is unknown or belongs
    /// to another part of the CPU state.
    pub fn set_register(&mut self, name: &str, value: u64) -> bool
    {
        A::resolve(name).is_some_and(|id| self.write(id, value))
    }

    pub(crate) fn write(&mut self, id: RegisterId, value: u64) -> bool
    {
        match id {
            RegisterId::Gpr(n, slice) => {
                let old = self.gp_regs[n];
                let new = match slice {
                    GprSlice::Full => value,
                    GprSlice::Low32 => value & 0xffff_ffff,
                    GprSlice::Low16 => (old & !0xffff) | (value & 0xffff),
                    GprSlice::Low8 => (old & !0xff) | (value & 0xff),
                    GprSlice::High8 => (old & !0xff00) | ((value & 0xff) << 8),
                };
                self.gp_regs[n] = new & A::WORD_MASK;
            }
            RegisterId::Segment(seg) => self.set_segment(seg, value as u16),
            RegisterId::Flags => self.set_flags(value),
            RegisterId::InstructionPointer => self.set_instruction_pointer(value),
            RegisterId::OrigAx => self.set_orig_ax(value),
            RegisterId::FsBase => self.fs_base = value & A::WORD_MASK,
            RegisterId::GsBase => self.gs_base = value & A::WORD_MASK,
            RegisterId::Debug(n) => self.set_debug_register(n, value),
            _ => return false,
        }
        trace!(register = ?id, value, "register file write");
        true
    }
}
