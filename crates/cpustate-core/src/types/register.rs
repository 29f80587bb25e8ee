//! Register identifiers and the values returned by name lookups.

use std::fmt;

use super::{Value128, Value256, Value512, Value80};
use crate::state::x86::SegmentRegister;

/// Which bits of a general-purpose register a name refers to
///
/// x86 lets the same physical register be addressed at several widths:
///
/// - `Full`: `rax` on x86-64, `eax` on x86
/// - `Low32`: `eax`, `r8d` (x86-64 only; writes zero-extend)
/// - `Low16`: `ax`, `r8w`
/// - `Low8`: `al`, `spl`, `r8b`
/// - `High8`: `ah`, `ch`, `dh`, `bh` (bits 8..16 of the first four registers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GprSlice
{
    /// The whole machine word
    Full,
    /// Bits 0..32
    Low32,
    /// Bits 0..16
    Low16,
    /// Bits 0..8
    Low8,
    /// Bits 8..16
    High8,
}

impl GprSlice
{
    /// Width of the slice in bits; `word_bits` is used for `Full`.
    #[must_use]
    pub const fn bits(self, word_bits: u32) -> u32
    {
        match self {
            GprSlice::Full => word_bits,
            GprSlice::Low32 => 32,
            GprSlice::Low16 => 16,
            GprSlice::Low8 | GprSlice::High8 => 8,
        }
    }
}

/// Identifier for a register reachable through the name API
///
/// Every canonical register name resolves to exactly one `RegisterId` via
/// [`Arch::resolve`](crate::types::Arch::resolve). Indices are already
/// validated against the architecture when they come out of a lookup.
///
/// ## Example
///
/// ```rust
/// use cpustate_core::types::{Arch, GprSlice, RegisterId, X86_64};
///
/// assert_eq!(X86_64::resolve("EAX"), Some(RegisterId::Gpr(0, GprSlice::Low32)));
/// assert_eq!(X86_64::resolve("bogus"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterId
{
    /// General-purpose register `index` viewed through `slice`
    Gpr(usize, GprSlice),
    /// Segment selector register
    Segment(SegmentRegister),
    /// EFLAGS / RFLAGS
    Flags,
    /// EIP / RIP
    InstructionPointer,
    /// The syscall number saved by the kernel on syscall entry
    OrigAx,
    /// FS segment base (`fs_base`)
    FsBase,
    /// GS segment base (`gs_base`)
    GsBase,
    /// Debug register DR0-DR7
    Debug(usize),
    /// x87 data register addressed by logical stack index `ST(n)`
    St(usize),
    /// MMX register `MMn`, the low 64 bits of physical x87 register `Rn`
    Mmx(usize),
    /// x87 control word
    FpuControl,
    /// x87 status word
    FpuStatus,
    /// x87 tag word (full 2-bit-per-register form)
    FpuTag,
    /// Opcode of the last non-control x87 instruction
    FpuOpcode,
    /// Offset of the last x87 instruction
    FpuInstructionOffset,
    /// Offset of the last x87 memory operand
    FpuDataOffset,
    /// Code selector of the last x87 instruction
    FpuInstructionSelector,
    /// Data selector of the last x87 memory operand
    FpuDataSelector,
    /// 128-bit view of vector lane `n`
    Xmm(usize),
    /// 256-bit view of vector lane `n`
    Ymm(usize),
    /// Full 512-bit vector lane `n`
    Zmm(usize),
    /// SSE control/status register
    Mxcsr,
}

/// What kind of register a [`Register`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind
{
    /// General-purpose register or one of its aliases
    GeneralPurpose,
    /// Segment selector
    Segment,
    /// Flags register
    Flags,
    /// Instruction pointer
    InstructionPointer,
    /// FS/GS base address
    SegmentBase,
    /// Debug register
    Debug,
    /// x87 data, control, status or pointer register
    Fpu,
    /// MMX register
    Mmx,
    /// XMM/YMM/ZMM register
    Simd,
    /// MXCSR
    SimdControl,
}

/// A register value of any supported width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterValue
{
    /// 8-bit value
    U8(u8),
    /// 16-bit value
    U16(u16),
    /// 32-bit value
    U32(u32),
    /// 64-bit value
    U64(u64),
    /// 80-bit x87 value
    F80(Value80),
    /// 128-bit vector value
    V128(Value128),
    /// 256-bit vector value
    V256(Value256),
    /// 512-bit vector value
    V512(Value512),
}

impl RegisterValue
{
    /// Wrap the low `bits` bits of `value` in the matching scalar variant.
    ///
    /// `bits` must be 8, 16, 32 or 64.
    #[must_use]
    pub(crate) fn scalar(value: u64, bits: u32) -> Self
    {
        match bits {
            8 => RegisterValue::U8(value as u8),
            16 => RegisterValue::U16(value as u16),
            32 => RegisterValue::U32(value as u32),
            _ => RegisterValue::U64(value),
        }
    }

    /// Width of the value in bits
    #[must_use]
    pub const fn bit_width(&self) -> u32
    {
        match self {
            RegisterValue::U8(_) => 8,
            RegisterValue::U16(_) => 16,
            RegisterValue::U32(_) => 32,
            RegisterValue::U64(_) => 64,
            RegisterValue::F80(_) => 80,
            RegisterValue::V128(_) => 128,
            RegisterValue::V256(_) => 256,
            RegisterValue::V512(_) => 512,
        }
    }

    /// The value zero-extended to 64 bits, or `None` for wide values.
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64>
    {
        match *self {
            RegisterValue::U8(v) => Some(v as u64),
            RegisterValue::U16(v) => Some(v as u64),
            RegisterValue::U32(v) => Some(v as u64),
            RegisterValue::U64(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for RegisterValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            RegisterValue::U8(v) => write!(f, "{v:02x}"),
            RegisterValue::U16(v) => write!(f, "{v:04x}"),
            RegisterValue::U32(v) => write!(f, "{v:08x}"),
            RegisterValue::U64(v) => write!(f, "{v:016x}"),
            RegisterValue::F80(v) => write!(f, "{v}"),
            RegisterValue::V128(v) => write!(f, "{v}"),
            RegisterValue::V256(v) => write!(f, "{v}"),
            RegisterValue::V512(v) => write!(f, "{v}"),
        }
    }
}

/// A named register value, as returned by `value()` and `gp_register()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register
{
    name: &'static str,
    value: RegisterValue,
    kind: RegisterKind,
}

impl Register
{
    /// Create a register description.
    #[must_use]
    pub const fn new(name: &'static str, value: RegisterValue, kind: RegisterKind) -> Self
    {
        Self { name, value, kind }
    }

    /// Canonical (lower case) register name
    #[must_use]
    pub const fn name(&self) -> &'static str
    {
        self.name
    }

    /// The register's value
    #[must_use]
    pub const fn value(&self) -> RegisterValue
    {
        self.value
    }

    /// What kind of register this is
    #[must_use]
    pub const fn kind(&self) -> RegisterKind
    {
        self.kind
    }

    /// Width of the value in bits
    #[must_use]
    pub const fn bit_width(&self) -> u32
    {
        self.value.bit_width()
    }

    /// The value zero-extended to 64 bits, or `None` for wide registers.
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64>
    {
        self.value.as_u64()
    }
}

impl fmt::Display for Register
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} = {}", self.name, self.value)
    }
}
