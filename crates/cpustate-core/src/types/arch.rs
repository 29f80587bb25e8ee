//! # Architecture Selection
//!
//! The register model is generic over the word width of the traced process.
//! Both shapes share all code; what differs (register counts, names, the raw
//! kernel layouts) hangs off the [`Arch`] trait as associated constants and
//! types.
//!
//! - [`X86`]: 32-bit i386, 8 GPRs, 8 vector lanes
//! - [`X86_64`]: 64-bit x86-64, 16 GPRs, 16 XMM/YMM and 32 ZMM lanes
//!
//! The architecture of a build is fixed, so this is a type parameter rather
//! than a runtime choice. [`NativeArch`] names the one matching the target.
//!
//! ## References
//!
//! - [Intel SDM Vol. 1, ch. 3 "Basic Execution Environment"](https://www.intel.com/content/www/us/en/developer/articles/technical/intel-sdm.html)

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use once_cell::sync::Lazy;

use super::register::{GprSlice, RegisterId};
use crate::raw::x86::{UserFpxRegsX86, UserRegsX86};
use crate::raw::x86_64::{UserFpRegsX86_64, UserRegsX86_64};
use crate::raw::RawSnapshot;
use crate::state::x86::SegmentRegister;

/// Number of debug registers (DR0-DR7)
pub const DBG_REG_COUNT: usize = 8;
/// Number of segment registers
pub const SEG_REG_COUNT: usize = 6;
/// Number of x87 data registers
pub const FPU_REG_COUNT: usize = 8;
/// Number of MMX registers (aliases of the x87 data registers)
pub const MMX_REG_COUNT: usize = FPU_REG_COUNT;
/// Registers with an addressable high byte (AH, CH, DH, BH)
pub const GPR_HIGH_ADDRESSABLE_COUNT: usize = 4;
/// Largest GPR count of any supported architecture
pub const MAX_GPR_COUNT: usize = 16;
/// Largest vector lane count of any supported architecture
pub const MAX_ZMM_REG_COUNT: usize = 32;

/// Returns `true` if `n` names a debug register.
#[must_use]
pub const fn dbg_index_valid(n: usize) -> bool
{
    n < DBG_REG_COUNT
}

/// Returns `true` if `n` names an x87 data register.
#[must_use]
pub const fn fpu_index_valid(n: usize) -> bool
{
    n < FPU_REG_COUNT
}

/// Returns `true` if `n` names an MMX register.
#[must_use]
pub const fn mmx_index_valid(n: usize) -> bool
{
    n < MMX_REG_COUNT
}

mod sealed
{
    pub trait Sealed {}
    impl Sealed for super::X86 {}
    impl Sealed for super::X86_64 {}
}

/// A word width the register model can represent
///
/// Implemented by [`X86`] and [`X86_64`] only.
pub trait Arch: sealed::Sealed + Copy + fmt::Debug + Default + PartialEq + Eq + Hash + Send + Sync + 'static
{
    /// Human readable architecture name
    const NAME: &'static str;
    /// Machine word width in bits
    const WORD_BITS: u32;
    /// Mask selecting the bits of a machine word
    const WORD_MASK: u64;
    /// Number of general-purpose registers
    const GPR_COUNT: usize;
    /// Number of GPRs whose low byte is addressable
    const GPR_LOW_ADDRESSABLE_COUNT: usize;
    /// Number of XMM registers
    const XMM_REG_COUNT: usize = Self::GPR_COUNT;
    /// Number of YMM registers
    const YMM_REG_COUNT: usize = Self::GPR_COUNT;
    /// Number of ZMM registers
    const ZMM_REG_COUNT: usize;

    /// Full-width GPR names, in hardware encoding order
    const GPR_NAMES: &'static [&'static str];
    /// 32-bit GPR names (same as `GPR_NAMES` on x86)
    const GPR32_NAMES: &'static [&'static str];
    /// 16-bit GPR names
    const GPR16_NAMES: &'static [&'static str];
    /// Low-byte GPR names
    const GPR8L_NAMES: &'static [&'static str];
    /// Instruction pointer name
    const IP_NAME: &'static str;
    /// Flags register name
    const FLAGS_NAME: &'static str;
    /// Name of the saved syscall number
    const ORIG_AX_NAME: &'static str;

    /// Kernel layout of the general-purpose register set (`user_regs_struct`)
    type GeneralRegs: RawSnapshot<Self>;
    /// Kernel layout of the FXSAVE-format floating-point set
    type ExtendedFpRegs: RawSnapshot<Self>;

    /// Name table for this architecture, built on first use.
    #[doc(hidden)]
    fn name_table() -> &'static HashMap<&'static str, RegisterId>;

    /// Resolve a register name (case-insensitive).
    #[must_use]
    fn resolve(name: &str) -> Option<RegisterId>
    {
        let table = Self::name_table();
        table.get(name).or_else(|| table.get(name.to_ascii_lowercase().as_str())).copied()
    }

    /// Returns `true` if `n` names a general-purpose register.
    #[must_use]
    fn gpr_index_valid(n: usize) -> bool
    {
        n < Self::GPR_COUNT
    }

    /// Returns `true` if `n` names an XMM register.
    #[must_use]
    fn xmm_index_valid(n: usize) -> bool
    {
        n < Self::XMM_REG_COUNT
    }

    /// Returns `true` if `n` names a YMM register.
    #[must_use]
    fn ymm_index_valid(n: usize) -> bool
    {
        n < Self::YMM_REG_COUNT
    }

    /// Returns `true` if `n` names a ZMM register.
    #[must_use]
    fn zmm_index_valid(n: usize) -> bool
    {
        n < Self::ZMM_REG_COUNT
    }
}

/// 32-bit x86 (i386)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct X86;

/// 64-bit x86-64 (AMD64)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct X86_64;

/// The architecture this crate was compiled for
#[cfg(target_arch = "x86")]
pub type NativeArch = X86;

/// The architecture this crate was compiled for
#[cfg(target_arch = "x86_64")]
pub type NativeArch = X86_64;

const HIGH8_NAMES: [&str; GPR_HIGH_ADDRESSABLE_COUNT] = ["ah", "ch", "dh", "bh"];
const DBG_NAMES: [&str; DBG_REG_COUNT] = ["dr0", "dr1", "dr2", "dr3", "dr4", "dr5", "dr6", "dr7"];
const ST_NAMES: [&str; FPU_REG_COUNT] = ["st0", "st1", "st2", "st3", "st4", "st5", "st6", "st7"];
const MM_NAMES: [&str; MMX_REG_COUNT] = ["mm0", "mm1", "mm2", "mm3", "mm4", "mm5", "mm6", "mm7"];

const XMM_NAMES: [&str; MAX_ZMM_REG_COUNT] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10", "xmm11", "xmm12", "xmm13",
    "xmm14", "xmm15", "xmm16", "xmm17", "xmm18", "xmm19", "xmm20", "xmm21", "xmm22", "xmm23", "xmm24", "xmm25", "xmm26",
    "xmm27", "xmm28", "xmm29", "xmm30", "xmm31",
];
const YMM_NAMES: [&str; MAX_ZMM_REG_COUNT] = [
    "ymm0", "ymm1", "ymm2", "ymm3", "ymm4", "ymm5", "ymm6", "ymm7", "ymm8", "ymm9", "ymm10", "ymm11", "ymm12", "ymm13",
    "ymm14", "ymm15", "ymm16", "ymm17", "ymm18", "ymm19", "ymm20", "ymm21", "ymm22", "ymm23", "ymm24", "ymm25", "ymm26",
    "ymm27", "ymm28", "ymm29", "ymm30", "ymm31",
];
const ZMM_NAMES: [&str; MAX_ZMM_REG_COUNT] = [
    "zmm0", "zmm1", "zmm2", "zmm3", "zmm4", "zmm5", "zmm6", "zmm7", "zmm8", "zmm9", "zmm10", "zmm11", "zmm12", "zmm13",
    "zmm14", "zmm15", "zmm16", "zmm17", "zmm18", "zmm19", "zmm20", "zmm21", "zmm22", "zmm23", "zmm24", "zmm25", "zmm26",
    "zmm27", "zmm28", "zmm29", "zmm30", "zmm31",
];

/// Canonical name of XMM register `n`.
pub(crate) const fn xmm_name(n: usize) -> &'static str
{
    XMM_NAMES[n]
}

/// Canonical name of YMM register `n`.
pub(crate) const fn ymm_name(n: usize) -> &'static str
{
    YMM_NAMES[n]
}

/// Canonical name of ZMM register `n`.
pub(crate) const fn zmm_name(n: usize) -> &'static str
{
    ZMM_NAMES[n]
}

/// Canonical name of `ST(n)`.
pub(crate) const fn st_name(n: usize) -> &'static str
{
    ST_NAMES[n]
}

/// Canonical name of `MMn`.
pub(crate) const fn mm_name(n: usize) -> &'static str
{
    MM_NAMES[n]
}

/// Canonical name of debug register `n`.
pub(crate) const fn dbg_name(n: usize) -> &'static str
{
    DBG_NAMES[n]
}

/// Every (name, id) pair valid on `A`.
///
/// Earlier entries win, so on x86 `eax` resolves to the full register rather
/// than to a 32-bit slice of it.
fn build_name_table<A: Arch>() -> HashMap<&'static str, RegisterId>
{
    let mut table = HashMap::new();
    let mut add = |name: &'static str, id: RegisterId| {
        table.entry(name).or_insert(id);
    };

    for (i, name) in A::GPR_NAMES.iter().copied().enumerate() {
        add(name, RegisterId::Gpr(i, GprSlice::Full));
    }
    for (i, name) in A::GPR32_NAMES.iter().copied().enumerate() {
        add(name, RegisterId::Gpr(i, GprSlice::Low32));
    }
    for (i, name) in A::GPR16_NAMES.iter().copied().enumerate() {
        add(name, RegisterId::Gpr(i, GprSlice::Low16));
    }
    for (i, name) in A::GPR8L_NAMES.iter().copied().enumerate() {
        add(name, RegisterId::Gpr(i, GprSlice::Low8));
    }
    for (i, name) in HIGH8_NAMES.iter().copied().enumerate() {
        add(name, RegisterId::Gpr(i, GprSlice::High8));
    }
    for seg in SegmentRegister::ALL {
        add(seg.name(), RegisterId::Segment(seg));
    }
    add(A::FLAGS_NAME, RegisterId::Flags);
    add(A::IP_NAME, RegisterId::InstructionPointer);
    add(A::ORIG_AX_NAME, RegisterId::OrigAx);
    add("fs_base", RegisterId::FsBase);
    add("gs_base", RegisterId::GsBase);
    for (i, name) in DBG_NAMES.iter().copied().enumerate() {
        add(name, RegisterId::Debug(i));
    }

    for (i, name) in ST_NAMES.iter().copied().enumerate() {
        add(name, RegisterId::St(i));
    }
    for (i, name) in MM_NAMES.iter().copied().enumerate() {
        add(name, RegisterId::Mmx(i));
    }
    add("fcw", RegisterId::FpuControl);
    add("fsw", RegisterId::FpuStatus);
    add("ftw", RegisterId::FpuTag);
    add("fop", RegisterId::FpuOpcode);
    add("fip", RegisterId::FpuInstructionOffset);
    add("fdp", RegisterId::FpuDataOffset);
    add("fis", RegisterId::FpuInstructionSelector);
    add("fds", RegisterId::FpuDataSelector);

    for (i, name) in XMM_NAMES.iter().copied().take(A::XMM_REG_COUNT).enumerate() {
        add(name, RegisterId::Xmm(i));
    }
    for (i, name) in YMM_NAMES.iter().copied().take(A::YMM_REG_COUNT).enumerate() {
        add(name, RegisterId::Ymm(i));
    }
    for (i, name) in ZMM_NAMES.iter().copied().take(A::ZMM_REG_COUNT).enumerate() {
        add(name, RegisterId::Zmm(i));
    }
    add("mxcsr", RegisterId::Mxcsr);

    table
}

impl Arch for X86
{
    const NAME: &'static str = "x86";
    const WORD_BITS: u32 = 32;
    const WORD_MASK: u64 = 0xffff_ffff;
    const GPR_COUNT: usize = 8;
    const GPR_LOW_ADDRESSABLE_COUNT: usize = 4;
    const ZMM_REG_COUNT: usize = 8;

    const GPR_NAMES: &'static [&'static str] = &["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];
    const GPR32_NAMES: &'static [&'static str] = Self::GPR_NAMES;
    const GPR16_NAMES: &'static [&'static str] = &["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"];
    const GPR8L_NAMES: &'static [&'static str] = &["al", "cl", "dl", "bl"];
    const IP_NAME: &'static str = "eip";
    const FLAGS_NAME: &'static str = "eflags";
    const ORIG_AX_NAME: &'static str = "orig_eax";

    type GeneralRegs = UserRegsX86;
    type ExtendedFpRegs = UserFpxRegsX86;

    fn name_table() -> &'static HashMap<&'static str, RegisterId>
    {
        static TABLE: Lazy<HashMap<&'static str, RegisterId>> = Lazy::new(build_name_table::<X86>);
        &TABLE
    }
}

impl Arch for X86_64
{
    const NAME: &'static str = "x86-64";
    const WORD_BITS: u32 = 64;
    const WORD_MASK: u64 = u64::MAX;
    const GPR_COUNT: usize = 16;
    const GPR_LOW_ADDRESSABLE_COUNT: usize = 16;
    const ZMM_REG_COUNT: usize = 32;

    const GPR_NAMES: &'static [&'static str] = &[
        "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
    ];
    const GPR32_NAMES: &'static [&'static str] = &[
        "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d", "r13d", "r14d",
        "r15d",
    ];
    const GPR16_NAMES: &'static [&'static str] = &[
        "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w", "r14w", "r15w",
    ];
    const GPR8L_NAMES: &'static [&'static str] = &[
        "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b",
        "r15b",
    ];
    const IP_NAME: &'static str = "rip";
    const FLAGS_NAME: &'static str = "rflags";
    const ORIG_AX_NAME: &'static str = "orig_rax";

    type GeneralRegs = UserRegsX86_64;
    type ExtendedFpRegs = UserFpRegsX86_64;

    fn name_table() -> &'static HashMap<&'static str, RegisterId>
    {
        static TABLE: Lazy<HashMap<&'static str, RegisterId>> = Lazy::new(build_name_table::<X86_64>);
        &TABLE
    }
}
