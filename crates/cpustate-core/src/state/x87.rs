//! # x87 Floating-Point State
//!
//! Eight physical 80-bit registers `R0`-`R7` plus control, status and tag
//! words and the last instruction/operand pointers.
//!
//! ## Two Indexing Spaces
//!
//! Instructions address the registers as a stack: `ST(0)` is whichever
//! physical register the TOP field (bits 11..13 of the status word) points
//! at, and `ST(n)` is `R[(n + TOP) mod 8]`. The tag word and the MMX aliases
//! use physical indices. Methods here say which space they take.
//!
//! ## Abridged Tag Word
//!
//! FXSAVE (and therefore ptrace's FXSAVE-format regsets) stores only one bit
//! per register: empty or not. The full 2-bit tag is recreated from the
//! register contents following the Intel SDM table for FXSAVE:
//!
//! | exponent | integer bit | fraction | tag |
//! |----------|-------------|----------|-----|
//! | all ones | any         | any      | Special |
//! | 0        | 0           | 0        | Zero |
//! | 0        | any         | nonzero, or integer bit set | Special |
//! | other    | 0           | any      | Special (unnormal) |
//! | other    | 1           | any      | Valid |

use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use crate::types::{
    fpu_index_valid, mm_name, mmx_index_valid, st_name, Arch, Register, RegisterId, RegisterKind, RegisterValue,
    Value80, FPU_REG_COUNT,
};

/// Classification of one x87 data register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FpuTag
{
    /// Finite, normalised number
    Valid = 0,
    /// Positive or negative zero
    Zero = 1,
    /// NaN, infinity, denormal or unsupported encoding
    Special = 2,
    /// No value loaded
    Empty = 3,
}

impl FpuTag
{
    /// Decode a 2-bit tag field.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self
    {
        match bits & 0b11 {
            0 => FpuTag::Valid,
            1 => FpuTag::Zero,
            2 => FpuTag::Special,
            _ => FpuTag::Empty,
        }
    }

    /// Classify a non-empty register's contents.
    #[must_use]
    pub fn classify(value: &Value80) -> Self
    {
        const INTEGER_BIT: u64 = 1 << 63;

        let exponent = value.exponent();
        let significand = value.significand();
        if exponent == 0x7fff {
            FpuTag::Special
        } else if exponent == 0 {
            if significand == 0 {
                FpuTag::Zero
            } else {
                FpuTag::Special
            }
        } else if significand & INTEGER_BIT == 0 {
            FpuTag::Special
        } else {
            FpuTag::Valid
        }
    }

    /// Display name of the tag
    #[must_use]
    pub const fn as_str(self) -> &'static str
    {
        match self {
            FpuTag::Valid => "Valid",
            FpuTag::Zero => "Zero",
            FpuTag::Special => "Special",
            FpuTag::Empty => "Empty",
        }
    }
}

impl fmt::Display for FpuTag
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// x87 state of one thread
///
/// `filled` covers everything except the opcode, which some layouts (FSAVE)
/// do not carry; that one has `op_code_filled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpuState<A: Arch>
{
    r: [Value80; FPU_REG_COUNT],
    /// Offset of the last x87 instruction
    pub inst_ptr_offset: u64,
    /// Offset of the last x87 memory operand
    pub data_ptr_offset: u64,
    /// Code selector of the last x87 instruction
    pub inst_ptr_selector: u16,
    /// Data selector of the last x87 memory operand
    pub data_ptr_selector: u16,
    /// FCW
    pub control_word: u16,
    /// FSW
    pub status_word: u16,
    /// Full 16-bit tag word, two bits per physical register
    pub tag_word: u16,
    /// Last opcode (11 significant bits)
    pub op_code: u16,
    /// Data registers, control words and pointers hold real data
    pub filled: bool,
    /// `op_code` holds real data
    pub op_code_filled: bool,
    _arch: PhantomData<A>,
}

impl<A: Arch> Default for FpuState<A>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<A: Arch> FpuState<A>
{
    /// Create an empty x87 state.
    #[must_use]
    pub const fn new() -> Self
    {
        Self {
            r: [Value80::ZERO; FPU_REG_COUNT],
            inst_ptr_offset: 0,
            data_ptr_offset: 0,
            inst_ptr_selector: 0,
            data_ptr_selector: 0,
            control_word: 0,
            status_word: 0,
            tag_word: 0,
            op_code: 0,
            filled: false,
            op_code_filled: false,
            _arch: PhantomData,
        }
    }

    /// Reset every register and validity flag.
    pub fn clear(&mut self)
    {
        *self = Self::new();
    }

    /// The TOP field of the status word: physical index of `ST(0)`.
    #[must_use]
    pub const fn stack_pointer(&self) -> usize
    {
        ((self.status_word >> 11) & 0b111) as usize
    }

    /// Convert a logical `ST(n)` index to a physical `Rx` index.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    #[must_use]
    pub fn st_index_to_r_index(&self, n: usize) -> usize
    {
        assert!(fpu_index_valid(n), "ST index {n} out of range");
        (n + self.stack_pointer()) % FPU_REG_COUNT
    }

    /// Convert a physical `Rx` index to a logical `ST(n)` index.
    ///
    /// ## Panics
    ///
    /// Panics if `r >= 8`.
    #[must_use]
    pub fn r_index_to_st_index(&self, r: usize) -> usize
    {
        assert!(fpu_index_valid(r), "R index {r} out of range");
        (r + FPU_REG_COUNT - self.stack_pointer()) % FPU_REG_COUNT
    }

    /// Physical register `Rr`.
    ///
    /// ## Panics
    ///
    /// Panics if `r >= 8`.
    #[must_use]
    pub fn register(&self, r: usize) -> Value80
    {
        assert!(fpu_index_valid(r), "R index {r} out of range");
        self.r[r]
    }

    /// Set physical register `Rr`. The tag word is not touched.
    ///
    /// ## Panics
    ///
    /// Panics if `r >= 8`.
    pub fn set_register_physical(&mut self, r: usize, value: Value80)
    {
        assert!(fpu_index_valid(r), "R index {r} out of range");
        self.r[r] = value;
    }

    /// Logical register `ST(n)`.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    #[must_use]
    pub fn st(&self, n: usize) -> Value80
    {
        self.r[self.st_index_to_r_index(n)]
    }

    /// Set logical register `ST(n)`. The tag word is not touched.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    pub fn set_st(&mut self, n: usize, value: Value80)
    {
        let r = self.st_index_to_r_index(n);
        self.r[r] = value;
    }

    /// Recreate the full tag word from FXSAVE's abridged form.
    ///
    /// Bit `r` of `abridged` is set when physical register `Rr` is not empty.
    /// Reads the current register contents, so load those first.
    #[must_use]
    pub fn restore_tag_word(&self, abridged: u8) -> u16
    {
        (0..FPU_REG_COUNT).fold(0u16, |word, r| {
            let tag = if abridged & (1 << r) == 0 {
                FpuTag::Empty
            } else {
                FpuTag::classify(&self.r[r])
            };
            word | ((tag as u16) << (2 * r))
        })
    }

    /// Reduce the tag word to FXSAVE's one-bit-per-register form.
    #[must_use]
    pub fn abridged_tag_word(&self) -> u8
    {
        (0..FPU_REG_COUNT)
            .filter(|&r| self.tag(r) != FpuTag::Empty)
            .fold(0u8, |bits, r| bits | (1 << r))
    }

    /// Tag of physical register `Rr`.
    ///
    /// ## Panics
    ///
    /// Panics if `r >= 8`.
    #[must_use]
    pub fn tag(&self, r: usize) -> FpuTag
    {
        assert!(fpu_index_valid(r), "R index {r} out of range");
        FpuTag::from_bits(self.tag_word >> (2 * r))
    }

    /// MMX register `MMn`: the low 64 bits of physical register `Rn`.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    #[must_use]
    pub fn mmx(&self, n: usize) -> u64
    {
        assert!(mmx_index_valid(n), "MMX index {n} out of range");
        self.r[n].significand()
    }

    /// Set `MMn`, leaving the sign/exponent bits of `Rn` as they are.
    ///
    /// ## Panics
    ///
    /// Panics if `n >= 8`.
    pub fn set_mmx(&mut self, n: usize, value: u64)
    {
        assert!(mmx_index_valid(n), "MMX index {n} out of range");
        let exponent = u16::from_le_bytes([self.r[n].bytes()[8], self.r[n].bytes()[9]]);
        self.r[n] = Value80::from_parts(exponent, value);
    }

    /// Look up an x87 register by name.
    ///
    /// Returns `None` if the name is unknown, owned elsewhere, or not filled.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Register>
    {
        self.read(A::resolve(name)?)
    }

    pub(crate) fn read(&self, id: RegisterId) -> Option<Register>
    {
        let word = |v| RegisterValue::scalar(v, A::WORD_BITS);
        let reg = match id {
            RegisterId::St(n) if self.filled => {
                Register::new(st_name(n), RegisterValue::F80(self.st(n)), RegisterKind::Fpu)
            }
            RegisterId::Mmx(n) if self.filled => {
                Register::new(mm_name(n), RegisterValue::U64(self.mmx(n)), RegisterKind::Mmx)
            }
            RegisterId::FpuControl if self.filled => {
                Register::new("fcw", RegisterValue::U16(self.control_word), RegisterKind::Fpu)
            }
            RegisterId::FpuStatus if self.filled => {
                Register::new("fsw", RegisterValue::U16(self.status_word), RegisterKind::Fpu)
            }
            RegisterId::FpuTag if self.filled => {
                Register::new("ftw", RegisterValue::U16(self.tag_word), RegisterKind::Fpu)
            }
            RegisterId::FpuOpcode if self.op_code_filled => {
                Register::new("fop", RegisterValue::U16(self.op_code), RegisterKind::Fpu)
            }
            RegisterId::FpuInstructionOffset if self.filled => {
                Register::new("fip", word(self.inst_ptr_offset), RegisterKind::Fpu)
            }
            RegisterId::FpuDataOffset if self.filled => {
                Register::new("fdp", word(self.data_ptr_offset), RegisterKind::Fpu)
            }
            RegisterId::FpuInstructionSelector if self.filled => {
                Register::new("fis", RegisterValue::U16(self.inst_ptr_selector), RegisterKind::Fpu)
            }
            RegisterId::FpuDataSelector if self.filled => {
                Register::new("fds", RegisterValue::U16(self.data_ptr_selector), RegisterKind::Fpu)
            }
            _ => return None,
        };
        Some(reg)
    }

    /// Write a scalar x87 register by name.
    ///
    /// The 80-bit `stN` registers are not scalar and are not written here;
    /// use [`set_st`](Self::set_st).
    pub fn set_register(&mut self, name: &str, value: u64) -> bool
    {
        A::resolve(name).is_some_and(|id| self.write(id, value))
    }

    pub(crate) fn write(&mut self, id: RegisterId, value: u64) -> bool
    {
        match id {
            RegisterId::Mmx(n) => self.set_mmx(n, value),
            RegisterId::FpuControl => self.control_word = value as u16,
            RegisterId::FpuStatus => self.status_word = value as u16,
            RegisterId::FpuTag => self.tag_word = value as u16,
            RegisterId::FpuOpcode => self.op_code = value as u16,
            RegisterId::FpuInstructionOffset => self.inst_ptr_offset = value & A::WORD_MASK,
            RegisterId::FpuDataOffset => self.data_ptr_offset = value & A::WORD_MASK,
            RegisterId::FpuInstructionSelector => self.inst_ptr_selector = value as u16,
            RegisterId::FpuDataSelector => self.data_ptr_selector = value as u16,
            _ => return false,
        }
        trace!(register = ?id, value, "x87 write");
        true
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::X86_64;

    fn with_top(top: u16) -> FpuState<X86_64>
    {
        let mut fpu = FpuState::new();
        fpu.status_word = top << 11;
        fpu
    }

    #[test]
    fn test_stack_pointer_from_status_word()
    {
        let fpu = with_top(5);
        assert_eq!(fpu.stack_pointer(), 5);
        assert_eq!(fpu.st_index_to_r_index(0), 5);
        assert_eq!(fpu.st_index_to_r_index(3), 0);
        assert_eq!(fpu.r_index_to_st_index(0), 3);
    }

    #[test]
    fn test_classify()
    {
        assert_eq!(FpuTag::classify(&Value80::ZERO), FpuTag::Zero);
        // Negative zero
        assert_eq!(FpuTag::classify(&Value80::from_parts(0x8000, 0)), FpuTag::Zero);
        // 1.0
        assert_eq!(FpuTag::classify(&Value80::from_parts(0x3fff, 1 << 63)), FpuTag::Valid);
        // Infinity and NaN
        assert_eq!(FpuTag::classify(&Value80::from_parts(0x7fff, 1 << 63)), FpuTag::Special);
        assert_eq!(FpuTag::classify(&Value80::from_parts(0xffff, 0xc000_0000_0000_0000)), FpuTag::Special);
        // Denormal
        assert_eq!(FpuTag::classify(&Value80::from_parts(0, 1)), FpuTag::Special);
        // Pseudo-denormal
        assert_eq!(FpuTag::classify(&Value80::from_parts(0, 1 << 63)), FpuTag::Special);
        // Unnormal
        assert_eq!(FpuTag::classify(&Value80::from_parts(0x3fff, 1)), FpuTag::Special);
    }

    #[test]
    fn test_restore_tag_word_empty_wins()
    {
        let mut fpu = with_top(0);
        fpu.set_register_physical(2, Value80::from_parts(0x3fff, 1 << 63));
        // Only R2 and R3 are non-empty; R3 holds zero
        let tags = fpu.restore_tag_word(0b0000_1100);
        fpu.tag_word = tags;

        assert_eq!(fpu.tag(0), FpuTag::Empty);
        assert_eq!(fpu.tag(2), FpuTag::Valid);
        assert_eq!(fpu.tag(3), FpuTag::Zero);
        assert_eq!(fpu.abridged_tag_word(), 0b0000_1100);
    }

    #[test]
    fn test_mmx_aliases_physical_register()
    {
        let mut fpu = with_top(3);
        fpu.set_register_physical(1, Value80::from_parts(0xffff, 0));
        fpu.set_mmx(1, 0x1122_3344_5566_7788);

        assert_eq!(fpu.mmx(1), 0x1122_3344_5566_7788);
        assert_eq!(fpu.register(1).exponent(), 0x7fff);
        assert_eq!(fpu.st(6).significand(), 0x1122_3344_5566_7788);
    }
}
