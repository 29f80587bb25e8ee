//! # Vector Register State
//!
//! The whole SSE/AVX/AVX-512 register file. XMM and YMM registers are the low
//! 128 and 256 bits of the ZMM registers, so there is one array of 512-bit
//! lanes and the narrower views are slices of it.
//!
//! The kernel hands out the widths through separate regsets (FXSAVE for XMM,
//! XSAVE components for the upper halves), in any order, and not every CPU
//! has every width. Each width therefore has its own filled flag, and a write
//! through a narrow view never disturbs the bits above it.

use tracing::trace;

use crate::types::{
    xmm_name, ymm_name, zmm_name, Arch, Register, RegisterId, RegisterKind, RegisterValue, Value128, Value256, Value512,
    MAX_ZMM_REG_COUNT,
};

/// Vector register state of one thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorState<A: Arch>
{
    zmm_storage: [Value512; MAX_ZMM_REG_COUNT],
    /// SSE control/status register
    pub mxcsr: u32,
    /// Bits of MXCSR the CPU supports
    pub mxcsr_mask: u32,
    /// XMM lanes and MXCSR hold real data
    pub xmm_filled: bool,
    /// Bits 128..256 of the first `YMM_REG_COUNT` lanes hold real data
    pub ymm_filled: bool,
    /// Bits 256..512 (and lanes 16..32 on x86-64) hold real data
    pub zmm_filled: bool,
    /// `mxcsr_mask` holds real data
    pub mxcsr_mask_filled: bool,
    _arch: std::marker::PhantomData<A>,
}

impl<A: Arch> Default for VectorState<A>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<A: Arch> VectorState<A>
{
    /// Create an empty vector state.
    #[must_use]
    pub const fn new() -> Self
    {
        Self {
            zmm_storage: [Value512::ZERO; MAX_ZMM_REG_COUNT],
            mxcsr: 0,
            mxcsr_mask: 0,
            xmm_filled: false,
            ymm_filled: false,
            zmm_filled: false,
            mxcsr_mask_filled: false,
            _arch: std::marker::PhantomData,
        }
    }

    /// Zero every lane and validity flag.
    pub fn clear(&mut self)
    {
        *self = Self::new();
    }

    /// `XMMi`, the low 128 bits of lane `i`.
    ///
    /// ## Panics
    ///
    /// Panics if `i >= A::XMM_REG_COUNT`.
    #[must_use]
    pub fn xmm(&self, i: usize) -> Value128
    {
        assert!(A::xmm_index_valid(i), "XMM index {i} out of range for {}", A::NAME);
        self.zmm_storage[i].low()
    }

    /// Overwrite the low 128 bits of lane `i`.
    ///
    /// ## Panics
    ///
    /// Panics if `i >= A::XMM_REG_COUNT`.
    pub fn set_xmm(&mut self, i: usize, value: Value128)
    {
        assert!(A::xmm_index_valid(i), "XMM index {i} out of range for {}", A::NAME);
        self.zmm_storage[i] = self.zmm_storage[i].with_low(value);
    }

    /// `YMMi`, the low 256 bits of lane `i`.
    ///
    /// ## Panics
    ///
    /// Panics if `i >= A::YMM_REG_COUNT`.
    #[must_use]
    pub fn ymm(&self, i: usize) -> Value256
    {
        assert!(A::ymm_index_valid(i), "YMM index {i} out of range for {}", A::NAME);
        self.zmm_storage[i].low()
    }

    /// Overwrite the low 256 bits of lane `i`.
    ///
    /// ## Panics
    ///
    /// Panics if `i >= A::YMM_REG_COUNT`.
    pub fn set_ymm(&mut self, i: usize, value: Value256)
    {
        assert!(A::ymm_index_valid(i), "YMM index {i} out of range for {}", A::NAME);
        self.zmm_storage[i] = self.zmm_storage[i].with_low(value);
    }

    /// `ZMMi`, the whole lane.
    ///
    /// ## Panics
    ///
    /// Panics if `i >= A::ZMM_REG_COUNT`.
    #[must_use]
    pub fn zmm(&self, i: usize) -> Value512
    {
        assert!(A::zmm_index_valid(i), "ZMM index {i} out of range for {}", A::NAME);
        self.zmm_storage[i]
    }

    /// Overwrite lane `i`.
    ///
    /// ## Panics
    ///
    /// Panics if `i >= A::ZMM_REG_COUNT`.
    pub fn set_zmm(&mut self, i: usize, value: Value512)
    {
        assert!(A::zmm_index_valid(i), "ZMM index {i} out of range for {}", A::NAME);
        self.zmm_storage[i] = value;
    }

    /// Look up a vector register or MXCSR by name.
    ///
    /// Returns `None` if the name is unknown, owned elsewhere, or the width it
    /// names has not been filled.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Register>
    {
        self.read(A::resolve(name)?)
    }

    pub(crate) fn read(&self, id: RegisterId) -> Option<Register>
    {
        let reg = match id {
            RegisterId::Xmm(i) if self.xmm_filled => {
                Register::new(xmm_name(i), RegisterValue::V128(self.xmm(i)), RegisterKind::Simd)
            }
            RegisterId::Ymm(i) if self.ymm_filled => {
                Register::new(ymm_name(i), RegisterValue::V256(self.ymm(i)), RegisterKind::Simd)
            }
            RegisterId::Zmm(i) if self.zmm_filled => {
                Register::new(zmm_name(i), RegisterValue::V512(self.zmm(i)), RegisterKind::Simd)
            }
            RegisterId::Mxcsr if self.xmm_filled => {
                Register::new("mxcsr", RegisterValue::U32(self.mxcsr), RegisterKind::SimdControl)
            }
            _ => return None,
        };
        Some(reg)
    }

    /// Write MXCSR by name. Vector lanes are not scalar and are not written
    /// here.
    pub fn set_register(&mut self, name: &str, value: u64) -> bool
    {
        A::resolve(name).is_some_and(|id| self.write(id, value))
    }

    pub(crate) fn write(&mut self, id: RegisterId, value: u64) -> bool
    {
        if id != RegisterId::Mxcsr {
            return false;
        }
        self.mxcsr = value as u32;
        trace!(value, "mxcsr write");
        true
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::{X86, X86_64};

    #[test]
    fn test_set_xmm_preserves_upper_bits()
    {
        let mut avx = VectorState::<X86_64>::new();
        avx.set_zmm(3, Value512::from_bytes([0xff; 64]));
        avx.set_xmm(3, Value128::from_u128(0x42));

        assert_eq!(avx.xmm(3), Value128::from_u128(0x42));
        assert!(avx.zmm(3).bytes()[16..].iter().all(|b| *b == 0xff));
    }

    #[test]
    fn test_set_ymm_preserves_upper_bits()
    {
        let mut avx = VectorState::<X86_64>::new();
        avx.set_zmm(0, Value512::from_bytes([0x11; 64]));
        avx.set_ymm(0, Value256::ZERO);

        assert!(avx.zmm(0).bytes()[..32].iter().all(|b| *b == 0));
        assert!(avx.zmm(0).bytes()[32..].iter().all(|b| *b == 0x11));
    }

    #[test]
    #[should_panic(expected = "XMM index 8")]
    fn test_xmm8_out_of_range_on_x86()
    {
        let avx = VectorState::<X86>::new();
        let _ = avx.xmm(8);
    }

    #[test]
    fn test_zmm16_valid_only_on_x86_64()
    {
        let avx = VectorState::<X86_64>::new();
        assert_eq!(avx.zmm(31), Value512::ZERO);
        assert!(!X86::zmm_index_valid(16));
    }

    #[test]
    fn test_value_checks_width_flag()
    {
        let mut avx = VectorState::<X86_64>::new();
        avx.xmm_filled = true;
        assert!(avx.value("xmm0").is_some());
        assert!(avx.value("ymm0").is_none());
        assert!(avx.value("zmm0").is_none());
        assert!(avx.value("mxcsr").is_some());
    }
}
