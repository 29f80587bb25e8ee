//! # XSAVE Extended State
//!
//! Decoding and encoding of the `NT_X86_XSTATE` regset, in the standard
//! (non-compacted) XSAVE format:
//!
//! | Offset | Size | Component |
//! |--------|------|-----------|
//! | 0      | 512  | Legacy FXSAVE region (x87, MXCSR, XMM) |
//! | 464    | 48   | Linux software-reserved bytes (XCR0 lives here) |
//! | 512    | 64   | XSAVE header (`xstate_bv` first) |
//! | 576    | 256  | YMM_Hi128: bits 128..256 of YMM0-YMM15 |
//! | 1152   | 512  | ZMM_Hi256: bits 256..512 of ZMM0-ZMM15 |
//! | 1664   | 1024 | Hi16_ZMM: all of ZMM16-ZMM31 |
//!
//! A component whose `xstate_bv` bit is clear is in its initial state, which
//! is all zeros, and the kernel may not have written its bytes at all.

use bitflags::bitflags;
use tracing::{debug, warn};

use super::RawSnapshot;
use crate::error::{StateError, StateResult};
use crate::state::PlatformState;
use crate::types::{Arch, RegisterBytes, Value256, Value512};

/// Size of the legacy region plus the XSAVE header
pub const XSAVE_HEADER_END: usize = 576;

const LEGACY_SIZE: usize = 512;
const XSTATE_BV_OFFSET: usize = 512;
const SW_RESERVED_OFFSET: usize = 464;
const SW_MAGIC: u32 = 0x4650_5853;
const YMM_HI128_OFFSET: usize = 576;
const ZMM_HI256_OFFSET: usize = 1152;
const HI16_ZMM_OFFSET: usize = 1664;
const HI16_ZMM_FIRST: usize = 16;

bitflags! {
    /// XSAVE state-component bitmap, as found in XCR0 and `xstate_bv`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct XFeatures: u64
    {
        const X87 = 1 << 0;
        const SSE = 1 << 1;
        const AVX = 1 << 2;
        const OPMASK = 1 << 5;
        const ZMM_HI256 = 1 << 6;
        const HI16_ZMM = 1 << 7;
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32>
{
    buf.get(offset..offset + 4)?.try_into().ok().map(u32::from_le_bytes)
}

fn read_u64(buf: &[u8], offset: usize) -> Option<u64>
{
    buf.get(offset..offset + 8)?.try_into().ok().map(u64::from_le_bytes)
}

/// XCR0 as recorded by the kernel in the software-reserved bytes, if the
/// magic number is present.
fn sw_xcr0(buf: &[u8]) -> Option<XFeatures>
{
    if read_u32(buf, SW_RESERVED_OFFSET)? != SW_MAGIC {
        return None;
    }
    read_u64(buf, SW_RESERVED_OFFSET + 8).map(XFeatures::from_bits_retain)
}

/// Components enabled in the buffer. Without the kernel's XCR0 record,
/// every component the buffer is long enough to hold counts as enabled.
fn enabled_features(buf: &[u8]) -> XFeatures
{
    sw_xcr0(buf).unwrap_or_else(|| {
        let mut features = XFeatures::X87 | XFeatures::SSE;
        if buf.len() >= ZMM_HI256_OFFSET {
            features |= XFeatures::AVX;
        }
        if buf.len() >= HI16_ZMM_OFFSET {
            features |= XFeatures::ZMM_HI256;
        }
        if buf.len() >= HI16_ZMM_OFFSET + 16 * 64 {
            features |= XFeatures::HI16_ZMM;
        }
        features
    })
}

/// Whether `feature` is enabled and its `len` bytes at `offset` fit.
fn component_present(buf: &[u8], enabled: XFeatures, feature: XFeatures, offset: usize, len: usize) -> bool
{
    if !enabled.contains(feature) {
        return false;
    }
    if buf.len() < offset + len {
        warn!(
            feature = feature.bits(),
            needed = offset + len,
            actual = buf.len(),
            "xstate buffer too short for enabled component"
        );
        return false;
    }
    true
}

/// Bytes of a component slot, or zeros when `xstate_bv` says it is in its
/// initial state.
fn slot<const N: usize>(buf: &[u8], in_use: bool, offset: usize) -> RegisterBytes<N>
{
    if !in_use {
        return RegisterBytes::ZERO;
    }
    RegisterBytes::from_slice(&buf[offset..]).unwrap_or_default()
}

impl<A: Arch> PlatformState<A>
{
    /// Load an `NT_X86_XSTATE` buffer.
    ///
    /// Fills the x87 and XMM categories from the legacy region, then the
    /// YMM and ZMM upper halves for every component that is enabled and fits.
    /// Their filled flags are set even when `xstate_bv` marks them as being
    /// in their initial state.
    ///
    /// ## Errors
    ///
    /// `StateError::TruncatedSnapshot` if the buffer cannot hold the legacy
    /// region and the XSAVE header.
    pub fn fill_from_xstate(&mut self, buf: &[u8]) -> StateResult<()>
    {
        if buf.len() < XSAVE_HEADER_END {
            return Err(StateError::TruncatedSnapshot {
                layout: "xstate",
                expected: XSAVE_HEADER_END,
                actual: buf.len(),
            });
        }

        let legacy = A::ExtendedFpRegs::from_bytes(&buf[..LEGACY_SIZE])?;
        self.fill_from(&legacy);

        let enabled = enabled_features(buf);
        let in_use = read_u64(buf, XSTATE_BV_OFFSET).map_or(XFeatures::empty(), XFeatures::from_bits_retain);

        if component_present(buf, enabled, XFeatures::AVX, YMM_HI128_OFFSET, 16 * 16) {
            let used = in_use.contains(XFeatures::AVX);
            let avx = self.avx_mut();
            for i in 0..A::YMM_REG_COUNT {
                let high = slot::<16>(buf, used, YMM_HI128_OFFSET + i * 16);
                let mut ymm = [0u8; 32];
                ymm[..16].copy_from_slice(avx.xmm(i).bytes());
                ymm[16..].copy_from_slice(high.bytes());
                avx.set_ymm(i, Value256::from_bytes(ymm));
            }
            avx.ymm_filled = true;
        }

        let zmm_hi = component_present(buf, enabled, XFeatures::ZMM_HI256, ZMM_HI256_OFFSET, 16 * 32);
        let zmm_hi16 = A::ZMM_REG_COUNT <= HI16_ZMM_FIRST
            || component_present(buf, enabled, XFeatures::HI16_ZMM, HI16_ZMM_OFFSET, 16 * 64);
        if zmm_hi && zmm_hi16 {
            let used = in_use.contains(XFeatures::ZMM_HI256);
            let avx = self.avx_mut();
            for i in 0..A::ZMM_REG_COUNT.min(HI16_ZMM_FIRST) {
                let high = slot::<32>(buf, used, ZMM_HI256_OFFSET + i * 32);
                let mut zmm = *avx.zmm(i).bytes();
                zmm[32..].copy_from_slice(high.bytes());
                avx.set_zmm(i, Value512::from_bytes(zmm));
            }

            let used = in_use.contains(XFeatures::HI16_ZMM);
            for i in HI16_ZMM_FIRST..A::ZMM_REG_COUNT {
                let value = slot::<64>(buf, used, HI16_ZMM_OFFSET + (i - HI16_ZMM_FIRST) * 64);
                avx.set_zmm(i, value);
            }
            avx.zmm_filled = true;
        }

        debug!(
            xcr0 = enabled.bits(),
            xstate_bv = in_use.bits(),
            len = buf.len(),
            "loaded xstate"
        );
        Ok(())
    }

    /// Write the state back into an `NT_X86_XSTATE` buffer.
    ///
    /// Starts from the buffer's current contents: the legacy region is
    /// projected through the architecture's FXSAVE layout, and each vector
    /// component that is filled and fits is written with its `xstate_bv` bit
    /// set. Components that are not filled are left alone.
    ///
    /// ## Errors
    ///
    /// `StateError::TruncatedSnapshot` if the buffer cannot hold the legacy
    /// region and the XSAVE header.
    pub fn fill_xstate(&self, buf: &mut [u8]) -> StateResult<()>
    {
        if buf.len() < XSAVE_HEADER_END {
            return Err(StateError::TruncatedSnapshot {
                layout: "xstate",
                expected: XSAVE_HEADER_END,
                actual: buf.len(),
            });
        }

        let mut legacy = A::ExtendedFpRegs::from_bytes(&buf[..LEGACY_SIZE])?;
        self.fill_struct(&mut legacy);
        buf[..LEGACY_SIZE].copy_from_slice(legacy.as_bytes());

        let mut in_use = read_u64(buf, XSTATE_BV_OFFSET).map_or(XFeatures::empty(), XFeatures::from_bits_retain);
        if self.x87().filled {
            in_use |= XFeatures::X87;
        }
        if self.avx().xmm_filled {
            in_use |= XFeatures::SSE;
        }

        let avx = self.avx();
        if avx.ymm_filled && buf.len() >= YMM_HI128_OFFSET + 16 * 16 {
            for i in 0..A::YMM_REG_COUNT {
                let offset = YMM_HI128_OFFSET + i * 16;
                buf[offset..offset + 16].copy_from_slice(&avx.ymm(i).bytes()[16..]);
            }
            in_use |= XFeatures::AVX;
        }

        if avx.zmm_filled && buf.len() >= ZMM_HI256_OFFSET + 16 * 32 {
            for i in 0..A::ZMM_REG_COUNT.min(HI16_ZMM_FIRST) {
                let offset = ZMM_HI256_OFFSET + i * 32;
                buf[offset..offset + 32].copy_from_slice(&avx.zmm(i).bytes()[32..]);
            }
            in_use |= XFeatures::ZMM_HI256;

            if A::ZMM_REG_COUNT > HI16_ZMM_FIRST && buf.len() >= HI16_ZMM_OFFSET + 16 * 64 {
                for i in HI16_ZMM_FIRST..A::ZMM_REG_COUNT {
                    avx.zmm(i).write_to(&mut buf[HI16_ZMM_OFFSET + (i - HI16_ZMM_FIRST) * 64..]);
                }
                in_use |= XFeatures::HI16_ZMM;
            }
        }

        buf[XSTATE_BV_OFFSET..XSTATE_BV_OFFSET + 8].copy_from_slice(&in_use.bits().to_le_bytes());

        debug!(xstate_bv = in_use.bits(), "stored xstate");
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::{Value128, X86, X86_64};

    const FULL_LEN: usize = HI16_ZMM_OFFSET + 16 * 64;

    fn with_xcr0(len: usize, xcr0: XFeatures) -> Vec<u8>
    {
        let mut buf = vec![0u8; len];
        buf[SW_RESERVED_OFFSET..SW_RESERVED_OFFSET + 4].copy_from_slice(&SW_MAGIC.to_le_bytes());
        buf[SW_RESERVED_OFFSET + 8..SW_RESERVED_OFFSET + 16].copy_from_slice(&xcr0.bits().to_le_bytes());
        buf
    }

    #[test]
    fn test_short_buffer_is_rejected()
    {
        let mut state = PlatformState::<X86_64>::new();
        let err = state.fill_from_xstate(&[0u8; 100]).unwrap_err();
        assert_eq!(
            err,
            StateError::TruncatedSnapshot {
                layout: "xstate",
                expected: XSAVE_HEADER_END,
                actual: 100,
            }
        );
        assert!(!state.x87().filled);
    }

    #[test]
    fn test_legacy_only_fills_sse()
    {
        let mut state = PlatformState::<X86_64>::new();
        state.fill_from_xstate(&[0u8; XSAVE_HEADER_END]).unwrap();

        assert!(state.x87().filled);
        assert!(state.avx().xmm_filled);
        assert!(!state.avx().ymm_filled);
        assert!(!state.avx().zmm_filled);
    }

    #[test]
    fn test_ymm_upper_half_loaded()
    {
        let features = XFeatures::X87 | XFeatures::SSE | XFeatures::AVX;
        let mut buf = with_xcr0(ZMM_HI256_OFFSET, features);
        buf[XSTATE_BV_OFFSET..XSTATE_BV_OFFSET + 8].copy_from_slice(&features.bits().to_le_bytes());
        // XMM1 low half, YMM1 high half
        buf[160 + 16] = 0x11;
        buf[YMM_HI128_OFFSET + 16] = 0x22;

        let mut state = PlatformState::<X86_64>::new();
        state.fill_from_xstate(&buf).unwrap();

        let ymm1 = state.avx().ymm(1);
        assert_eq!(ymm1.bytes()[0], 0x11);
        assert_eq!(ymm1.bytes()[16], 0x22);
        assert!(state.avx().ymm_filled);
        assert!(!state.avx().zmm_filled);
    }

    #[test]
    fn test_init_state_component_reads_as_zero_but_filled()
    {
        let mut buf = with_xcr0(ZMM_HI256_OFFSET, XFeatures::X87 | XFeatures::SSE | XFeatures::AVX);
        buf[YMM_HI128_OFFSET] = 0xff;

        let mut state = PlatformState::<X86_64>::new();
        state.fill_from_xstate(&buf).unwrap();

        assert!(state.avx().ymm_filled);
        assert!(state.avx().ymm(0).is_zero());
    }

    #[test]
    fn test_advertised_component_missing_from_buffer()
    {
        let buf = with_xcr0(XSAVE_HEADER_END, XFeatures::X87 | XFeatures::SSE | XFeatures::AVX);

        let mut state = PlatformState::<X86_64>::new();
        state.fill_from_xstate(&buf).unwrap();

        assert!(state.avx().xmm_filled);
        assert!(!state.avx().ymm_filled);
    }

    #[test]
    fn test_zmm_round_trip_x86_64()
    {
        let mut state = PlatformState::<X86_64>::new();
        state.avx_mut().set_zmm(3, Value512::from_bytes([0x33; 64]));
        state.avx_mut().set_zmm(20, Value512::from_bytes([0x44; 64]));
        state.avx_mut().xmm_filled = true;
        state.avx_mut().ymm_filled = true;
        state.avx_mut().zmm_filled = true;

        let mut buf = with_xcr0(FULL_LEN, XFeatures::all());
        state.fill_xstate(&mut buf).unwrap();

        let bv = XFeatures::from_bits_retain(read_u64(&buf, XSTATE_BV_OFFSET).unwrap());
        assert!(bv.contains(XFeatures::SSE | XFeatures::AVX | XFeatures::ZMM_HI256 | XFeatures::HI16_ZMM));

        let mut back = PlatformState::<X86_64>::new();
        back.fill_from_xstate(&buf).unwrap();
        assert_eq!(back.avx().zmm(3), Value512::from_bytes([0x33; 64]));
        assert_eq!(back.avx().zmm(20), Value512::from_bytes([0x44; 64]));
        assert!(back.avx().zmm_filled);
    }

    #[test]
    fn test_x86_ignores_hi16_zmm()
    {
        let mut buf = with_xcr0(HI16_ZMM_OFFSET, XFeatures::all() - XFeatures::HI16_ZMM);
        buf[XSTATE_BV_OFFSET..XSTATE_BV_OFFSET + 8].copy_from_slice(&XFeatures::all().bits().to_le_bytes());
        buf[ZMM_HI256_OFFSET + 7 * 32] = 0x77;
        buf[160] = 0x01;

        let mut state = PlatformState::<X86>::new();
        state.fill_from_xstate(&buf).unwrap();

        assert!(state.avx().zmm_filled);
        assert_eq!(state.avx().zmm(7).bytes()[32], 0x77);
        assert_eq!(state.avx().xmm(0), Value128::from_u128(1));
    }

    #[test]
    fn test_fallback_without_sw_magic()
    {
        assert_eq!(enabled_features(&[0u8; XSAVE_HEADER_END]), XFeatures::X87 | XFeatures::SSE);
        assert!(enabled_features(&[0u8; FULL_LEN]).contains(XFeatures::HI16_ZMM));
    }
}
