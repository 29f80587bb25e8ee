//! Fixed-width register values wider than a machine word.

use std::fmt;

/// Little-endian register value of `N` bytes.
///
/// Used for everything that does not fit in a `u64`: x87 data registers
/// (80 bits) and the three vector widths (128, 256, 512 bits).
///
/// ## Byte Order
///
/// All values are stored in little-endian format, which is the native byte
/// order of x86. `bytes()[0]` is the least significant byte.
///
/// ## Example
///
/// ```rust
/// use cpustate_core::types::{Value128, Value512};
///
/// let xmm = Value128::from_u128(0x0123_4567_89ab_cdef);
/// let zmm = Value512::ZERO.with_low(xmm);
/// assert_eq!(zmm.low::<16>(), xmm);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterBytes<const N: usize>
{
    bytes: [u8; N],
}

/// 80-bit x87 extended-precision value
pub type Value80 = RegisterBytes<10>;
/// 128-bit XMM value
pub type Value128 = RegisterBytes<16>;
/// 256-bit YMM value
pub type Value256 = RegisterBytes<32>;
/// 512-bit ZMM value
pub type Value512 = RegisterBytes<64>;

impl<const N: usize> RegisterBytes<N>
{
    /// All bits clear
    pub const ZERO: Self = Self { bytes: [0; N] };

    /// Create a value from raw little-endian bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; N]) -> Self
    {
        Self { bytes }
    }

    /// Create a value from the first `N` bytes of `slice`.
    ///
    /// Returns `None` if the slice is shorter than `N`.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self>
    {
        let bytes = slice.get(..N)?.try_into().ok()?;
        Some(Self { bytes })
    }

    /// Access the raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; N]
    {
        &self.bytes
    }

    /// Copy the value into the first `N` bytes of `out`.
    ///
    /// Bytes of `out` past `N` are left as they were.
    ///
    /// ## Panics
    ///
    /// Panics if `out` is shorter than `N`.
    pub fn write_to(&self, out: &mut [u8])
    {
        out[..N].copy_from_slice(&self.bytes);
    }

    /// The low `M` bytes of this value.
    #[must_use]
    pub fn low<const M: usize>(&self) -> RegisterBytes<M>
    {
        const { assert!(M <= N, "low view wider than the value") };
        let mut bytes = [0; M];
        bytes.copy_from_slice(&self.bytes[..M]);
        RegisterBytes { bytes }
    }

    /// This value with its low `M` bytes replaced by `low`.
    #[must_use]
    pub fn with_low<const M: usize>(mut self, low: RegisterBytes<M>) -> Self
    {
        const { assert!(M <= N, "low view wider than the value") };
        self.bytes[..M].copy_from_slice(&low.bytes);
        self
    }

    /// Returns `true` if every bit is clear.
    #[must_use]
    pub fn is_zero(&self) -> bool
    {
        self.bytes.iter().all(|b| *b == 0)
    }
}

impl<const N: usize> Default for RegisterBytes<N>
{
    fn default() -> Self
    {
        Self::ZERO
    }
}

impl<const N: usize> From<[u8; N]> for RegisterBytes<N>
{
    fn from(bytes: [u8; N]) -> Self
    {
        Self::from_bytes(bytes)
    }
}

// Printed most significant byte first, the way register panels show them.
impl<const N: usize> fmt::LowerHex for RegisterBytes<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if f.alternate() {
            f.write_str("0x")?;
        }
        for b in self.bytes.iter().rev() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for RegisterBytes<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self)
    }
}

impl<const N: usize> fmt::Display for RegisterBytes<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:x}", self)
    }
}

impl Value80
{
    /// The 64-bit significand, including the explicit integer bit (bit 63).
    #[must_use]
    pub fn significand(&self) -> u64
    {
        let mut low = [0; 8];
        low.copy_from_slice(&self.bytes[..8]);
        u64::from_le_bytes(low)
    }

    /// The 15-bit biased exponent.
    #[must_use]
    pub fn exponent(&self) -> u16
    {
        u16::from_le_bytes([self.bytes[8], self.bytes[9]]) & 0x7fff
    }

    /// `true` if the sign bit is set.
    #[must_use]
    pub fn sign(&self) -> bool
    {
        self.bytes[9] & 0x80 != 0
    }

    /// Build a value from its sign/exponent word and significand.
    #[must_use]
    pub fn from_parts(sign_exponent: u16, significand: u64) -> Self
    {
        let mut bytes = [0; 10];
        bytes[..8].copy_from_slice(&significand.to_le_bytes());
        bytes[8..].copy_from_slice(&sign_exponent.to_le_bytes());
        Self { bytes }
    }
}

impl Value128
{
    /// Create a vector register from a 128-bit integer (little-endian).
    #[must_use]
    pub const fn from_u128(value: u128) -> Self
    {
        Self {
            bytes: value.to_le_bytes(),
        }
    }

    /// Convert to a 128-bit integer (little-endian).
    #[must_use]
    pub const fn as_u128(&self) -> u128
    {
        u128::from_le_bytes(self.bytes)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_value80_parts()
    {
        // 1.0: exponent 0x3fff, integer bit set
        let one = Value80::from_parts(0x3fff, 0x8000_0000_0000_0000);
        assert_eq!(one.exponent(), 0x3fff);
        assert_eq!(one.significand(), 0x8000_0000_0000_0000);
        assert!(!one.sign());

        let neg = Value80::from_parts(0xbfff, 0x8000_0000_0000_0000);
        assert!(neg.sign());
        assert_eq!(neg.exponent(), 0x3fff);
    }

    #[test]
    fn test_low_and_with_low()
    {
        let wide = Value512::from_bytes([0xaa; 64]);
        let narrow = Value128::from_u128(1);
        let merged = wide.with_low(narrow);

        assert_eq!(merged.low::<16>(), narrow);
        assert!(merged.bytes()[16..].iter().all(|b| *b == 0xaa));
    }

    #[test]
    fn test_hex_formatting()
    {
        let v = Value128::from_u128(0x1234);
        assert_eq!(format!("{v}"), "00000000000000000000000000001234");
        assert_eq!(format!("{v:?}"), "0x00000000000000000000000000001234");
    }

    #[test]
    fn test_from_slice_too_short()
    {
        assert!(Value80::from_slice(&[0; 9]).is_none());
        assert!(Value80::from_slice(&[0; 16]).is_some());
    }
}
