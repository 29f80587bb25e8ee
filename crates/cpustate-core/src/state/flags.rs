//! EFLAGS / RFLAGS bit definitions.

use bitflags::bitflags;

bitflags! {
    /// Bits of the x86 flags register
    ///
    /// The upper 32 bits of RFLAGS are reserved, so the same definition covers
    /// both word widths.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EFlags: u64 {
        const CF = 1 << 0;   // Carry
        const PF = 1 << 2;   // Parity
        const AF = 1 << 4;   // Aux carry
        const ZF = 1 << 6;   // Zero
        const SF = 1 << 7;   // Sign
        const TF = 1 << 8;   // Trap
        const IF = 1 << 9;   // Interrupt enable
        const DF = 1 << 10;  // Direction
        const OF = 1 << 11;  // Overflow
        const NT = 1 << 14;  // Nested task
        const RF = 1 << 16;  // Resume
        const VM = 1 << 17;  // Virtual 8086
        const AC = 1 << 18;  // Alignment check
        const VIF = 1 << 19; // Virtual IF
        const VIP = 1 << 20; // Virtual IF pending
        const ID = 1 << 21;  // CPUID available
    }
}

/// Flags shown by [`flags_to_string`], in display order.
const DISPLAYED: [(EFlags, char); 9] = [
    (EFlags::CF, 'c'),
    (EFlags::PF, 'p'),
    (EFlags::AF, 'a'),
    (EFlags::ZF, 'z'),
    (EFlags::SF, 's'),
    (EFlags::TF, 't'),
    (EFlags::IF, 'i'),
    (EFlags::DF, 'd'),
    (EFlags::OF, 'o'),
];

impl EFlags
{
    /// The I/O privilege level (bits 12..14).
    #[must_use]
    pub const fn iopl(self) -> u8
    {
        ((self.bits() >> 12) & 0b11) as u8
    }
}

/// Render the condition-code bits of `flags`.
///
/// Each of carry, parity, aux-carry, zero, sign, trap, interrupt, direction and
/// overflow is shown as its letter, upper case when set and lower case when
/// clear, separated by spaces.
///
/// ## Example
///
/// ```rust
/// use cpustate_core::state::flags_to_string;
///
/// assert_eq!(flags_to_string(0x246), "c P a Z s t I d o");
/// ```
#[must_use]
pub fn flags_to_string(flags: u64) -> String
{
    let flags = EFlags::from_bits_retain(flags);
    DISPLAYED
        .iter()
        .map(|&(bit, letter)| {
            if flags.contains(bit) {
                letter.to_ascii_uppercase()
            } else {
                letter
            }
        })
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_flags_to_string_all_clear()
    {
        assert_eq!(flags_to_string(0), "c p a z s t i d o");
    }

    #[test]
    fn test_flags_to_string_all_set()
    {
        assert_eq!(flags_to_string(0xfd5), "C P A Z S T I D O");
    }

    #[test]
    fn test_iopl()
    {
        assert_eq!(EFlags::from_bits_retain(0x3000).iopl(), 3);
        assert_eq!(EFlags::from_bits_retain(0x1202).iopl(), 1);
    }
}
