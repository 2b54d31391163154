//! x86 status flag (`EFLAGS`) structures and utilities.
//!
//! Note that we don't model all flags in the register. The important ones are
//! those read and written by instructions.

use cpu::instr::OpSize;

bitflags! {
    /// A bitmask carrying any combination of x86 status flags.
    ///
    /// The bit indices correspond to the bit indices in `EFLAGS`.
    pub struct Flags: u32 {
        /// Carry flag.
        const CF = 1 << 0;
        /// Parity flag.
        ///
        /// Set when the least significant byte of the result contains an even
        /// number of 1-bits.
        const PF = 1 << 2;
        /// Adjust flag (or Auxiliary Carry Flag).
        ///
        /// Set to whether a carry from the lower 4 bits of an operation has
        /// been generated.
        const AF = 1 << 4;
        /// Zero flag.
        ///
        /// Set to whether the result of an operation consists entirely of
        /// 0-bits.
        const ZF = 1 << 6;
        /// Sign flag.
        const SF = 1 << 7;
        /// Trap flag.
        const TF = 1 << 8;
        /// Interrupt enable flag.
        const IF = 1 << 9;
        /// Direction flag. String instructions walk backwards when set.
        const DF = 1 << 10;
        /// Overflow.
        const OF = 1 << 11;

        /// The status flags written by arithmetic instructions.
        const STATUS = Self::CF.bits | Self::PF.bits | Self::AF.bits | Self::ZF.bits | Self::SF.bits | Self::OF.bits;
        /// The flags transferred by `lahf` and `sahf`.
        const AH = Self::SF.bits | Self::ZF.bits | Self::AF.bits | Self::PF.bits | Self::CF.bits;
    }
}

/// Bit 1 of `EFLAGS` is reserved and always reads as 1.
pub const EFLAGS_RESERVED: u32 = 1 << 1;

/// Returns the value of the parity flag for a result: `true` if its low byte
/// has an even number of bits set.
pub fn parity(result: u32) -> bool {
    (result as u8).count_ones() % 2 == 0
}

/// Computes `SF`, `ZF` and `PF` for a `size`-bit result.
pub fn szp(result: u32, size: OpSize) -> Flags {
    let mut flags = Flags::empty();
    flags.set(Flags::SF, size.is_negative(result));
    flags.set(Flags::ZF, result & size.mask() == 0);
    flags.set(Flags::PF, parity(result));
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_flags() {
        assert_eq!(szp(0, OpSize::Bits32), Flags::ZF | Flags::PF);
        assert_eq!(szp(0x100, OpSize::Bits8), Flags::ZF | Flags::PF);
        assert_eq!(szp(0x80, OpSize::Bits8), Flags::SF);
        assert_eq!(szp(0x80, OpSize::Bits16), Flags::empty());
    }

    #[test]
    fn parity_of_low_byte() {
        assert!(parity(0));
        assert!(parity(0b11));
        assert!(!parity(0b111));
        assert!(parity(0xFF00));
        assert!(!parity(0x0100_0001));
    }

    #[test]
    fn eflags_positions() {
        assert_eq!(Flags::CF.bits(), 0x001);
        assert_eq!(Flags::ZF.bits(), 0x040);
        assert_eq!(Flags::DF.bits(), 0x400);
        assert_eq!(Flags::OF.bits(), 0x800);
        assert!(!Flags::STATUS.contains(Flags::DF));
        assert_eq!(Flags::AH.bits(), 0xD5);
        assert_eq!(Flags::STATUS - Flags::AH, Flags::OF);
    }
}
