//! Immediate value manipulation.
//!
//! An immediate is an 8-, 16- or 32-bit value encoded in the instruction
//! stream. Branch targets are also stored as (absolute) immediates once the
//! decoder has resolved them.

use cpu::instr::OpSize;

use std::fmt;

/// An 8, 16 or 32-bit immediate value.
///
/// Note that while `Immediate` only stores signed values, whether the sign is
/// meaningful depends on the operation performed on the values.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Immediate {
    Imm8(i8),
    Imm16(i16),
    Imm32(i32),
}

impl Immediate {
    /// Creates an immediate of the given size from the low bits of `value`.
    pub fn new(value: u32, size: OpSize) -> Self {
        match size {
            OpSize::Bits8 => Immediate::Imm8(value as i8),
            OpSize::Bits16 => Immediate::Imm16(value as i16),
            OpSize::Bits32 => Immediate::Imm32(value as i32),
        }
    }

    /// Sign-extend or truncate the immediate to a different size.
    pub fn sign_ext_to(&self, size: OpSize) -> Immediate {
        Immediate::new(self.sign_extended() as u32, size)
    }

    /// Returns the sign-extended immediate value as an `i32`.
    pub fn sign_extended(&self) -> i32 {
        match *self {
            Immediate::Imm8(imm) => imm as i32,
            Immediate::Imm16(imm) => imm as i32,
            Immediate::Imm32(imm) => imm,
        }
    }

    /// Returns the zero-extended immediate value as a `u32`.
    pub fn zero_extended(&self) -> u32 {
        match *self {
            Immediate::Imm8(imm) => imm as u8 as u32,
            Immediate::Imm16(imm) => imm as u16 as u32,
            Immediate::Imm32(imm) => imm as u32,
        }
    }

    /// Returns the size of the immediate value.
    pub fn size(&self) -> OpSize {
        match self {
            Immediate::Imm8(_) => OpSize::Bits8,
            Immediate::Imm16(_) => OpSize::Bits16,
            Immediate::Imm32(_) => OpSize::Bits32,
        }
    }
}

impl From<u8> for Immediate {
    fn from(imm: u8) -> Self {
        Immediate::Imm8(imm as i8)
    }
}

impl From<u16> for Immediate {
    fn from(imm: u16) -> Self {
        Immediate::Imm16(imm as i16)
    }
}

impl From<u32> for Immediate {
    fn from(imm: u32) -> Self {
        Immediate::Imm32(imm as i32)
    }
}

impl From<i8> for Immediate {
    fn from(imm: i8) -> Self {
        Immediate::Imm8(imm)
    }
}

impl From<i16> for Immediate {
    fn from(imm: i16) -> Self {
        Immediate::Imm16(imm)
    }
}

impl From<i32> for Immediate {
    fn from(imm: i32) -> Self {
        Immediate::Imm32(imm)
    }
}

impl fmt::LowerHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Immediate::Imm8(imm) => fmt::LowerHex::fmt(imm, f),
            Immediate::Imm16(imm) => fmt::LowerHex::fmt(imm, f),
            Immediate::Imm32(imm) => fmt::LowerHex::fmt(imm, f),
        }
    }
}

/// Prints the signed decimal value of the immediate.
impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Immediate::Imm8(imm) => fmt::Display::fmt(imm, f),
            Immediate::Imm16(imm) => fmt::Display::fmt(imm, f),
            Immediate::Imm32(imm) => fmt::Display::fmt(imm, f),
        }
    }
}
