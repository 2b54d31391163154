//! Instruction prefix byte decoding.

use cpu::instr::{OpSize, Segment};

bitflags! {
    /// Bitmask of raw instruction prefixes.
    ///
    /// Their meaning depends on the instruction opcode. In (dis)assembly, not
    /// all prefixes show up as actual prefix words before the mnemonic.
    ///
    /// The decoder collects prefix bytes in this bitmask. Candidate decoders
    /// only *query* it, since a candidate that ends up rejecting the encoding
    /// must leave the decoder untouched for the next one.
    pub struct RawPrefixes: u16 {
        /// `0xF0` - accepted and ignored, there's only one thread of execution.
        const LOCK       = 0x0100;
        /// `0xF2`
        const REPNE      = 0x0400;
        /// `0xF3` - `rep` or `repe` prefix, depending on the instruction.
        const REP_REPE   = 0x0800;
        /// `0x26`
        const OVERRIDE_ES = 0x0010;
        /// `0x2E` - Use CS instead of the instruction's default segment.
        ///
        /// This prefix doubles as a "not taken" branch hint.
        const OVERRIDE_CS = 0x0020;
        /// `0x36`
        const OVERRIDE_SS = 0x0040;
        /// `0x3E` - Use DS instead of the instruction's default segment.
        ///
        /// This prefix doubles as a "taken" branch hint.
        const OVERRIDE_DS = 0x0080;
        /// `0x64`
        const OVERRIDE_FS = 0x0001;
        /// `0x65`
        const OVERRIDE_GS = 0x0002;
        /// `0x66` - Operand size override.
        ///
        /// In 32-bit mode, this changes the size of register operands back to
        /// 16-bit registers.
        const OVERRIDE_OPERAND = 0x0004;
        /// `0x67` - Address size override.
        ///
        /// In 32-bit mode, this changes the interpretation of the Mod-Reg-R/M
        /// byte back to what it is in 16-bit mode, with all consequences.
        const OVERRIDE_ADDRESS = 0x0008;
    }
}

impl RawPrefixes {
    /// Decodes a prefix byte and merges it with `self`.
    ///
    /// Returns `Ok` when the byte is a valid prefix, and `Err` if not.
    pub fn decode(self, prefix: u8) -> Result<Self, Self> {
        Ok(self | match prefix {
            0xF0 => RawPrefixes::LOCK,
            0xF3 => RawPrefixes::REP_REPE,
            0xF2 => RawPrefixes::REPNE,
            0x2E => RawPrefixes::OVERRIDE_CS,
            0x36 => RawPrefixes::OVERRIDE_SS,
            0x3E => RawPrefixes::OVERRIDE_DS,
            0x26 => RawPrefixes::OVERRIDE_ES,
            0x64 => RawPrefixes::OVERRIDE_FS,
            0x65 => RawPrefixes::OVERRIDE_GS,
            0x66 => RawPrefixes::OVERRIDE_OPERAND,
            0x67 => RawPrefixes::OVERRIDE_ADDRESS,
            _ => return Err(self),
        })
    }

    /// Determine the operand size, given the size bit from the opcode.
    ///
    /// If `size_bit == true`, default size is assumed to be 32 bits, which
    /// the operand size override turns into 16 bits. If `size_bit == false`,
    /// the size is 8 bits and the override has no effect.
    pub fn size(&self, size_bit: bool) -> OpSize {
        match (size_bit, self.contains(Self::OVERRIDE_OPERAND)) {
            (false, _) => OpSize::Bits8,
            (true, false) => OpSize::Bits32,
            (true, true) => OpSize::Bits16,
        }
    }

    /// Returns the segment selected by an override prefix, if any.
    ///
    /// When several overrides are present, the last one in this list wins,
    /// which is as arbitrary as real hardware.
    pub fn segment(&self) -> Option<Segment> {
        let overrides = [
            (Self::OVERRIDE_ES, Segment::Es),
            (Self::OVERRIDE_CS, Segment::Cs),
            (Self::OVERRIDE_SS, Segment::Ss),
            (Self::OVERRIDE_DS, Segment::Ds),
            (Self::OVERRIDE_FS, Segment::Fs),
            (Self::OVERRIDE_GS, Segment::Gs),
        ];

        overrides.iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, seg)| *seg)
            .last()
    }

    pub fn address_size_override(&self) -> bool {
        self.contains(Self::OVERRIDE_ADDRESS)
    }
}
