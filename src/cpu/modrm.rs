//! Mod-Reg-R/M and SIB decoding (the addressing-mode resolver).
//!
//! Most instructions that take a register or memory operand encode it in a
//! Mod-Reg-R/M byte following the opcode, optionally followed by a Scale Index
//! Byte and a displacement. The resolver turns those bytes into `Operand`s,
//! computing the effective offset of memory operands from the current
//! register contents.

use cpu::decode::Decoder;
use cpu::instr::{Addressing, MemoryLocation, OpSize, Operand, Register};
use cpu::interpret::CpuError;
use cpu::state::State;

/// A Mod-Reg-R/M byte (also called Mod-R/M).
///
/// This is used by many opcodes to define their source and destination operands
/// and, if present, follows right after the opcode bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModRm(pub u8);

impl ModRm {
    /// Get the addressing mode, specified by the `Mod` field.
    ///
    /// This influences the interpretation of the `R/M` field.
    pub fn mode(&self) -> AddressingMode {
        match self.0 >> 6 {
            0b00 => AddressingMode::RegIndirect,
            0b01 => AddressingMode::OneByteDisplacement,
            0b10 => AddressingMode::FourByteDisplacement,
            _ => AddressingMode::Register,
        }
    }

    /// Gets the raw value of the `Reg` field.
    ///
    /// This is used to encode a second register operand, or an opcode
    /// extension for opcode groups.
    pub fn reg(&self) -> u8 {
        (self.0 >> 3) & 0b111
    }

    /// Get the register specified in the `Reg` field, given the operand size.
    pub fn reg_operand(&self, size: OpSize) -> Register {
        Register::from_encoding(self.reg(), size)
    }

    /// Returns the raw R/M field value.
    pub fn rm(&self) -> u8 {
        self.0 & 0b111
    }

    /// Whether the R/M field names a register rather than a memory location.
    pub fn is_register(&self) -> bool {
        self.mode() == AddressingMode::Register
    }
}

/// The possible values of the Mod-Reg-R/M bytes Mod field.
///
/// This is the interpretation in 32-bit mode, 16-bit mode is not supported and
/// interprets these differently.
///
/// For all addressing modes except `Register`, if `R/M == 0b100`, an SIB byte
/// follows the Mod-R/M byte and replaces the base address (the displacement
/// is still applied to the SIB-determined address).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressingMode {
    /// `00` - Operand is in memory, its effective address is a register.
    ///
    /// If `R/M == 0b101`, a 32-bit displacement follows the Mod-R/M byte and
    /// is the absolute address where the operand is stored.
    RegIndirect,

    /// `01` - Same as `RegIndirect`, but followed by a 1-byte/8-bit signed
    /// displacement added to the effective address.
    OneByteDisplacement,

    /// `10` - Same as `RegIndirect`, but followed by a 4-byte/32-bit signed
    /// displacement added to the effective address.
    FourByteDisplacement,

    /// `11` - Register-register op, no memory access. R/M is interpreted just
    /// like Reg.
    Register,
}

/// A decoded Scaled Index Byte (SIB).
///
/// The SIB is followed by a displacement according to the addressing mode
/// specified in the Mod-Reg-R/M byte.
struct Sib {
    /// 1, 2, 4 or 8
    scale: u8,
    /// The index register to multiply with the scale value.
    index: Option<Register>,
    /// The base register, or `None` if Base is `0b101` and Mod is `0b00`.
    base: Option<Register>,
    /// Displacement addr. mode. The Mod-Reg-R/M addressing mode can be
    /// overridden.
    disp_mode: AddressingMode,
}

impl Sib {
    fn decode(raw: u8, mode: AddressingMode) -> Self {
        let (scale, index, base) = (raw >> 6, (raw >> 3) & 0b111, raw & 0b111);

        let index = if index == 0b100 {
            // this would encode ESP, but is special-cased to leave out the index reg
            None
        } else {
            Some(Register::from_encoding(index, OpSize::Bits32))
        };

        let (base, disp_mode) = if base == 0b101 && mode == AddressingMode::RegIndirect {
            // no base register, a disp32 follows instead
            (None, AddressingMode::FourByteDisplacement)
        } else {
            (Some(Register::from_encoding(base, OpSize::Bits32)), mode)
        };

        Sib {
            scale: 1 << scale,
            index,
            base,
            disp_mode,
        }
    }
}

/// Reads additional addressing mode data from the stream, as specified in
/// a Mod-Reg-R/M byte that has already been consumed.
///
/// The result of this is the R/M operand of the instruction.
///
/// # Parameters
///
/// * `modrm`: The Mod-Reg-R/M byte.
/// * `size`: The operation's size (used for register addr. mode and as the
///   access size of memory operands).
pub fn resolve(d: &mut Decoder, modrm: ModRm, size: OpSize) -> Result<Operand, CpuError> {
    let mode = modrm.mode();
    if mode == AddressingMode::Register {
        return Ok(Register::from_encoding(modrm.rm(), size).into());
    }

    if d.prefixes().address_size_override() {
        return Err(CpuError::unsupported("16-bit addressing (address size override)"));
    }

    let addressing = if mode == AddressingMode::RegIndirect && modrm.rm() == 0b101 {
        // displacement-only mode
        Addressing::absolute(d.read_u32()?)
    } else if modrm.rm() == 0b100 {
        let sib = Sib::decode(d.read()?, mode);
        Addressing::Sib {
            scale: sib.scale,
            index: sib.index,
            base: sib.base,
            disp: read_disp(d, sib.disp_mode)?,
        }
    } else {
        // Register-indirect addressing with optional displacement
        Addressing::Disp {
            base: Some(Register::from_encoding(modrm.rm(), OpSize::Bits32)),
            disp: read_disp(d, mode)?,
        }
    };

    Ok(MemoryLocation {
        size,
        segment: d.prefixes().segment().unwrap_or_else(|| addressing.default_segment()),
        offset: effective_address(d.state(), &addressing),
        addressing,
    }.into())
}

fn read_disp(d: &mut Decoder, mode: AddressingMode) -> Result<i32, CpuError> {
    Ok(match mode {
        AddressingMode::OneByteDisplacement => i32::from(d.read()? as i8),
        AddressingMode::FourByteDisplacement => d.read_u32()? as i32,
        _ => 0,
    })
}

/// Computes `base + index * scale + disp` (modulo 2^32) for the current
/// register contents.
pub fn effective_address(state: &State, addressing: &Addressing) -> u32 {
    let reg = |reg: Option<Register>| reg.map(|reg| state.reg(reg)).unwrap_or(0);

    match *addressing {
        Addressing::Disp { base, disp } => reg(base).wrapping_add(disp as u32),
        Addressing::Sib { scale, index, base, disp } => {
            reg(base)
                .wrapping_add(reg(index).wrapping_mul(u32::from(scale)))
                .wrapping_add(disp as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::dispatch::DispatchTable;
    use cpu::instr::{Instr, Segment};
    use memory::Memory;

    /// Decodes `lea eax, <modrm bytes>` and returns the memory location.
    fn lea(state: &State, modrm: &[u8]) -> (MemoryLocation, u32) {
        let mut mem = Memory::new(32);
        let mut code = vec![0x8D];
        code.extend_from_slice(modrm);
        mem.set_bytes(0, &code).unwrap();

        let table = DispatchTable::new();
        let mut d = Decoder::new(&mem, state, 0);
        match d.decode_next(&table).unwrap() {
            Instr::Lea { src, .. } => (src, d.current_address()),
            other => panic!("decoded {:?}", other),
        }
    }

    fn regs() -> State {
        let mut state = State::new(0, 0x1000);
        state.set_eax(0x100);
        state.set_ecx(0x10);
        state.set_edx(0xFFFF_FFF0);
        state.set_ebx(0x2000);
        state.set_esi(3);
        state
    }

    #[test]
    fn register_indirect() {
        let state = regs();
        let (loc, len) = lea(&state, &[0x03]);          // [ebx]
        assert_eq!(loc.offset, 0x2000);
        assert_eq!(len, 2);
        let (loc, len) = lea(&state, &[0x41, 0xFC]);    // [ecx-4]
        assert_eq!(loc.offset, 0xC);
        assert_eq!(len, 3);
        let (loc, len) = lea(&state, &[0x82, 0x20, 0, 0, 0]); // [edx+0x20]
        assert_eq!(loc.offset, 0x10);
        assert_eq!(len, 6);
        assert_eq!(loc.segment, Segment::Ds);
    }

    #[test]
    fn displacement_only() {
        let state = regs();
        let (loc, len) = lea(&state, &[0x05, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(loc.offset, 0x1234_5678);
        assert_eq!(loc.addressing, Addressing::absolute(0x1234_5678));
        assert_eq!(len, 6);
    }

    #[test]
    fn sib_forms() {
        let state = regs();
        // [eax+ecx*4]
        let (loc, len) = lea(&state, &[0x04, 0x88]);
        assert_eq!(loc.offset, 0x140);
        assert_eq!(len, 3);
        // [ebx+esi*8+0x7F]
        let (loc, len) = lea(&state, &[0x44, 0xF3, 0x7F]);
        assert_eq!(loc.offset, 0x2000 + 24 + 0x7F);
        assert_eq!(len, 4);
        // [ecx*2+0x1000], no base
        let (loc, len) = lea(&state, &[0x04, 0x4D, 0x00, 0x10, 0x00, 0x00]);
        assert_eq!(loc.offset, 0x1020);
        assert_eq!(len, 7);
        // [esp], no index
        let (loc, _) = lea(&state, &[0x04, 0x24]);
        assert_eq!(loc.offset, 0x1000);
        // [ebp+edx*1] with mod=01 keeps the base
        let (loc, len) = lea(&state, &[0x44, 0x15, 0x00]);
        assert_eq!(loc.offset, 0x1000u32.wrapping_add(0xFFFF_FFF0));
        assert_eq!(len, 4);
    }

    #[test]
    fn register_operands() {
        let mut mem = Memory::new(16);
        mem.set_bytes(0, &[0x89, 0xC8, 0x88, 0xE1]).unwrap();
        let state = State::new(0, 16);
        let table = DispatchTable::new();
        let mut d = Decoder::new(&mem, &state, 0);
        match d.decode_next(&table).unwrap() {
            Instr::Mov { dest, src } => {
                assert_eq!(dest, Operand::Reg(Register::Eax));
                assert_eq!(src, Operand::Reg(Register::Ecx));
            }
            other => panic!("decoded {:?}", other),
        }
        match d.decode_next(&table).unwrap() {
            Instr::Mov { dest, src } => {
                assert_eq!(dest, Operand::Reg(Register::Cl));
                assert_eq!(src, Operand::Reg(Register::Ah));
            }
            other => panic!("decoded {:?}", other),
        }
    }

    #[test]
    fn default_segments() {
        let state = regs();
        // [esp]
        assert_eq!(lea(&state, &[0x04, 0x24]).0.segment, Segment::Ss);
        // [ebp+0]
        assert_eq!(lea(&state, &[0x45, 0x00]).0.segment, Segment::Ss);
        // [ebp+edx*1+0]
        assert_eq!(lea(&state, &[0x44, 0x15, 0x00]).0.segment, Segment::Ss);
        // [edx+ebp*1], EBP as index keeps DS
        assert_eq!(lea(&state, &[0x04, 0x2A]).0.segment, Segment::Ds);
        // [eax+ecx*4]
        assert_eq!(lea(&state, &[0x04, 0x88]).0.segment, Segment::Ds);
        // [0x1000], displacement-only
        assert_eq!(lea(&state, &[0x05, 0x00, 0x10, 0x00, 0x00]).0.segment, Segment::Ds);

        // ds: override on [ebp+4]
        let mut mem = Memory::new(16);
        mem.set_bytes(0, &[0x3E, 0x8B, 0x45, 0x04]).unwrap();
        let table = DispatchTable::new();
        match Decoder::new(&mem, &state, 0).decode_next(&table).unwrap() {
            Instr::Mov { src: Operand::Mem(loc), .. } => assert_eq!(loc.segment, Segment::Ds),
            other => panic!("decoded {:?}", other),
        }
    }

    #[test]
    fn addressing_round_trip() {
        let bases = [0u32, 1, 0x7FFF_FFFF, 0xFFFF_FFFF, 0x1234_5678];
        let indices = [0u32, 5, 0x8000_0000, 0xFFFF_FFFF];
        let disps = [0i32, 1, -1, 0x7F, -0x80, 0x1234_5678, -0x1234_5678];

        for &base in &bases {
            for &index in &indices {
                for scale_bits in 0..4u8 {
                    for &disp in &disps {
                        let mut state = State::new(0, 0);
                        state.set_ebx(base);
                        state.set_esi(index);

                        // mod=10 rm=100, SIB: scale, index=esi, base=ebx, disp32
                        let mut modrm = vec![0x84, scale_bits << 6 | 0b110 << 3 | 0b011];
                        modrm.extend_from_slice(&(disp as u32).to_le_bytes());
                        let (loc, len) = lea(&state, &modrm);

                        let scale = 1u32 << scale_bits;
                        let expected = base
                            .wrapping_add(index.wrapping_mul(scale))
                            .wrapping_add(disp as u32);
                        assert_eq!(loc.offset, expected);
                        assert_eq!(len, 7);
                    }
                }
            }
        }
    }

    #[test]
    fn address_size_override_is_unsupported() {
        let mut mem = Memory::new(16);
        mem.set_bytes(0, &[0x67, 0x8B, 0x07]).unwrap();
        let state = State::new(0, 16);
        let table = DispatchTable::new();
        match Decoder::new(&mem, &state, 0).decode_next(&table) {
            Err(CpuError::Unsupported(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}
