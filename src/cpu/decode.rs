//! x86 instruction decoder.
//!
//! The `Decoder` is a cursor over the instruction stream. It collects prefix
//! bytes and forms the opcode identity, then hands itself to the candidates
//! registered for that opcode in the `DispatchTable`. Candidates use the
//! `peek*` methods to check whether they match before they consume anything.

use cpu::dispatch::DispatchTable;
use cpu::instr::*;
use cpu::interpret::CpuError;
use cpu::modrm::{self, ModRm};
use cpu::prefix::RawPrefixes;
use cpu::state::State;
use memory::Memory;

use std::error::Error;
use std::fmt;

/// The architectural limit of an x86 instruction's length, including prefixes.
pub const MAX_INSTR_LEN: u32 = 15;

/// x86 machine instruction decoder.
#[derive(Debug)]
pub struct Decoder<'a> {
    mem: &'a Memory,
    /// Register contents used to compute effective addresses.
    state: &'a State,
    /// Address of the first byte (including prefixes) of the current instruction.
    start: u32,
    /// Virtual address of the next byte that will be loaded from memory.
    pos: u32,
    prefixes: RawPrefixes,
    /// The opcode identity: 1 byte, `0x0F` followed by a byte, or one of those
    /// extended by the following byte.
    opcode: u32,
}

impl<'a> Decoder<'a> {
    /// Creates a new instruction decoder.
    ///
    /// # Parameters
    ///
    /// * `mem`: The memory to fetch from (through `CS`).
    /// * `state`: Registers used when resolving memory operands.
    /// * `eip`: The address at which to start decoding.
    pub fn new(mem: &'a Memory, state: &'a State, eip: u32) -> Self {
        Self {
            mem,
            state,
            start: eip,
            pos: eip,
            prefixes: RawPrefixes::empty(),
            opcode: 0,
        }
    }

    /// Returns the address of the next byte the decoder will read.
    ///
    /// After a successful `decode_next`, this is the address of the following
    /// instruction.
    pub fn current_address(&self) -> u32 {
        self.pos
    }

    /// Returns the address of the instruction currently being decoded.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Number of bytes consumed for the current instruction so far.
    pub fn len(&self) -> u32 {
        self.pos.wrapping_sub(self.start)
    }

    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    /// The last opcode byte. Many encodings carry a size or direction bit in
    /// here.
    pub fn opcode_byte(&self) -> u8 {
        self.opcode as u8
    }

    pub fn prefixes(&self) -> RawPrefixes {
        self.prefixes
    }

    pub fn state(&self) -> &State {
        self.state
    }

    /// Read and decode the next instruction in the stream.
    ///
    /// If this returns an error, the decoder's address most likely points into
    /// the middle of the instruction and the decoder should not be used for
    /// further instruction decoding.
    pub fn decode_next(&mut self, table: &DispatchTable) -> Result<Instr, CpuError> {
        self.start = self.pos;
        self.prefixes = RawPrefixes::empty();
        self.opcode = 0;

        let mut byte = self.read()?;

        // Collect prefix bytes
        loop {
            match self.prefixes.decode(byte) {
                Ok(new) => self.prefixes = new,
                Err(_) => break,
            }
            byte = self.read()?;
        }

        self.opcode = u32::from(byte);
        if byte == 0x0F {
            self.opcode = 0x0F00 | u32::from(self.read()?);
        }

        if let Some(instr) = table.dispatch(self)? {
            return Ok(instr);
        }

        // No candidate accepted the short form, retry once with the next byte
        // folded into the opcode (x87 register forms are registered this way).
        let next = match self.read() {
            Ok(next) => next,
            Err(CpuError::MemoryFault(_)) => return Err(self.ud("unknown opcode")),
            Err(e) => return Err(e),
        };
        self.opcode = self.opcode << 8 | u32::from(next);

        match table.dispatch(self)? {
            Some(instr) => Ok(instr),
            None => Err(self.ud("unknown opcode")),
        }
    }

    /// Reads the next instruction byte.
    pub fn read(&mut self) -> Result<u8, CpuError> {
        if self.len() >= MAX_INSTR_LEN {
            return Err(self.ud("instruction exceeds 15 bytes"));
        }

        let byte = self.mem.fetch(self.pos)?;
        self.pos = self.pos.wrapping_add(1);
        Ok(byte)
    }

    /// Returns the next instruction byte without consuming it.
    pub fn peek(&self) -> Result<u8, CpuError> {
        Ok(self.mem.fetch(self.pos)?)
    }

    pub fn read_u16(&mut self) -> Result<u16, CpuError> {
        let lo = u16::from(self.read()?);
        let hi = u16::from(self.read()?);
        Ok(hi << 8 | lo)
    }

    pub fn read_u32(&mut self) -> Result<u32, CpuError> {
        let lo = u32::from(self.read_u16()?);
        let hi = u32::from(self.read_u16()?);
        Ok(hi << 16 | lo)
    }

    pub fn read_i8(&mut self) -> Result<i8, CpuError> {
        Ok(self.read()? as i8)
    }

    /// Reads an immediate of the given size.
    pub fn read_imm(&mut self, size: OpSize) -> Result<Immediate, CpuError> {
        Ok(match size {
            OpSize::Bits8 => Immediate::from(self.read()?),
            OpSize::Bits16 => Immediate::from(self.read_u16()?),
            OpSize::Bits32 => Immediate::from(self.read_u32()?),
        })
    }

    /// Reads an 8-bit immediate and sign-extends it to `size`.
    pub fn read_imm8_sext(&mut self, size: OpSize) -> Result<Immediate, CpuError> {
        Ok(Immediate::from(self.read_i8()?).sign_ext_to(size))
    }

    /// Returns the next byte interpreted as a Mod-Reg-R/M byte, without
    /// consuming it.
    pub fn peek_modrm(&self) -> Result<ModRm, CpuError> {
        self.peek().map(ModRm)
    }

    /// Checks whether the upcoming Mod-Reg-R/M byte selects `reg` in an
    /// opcode group.
    pub fn group_is(&self, reg: u8) -> Result<bool, CpuError> {
        Ok(self.peek_modrm()?.reg() == reg)
    }

    pub fn read_modrm(&mut self) -> Result<ModRm, CpuError> {
        self.read().map(ModRm)
    }

    /// Reads the rest of the R/M operand described by `modrm`.
    pub fn read_rm(&mut self, modrm: ModRm, size: OpSize) -> Result<Operand, CpuError> {
        modrm::resolve(self, modrm, size)
    }

    /// Like `read_rm`, for instructions whose R/M operand must be in memory.
    pub fn read_mem(&mut self, modrm: ModRm, size: OpSize) -> Result<MemoryLocation, CpuError> {
        match self.read_rm(modrm, size)? {
            Operand::Mem(mem) => Ok(mem),
            _ => Err(self.ud("register operand where memory is required")),
        }
    }

    /// Determine the operand size, given the size bit from the opcode.
    pub fn size(&self, size_bit: bool) -> OpSize {
        self.prefixes.size(size_bit)
    }

    /// The operand size selected by the lowest opcode bit.
    pub fn opcode_size(&self) -> OpSize {
        self.size(self.opcode & 1 != 0)
    }

    /// The size of operands that are 32-bit by default (`push`, `pop`, ...).
    pub fn dword_size(&self) -> OpSize {
        self.size(true)
    }

    /// The override segment, or `DS`. ModRM operands use
    /// `Addressing::default_segment` instead.
    pub fn segment(&self) -> Segment {
        self.prefixes.segment().unwrap_or(Segment::Ds)
    }

    /// The repeat prefix of a string instruction.
    pub fn rep(&self, compares: bool) -> Option<Rep> {
        if self.prefixes.contains(RawPrefixes::REPNE) {
            Some(Rep::Repne)
        } else if self.prefixes.contains(RawPrefixes::REP_REPE) {
            Some(if compares { Rep::Repe } else { Rep::Rep })
        } else {
            None
        }
    }

    /// Reads a relative branch displacement of `size` and returns the
    /// absolute target as an operand.
    ///
    /// The target is relative to the end of the instruction, so the
    /// displacement has to be the last part of it. A 16-bit operand size
    /// truncates the target to 16 bits.
    pub fn read_rel(&mut self, size: OpSize) -> Result<Operand, CpuError> {
        let rel = match size {
            OpSize::Bits8 => i32::from(self.read_i8()?),
            OpSize::Bits16 => i32::from(self.read_u16()? as i16),
            OpSize::Bits32 => self.read_u32()? as i32,
        };

        let mut target = self.pos.wrapping_add(rel as u32);
        if self.dword_size() == OpSize::Bits16 {
            target &= 0xFFFF;
        }

        Ok(Immediate::Imm32(target as i32).into())
    }

    /// Creates an error for an undefined encoding at the current instruction.
    #[cold]
    pub fn ud<S: Into<String>>(&self, why: S) -> CpuError {
        DecodeError::new(self.start, self.opcode, why).into()
    }
}

/// No instruction matched the bytes at an address (`#UD`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Address of the offending instruction.
    pub eip: u32,
    /// The opcode identity formed so far.
    pub opcode: u32,
    pub why: String,
}

impl DecodeError {
    #[cold]
    pub(crate) fn new<S: Into<String>>(eip: u32, opcode: u32, why: S) -> Self {
        DecodeError {
            eip,
            opcode,
            why: why.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "undefined instruction at {:#010X} (opcode {:#X}): {}", self.eip, self.opcode, self.why)
    }
}

impl Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(rawstr: &str) -> Result<(Instr, u32), CpuError> {
        let bytes: Vec<_> = rawstr.split_whitespace()
            .map(|hexstr| u8::from_str_radix(hexstr, 16).unwrap())
            .collect();

        let mut mem = Memory::new(bytes.len() as u32);
        mem.set_bytes(0, &bytes).unwrap();
        let state = State::new(0, 0);
        let table = DispatchTable::new();
        let mut dec = Decoder::new(&mem, &state, 0);
        let instr = dec.decode_next(&table)?;
        Ok((instr, dec.current_address()))
    }

    fn decodes_as(rawstr: &str, printed: &str) {
        let (instr, len) = decode(rawstr).unwrap();
        assert_eq!(instr.to_string(), printed);
        assert_eq!(len as usize, rawstr.split_whitespace().count(), "{} consumed wrong byte count", printed);
    }

    /// Combined decoder and printer test. Every case must consume all of the
    /// given bytes.
    #[test]
    fn disassemble_smoke() {
        decodes_as("8D 44 08 0F", "lea eax,[eax+ecx+0xf]");
        decodes_as("8D 44 08 FE", "lea eax,[eax+ecx-0x2]");
        decodes_as("F7 F9", "idiv ecx");
        decodes_as("73 02", "jnc 0x00000004");
        decodes_as("99", "cdq");
        decodes_as("66 99", "cwd");
        decodes_as("33 F6", "xor esi,esi");
        decodes_as("83 E0 F0", "and eax,0xfffffff0");
        decodes_as("89 01", "mov [ecx],eax");
        decodes_as("68 9B D8 04 00", "push dword 0x4d89b");
        decodes_as("5F", "pop edi");
        decodes_as("C3", "ret");
        decodes_as("C2 10 00", "ret 16");
        decodes_as("81 78 08 00 00 FE FF", "cmp dword [eax+0x8],0xfffe0000");
        decodes_as("81 78 ff 00 00 FE FF", "cmp dword [eax-0x1],0xfffe0000");
        decodes_as("8D BD 00 F4 FF FF", "lea edi,[ebp-0xc00]");
        decodes_as("6b 84 8b ab 00 00 00 02", "imul eax,[ebx+ecx*4+0xab],2");
        decodes_as("85 C0", "test eax,eax");
        decodes_as("C1 E9 02", "shr ecx,2");
        decodes_as("D1 E0", "shl eax,1");
        decodes_as("D3 7D 08", "sar dword [ebp+0x8],cl");
        decodes_as("FF 74 24 04", "push dword [esp+0x4]");
        decodes_as("F3 AB", "rep stosd");
        decodes_as("F3 A6", "repe cmpsb");
        decodes_as("F2 AE", "repne scasb");
        decodes_as("C9", "leave");
        decodes_as("C7 45 F4 40 00 00 00", "mov dword [ebp-0xc],0x40");
        decodes_as("0F AF 45 E8", "imul eax,[ebp-0x18]");
        decodes_as("0F 95 C1", "setne cl");
        decodes_as("0F 84 AE 00 00 00", "je 0x000000B4");
        decodes_as("FF 24 85 C1 D7 15 00", "jmp dword [eax*4+0x15d7c1]");
        decodes_as("64 0F B6 05 24 00 00 00", "movzx eax,byte [fs:0x24]");
        decodes_as("64 0F BE 05 24 00 00 00", "movsx eax,byte [fs:0x24]");
        decodes_as("A8 82", "test al,0x82");
        decodes_as("E8 FB FF FF FF", "call 0x00000000");
        decodes_as("CD 80", "int 0x80");
        decodes_as("8E E8", "mov gs,ax");
        decodes_as("65 A1 14 00 00 00", "mov eax,[gs:0x14]");
        decodes_as("0F A2", "cpuid");
        decodes_as("0F 1F 00", "nop");
        decodes_as("F4", "hlt");
    }

    #[test]
    fn disassemble_fpu() {
        decodes_as("D9 45 08", "fld dword [ebp+0x8]");
        decodes_as("DD 04 24", "fld qword [esp]");
        decodes_as("DB 28", "fld tword [eax]");
        decodes_as("D9 C1", "fld st(1)");
        decodes_as("D9 E8", "fld1");
        decodes_as("D9 EE", "fldz");
        decodes_as("DF 2C 24", "fild qword [esp]");
        decodes_as("DC C9", "fmul st(1),st(0)");
        decodes_as("D8 C1", "fadd st(0),st(1)");
        decodes_as("DE F9", "fdivp st(1),st(0)");
        decodes_as("DE E9", "fsubp st(1),st(0)");
        decodes_as("D8 65 F8", "fsub dword [ebp-0x8]");
        decodes_as("DD 5D F8", "fstp qword [ebp-0x8]");
        decodes_as("DB 1C 24", "fistp dword [esp]");
        decodes_as("DD 0C 24", "fisttp qword [esp]");
        decodes_as("DF E0", "fnstsw ax");
        decodes_as("D9 7D FE", "fnstcw word [ebp-0x2]");
        decodes_as("DB E9", "fucomi st(0),st(1)");
        decodes_as("DF F1", "fcomip st(0),st(1)");
        decodes_as("DE D9", "fcompp");
        decodes_as("D9 C9", "fxch st(1)");
        decodes_as("D9 E0", "fchs");
        decodes_as("DB E3", "fninit");
        decodes_as("9B", "fwait");
    }

    #[test]
    fn group_opcodes_are_deterministic() {
        let ops = ["add", "or", "adc", "sbb", "and", "sub", "xor", "cmp"];
        for reg in 0..8u8 {
            let modrm = 0xC0 | reg << 3;
            let (instr, len) = decode(&format!("81 {:02X} 05 00 00 00", modrm)).unwrap();
            assert_eq!(instr.to_string(), format!("{} eax,{}", ops[reg as usize], if reg == 1 || reg == 4 || reg == 6 || reg == 7 { "0x5" } else { "5" }));
            assert_eq!(len, 6);
        }

        let f7 = ["test eax,0x1", "", "not eax", "neg eax", "mul eax", "imul eax", "div eax", "idiv eax"];
        for reg in 0..8u8 {
            let modrm = format!("{:02X}", 0xC0 | reg << 3);
            if reg == 1 {
                // `/1` is undefined
                assert!(decode(&format!("F7 {}", modrm)).is_err());
                continue;
            }
            let raw = if reg == 0 { format!("F7 {} 01 00 00 00", modrm) } else { format!("F7 {}", modrm) };
            let (instr, len) = decode(&raw).unwrap();
            assert_eq!(instr.to_string(), f7[reg as usize]);
            assert_eq!(len as usize, raw.split_whitespace().count());
        }
    }

    #[test]
    fn length_limit() {
        decodes_as(
            "66 66 66 66 66 66 66 66 66 66 66 66 66 66 99",
            "cwd"
        );
        match decode("66 66 66 66 66 66 66 66 66 66 66 66 66 66 66 99") {
            Err(CpuError::Decode(_)) => {}
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_opcodes() {
        for raw in &["0F 0B", "D6", "8D C0", "FF FF", "8E C8"] {
            match decode(raw) {
                Err(CpuError::Decode(e)) => assert_eq!(e.eip, 0),
                other => panic!("{}: expected decode error, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn far_transfers_are_unsupported() {
        for raw in &["EA 00 00 00 00 08 00", "9A 00 00 00 00 08 00", "CB", "CA 04 00", "FF 18", "FF 2D 00 00 00 00"] {
            match decode(raw) {
                Err(CpuError::Unsupported(_)) => {}
                other => panic!("{}: expected unsupported, got {:?}", raw, other),
            }
        }
    }
}
