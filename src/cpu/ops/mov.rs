//! Data movement: `mov` in all its forms, `movzx`, `movsx`, `lea`, `xchg`,
//! `cmovcc` and `setcc`.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};

use num_traits::FromPrimitive;

pub(crate) fn register(table: &mut DispatchTable) {
    table.register_range(0x88..=0x8B, decode_mov_rm);
    table.register(0x8C, decode_mov_from_seg);
    table.register(0x8E, decode_mov_to_seg);
    table.register_range(0xA0..=0xA3, decode_mov_moffs);
    table.register_range(0xB0..=0xBF, decode_mov_imm_reg);
    table.register_range(0xC6..=0xC7, decode_mov_imm_rm);
    table.register(0x8D, decode_lea);
    table.register_range(0x86..=0x87, decode_xchg_rm);
    table.register_range(0x91..=0x97, decode_xchg_acc);
    table.register_range(0x0FB6..=0x0FB7, decode_movx);
    table.register_range(0x0FBE..=0x0FBF, decode_movx);
    table.register_range(0x0F40..=0x0F4F, decode_cmov);
    table.register_range(0x0F90..=0x0F9F, decode_setcc);
}

/// The condition code in the low nibble of the opcode.
fn condition(d: &Decoder) -> Result<ConditionCode, CpuError> {
    ConditionCode::from_u8(d.opcode_byte() & 0x0F).ok_or_else(|| d.ud("invalid condition code"))
}

/// `88`-`8B`. Bit 1 is the direction bit.
fn decode_mov_rm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let reg = modrm.reg_operand(size).into();
    let rm = d.read_rm(modrm, size)?;
    let (dest, src) = if d.opcode_byte() & 0b10 != 0 {
        (reg, rm)
    } else {
        (rm, reg)
    };

    Ok(Some(Instr::Mov { dest, src }))
}

/// `8C`: `mov r/m16, Sreg`. A register destination gets the zero-extended
/// selector.
fn decode_mov_from_seg(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let modrm = d.read_modrm()?;
    let seg = Segment::from_u8(modrm.reg()).ok_or_else(|| d.ud("invalid segment register"))?;
    let size = if modrm.is_register() {
        d.dword_size()
    } else {
        OpSize::Bits16
    };
    let dest = d.read_rm(modrm, size)?;
    Ok(Some(Instr::MovFromSeg { dest, seg }))
}

/// `8E`: `mov Sreg, r/m16`. Loading `CS` this way is undefined.
fn decode_mov_to_seg(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let modrm = d.read_modrm()?;
    let seg = match Segment::from_u8(modrm.reg()) {
        Some(Segment::Cs) | None => return Err(d.ud("invalid segment register")),
        Some(seg) => seg,
    };
    let src = d.read_rm(modrm, OpSize::Bits16)?;
    Ok(Some(Instr::MovToSeg { seg, src }))
}

/// `A0`-`A3`: move between the accumulator and an absolute offset.
fn decode_mov_moffs(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if d.prefixes().address_size_override() {
        return Err(CpuError::unsupported("16-bit memory offset (address size override)"));
    }

    let byte = d.opcode_byte();
    let size = d.opcode_size();
    let offset = d.read_u32()?;
    let mem = MemoryLocation {
        size,
        segment: d.segment(),
        addressing: Addressing::absolute(offset),
        offset,
    }.into();
    let acc = Register::accumulator(size).into();

    let (dest, src) = if byte & 0b10 == 0 {
        (acc, mem)
    } else {
        (mem, acc)
    };
    Ok(Some(Instr::Mov { dest, src }))
}

/// `B0`-`B7`: `mov r8, imm8`. `B8`-`BF`: `mov r32, imm32`.
fn decode_mov_imm_reg(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let byte = d.opcode_byte();
    let size = d.size(byte & 0b1000 != 0);
    let dest = Register::from_encoding(byte & 0b111, size).into();
    let src = d.read_imm(size)?.into();
    Ok(Some(Instr::Mov { dest, src }))
}

/// `C6`/`C7 /0`.
fn decode_mov_imm_rm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if !d.group_is(0)? {
        return Ok(None);
    }

    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let dest = d.read_rm(modrm, size)?;
    let src = d.read_imm(size)?.into();
    Ok(Some(Instr::Mov { dest, src }))
}

fn decode_lea(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let dest = modrm.reg_operand(size);
    let src = d.read_mem(modrm, size)?;
    Ok(Some(Instr::Lea { dest, src }))
}

fn decode_xchg_rm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let b = modrm.reg_operand(size).into();
    let a = d.read_rm(modrm, size)?;
    Ok(Some(Instr::Xchg { a, b }))
}

/// `91`-`97`: `xchg eax, r32`. `90` would be `xchg eax, eax`, which is `nop`.
fn decode_xchg_acc(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    let a = Register::accumulator(size).into();
    let b = Register::from_encoding(d.opcode_byte() & 0b111, size).into();
    Ok(Some(Instr::Xchg { a, b }))
}

/// `0F B6`/`B7` (`movzx`) and `0F BE`/`BF` (`movsx`). The low opcode bit
/// selects an 8- or 16-bit source.
fn decode_movx(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let byte = d.opcode_byte();
    let src_size = if byte & 1 == 0 { OpSize::Bits8 } else { OpSize::Bits16 };
    let modrm = d.read_modrm()?;
    let dest = modrm.reg_operand(d.dword_size());
    let src = d.read_rm(modrm, src_size)?;

    Ok(Some(if byte < 0xBE {
        Instr::MovZx { dest, src }
    } else {
        Instr::MovSx { dest, src }
    }))
}

fn decode_cmov(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let cc = condition(d)?;
    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let dest = modrm.reg_operand(size);
    let src = d.read_rm(modrm, size)?;
    Ok(Some(Instr::CondMove { cc, dest, src }))
}

/// `0F 90`-`9F`. The `Reg` field is ignored.
fn decode_setcc(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let cc = condition(d)?;
    let modrm = d.read_modrm()?;
    let operand = d.read_rm(modrm, OpSize::Bits8)?;
    Ok(Some(Instr::SetIf { cc, operand }))
}

impl<H: SyscallHandler> Interpreter<H> {
    pub(crate) fn exec_mov(&mut self, dest: &Operand, src: &Operand) -> Result<(), CpuError> {
        let value = self.read_operand(src)?;
        self.write_operand(dest, value)
    }

    pub(crate) fn exec_movzx(&mut self, dest: Register, src: &Operand) -> Result<(), CpuError> {
        let value = self.read_operand(src)?;
        self.state.set_reg(dest, value);
        Ok(())
    }

    pub(crate) fn exec_movsx(&mut self, dest: Register, src: &Operand) -> Result<(), CpuError> {
        let value = src.size().sign_extend(self.read_operand(src)?);
        self.state.set_reg(dest, value);
        Ok(())
    }

    pub(crate) fn exec_mov_from_seg(&mut self, dest: &Operand, seg: Segment) -> Result<(), CpuError> {
        let selector = self.mem.segments().selector(seg);
        self.write_operand(dest, u32::from(selector.0))
    }

    pub(crate) fn exec_mov_to_seg(&mut self, seg: Segment, src: &Operand) -> Result<(), CpuError> {
        let selector = self.read_operand(src)? as u16;
        self.load_segment(seg, selector)
    }

    pub(crate) fn exec_xchg(&mut self, a: &Operand, b: &Operand) -> Result<(), CpuError> {
        let (va, vb) = (self.read_operand(a)?, self.read_operand(b)?);
        self.write_operand(a, vb)?;
        self.write_operand(b, va)
    }

    pub(crate) fn exec_cmov(&mut self, cc: ConditionCode, dest: Register, src: &Operand) -> Result<(), CpuError> {
        let value = self.read_operand(src)?;
        if self.condition(cc) {
            self.state.set_reg(dest, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::flags::Flags;
    use cpu::interpret::testutil::*;
    use cpu::segment::{Descriptor, Selector};

    #[test]
    fn mov_forms() {
        // mov [ecx], eax ; mov edx, [ecx] ; mov bl, 0x7f ; mov byte [ecx+1], 0x11
        let cpu = exec("89 01 8B 11 B3 7F C6 41 01 11", |cpu| {
            cpu.state_mut().set_eax(0xAABB_CCDD);
            cpu.state_mut().set_ecx(0x100);
            cpu.state_mut().set_ebx(0xFFFF_FFFF);
        });
        assert_eq!(cpu.state().edx(), 0xAABB_CCDD);
        assert_eq!(cpu.state().ebx(), 0xFFFF_FF7F);
        assert_eq!(cpu.mem().get(0x100, OpSize::Bits32).unwrap(), 0xAABB_11DD);

        // mov ax, 0x1234 keeps the upper half
        let cpu = exec("66 B8 34 12", |cpu| cpu.state_mut().set_eax(0xFFFF_FFFF));
        assert_eq!(cpu.state().eax(), 0xFFFF_1234);
    }

    #[test]
    fn mov_moffs() {
        // mov [0x200], eax ; mov al, [0x201]
        let cpu = exec("A3 00 02 00 00 A0 01 02 00 00", |cpu| cpu.state_mut().set_eax(0x1122_3344));
        assert_eq!(cpu.state().eax(), 0x1122_3333);
    }

    #[test]
    fn lea_computes_without_access() {
        // lea edi, [ebp-0xc00] with ebp pointing far outside of memory
        let cpu = exec("8D BD 00 F4 FF FF", |cpu| cpu.state_mut().set_ebp(0x10_0000));
        assert_eq!(cpu.state().edi(), 0x10_0000 - 0xC00);

        // lea ax, [eax+ecx+0xf]
        let cpu = exec("66 8D 44 08 0F", |cpu| {
            cpu.state_mut().set_eax(0xFFFF_FFF0);
            cpu.state_mut().set_ecx(0x20);
        });
        assert_eq!(cpu.state().eax(), 0xFFFF_001F);
    }

    #[test]
    fn extension() {
        // movzx eax, byte [ebx] ; movsx ecx, byte [ebx] ; movsx edx, word [ebx]
        let cpu = exec("0F B6 03 0F BE 0B 0F BF 13", |cpu| {
            cpu.state_mut().set_ebx(0x100);
            cpu.state_mut().set_eax(0xFFFF_FFFF);
            cpu.mem_mut().set(0x100, OpSize::Bits16, 0x7F80).unwrap();
        });
        assert_eq!(cpu.state().eax(), 0x80);
        assert_eq!(cpu.state().ecx(), 0xFFFF_FF80);
        assert_eq!(cpu.state().edx(), 0x7F80);
    }

    #[test]
    fn xchg() {
        // xchg eax, ecx ; xchg [ebx], dl
        let cpu = exec("91 86 13", |cpu| {
            cpu.state_mut().set_eax(1);
            cpu.state_mut().set_ecx(2);
            cpu.state_mut().set_edx(0xAB);
            cpu.state_mut().set_ebx(0x100);
            cpu.mem_mut().set(0x100, OpSize::Bits8, 0xCD).unwrap();
        });
        assert_eq!(cpu.state().eax(), 2);
        assert_eq!(cpu.state().ecx(), 1);
        assert_eq!(cpu.state().edx(), 0xCD);
        assert_eq!(cpu.mem().get(0x100, OpSize::Bits8).unwrap(), 0xAB);
    }

    #[test]
    fn conditional_moves_and_sets() {
        // cmovz eax, ecx ; cmovnz edx, ecx ; setne bl ; sete bh
        let cpu = exec("0F 44 C1 0F 45 D1 0F 95 C3 0F 94 C7", |cpu| {
            cpu.state_mut().set_ecx(0x55);
            cpu.state_mut().set_ebx(0xFFFF_FFFF);
            cpu.state_mut().set_flags(Flags::ZF);
        });
        assert_eq!(cpu.state().eax(), 0x55);
        assert_eq!(cpu.state().edx(), 0);
        assert_eq!(cpu.state().ebx(), 0xFFFF_0100);

        // the source of cmov is read even when the condition fails
        let (_, result) = try_exec("0F 45 05 00 00 01 00", |cpu| cpu.state_mut().set_flags(Flags::ZF));
        match result {
            Err(CpuError::MemoryFault(_)) => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn segment_loads() {
        let tls = Descriptor { base: 0x400, limit: 0xFF, access: Descriptor::PRESENT | 0x13, flags: 0 };

        // mov fs, ax ; mov ecx, fs ; mov [0x10], fs
        let cpu = exec("8E E0 8C E1 8C 25 10 00 00 00", |cpu| {
            cpu.gdt_mut().set(4, tls.encode());
            cpu.state_mut().set_eax(4 << 3 | 3);
            cpu.state_mut().set_ecx(0xFFFF_FFFF);
            cpu.mem_mut().set(0x10, OpSize::Bits32, 0xAAAA_AAAA).unwrap();
        });
        assert_eq!(cpu.mem().segments().selector(Segment::Fs), Selector(0x23));
        assert_eq!(cpu.mem().segments().hidden_base(Segment::Fs), 0x400);
        assert_eq!(cpu.state().ecx(), 0x23);
        assert_eq!(cpu.mem().get(0x10, OpSize::Bits32).unwrap(), 0xAAAA_0023);
    }

    #[test]
    fn segment_load_errors() {
        // selector beyond the end of the GDT
        let (cpu, result) = try_exec("8E E8", |cpu| cpu.state_mut().set_eax(40 << 3));
        match result {
            Err(CpuError::Unsupported(_)) => {}
            other => panic!("{:?}", other),
        }
        assert_eq!(cpu.state().eip(), 0);

        // LDT selector
        let (_, result) = try_exec("8E E8", |cpu| cpu.state_mut().set_eax(1 << 3 | 1 << 2));
        match result {
            Err(CpuError::Unsupported(_)) => {}
            other => panic!("{:?}", other),
        }

        // mov cs, ax is undefined
        let (_, result) = try_exec("8E C8", |_| {});
        match result {
            Err(CpuError::Decode(_)) => {}
            other => panic!("{:?}", other),
        }
    }
}
