//! Bitwise operations: `test`, `not`, `bt`, `bsf`, `bsr`.
//!
//! `and`, `or` and `xor` are decoded together with the arithmetic ALU ops, but
//! compute their flags with `logic`.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::flags::{self, Flags};
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};

pub(crate) fn register(table: &mut DispatchTable) {
    table.register_range(0x84..=0x85, decode_test_rm);
    table.register_range(0xA8..=0xA9, decode_test_acc);
    table.register(0xF6, decode_group3);
    table.register(0xF7, decode_group3);
    table.register(0x0FA3, decode_bt);
    table.register(0x0FBA, decode_bt_imm);
    table.register_range(0x0FBC..=0x0FBD, decode_bit_scan);
}

/// Flags of a bitwise result: OF, CF and AF are cleared, SF, ZF and PF follow
/// the result.
pub fn logic(result: u32, size: OpSize) -> (u32, Flags) {
    let result = result & size.mask();
    (result, flags::szp(result, size))
}

fn decode_test_rm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let rhs = modrm.reg_operand(size).into();
    let lhs = d.read_rm(modrm, size)?;
    Ok(Some(Instr::Test { lhs, rhs }))
}

fn decode_test_acc(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.opcode_size();
    let lhs = Register::accumulator(size).into();
    let rhs = d.read_imm(size)?.into();
    Ok(Some(Instr::Test { lhs, rhs }))
}

/// `F6`/`F7 /0` (`test r/m, imm`) and `/2` (`not`).
fn decode_group3(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let reg = d.peek_modrm()?.reg();
    if reg != 0 && reg != 2 {
        return Ok(None);
    }

    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let operand = d.read_rm(modrm, size)?;
    Ok(Some(if reg == 0 {
        let imm = d.read_imm(size)?;
        Instr::Test { lhs: operand, rhs: imm.into() }
    } else {
        Instr::Not { operand }
    }))
}

fn decode_bt(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let bit = modrm.reg_operand(size).into();
    let base = d.read_rm(modrm, size)?;
    Ok(Some(Instr::BitTest { base, bit }))
}

/// `0F BA /4 ib`. The other group members (`bts`, `btr`, `btc`) aren't
/// implemented.
fn decode_bt_imm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if !d.group_is(4)? {
        return Ok(None);
    }

    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let base = d.read_rm(modrm, size)?;
    let bit = Immediate::from(d.read()?).into();
    Ok(Some(Instr::BitTest { base, bit }))
}

fn decode_bit_scan(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let dest = modrm.reg_operand(size);
    let src = d.read_rm(modrm, size)?;
    Ok(Some(Instr::BitScan {
        reverse: d.opcode_byte() == 0xBD,
        dest,
        src,
    }))
}

impl<H: SyscallHandler> Interpreter<H> {
    pub(crate) fn exec_test(&mut self, lhs: &Operand, rhs: &Operand) -> Result<(), CpuError> {
        let value = self.read_operand(lhs)? & self.read_operand(rhs)?;
        let (_, flags) = logic(value, lhs.size());
        self.state.set_status(Flags::STATUS, flags);
        Ok(())
    }

    pub(crate) fn exec_not(&mut self, operand: &Operand) -> Result<(), CpuError> {
        let value = self.read_operand(operand)?;
        self.write_operand(operand, !value)
    }

    /// A register bit offset into a memory operand is signed and addresses a
    /// bit string starting at the operand, so it may select a bit in a
    /// neighbouring word. Immediate offsets and register bases wrap at the
    /// operand size.
    pub(crate) fn exec_bit_test(&mut self, base: &Operand, bit: &Operand) -> Result<(), CpuError> {
        let size = base.size();
        let offset = self.read_operand(bit)?;
        let value = match (base, bit) {
            (Operand::Mem(mem), Operand::Reg(_)) => {
                let words = (size.sign_extend(offset) as i32) >> size.bits().trailing_zeros();
                let delta = words.wrapping_mul(size.bytes() as i32) as u32;
                self.read_operand(&Operand::Mem(mem.displaced(delta)))?
            }
            _ => self.read_operand(base)?,
        };
        let bit = offset & (size.bits() - 1);
        self.state.update_flags(Flags::CF, value & (1 << bit) != 0);
        Ok(())
    }

    /// If the source is 0, sets ZF and leaves `dest` alone.
    pub(crate) fn exec_bit_scan(&mut self, reverse: bool, dest: Register, src: &Operand) -> Result<(), CpuError> {
        let value = self.read_operand(src)?;
        if value == 0 {
            self.state.update_flags(Flags::ZF, true);
            return Ok(());
        }

        let index = if reverse {
            31 - value.leading_zeros()
        } else {
            value.trailing_zeros()
        };
        self.state.set_reg(dest, index);
        self.state.update_flags(Flags::ZF, false);
        Ok(())
    }
}
