//! Integer arithmetic: `add`, `adc`, `sub`, `sbb`, `cmp`, `inc`, `dec`, `neg`.
//!
//! The ALU encoding is shared with `and`, `or` and `xor`, so those are decoded
//! here too. Their flag rules live in `ops::logic`.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::flags::{self, Flags};
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};
use cpu::ops::logic;

use num_traits::FromPrimitive;

pub(crate) fn register(table: &mut DispatchTable) {
    for opcode in 0x00..=0x3D {
        if opcode & 0b111 <= 0b101 {
            table.register(opcode, decode_alu);
        }
    }
    table.register_range(0x80..=0x83, decode_alu_imm);
    table.register_range(0x40..=0x4F, decode_inc_dec_reg);
    table.register(0xFE, decode_inc_dec);
    table.register(0xFF, decode_inc_dec);
    table.register(0xF6, decode_neg);
    table.register(0xF7, decode_neg);
}

/// ALU opcodes `00`-`3D` with a Mod-Reg-R/M byte or an accumulator and an
/// immediate.
fn decode_alu(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let byte = d.opcode_byte();
    let op = AluOp::from_u8(byte >> 3 & 0b111).ok_or_else(|| d.ud("invalid ALU op"))?;
    let size = d.opcode_size();

    if bitpat!(0 0 _ _ _ 1 0 _)(byte) {
        // ALU op with immediate and al/ax/eax
        let dest = Register::accumulator(size).into();
        let src = d.read_imm(size)?.into();
        return Ok(Some(Instr::Alu { op, dest, src }));
    }

    let modrm = d.read_modrm()?;
    let reg = modrm.reg_operand(size).into();
    let rm = d.read_rm(modrm, size)?;
    // the direction bit selects `reg <- r/m`
    let (dest, src) = if byte & 0b10 != 0 {
        (reg, rm)
    } else {
        (rm, reg)
    };

    Ok(Some(Instr::Alu { op, dest, src }))
}

/// Group 1: `80`-`83 /op r/m, imm`.
fn decode_alu_imm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let op = AluOp::from_u8(modrm.reg()).ok_or_else(|| d.ud("invalid ALU op"))?;
    let dest = d.read_rm(modrm, size)?;
    let imm = if d.opcode_byte() == 0x83 {
        // 8-bit immediate sign-extended to the operand size
        d.read_imm8_sext(size)?
    } else {
        d.read_imm(size)?
    };

    Ok(Some(Instr::Alu { op, dest, src: imm.into() }))
}

/// `40`-`47` is `inc r32`, `48`-`4F` is `dec r32`.
fn decode_inc_dec_reg(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let byte = d.opcode_byte();
    let operand = Register::from_encoding(byte & 0b111, d.dword_size()).into();
    Ok(Some(if byte & 0b1000 == 0 {
        Instr::Inc { operand }
    } else {
        Instr::Dec { operand }
    }))
}

/// `FE`/`FF /0` and `/1`.
fn decode_inc_dec(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if d.peek_modrm()?.reg() > 1 {
        return Ok(None);
    }

    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let operand = d.read_rm(modrm, size)?;
    Ok(Some(if modrm.reg() == 0 {
        Instr::Inc { operand }
    } else {
        Instr::Dec { operand }
    }))
}

/// `F6`/`F7 /3`.
fn decode_neg(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if !d.group_is(3)? {
        return Ok(None);
    }

    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let operand = d.read_rm(modrm, size)?;
    Ok(Some(Instr::Neg { operand }))
}

/// Computes `a + b + carry` on `size`-bit values.
///
/// Returns the truncated result and the resulting status flags.
pub fn add(a: u32, b: u32, carry: bool, size: OpSize) -> (u32, Flags) {
    let mask = size.mask();
    let (a, b) = (a & mask, b & mask);
    let full = u64::from(a) + u64::from(b) + u64::from(carry);
    let c = full as u32 & mask;

    let mut flags = flags::szp(c, size);
    flags.set(Flags::CF, full > u64::from(mask));
    // both inputs have the same sign and the result's sign differs
    flags.set(Flags::OF, size.is_negative((a ^ c) & (b ^ c)));
    flags.set(Flags::AF, (a ^ b ^ c) & 0x10 != 0);
    (c, flags)
}

/// Computes `a - b - borrow` on `size`-bit values.
///
/// Returns the truncated result and the resulting status flags.
pub fn sub(a: u32, b: u32, borrow: bool, size: OpSize) -> (u32, Flags) {
    let mask = size.mask();
    let (a, b) = (a & mask, b & mask);
    let c = a.wrapping_sub(b).wrapping_sub(u32::from(borrow)) & mask;

    let mut flags = flags::szp(c, size);
    flags.set(Flags::CF, u64::from(b) + u64::from(borrow) > u64::from(a));
    // the inputs have different signs and the result's sign differs from `a`
    flags.set(Flags::OF, size.is_negative((a ^ b) & (a ^ c)));
    flags.set(Flags::AF, (a ^ b ^ c) & 0x10 != 0);
    (c, flags)
}

impl<H: SyscallHandler> Interpreter<H> {
    pub(crate) fn exec_alu(&mut self, op: AluOp, dest: &Operand, src: &Operand) -> Result<(), CpuError> {
        let size = dest.size();
        let (a, b) = (self.read_operand(dest)?, self.read_operand(src)?);
        let carry = self.state.flag(Flags::CF);

        let (result, flags) = match op {
            AluOp::Add => add(a, b, false, size),
            AluOp::Adc => add(a, b, carry, size),
            AluOp::Sub | AluOp::Cmp => sub(a, b, false, size),
            AluOp::Sbb => sub(a, b, carry, size),
            AluOp::And => logic::logic(a & b, size),
            AluOp::Or => logic::logic(a | b, size),
            AluOp::Xor => logic::logic(a ^ b, size),
        };

        if op != AluOp::Cmp {
            self.write_operand(dest, result)?;
        }
        self.state.set_status(Flags::STATUS, flags);
        Ok(())
    }

    /// `inc`/`dec` set the flags like `add`/`sub` with 1, but preserve CF.
    pub(crate) fn exec_inc_dec(&mut self, operand: &Operand, inc: bool) -> Result<(), CpuError> {
        let value = self.read_operand(operand)?;
        let (result, flags) = if inc {
            add(value, 1, false, operand.size())
        } else {
            sub(value, 1, false, operand.size())
        };

        self.write_operand(operand, result)?;
        self.state.set_status(Flags::STATUS - Flags::CF, flags);
        Ok(())
    }

    pub(crate) fn exec_neg(&mut self, operand: &Operand) -> Result<(), CpuError> {
        let value = self.read_operand(operand)?;
        // CF ends up set unless the operand is 0
        let (result, flags) = sub(0, value, false, operand.size());
        self.write_operand(operand, result)?;
        self.state.set_status(Flags::STATUS, flags);
        Ok(())
    }
}
