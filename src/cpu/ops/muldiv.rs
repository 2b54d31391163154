//! Multiplication and division.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::flags::Flags;
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};

pub(crate) fn register(table: &mut DispatchTable) {
    table.register(0xF6, decode_group3);
    table.register(0xF7, decode_group3);
    table.register(0x0FAF, decode_imul_rm);
    table.register(0x69, decode_imul_imm);
    table.register(0x6B, decode_imul_imm);
}

/// `F6`/`F7 /4`-`/7`: `mul`, `imul`, `div`, `idiv` with the `A` (and `D`)
/// register as the implicit operand.
fn decode_group3(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if d.peek_modrm()?.reg() < 4 {
        return Ok(None);
    }

    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let operand = d.read_rm(modrm, size)?;
    Ok(Some(match modrm.reg() {
        4 => Instr::Mul { operand },
        5 => Instr::Imul { operand },
        6 => Instr::Div { operand },
        _ => Instr::Idiv { operand },
    }))
}

/// `0F AF`: `imul r, r/m`.
fn decode_imul_rm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let dest = modrm.reg_operand(size);
    let src2 = d.read_rm(modrm, size)?;
    Ok(Some(Instr::ImulTrunc { dest, src1: dest.into(), src2 }))
}

/// `69`: `imul r, r/m, imm`. `6B`: `imul r, r/m, imm8`.
fn decode_imul_imm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let dest = modrm.reg_operand(size);
    let src1 = d.read_rm(modrm, size)?;
    let imm = if d.opcode_byte() == 0x6B {
        d.read_imm8_sext(size)?
    } else {
        d.read_imm(size)?
    };

    Ok(Some(Instr::ImulTrunc { dest, src1, src2: imm.into() }))
}

impl<H: SyscallHandler> Interpreter<H> {
    /// Reads the double-width dividend: `AX`, `DX:AX` or `EDX:EAX`.
    fn dividend(&self, size: OpSize) -> u64 {
        match size {
            OpSize::Bits8 => u64::from(self.state.ax()),
            OpSize::Bits16 => u64::from(self.state.dx()) << 16 | u64::from(self.state.ax()),
            OpSize::Bits32 => u64::from(self.state.edx()) << 32 | u64::from(self.state.eax()),
        }
    }

    /// Writes a result pair: `AL`/`AH`, `AX`/`DX` or `EAX`/`EDX`.
    fn set_pair(&mut self, size: OpSize, low: u32, high: u32) {
        match size {
            OpSize::Bits8 => {
                self.state.set_al(low as u8);
                self.state.set_ah(high as u8);
            }
            OpSize::Bits16 => {
                self.state.set_ax(low as u16);
                self.state.set_dx(high as u16);
            }
            OpSize::Bits32 => {
                self.state.set_eax(low);
                self.state.set_edx(high);
            }
        }
    }

    fn set_mul_overflow(&mut self, overflow: bool) {
        let flags = if overflow { Flags::CF | Flags::OF } else { Flags::empty() };
        self.state.set_status(Flags::CF | Flags::OF, flags);
    }

    pub(crate) fn exec_mul(&mut self, operand: &Operand) -> Result<(), CpuError> {
        let size = operand.size();
        let a = u64::from(self.state.reg(Register::accumulator(size)));
        let b = u64::from(self.read_operand(operand)?);
        let product = a * b;

        let high = (product >> size.bits()) as u32 & size.mask();
        self.set_pair(size, product as u32 & size.mask(), high);
        self.set_mul_overflow(high != 0);
        Ok(())
    }

    pub(crate) fn exec_imul(&mut self, operand: &Operand) -> Result<(), CpuError> {
        let size = operand.size();
        let a = i64::from(size.sign_extend(self.state.reg(Register::accumulator(size))) as i32);
        let b = i64::from(size.sign_extend(self.read_operand(operand)?) as i32);
        let product = a * b;

        let low = product as u32 & size.mask();
        let high = (product >> size.bits()) as u32 & size.mask();
        self.set_pair(size, low, high);
        self.set_mul_overflow(i64::from(size.sign_extend(low) as i32) != product);
        Ok(())
    }

    /// Truncating multiply. CF and OF tell whether the result was truncated.
    pub(crate) fn exec_imul_trunc(&mut self, dest: Register, src1: &Operand, src2: &Operand) -> Result<(), CpuError> {
        let size = dest.size();
        let a = i64::from(size.sign_extend(self.read_operand(src1)?) as i32);
        let b = i64::from(size.sign_extend(self.read_operand(src2)?) as i32);
        let product = a * b;

        let low = product as u32 & size.mask();
        self.state.set_reg(dest, low);
        self.set_mul_overflow(i64::from(size.sign_extend(low) as i32) != product);
        Ok(())
    }

    /// Unsigned division. Nothing is written when the divisor is 0 or the
    /// quotient doesn't fit.
    pub(crate) fn exec_div(&mut self, operand: &Operand) -> Result<(), CpuError> {
        let size = operand.size();
        let divisor = u64::from(self.read_operand(operand)?);
        if divisor == 0 {
            return Err(CpuError::DivideError);
        }

        let dividend = self.dividend(size);
        let (quotient, remainder) = (dividend / divisor, dividend % divisor);
        if quotient > u64::from(size.mask()) {
            return Err(CpuError::DivideError);
        }

        self.set_pair(size, quotient as u32, remainder as u32);
        Ok(())
    }

    /// Signed division, rounding towards 0. The remainder has the sign of the
    /// dividend.
    pub(crate) fn exec_idiv(&mut self, operand: &Operand) -> Result<(), CpuError> {
        let size = operand.size();
        let divisor = i64::from(size.sign_extend(self.read_operand(operand)?) as i32);
        if divisor == 0 {
            return Err(CpuError::DivideError);
        }

        let raw = self.dividend(size);
        let dividend = match size {
            OpSize::Bits8 => i64::from(raw as u16 as i16),
            OpSize::Bits16 => i64::from(raw as u32 as i32),
            OpSize::Bits32 => raw as i64,
        };

        let quotient = dividend.checked_div(divisor).ok_or(CpuError::DivideError)?;
        let remainder = dividend.checked_rem(divisor).ok_or(CpuError::DivideError)?;
        let (min, max) = (-(1i64 << (size.bits() - 1)), (1i64 << (size.bits() - 1)) - 1);
        if quotient < min || quotient > max {
            return Err(CpuError::DivideError);
        }

        self.set_pair(size, quotient as u32, remainder as u32);
        Ok(())
    }
}
