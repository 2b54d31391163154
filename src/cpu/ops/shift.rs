//! Shifts and rotates, including the double-precision `shld`/`shrd`.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::flags::{self, Flags};
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};

use num_traits::FromPrimitive;

pub(crate) fn register(table: &mut DispatchTable) {
    table.register_range(0xC0..=0xC1, decode_shift);
    table.register_range(0xD0..=0xD3, decode_shift);
    table.register_range(0x0FA4..=0x0FA5, decode_double_shift);
    table.register_range(0x0FAC..=0x0FAD, decode_double_shift);
}

/// Shift group 2.
///
/// * `C0`/`C1`: count is an 8-bit immediate
/// * `D0`/`D1`: count is 1
/// * `D2`/`D3`: count is `cl`
fn decode_shift(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let byte = d.opcode_byte();
    let size = d.opcode_size();
    let modrm = d.read_modrm()?;
    let op = ShiftOp::from_u8(modrm.reg()).ok_or_else(|| d.ud("invalid shift op"))?;
    let dest = d.read_rm(modrm, size)?;
    let count = match byte {
        0xC0 | 0xC1 => Immediate::from(d.read()?).into(),
        0xD0 | 0xD1 => Immediate::Imm8(1).into(),
        _ => Register::Cl.into(),
    };

    Ok(Some(Instr::Shift { op, dest, count }))
}

fn decode_double_shift(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let byte = d.opcode_byte();
    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let src = modrm.reg_operand(size);
    let dest = d.read_rm(modrm, size)?;
    let count = if byte & 1 == 0 {
        Immediate::from(d.read()?).into()
    } else {
        Register::Cl.into()
    };

    Ok(Some(Instr::DoubleShift {
        left: byte < 0xAC,
        dest,
        src,
        count,
    }))
}

/// Shifts or rotates `value` by `count` (already masked, nonzero) positions.
///
/// `flags` are the flags before the operation. Returns the result and the
/// updated flags. Rotates only change CF and OF. OF is only defined for
/// single-bit shifts and is left alone otherwise.
pub fn shift(op: ShiftOp, value: u32, count: u32, flags: Flags, size: OpSize) -> (u32, Flags) {
    let msb = size.sign_bit();
    let mask = size.mask();
    let orig = value & mask;
    let carry_in = flags.contains(Flags::CF);

    let mut v = orig;
    let mut cf = carry_in;
    for _ in 0..count {
        match op {
            ShiftOp::Rol => {
                cf = v & msb != 0;
                v = (v << 1 | cf as u32) & mask;
            }
            ShiftOp::Ror => {
                cf = v & 1 != 0;
                v = v >> 1 | if cf { msb } else { 0 };
            }
            ShiftOp::Rcl => {
                let out = v & msb != 0;
                v = (v << 1 | cf as u32) & mask;
                cf = out;
            }
            ShiftOp::Rcr => {
                let out = v & 1 != 0;
                v = v >> 1 | if cf { msb } else { 0 };
                cf = out;
            }
            ShiftOp::Shl | ShiftOp::Sal => {
                cf = v & msb != 0;
                v = (v << 1) & mask;
            }
            ShiftOp::Shr => {
                cf = v & 1 != 0;
                v >>= 1;
            }
            ShiftOp::Sar => {
                cf = v & 1 != 0;
                v = v >> 1 | (v & msb);
            }
        }
    }

    let mut new = flags;
    new.set(Flags::CF, cf);
    if count == 1 {
        let msb_set = v & msb != 0;
        let of = match op {
            ShiftOp::Rol | ShiftOp::Rcl | ShiftOp::Shl | ShiftOp::Sal => msb_set != cf,
            ShiftOp::Ror => msb_set != (v & (msb >> 1) != 0),
            ShiftOp::Rcr => (orig & msb != 0) != carry_in,
            ShiftOp::Shr => orig & msb != 0,
            ShiftOp::Sar => false,
        };
        new.set(Flags::OF, of);
    }

    match op {
        ShiftOp::Shl | ShiftOp::Sal | ShiftOp::Shr | ShiftOp::Sar => {
            let szp = Flags::SF | Flags::ZF | Flags::PF;
            new = (new - szp) | flags::szp(v, size);
        }
        _ => {}
    }

    (v, new)
}

impl<H: SyscallHandler> Interpreter<H> {
    /// A count of 0 (after masking to 5 bits) doesn't write anything, not even
    /// the flags.
    pub(crate) fn exec_shift(&mut self, op: ShiftOp, dest: &Operand, count: &Operand) -> Result<(), CpuError> {
        let count = self.read_operand(count)? & 0x1F;
        if count == 0 {
            return Ok(());
        }

        let value = self.read_operand(dest)?;
        let (result, flags) = shift(op, value, count, self.state.flags(), dest.size());
        self.write_operand(dest, result)?;
        self.state.set_flags(flags);
        Ok(())
    }

    pub(crate) fn exec_double_shift(&mut self, left: bool, dest: &Operand, src: Register, count: &Operand) -> Result<(), CpuError> {
        let count = self.read_operand(count)? & 0x1F;
        if count == 0 {
            return Ok(());
        }

        let size = dest.size();
        let bits = size.bits();
        let d = self.read_operand(dest)?;
        let s = self.state.reg(src);

        let (result, cf) = if left {
            let wide = u64::from(d) << bits | u64::from(s);
            ((wide << count >> bits) as u32, wide >> (2 * bits - count) & 1 != 0)
        } else {
            let wide = u64::from(s) << bits | u64::from(d);
            ((wide >> count) as u32, wide >> (count - 1) & 1 != 0)
        };
        let result = result & size.mask();

        let mut flags = flags::szp(result, size);
        flags.set(Flags::CF, cf);
        let mut mask = Flags::CF | Flags::SF | Flags::ZF | Flags::PF;
        if count == 1 {
            flags.set(Flags::OF, size.is_negative(result) != size.is_negative(d));
            mask |= Flags::OF;
        }

        self.write_operand(dest, result)?;
        self.state.set_status(mask, flags);
        Ok(())
    }
}
