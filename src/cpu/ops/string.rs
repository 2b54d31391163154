//! String instructions and their repeat prefixes.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::flags::Flags;
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};
use cpu::ops::arith;

pub(crate) fn register(table: &mut DispatchTable) {
    table.register_range(0xA4..=0xA7, decode_str);
    table.register_range(0xAA..=0xAF, decode_str);
}

fn decode_str(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if d.prefixes().address_size_override() {
        return Err(CpuError::unsupported("string operation with 16-bit addressing"));
    }

    let op = match d.opcode_byte() {
        0xA4 | 0xA5 => StrOp::Movs,
        0xA6 | 0xA7 => StrOp::Cmps,
        0xAA | 0xAB => StrOp::Stos,
        0xAC | 0xAD => StrOp::Lods,
        _ => StrOp::Scas,
    };

    Ok(Some(Instr::Str {
        op,
        size: d.opcode_size(),
        rep: d.rep(op.compares()),
    }))
}

impl<H: SyscallHandler> Interpreter<H> {
    /// Executes a string instruction.
    ///
    /// With a repeat prefix, the operation runs `ECX` times (possibly 0),
    /// decrementing `ECX` after each element. `repe`/`repne` additionally stop
    /// after the first element for which `ZF` is clear/set.
    pub(crate) fn exec_str(&mut self, op: StrOp, size: OpSize, rep: Option<Rep>) -> Result<(), CpuError> {
        let rep = match rep {
            Some(rep) => rep,
            None => return self.str_element(op, size),
        };

        let mut count = 0u32;
        while self.state.ecx() != 0 {
            self.str_element(op, size)?;
            let ecx = self.state.ecx();
            self.state.set_ecx(ecx - 1);
            count += 1;

            if op.compares() {
                let zf = self.state.flag(Flags::ZF);
                match rep {
                    Rep::Repe if !zf => break,
                    Rep::Repne if zf => break,
                    _ => {}
                }
            }
        }

        debug!("{} {}: {} iterations", rep.mnemonic(), op.mnemonic(), count);
        Ok(())
    }

    /// Processes a single element and advances the index registers.
    ///
    /// The source is read relative to the current data segment, the
    /// destination always lives in `ES`.
    fn str_element(&mut self, op: StrOp, size: OpSize) -> Result<(), CpuError> {
        let step = if self.state.flag(Flags::DF) {
            size.bytes().wrapping_neg()
        } else {
            size.bytes()
        };
        let acc = Register::accumulator(size);
        let (esi, edi) = (self.state.esi(), self.state.edi());

        match op {
            StrOp::Movs => {
                let value = self.mem.get(esi, size)?;
                self.mem.write(Segment::Es, edi, size, value)?;
            }
            StrOp::Stos => {
                let value = self.state.reg(acc);
                self.mem.write(Segment::Es, edi, size, value)?;
            }
            StrOp::Lods => {
                let value = self.mem.get(esi, size)?;
                self.state.set_reg(acc, value);
            }
            StrOp::Scas => {
                let value = self.mem.read(Segment::Es, edi, size)?;
                let (_, flags) = arith::sub(self.state.reg(acc), value, false, size);
                self.state.set_status(Flags::STATUS, flags);
            }
            StrOp::Cmps => {
                let src = self.mem.get(esi, size)?;
                let dest = self.mem.read(Segment::Es, edi, size)?;
                let (_, flags) = arith::sub(src, dest, false, size);
                self.state.set_status(Flags::STATUS, flags);
            }
        }

        match op {
            StrOp::Movs | StrOp::Cmps => {
                self.state.set_esi(esi.wrapping_add(step));
                self.state.set_edi(edi.wrapping_add(step));
            }
            StrOp::Lods => self.state.set_esi(esi.wrapping_add(step)),
            StrOp::Stos | StrOp::Scas => self.state.set_edi(edi.wrapping_add(step)),
        }

        Ok(())
    }
}
