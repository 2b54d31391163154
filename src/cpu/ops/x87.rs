//! x87 floating-point instructions (escape opcodes `D8` to `DF`).
//!
//! Memory forms are decoded from the `Reg` field of the Mod-Reg-R/M byte.
//! Register forms (`Mod = 11`) are rejected by the memory candidate, so the
//! decoder folds the second byte into the opcode and dispatches them as
//! two-byte opcodes like `D9 E8`.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::f80::{Exceptions, RoundingMode, F80};
use cpu::flags::Flags;
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};

use num_traits::FromPrimitive;

use std::cmp::Ordering;

pub(crate) fn register(table: &mut DispatchTable) {
    table.register_range(0xD8..=0xDF, decode_memory_form);
    table.register_range(0xD8C0..=0xDFFF, decode_register_form);
    table.register(0x9B, decode_wait);
}

fn decode_wait(_: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    Ok(Some(Instr::Fpu(FpuInstr::Wait)))
}

fn decode_memory_form(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let modrm = d.peek_modrm()?;
    if modrm.is_register() {
        return Ok(None);
    }

    let esc = d.opcode_byte();
    let reg = modrm.reg();

    // Escapes with an arithmetic memory form, and its operand format.
    let arith_format = match esc {
        0xD8 => Some(FpuFormat::F32),
        0xDA => Some(FpuFormat::I32),
        0xDC => Some(FpuFormat::F64),
        0xDE => Some(FpuFormat::I16),
        _ => None,
    };

    if let Some(format) = arith_format {
        let modrm = d.read_modrm()?;
        let src = FpuOperand::Mem(format, d.read_mem(modrm, mem_size(format))?);
        let instr = match reg {
            2 | 3 => FpuInstr::Compare { src, pops: reg - 2, unordered: false },
            _ => {
                let op = FpuArith::from_u8(reg).ok_or_else(|| d.ud("invalid x87 arithmetic"))?;
                FpuInstr::Arith { op, dest: 0, src, pop: false }
            }
        };
        return Ok(Some(Instr::Fpu(instr)));
    }

    // (format of loads/stores, or `None` for the control forms)
    let format = match (esc, reg) {
        (0xD9, 0) | (0xD9, 2) | (0xD9, 3) => Some(FpuFormat::F32),
        (0xDD, 0) | (0xDD, 2) | (0xDD, 3) => Some(FpuFormat::F64),
        (0xDD, 1) => Some(FpuFormat::I64),
        (0xDB, 0..=3) => Some(FpuFormat::I32),
        (0xDB, 5) | (0xDB, 7) => Some(FpuFormat::F80),
        (0xDF, 0..=3) => Some(FpuFormat::I16),
        (0xDF, 5) | (0xDF, 7) => Some(FpuFormat::I64),
        (0xD9, 5) | (0xD9, 7) | (0xDD, 7) => None,
        _ => return Err(d.ud("unsupported x87 memory operation")),
    };

    let modrm = d.read_modrm()?;
    let instr = match format {
        Some(format) => {
            let mem = d.read_mem(modrm, mem_size(format))?;
            match reg {
                0 | 5 => FpuInstr::Load(FpuOperand::Mem(format, mem)),
                1 => FpuInstr::StoreTruncate { format, dest: mem },
                2 => FpuInstr::Store { dest: FpuOperand::Mem(format, mem), pop: false },
                _ => FpuInstr::Store { dest: FpuOperand::Mem(format, mem), pop: true },
            }
        }
        None => {
            let mem = d.read_mem(modrm, OpSize::Bits16)?;
            match (esc, reg) {
                (0xD9, 5) => FpuInstr::LoadControl(mem),
                (0xD9, _) => FpuInstr::StoreControl(mem),
                _ => FpuInstr::StoreStatus(Some(mem)),
            }
        }
    };

    Ok(Some(Instr::Fpu(instr)))
}

/// The access size recorded in a memory operand. Wider formats are accessed
/// through `FpuFormat::bytes` instead.
fn mem_size(format: FpuFormat) -> OpSize {
    match format {
        FpuFormat::I16 => OpSize::Bits16,
        _ => OpSize::Bits32,
    }
}

/// The `Mod = 11` forms, dispatched on both opcode bytes.
fn decode_register_form(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let esc = (d.opcode() >> 8) as u8;
    let byte = d.opcode_byte();
    let (reg, i) = ((byte >> 3) & 0b111, byte & 0b111);

    let instr = match (esc, reg) {
        (0xD8, 2) | (0xD8, 3) => FpuInstr::Compare { src: FpuOperand::St(i), pops: reg - 2, unordered: false },
        (0xD8, _) => FpuInstr::Arith { op: arith(reg), dest: 0, src: FpuOperand::St(i), pop: false },
        (0xDC, 0) | (0xDC, 1) | (0xDC, 4..=7) => {
            FpuInstr::Arith { op: arith(reg).reversed(), dest: i, src: FpuOperand::St(0), pop: false }
        }
        (0xDE, 3) if i == 1 => FpuInstr::Compare { src: FpuOperand::St(1), pops: 2, unordered: false },
        (0xDE, 0) | (0xDE, 1) | (0xDE, 4..=7) => {
            FpuInstr::Arith { op: arith(reg).reversed(), dest: i, src: FpuOperand::St(0), pop: true }
        }
        (0xD9, 0) => FpuInstr::Load(FpuOperand::St(i)),
        (0xD9, 1) => FpuInstr::Exchange(i),
        _ => match (esc, byte) {
            (0xD9, 0xD0) => FpuInstr::Nop,
            (0xD9, 0xE0) => FpuInstr::ChangeSign,
            (0xD9, 0xE1) => FpuInstr::Abs,
            (0xD9, 0xE4) => FpuInstr::Test,
            (0xD9, 0xE8) => FpuInstr::LoadConst(FpuConst::One),
            (0xD9, 0xEE) => FpuInstr::LoadConst(FpuConst::Zero),
            (0xDA, 0xE9) => FpuInstr::Compare { src: FpuOperand::St(1), pops: 2, unordered: true },
            (0xDB, 0xE2) => FpuInstr::ClearExceptions,
            (0xDB, 0xE3) => FpuInstr::Init,
            (0xDB, 0xE8..=0xEF) => FpuInstr::CompareFlags { src: i, pop: false, unordered: true },
            (0xDB, 0xF0..=0xF7) => FpuInstr::CompareFlags { src: i, pop: false, unordered: false },
            (0xDD, 0xD0..=0xD7) => FpuInstr::Store { dest: FpuOperand::St(i), pop: false },
            (0xDD, 0xD8..=0xDF) => FpuInstr::Store { dest: FpuOperand::St(i), pop: true },
            (0xDD, 0xE0..=0xE7) => FpuInstr::Compare { src: FpuOperand::St(i), pops: 0, unordered: true },
            (0xDD, 0xE8..=0xEF) => FpuInstr::Compare { src: FpuOperand::St(i), pops: 1, unordered: true },
            (0xDF, 0xE0) => FpuInstr::StoreStatus(None),
            (0xDF, 0xE8..=0xEF) => FpuInstr::CompareFlags { src: i, pop: true, unordered: true },
            (0xDF, 0xF0..=0xF7) => FpuInstr::CompareFlags { src: i, pop: true, unordered: false },
            _ => return Ok(None),
        },
    };

    Ok(Some(Instr::Fpu(instr)))
}

/// Maps the `Reg` field of an arithmetic form to its operation. Only called
/// with values that have one.
fn arith(reg: u8) -> FpuArith {
    FpuArith::from_u8(reg).unwrap_or(FpuArith::Add)
}

/// The value stored by integer conversions whose result doesn't fit.
fn integer_indefinite(format: FpuFormat) -> i64 {
    match format {
        FpuFormat::I16 => i64::from(i16::min_value()),
        FpuFormat::I32 => i64::from(i32::min_value()),
        _ => i64::min_value(),
    }
}

fn integer_range(format: FpuFormat) -> (i64, i64) {
    match format {
        FpuFormat::I16 => (i64::from(i16::min_value()), i64::from(i16::max_value())),
        FpuFormat::I32 => (i64::from(i32::min_value()), i64::from(i32::max_value())),
        _ => (i64::min_value(), i64::max_value()),
    }
}

impl<H: SyscallHandler> Interpreter<H> {
    pub(crate) fn exec_fpu(&mut self, instr: &FpuInstr) -> Result<(), CpuError> {
        match instr {
            FpuInstr::Load(src) => {
                let value = self.fpu_operand(src)?;
                self.fpu.push(value);
            }
            FpuInstr::LoadConst(c) => {
                self.fpu.push(match c {
                    FpuConst::One => F80::ONE,
                    FpuConst::Zero => F80::ZERO,
                });
            }
            FpuInstr::Store { dest, pop } => {
                let value = self.fpu.st(0);
                match dest {
                    FpuOperand::St(i) => self.fpu.set_st(*i, value),
                    FpuOperand::Mem(format, mem) => {
                        let mode = self.fpu.rounding_mode();
                        self.fpu_store(*format, mem, value, mode)?;
                    }
                }
                if *pop {
                    self.fpu.pop();
                }
            }
            FpuInstr::StoreTruncate { format, dest } => {
                let value = self.fpu.st(0);
                self.fpu_store(*format, dest, value, RoundingMode::Zero)?;
                self.fpu.pop();
            }
            FpuInstr::Arith { op, dest, src, pop } => {
                let src = self.fpu_operand(src)?;
                let value = self.fpu.st(*dest);
                let mode = self.fpu.rounding_mode();
                let (result, exc) = match op {
                    FpuArith::Add => value.add(src, mode),
                    FpuArith::Mul => value.mul(src, mode),
                    FpuArith::Sub => value.sub(src, mode),
                    FpuArith::Subr => src.sub(value, mode),
                    FpuArith::Div => value.div(src, mode),
                    FpuArith::Divr => src.div(value, mode),
                };
                self.fpu.raise(exc);
                self.fpu.set_st(*dest, result);
                if *pop {
                    self.fpu.pop();
                }
            }
            FpuInstr::Compare { src, pops, unordered } => {
                let src = self.fpu_operand(src)?;
                let ordering = self.fpu_compare(src, *unordered);
                self.fpu.set_condition(
                    ordering != Some(Ordering::Greater) && ordering != Some(Ordering::Less),
                    ordering.is_none(),
                    ordering != Some(Ordering::Greater) && ordering != Some(Ordering::Equal),
                );
                for _ in 0..*pops {
                    self.fpu.pop();
                }
            }
            FpuInstr::CompareFlags { src, pop, unordered } => {
                let src = self.fpu.st(*src);
                let ordering = self.fpu_compare(src, *unordered);
                let flags = match ordering {
                    None => Flags::ZF | Flags::PF | Flags::CF,
                    Some(Ordering::Less) => Flags::CF,
                    Some(Ordering::Equal) => Flags::ZF,
                    Some(Ordering::Greater) => Flags::empty(),
                };
                self.state.set_status(Flags::STATUS, flags);
                self.fpu.set_c1(false);
                if *pop {
                    self.fpu.pop();
                }
            }
            FpuInstr::Test => {
                let ordering = self.fpu_compare(F80::ZERO, false);
                self.fpu.set_condition(
                    ordering == Some(Ordering::Equal) || ordering.is_none(),
                    ordering.is_none(),
                    ordering == Some(Ordering::Less) || ordering.is_none(),
                );
            }
            FpuInstr::ChangeSign => {
                let value = self.fpu.st(0);
                self.fpu.set_st(0, value.neg());
                self.fpu.set_c1(false);
            }
            FpuInstr::Abs => {
                let value = self.fpu.st(0);
                self.fpu.set_st(0, value.abs());
                self.fpu.set_c1(false);
            }
            FpuInstr::Exchange(i) => {
                let (a, b) = (self.fpu.st(0), self.fpu.st(*i));
                self.fpu.set_st(0, b);
                self.fpu.set_st(*i, a);
                self.fpu.set_c1(false);
            }
            FpuInstr::LoadControl(mem) => {
                let control = self.mem.read(mem.segment, mem.offset, OpSize::Bits16)?;
                self.fpu.set_control_word(control as u16);
            }
            FpuInstr::StoreControl(mem) => {
                let control = self.fpu.control_word();
                self.mem.write(mem.segment, mem.offset, OpSize::Bits16, control.into())?;
            }
            FpuInstr::StoreStatus(Some(mem)) => {
                let status = self.fpu.status_word();
                self.mem.write(mem.segment, mem.offset, OpSize::Bits16, status.into())?;
            }
            FpuInstr::StoreStatus(None) => {
                let status = self.fpu.status_word();
                self.state.set_ax(status);
            }
            FpuInstr::Init => self.fpu.init(),
            FpuInstr::ClearExceptions => self.fpu.clear_exceptions(),
            FpuInstr::Nop | FpuInstr::Wait => {}
        }

        Ok(())
    }

    /// Compares `ST(0)` with `src`. Unordered results raise an invalid
    /// operation, except for quiet NaNs in the `fucom` forms.
    fn fpu_compare(&mut self, src: F80, unordered: bool) -> Option<Ordering> {
        let value = self.fpu.st(0);
        let ordering = value.compare(&src);
        if ordering.is_none() && (!unordered || value.is_signaling() || src.is_signaling()) {
            self.fpu.raise(Exceptions::IE);
        }
        ordering
    }

    /// Reads a register or converts a memory operand to extended precision.
    fn fpu_operand(&mut self, src: &FpuOperand) -> Result<F80, CpuError> {
        let (format, mem) = match src {
            FpuOperand::St(i) => return Ok(self.fpu.st(*i)),
            FpuOperand::Mem(format, mem) => (*format, mem),
        };

        let bytes = self.mem.read_bytes(mem.segment, mem.offset, format.bytes())?;
        let raw = bytes.iter().rev().fold(0u64, |raw, &b| raw << 8 | u64::from(b));

        Ok(match format {
            FpuFormat::F32 => F80::from_f32(f32::from_bits(raw as u32)),
            FpuFormat::F64 => F80::from_f64(f64::from_bits(raw)),
            FpuFormat::F80 => {
                let mut buf = [0; 10];
                buf.copy_from_slice(bytes);
                F80::from_bytes(buf)
            }
            FpuFormat::I16 => F80::from_i64(i64::from(raw as u16 as i16)),
            FpuFormat::I32 => F80::from_i64(i64::from(raw as u32 as i32)),
            FpuFormat::I64 => F80::from_i64(raw as i64),
        })
    }

    /// Converts `value` to `format` and writes it to memory.
    fn fpu_store(
        &mut self,
        format: FpuFormat,
        mem: &MemoryLocation,
        value: F80,
        mode: RoundingMode,
    ) -> Result<(), CpuError> {
        let (raw, exc) = match format {
            FpuFormat::F32 => {
                let (result, exc) = value.to_f32(mode);
                (u64::from(result.to_bits()), exc)
            }
            FpuFormat::F64 => {
                let (result, exc) = value.to_f64(mode);
                (result.to_bits(), exc)
            }
            FpuFormat::F80 => {
                self.mem.write_bytes(mem.segment, mem.offset, &value.to_bytes())?;
                return Ok(());
            }
            FpuFormat::I16 | FpuFormat::I32 | FpuFormat::I64 => {
                let (min, max) = integer_range(format);
                match value.to_i64(mode).filter(|int| *int >= min && *int <= max) {
                    Some(int) => {
                        let exact = F80::from_i64(int).compare(&value) == Some(Ordering::Equal);
                        (int as u64, if exact { Exceptions::empty() } else { Exceptions::PE })
                    }
                    None => {
                        debug!("x87 integer store of {} out of range", value);
                        (integer_indefinite(format) as u64, Exceptions::IE)
                    }
                }
            }
        };

        let mut bytes = [0; 8];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = (raw >> (i * 8)) as u8;
        }
        self.mem.write_bytes(mem.segment, mem.offset, &bytes[..format.bytes() as usize])?;
        self.fpu.raise(exc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::fpu::StatusWord;
    use cpu::interpret::testutil::*;

    fn set_f64(cpu: &mut Interpreter, addr: u32, value: f64) {
        let bits = value.to_bits();
        cpu.mem_mut().set(addr, OpSize::Bits32, bits as u32).unwrap();
        cpu.mem_mut().set(addr + 4, OpSize::Bits32, (bits >> 32) as u32).unwrap();
    }

    fn get_f64(cpu: &Interpreter, addr: u32) -> f64 {
        let lo = u64::from(cpu.mem().get(addr, OpSize::Bits32).unwrap());
        let hi = u64::from(cpu.mem().get(addr + 4, OpSize::Bits32).unwrap());
        f64::from_bits(hi << 32 | lo)
    }

    #[test]
    fn constants_and_popping_add() {
        // fld1 ; fld1 ; faddp st(1),st(0) ; fstp qword [0x100]
        let cpu = exec("D9 E8 D9 E8 DE C1 DD 1D 00 01 00 00", |_| {});
        assert_eq!(get_f64(&cpu, 0x100), 2.0);
        assert_eq!(cpu.fpu().depth(), 0);
        assert_eq!(cpu.fpu().top(), 0);
    }

    #[test]
    fn memory_operands() {
        // fld qword [0x100] ; fmul qword [0x108] ; fsub dword [0x118] ; fstp qword [0x110]
        let cpu = exec("DD 05 00 01 00 00 DC 0D 08 01 00 00 D8 25 18 01 00 00 DD 1D 10 01 00 00", |cpu| {
            set_f64(cpu, 0x100, 1.5);
            set_f64(cpu, 0x108, 4.0);
            cpu.mem_mut().set(0x118, OpSize::Bits32, 0.5f32.to_bits()).unwrap();
        });
        assert_eq!(get_f64(&cpu, 0x110), 5.5);
    }

    #[test]
    fn reversed_operations() {
        // fld qword [0x100] ; fld qword [0x108] ; fdivrp st(1),st(0) ; fstp qword [0x110]
        // ST(1) = ST(0) / ST(1) = 8 / 2
        let cpu = exec("DD 05 00 01 00 00 DD 05 08 01 00 00 DE F1 DD 1D 10 01 00 00", |cpu| {
            set_f64(cpu, 0x100, 2.0);
            set_f64(cpu, 0x108, 8.0);
        });
        assert_eq!(get_f64(&cpu, 0x110), 4.0);

        // fld qword [0x100] ; fld qword [0x108] ; fsub st(1),st(0) ; fstp st(0) ; fstp qword [0x110]
        let cpu = exec("DD 05 00 01 00 00 DD 05 08 01 00 00 DC E9 DD D8 DD 1D 10 01 00 00", |cpu| {
            set_f64(cpu, 0x100, 2.0);
            set_f64(cpu, 0x108, 8.0);
        });
        assert_eq!(get_f64(&cpu, 0x110), -6.0);
    }

    #[test]
    fn formats() {
        // fld dword [0x100] ; fstp tword [0x110] ; fld tword [0x110] ; fstp dword [0x104]
        let cpu = exec("D9 05 00 01 00 00 DB 3D 10 01 00 00 DB 2D 10 01 00 00 D9 1D 04 01 00 00", |cpu| {
            cpu.mem_mut().set(0x100, OpSize::Bits32, (-1.25f32).to_bits()).unwrap();
        });
        assert_eq!(cpu.mem().get(0x104, OpSize::Bits32).unwrap(), (-1.25f32).to_bits());
        assert_eq!(cpu.mem().get_bytes(0x118, 2).unwrap(), &[0xFF, 0xBF]);
    }

    #[test]
    fn integer_conversions() {
        // fild dword [0x100] ; fistp word [0x104]
        let cpu = exec("DB 05 00 01 00 00 DF 1D 04 01 00 00", |cpu| {
            cpu.mem_mut().set(0x100, OpSize::Bits32, -7i32 as u32).unwrap();
        });
        assert_eq!(cpu.mem().get(0x104, OpSize::Bits16).unwrap(), 0xFFF9);

        // fild qword [0x100] ; fistp qword [0x108]
        let cpu = exec("DF 2D 00 01 00 00 DF 3D 08 01 00 00", |cpu| {
            cpu.mem_mut().set(0x100, OpSize::Bits32, 0x8765_4321).unwrap();
            cpu.mem_mut().set(0x104, OpSize::Bits32, 0x1234).unwrap();
        });
        assert_eq!(cpu.mem().get(0x108, OpSize::Bits32).unwrap(), 0x8765_4321);
        assert_eq!(cpu.mem().get(0x10C, OpSize::Bits32).unwrap(), 0x1234);
    }

    #[test]
    fn rounding_control() {
        // fld qword [0x108] ; fistp dword [0x110]
        let code = "DD 05 08 01 00 00 DB 1D 10 01 00 00";
        let cpu = exec(code, |cpu| set_f64(cpu, 0x108, 2.7));
        assert_eq!(cpu.mem().get(0x110, OpSize::Bits32).unwrap(), 3);
        assert!(cpu.fpu().status().contains(StatusWord::PE));

        // fldcw [0x100] ; ..=
        let code = "D9 2D 00 01 00 00 DD 05 08 01 00 00 DB 1D 10 01 00 00";
        let cpu = exec(code, |cpu| {
            cpu.mem_mut().set(0x100, OpSize::Bits16, 0x0F7F).unwrap();
            set_f64(cpu, 0x108, 2.7);
        });
        assert_eq!(cpu.mem().get(0x110, OpSize::Bits32).unwrap(), 2);

        let cpu = exec(code, |cpu| {
            cpu.mem_mut().set(0x100, OpSize::Bits16, 0x077F).unwrap();
            set_f64(cpu, 0x108, -2.2);
        });
        assert_eq!(cpu.mem().get(0x110, OpSize::Bits32).unwrap(), -3i32 as u32);
    }

    #[test]
    fn truncating_store() {
        // fld qword [0x108] ; fisttp qword [0x110]
        let cpu = exec("DD 05 08 01 00 00 DD 0D 10 01 00 00", |cpu| set_f64(cpu, 0x108, -2.7));
        assert_eq!(cpu.mem().get(0x110, OpSize::Bits32).unwrap(), -2i32 as u32);
        assert_eq!(cpu.mem().get(0x114, OpSize::Bits32).unwrap(), 0xFFFF_FFFF);
        assert_eq!(cpu.fpu().depth(), 0);
    }

    #[test]
    fn integer_overflow_stores_indefinite() {
        // fld qword [0x108] ; fistp dword [0x110]
        let cpu = exec("DD 05 08 01 00 00 DB 1D 10 01 00 00", |cpu| set_f64(cpu, 0x108, 1e10));
        assert_eq!(cpu.mem().get(0x110, OpSize::Bits32).unwrap(), 0x8000_0000);
        assert!(cpu.fpu().status().contains(StatusWord::IE));
    }

    #[test]
    fn division_by_zero() {
        // fld1 ; fldz ; fdivp st(1),st(0) ; fstp qword [0x100]
        let cpu = exec("D9 E8 D9 EE DE F9 DD 1D 00 01 00 00", |_| {});
        assert_eq!(get_f64(&cpu, 0x100), ::std::f64::INFINITY);
        assert!(cpu.fpu().status().contains(StatusWord::ZE));

        // fldz ; fldz ; fdivp ; fstp
        let cpu = exec("D9 EE D9 EE DE F9 DD 1D 00 01 00 00", |_| {});
        assert!(get_f64(&cpu, 0x100).is_nan());
        assert!(cpu.fpu().status().contains(StatusWord::IE));
    }

    #[test]
    fn compare_through_status_word() {
        // fld1 ; fldz ; fcompp ; fnstsw ax ; sahf
        let cpu = exec("D9 E8 D9 EE DE D9 DF E0 9E", |_| {});
        assert_eq!(cpu.state().ax() & 0x4500, 0x0100);
        assert!(cpu.state().flag(Flags::CF));
        assert!(!cpu.state().flag(Flags::ZF));
        assert_eq!(cpu.fpu().depth(), 0);

        // fld1 ; fld1 ; fucompp ; fnstsw word [0x100]
        let cpu = exec("D9 E8 D9 E8 DA E9 DD 3D 00 01 00 00", |_| {});
        assert_eq!(cpu.mem().get(0x100, OpSize::Bits16).unwrap() & 0x4500, 0x4000);

        // fldz ; ftst
        let cpu = exec("D9 EE D9 E4", |_| {});
        assert!(cpu.fpu().status().contains(StatusWord::C3));
    }

    #[test]
    fn compare_into_eflags() {
        // fld1 ; fldz ; fucomip st(0),st(1)
        let cpu = exec("D9 E8 D9 EE DF E9", |cpu| cpu.state_mut().set_flags(Flags::OF | Flags::SF));
        assert_eq!(cpu.state().flags(), Flags::CF);
        assert_eq!(cpu.fpu().depth(), 1);

        // fldz ; fld1 ; fcomi st(0),st(1)
        let cpu = exec("D9 EE D9 E8 DB F1", |_| {});
        assert_eq!(cpu.state().flags(), Flags::empty());
        assert_eq!(cpu.fpu().depth(), 2);

        // NaN operands are unordered
        let cpu = exec("D9 EE D9 EE DE F9 D9 E8 DB E9", |_| {});
        assert_eq!(cpu.state().flags(), Flags::ZF | Flags::PF | Flags::CF);
    }

    #[test]
    fn stack_manipulation() {
        // fld1 ; fldz ; fxch st(1) ; fchs ; fstp qword [0x100] ; fld st(0) ; faddp ; fstp qword [0x108]
        let cpu = exec("D9 E8 D9 EE D9 C9 D9 E0 DD 1D 00 01 00 00 D9 C0 DE C1 DD 1D 08 01 00 00", |_| {});
        assert_eq!(get_f64(&cpu, 0x100), -1.0);
        assert_eq!(get_f64(&cpu, 0x108), 0.0);
        assert_eq!(cpu.fpu().depth(), 0);

        // fld1 ; fchs ; fabs
        let mut cpu = exec("D9 E8 D9 E0 D9 E1", |_| {});
        assert_eq!(cpu.fpu_mut().st(0), F80::ONE);
    }

    #[test]
    fn stack_overflow_sets_stack_fault() {
        let code = "D9 E8 ".repeat(9);
        let mut cpu = exec(&code, |_| {});
        assert!(cpu.fpu().status().contains(StatusWord::IE | StatusWord::SF | StatusWord::C1));
        assert_eq!(cpu.fpu_mut().st(0), F80::INDEFINITE);
    }

    #[test]
    fn control_words() {
        // fnstcw [0x100] ; fld1 ; fninit ; fnstsw ax ; fwait ; fnop
        let cpu = exec("D9 3D 00 01 00 00 D9 E8 DB E3 DF E0 9B D9 D0", |cpu| cpu.state_mut().set_eax(0xFFFF));
        assert_eq!(cpu.mem().get(0x100, OpSize::Bits16).unwrap(), 0x037F);
        assert_eq!(cpu.state().ax(), 0);
        assert_eq!(cpu.fpu().depth(), 0);

        // fldz ; fldz ; fdivp ; fnclex
        let cpu = exec("D9 EE D9 EE DE F9 DB E2", |_| {});
        assert!(cpu.fpu().status().is_empty());
    }

    #[test]
    fn unsupported_encodings() {
        // fldenv / fbld / ffree
        for code in &["D9 20", "DF 20", "DD C0"] {
            let (_, result) = try_exec(code, |_| {});
            match result {
                Err(CpuError::Decode(_)) => {}
                other => panic!("{}: expected decode error, got {:?}", code, other),
            }
        }
    }
}
