//! Sign extension of the accumulator, direct flag manipulation, `cpuid` and
//! the various `nop`s.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::flags::Flags;
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};

pub(crate) fn register(table: &mut DispatchTable) {
    for &opcode in &[0x98, 0x99, 0x9E, 0x9F, 0xF4, 0xF5, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0x90, 0x0FA2] {
        table.register(opcode, decode_implicit);
    }
    table.register(0x0F1F, decode_nop_rm);
}

/// Instructions that consist of nothing but their opcode.
fn decode_implicit(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let word = d.dword_size() == OpSize::Bits16;
    Ok(Some(match d.opcode() {
        0x98 if word => Instr::Cbw,
        0x98 => Instr::Cwde,
        0x99 if word => Instr::Cwd,
        0x99 => Instr::Cdq,
        0x9E => Instr::Sahf,
        0x9F => Instr::Lahf,
        0xF4 => Instr::Hlt,
        0xF5 => Instr::Cmc,
        0xF8 => Instr::Clc,
        0xF9 => Instr::Stc,
        0xFA => Instr::Cli,
        0xFB => Instr::Sti,
        0xFC => Instr::Cld,
        0xFD => Instr::Std,
        0x0FA2 => Instr::Cpuid,
        _ => Instr::Nop,
    }))
}

/// `0F 1F /0`: the multi-byte `nop`. The operand is decoded but never
/// accessed.
fn decode_nop_rm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if !d.group_is(0)? {
        return Ok(None);
    }

    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    d.read_rm(modrm, size)?;
    Ok(Some(Instr::Nop))
}

/// `cpuid` leaf 0: the highest supported leaf and the vendor string
/// "GenuineIntel" (in `EBX`, `EDX`, `ECX`).
const VENDOR: [u32; 3] = [0x756E_6547, 0x4965_6E69, 0x6C65_746E];

/// `cpuid` leaf 1, `EAX`: family 6, model 3, stepping 3.
const SIGNATURE: u32 = 0x0633;

/// `cpuid` leaf 1, `EDX`: FPU, TSC, CX8 and CMOV.
const FEATURES: u32 = 1 << 0 | 1 << 4 | 1 << 8 | 1 << 15;

impl<H: SyscallHandler> Interpreter<H> {
    pub(crate) fn exec_convert(&mut self, instr: &Instr) {
        match instr {
            Instr::Cbw => {
                let ax = OpSize::Bits8.sign_extend(self.state.eax());
                self.state.set_ax(ax as u16);
            }
            Instr::Cwde => {
                let eax = OpSize::Bits16.sign_extend(self.state.eax());
                self.state.set_eax(eax);
            }
            Instr::Cwd => {
                let dx = if self.state.ax() & 0x8000 != 0 { 0xFFFF } else { 0 };
                self.state.set_dx(dx);
            }
            Instr::Cdq => {
                let edx = if self.state.eax() & 0x8000_0000 != 0 { 0xFFFF_FFFF } else { 0 };
                self.state.set_edx(edx);
            }
            _ => {}
        }
    }

    pub(crate) fn exec_lahf(&mut self) {
        let ah = (self.state.flags() & Flags::AH).bits() | 0b10;
        self.state.set_ah(ah as u8);
    }

    pub(crate) fn exec_sahf(&mut self) {
        let ah = Flags::from_bits_truncate(u32::from(self.state.ah()));
        self.state.set_status(Flags::AH, ah);
    }

    pub(crate) fn exec_flag_op(&mut self, instr: &Instr) {
        let (flag, value) = match instr {
            Instr::Clc => (Flags::CF, false),
            Instr::Stc => (Flags::CF, true),
            Instr::Cmc => (Flags::CF, !self.state.flag(Flags::CF)),
            Instr::Cld => (Flags::DF, false),
            Instr::Std => (Flags::DF, true),
            Instr::Cli => (Flags::IF, false),
            Instr::Sti => (Flags::IF, true),
            _ => return,
        };
        self.state.update_flags(flag, value);
    }

    /// Identifies as a Pentium Pro class Intel CPU with an FPU. Leaves beyond
    /// 1 return all zeros.
    pub(crate) fn exec_cpuid(&mut self) {
        let leaf = self.state.eax();
        let (eax, ebx, ecx, edx) = match leaf {
            0 => (1, VENDOR[0], VENDOR[2], VENDOR[1]),
            1 => (SIGNATURE, 0, 0, FEATURES),
            _ => {
                debug!("cpuid: unknown leaf {:#X}", leaf);
                (0, 0, 0, 0)
            }
        };

        self.state.set_eax(eax);
        self.state.set_ebx(ebx);
        self.state.set_ecx(ecx);
        self.state.set_edx(edx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::interpret::testutil::*;

    #[test]
    fn conversions() {
        let cpu = exec("98", |cpu| cpu.state_mut().set_eax(0x1234_8000));
        assert_eq!(cpu.state().eax(), 0xFFFF_8000);

        let cpu = exec("66 98", |cpu| cpu.state_mut().set_eax(0x1234_5680));
        assert_eq!(cpu.state().eax(), 0x1234_FF80);

        let cpu = exec("99", |cpu| {
            cpu.state_mut().set_eax(0x8000_0000);
            cpu.state_mut().set_edx(5);
        });
        assert_eq!(cpu.state().edx(), 0xFFFF_FFFF);

        let cpu = exec("66 99", |cpu| {
            cpu.state_mut().set_eax(0x8000_7FFF);
            cpu.state_mut().set_edx(0xAAAA_5555);
        });
        assert_eq!(cpu.state().edx(), 0xAAAA_0000);
    }

    #[test]
    fn flag_ops() {
        let cpu = exec("F9 FD FB", |_| {});
        assert_eq!(cpu.state().flags(), Flags::CF | Flags::DF | Flags::IF);

        let cpu = exec("F5 F5 F5 FC FA", |cpu| cpu.state_mut().set_flags(Flags::DF | Flags::IF));
        assert_eq!(cpu.state().flags(), Flags::CF);

        let cpu = exec("F9 F8", |_| {});
        assert!(!cpu.state().flag(Flags::CF));
    }

    #[test]
    fn lahf_sahf() {
        let cpu = exec("9F", |cpu| cpu.state_mut().set_flags(Flags::SF | Flags::CF | Flags::OF | Flags::DF));
        assert_eq!(cpu.state().ah(), 0x83);

        let cpu = exec("9E", |cpu| {
            cpu.state_mut().set_eax(0xFF00);
            cpu.state_mut().set_flags(Flags::OF);
        });
        assert_eq!(cpu.state().flags(), Flags::OF | Flags::SF | Flags::ZF | Flags::AF | Flags::PF | Flags::CF);
    }

    #[test]
    fn cpuid() {
        let cpu = exec("0F A2", |_| {});
        assert_eq!(cpu.state().eax(), 1);
        let mut vendor = Vec::new();
        for reg in &[cpu.state().ebx(), cpu.state().edx(), cpu.state().ecx()] {
            vendor.extend_from_slice(&reg.to_le_bytes());
        }
        assert_eq!(vendor, b"GenuineIntel");

        let cpu = exec("0F A2", |cpu| cpu.state_mut().set_eax(1));
        assert_eq!(cpu.state().eax(), 0x633);
        assert_eq!(cpu.state().edx() & 1, 1);

        let cpu = exec("0F A2", |cpu| {
            cpu.state_mut().set_eax(0x8000_0000);
            cpu.state_mut().set_ebx(0xFF);
        });
        assert_eq!(
            (cpu.state().eax(), cpu.state().ebx(), cpu.state().ecx(), cpu.state().edx()),
            (0, 0, 0, 0)
        );
    }

    #[test]
    fn nops() {
        // nop ; pause ; nop dword [eax+eax*1+0x0]
        let cpu = exec("90 F3 90 0F 1F 44 00 00", |cpu| cpu.state_mut().set_eax(0x7FFF_FFFF));
        assert_eq!(cpu.state().eip(), 8);
        assert_eq!(cpu.state().eax(), 0x7FFF_FFFF);
    }
}
