//! Control transfer: jumps, conditional branches, loops, `call`, `ret` and
//! software interrupts.
//!
//! Only near transfers are implemented. Far jumps, calls and returns are
//! recognized, but rejected with `CpuError::Unsupported` while decoding.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::flags::Flags;
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallContext, SyscallHandler, SyscallOutcome};

use num_traits::FromPrimitive;

/// The interrupt vector Linux uses for system calls.
pub const SYSCALL_VECTOR: u8 = 0x80;

pub(crate) fn register(table: &mut DispatchTable) {
    table.register(0xEB, decode_jmp_rel);
    table.register(0xE9, decode_jmp_rel);
    table.register_range(0x70..=0x7F, decode_jcc);
    table.register_range(0x0F80..=0x0F8F, decode_jcc);
    table.register(0xE3, decode_jecxz);
    table.register_range(0xE0..=0xE2, decode_loop);
    table.register(0xE8, decode_call_rel);
    table.register(0xFF, decode_group5);
    table.register(0xC3, decode_ret);
    table.register(0xC2, decode_ret);
    table.register_range(0xCC..=0xCE, decode_int);
    for &opcode in &[0xEA, 0x9A, 0xCA, 0xCB] {
        table.register(opcode, decode_far);
    }
}

fn decode_jmp_rel(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = if d.opcode_byte() == 0xEB { OpSize::Bits8 } else { d.dword_size() };
    let target = d.read_rel(size)?;
    Ok(Some(Instr::Jump { target }))
}

/// `70`-`7F` with an 8-bit displacement, `0F 80`-`8F` with a full one.
fn decode_jcc(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let cc = ConditionCode::from_u8(d.opcode_byte() & 0x0F).ok_or_else(|| d.ud("invalid condition code"))?;
    let size = if d.opcode() < 0x100 { OpSize::Bits8 } else { d.dword_size() };
    let target = d.read_rel(size)?;
    Ok(Some(Instr::JumpIf { cc, target }))
}

fn decode_jecxz(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if d.prefixes().address_size_override() {
        return Err(CpuError::unsupported("jcxz (address size override)"));
    }

    let target = d.read_rel(OpSize::Bits8)?;
    Ok(Some(Instr::Jecxz { target }))
}

fn decode_loop(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let kind = match d.opcode_byte() {
        0xE0 => LoopKind::Loopne,
        0xE1 => LoopKind::Loope,
        _ => LoopKind::Loop,
    };
    let target = d.read_rel(OpSize::Bits8)?;
    Ok(Some(Instr::Loop { kind, target }))
}

fn decode_call_rel(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    let target = d.read_rel(size)?;
    Ok(Some(Instr::Call { target }))
}

/// `FF /2` (`call r/m`) and `/4` (`jmp r/m`). The far forms `/3` and `/5`
/// are rejected.
fn decode_group5(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    match d.peek_modrm()?.reg() {
        2 | 4 => {}
        3 | 5 => return Err(CpuError::unsupported("indirect far transfer")),
        _ => return Ok(None),
    }

    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let target = d.read_rm(modrm, size)?;
    Ok(Some(if modrm.reg() == 2 {
        Instr::Call { target }
    } else {
        Instr::Jump { target }
    }))
}

fn decode_ret(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let pop = if d.opcode_byte() == 0xC2 { d.read_u16()? } else { 0 };
    Ok(Some(Instr::Ret { pop }))
}

/// `CC` (`int3`), `CD ib` and `CE` (`into`).
fn decode_int(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    Ok(Some(match d.opcode_byte() {
        0xCC => Instr::Int { vector: 3 },
        0xCD => Instr::Int { vector: d.read()? },
        _ => Instr::IntO,
    }))
}

fn decode_far(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let what = match d.opcode_byte() {
        0xEA => "far jmp",
        0x9A => "far call",
        _ => "far ret",
    };
    Err(CpuError::unsupported(what))
}

impl<H: SyscallHandler> Interpreter<H> {
    /// Sets `EIP` to the target. Relative targets were made absolute by the
    /// decoder, so immediates are used as-is.
    pub(crate) fn exec_jump(&mut self, target: &Operand) -> Result<(), CpuError> {
        let eip = self.read_operand(target)?;
        self.state.set_eip(eip);
        Ok(())
    }

    pub(crate) fn exec_loop(&mut self, kind: LoopKind, target: &Operand) -> Result<(), CpuError> {
        let ecx = self.state.ecx().wrapping_sub(1);
        self.state.set_ecx(ecx);

        let zf = self.state.flag(Flags::ZF);
        let taken = ecx != 0 && match kind {
            LoopKind::Loop => true,
            LoopKind::Loope => zf,
            LoopKind::Loopne => !zf,
        };

        if taken {
            self.exec_jump(target)?;
        }
        Ok(())
    }

    /// The target is read before the return address is pushed, so it may be
    /// addressed relative to `ESP`.
    pub(crate) fn exec_call(&mut self, target: &Operand) -> Result<(), CpuError> {
        let dest = self.read_operand(target)?;
        let ret = self.state.eip();
        self.push(ret, OpSize::Bits32)?;
        self.state.set_eip(dest);
        Ok(())
    }

    pub(crate) fn exec_ret(&mut self, pop: u16) -> Result<(), CpuError> {
        let ret = self.pop(OpSize::Bits32)?;
        let esp = self.state.esp().wrapping_add(u32::from(pop));
        self.state.set_esp(esp);
        self.state.set_eip(ret);
        Ok(())
    }

    /// Software interrupt.
    ///
    /// `int 0x80` is forwarded to the system call handler. `int3` is logged
    /// and ignored. Every other vector is unsupported.
    pub(crate) fn exec_int(&mut self, vector: u8) -> Result<(), CpuError> {
        match vector {
            SYSCALL_VECTOR => {
                let number = self.state.eax();
                let args = [
                    self.state.ebx(),
                    self.state.ecx(),
                    self.state.edx(),
                    self.state.esi(),
                    self.state.edi(),
                ];

                let ctx = SyscallContext {
                    state: &mut self.state,
                    mem: &mut self.mem,
                    gdt: &mut self.gdt,
                };
                match self.handler.syscall(number, args, ctx)? {
                    SyscallOutcome::Return(value) => self.state.set_eax(value),
                    SyscallOutcome::Exit(code) => {
                        info!("program exited with status {}", code);
                        self.exit_code = Some(code);
                        self.running = false;
                    }
                }
                Ok(())
            }
            3 => {
                warn!("breakpoint at {:#010X}, continuing", self.state.eip().wrapping_sub(1));
                Ok(())
            }
            _ => Err(CpuError::unsupported(format!("interrupt {:#X}", vector))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::interpret::testutil::*;
    use memory::Memory;

    #[test]
    fn jumps() {
        // jmp +2 ; inc eax ; inc eax ; inc ecx
        let cpu = exec("EB 02 40 40 41", |_| {});
        assert_eq!(cpu.state().eax(), 0);
        assert_eq!(cpu.state().ecx(), 1);

        // jmp eax
        let cpu = exec("FF E0 40 40 41", |cpu| cpu.state_mut().set_eax(4));
        assert_eq!(cpu.state().eax(), 4);
        assert_eq!(cpu.state().ecx(), 1);

        // jmp dword [eax*4+0x100]
        let cpu = exec("FF 24 85 00 01 00 00 40 41", |cpu| {
            cpu.state_mut().set_eax(2);
            cpu.mem_mut().set(0x108, OpSize::Bits32, 8).unwrap();
        });
        assert_eq!(cpu.state().eax(), 2);
        assert_eq!(cpu.state().ecx(), 1);
    }

    #[test]
    fn conditional_branches() {
        // cmp eax, 5 ; jne +1 ; inc ecx ; inc edx
        let code = "83 F8 05 75 01 41 42";
        let cpu = exec(code, |cpu| cpu.state_mut().set_eax(5));
        assert_eq!((cpu.state().ecx(), cpu.state().edx()), (1, 1));
        let cpu = exec(code, |cpu| cpu.state_mut().set_eax(4));
        assert_eq!((cpu.state().ecx(), cpu.state().edx()), (0, 1));

        // signed vs unsigned: cmp eax, 1 ; jl rel32 +1 ; inc ecx
        let cpu = exec("83 F8 01 0F 8C 01 00 00 00 41", |cpu| cpu.state_mut().set_eax(-1i32 as u32));
        assert_eq!(cpu.state().ecx(), 0);
        let cpu = exec("83 F8 01 0F 82 01 00 00 00 41", |cpu| cpu.state_mut().set_eax(-1i32 as u32));
        assert_eq!(cpu.state().ecx(), 1);
    }

    #[test]
    fn jecxz() {
        let cpu = exec("E3 01 40 41", |_| {});
        assert_eq!((cpu.state().eax(), cpu.state().ecx()), (0, 1));
        let cpu = exec("E3 01 40 41", |cpu| cpu.state_mut().set_ecx(1));
        assert_eq!((cpu.state().eax(), cpu.state().ecx()), (1, 2));
    }

    #[test]
    fn loops() {
        // inc eax ; loop -3
        let cpu = exec("40 E2 FD", |cpu| cpu.state_mut().set_ecx(5));
        assert_eq!(cpu.state().eax(), 5);
        assert_eq!(cpu.state().ecx(), 0);

        // inc eax ; cmp eax, 2 ; loopne -8 stops when eax reaches 2
        let cpu = exec("40 83 F8 02 E0 FA", |cpu| cpu.state_mut().set_ecx(10));
        assert_eq!(cpu.state().eax(), 2);
        assert_eq!(cpu.state().ecx(), 8);
    }

    #[test]
    fn call_ret() {
        // call +3 ; inc ecx ; jmp +2 ; inc eax ; ret
        let cpu = exec("E8 03 00 00 00 41 EB 02 40 C3", |_| {});
        assert_eq!(cpu.state().eax(), 1);
        assert_eq!(cpu.state().ecx(), 1);
        assert_eq!(cpu.state().esp(), MEMORY_SIZE - 1);
    }

    #[test]
    fn call_indirect_through_stack() {
        // push 0x8 ; call dword [esp] ; (0x8:) inc eax
        let cpu = exec("6A 08 FF 14 24 90 90 90 40", |_| {});
        assert_eq!(cpu.state().eax(), 1);
        let esp = cpu.state().esp();
        assert_eq!(esp, MEMORY_SIZE - 1 - 8);
        assert_eq!(cpu.mem().get(esp, OpSize::Bits32).unwrap(), 5);
        assert_eq!(cpu.mem().get(esp + 4, OpSize::Bits32).unwrap(), 8);
    }

    #[test]
    fn ret_pops_arguments() {
        let mut cpu = machine("C2 08 00");
        cpu.state_mut().set_esp(0x800);
        cpu.mem_mut().set(0x800, OpSize::Bits32, 0x123).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.state().eip(), 0x123);
        assert_eq!(cpu.state().esp(), 0x80C);
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(u32, [u32; 5])>,
    }

    impl SyscallHandler for Recorder {
        fn syscall(&mut self, number: u32, args: [u32; 5], ctx: SyscallContext) -> Result<SyscallOutcome, CpuError> {
            self.calls.push((number, args));
            match number {
                1 => Ok(SyscallOutcome::Exit(args[0] as i32)),
                _ => {
                    ctx.mem.set(0x200, OpSize::Bits32, 0x5A5A)?;
                    Ok(SyscallOutcome::Return(42))
                }
            }
        }
    }

    fn with_recorder(code: &[u8]) -> Interpreter<Recorder> {
        let mut mem = Memory::new(MEMORY_SIZE);
        mem.set_bytes(0, code).unwrap();
        mem.set_program_break(code.len() as u32);
        Interpreter::new(mem, 0, Recorder::default())
    }

    #[test]
    fn syscalls() {
        // mov eax, 20 ; mov ebx, 7 ; int 0x80 ; mov ebx, eax ; mov eax, 1 ; int 0x80 ; inc ecx
        let mut cpu = with_recorder(&bytes(
            "B8 14 00 00 00 BB 07 00 00 00 CD 80 89 C3 B8 01 00 00 00 CD 80 41"
        ));
        cpu.run().unwrap();

        assert!(!cpu.is_running());
        assert_eq!(cpu.exit_code(), Some(42));
        assert_eq!(cpu.state().ecx(), 0);
        assert_eq!(cpu.handler().calls, vec![
            (20, [7, 0, 0, 0, 0]),
            (1, [42, 0, 0, 0, 0]),
        ]);
        assert_eq!(cpu.mem().get(0x200, OpSize::Bits32).unwrap(), 0x5A5A);
    }

    #[test]
    fn other_interrupts() {
        // int3 is skipped
        let cpu = exec("CC 40", |_| {});
        assert_eq!(cpu.state().eax(), 1);

        let (cpu, result) = try_exec("90 CD 21", |_| {});
        match result {
            Err(CpuError::Unsupported(_)) => {}
            other => panic!("{:?}", other),
        }
        assert_eq!(cpu.state().eip(), 1);

        // into only traps with OF set
        let cpu = exec("CE 40", |_| {});
        assert_eq!(cpu.state().eax(), 1);
        let (_, result) = try_exec("CE", |cpu| cpu.state_mut().set_flags(Flags::OF));
        assert!(result.is_err());
    }
}
