//! Stack instructions: `push`, `pop` and their segment, flag and all-register
//! variants, `enter` and `leave`.
//!
//! The stack lives in `SS` and grows downwards. A push that would move `ESP`
//! below the program break fails with `CpuError::StackOverflow`.

use cpu::decode::Decoder;
use cpu::dispatch::DispatchTable;
use cpu::instr::*;
use cpu::interpret::{CpuError, Interpreter, SyscallHandler};

pub(crate) fn register(table: &mut DispatchTable) {
    table.register_range(0x50..=0x5F, decode_push_pop_reg);
    table.register(0xFF, decode_push_rm);
    table.register(0x8F, decode_pop_rm);
    table.register(0x68, decode_push_imm);
    table.register(0x6A, decode_push_imm);
    for &opcode in &[0x06, 0x0E, 0x16, 0x1E, 0x0FA0, 0x0FA8] {
        table.register(opcode, decode_push_seg);
    }
    for &opcode in &[0x07, 0x17, 0x1F, 0x0FA1, 0x0FA9] {
        table.register(opcode, decode_pop_seg);
    }
    for &opcode in &[0x60, 0x61, 0x9C, 0x9D, 0xC9] {
        table.register(opcode, decode_implicit);
    }
    table.register(0xC8, decode_enter);
}

/// Instructions without explicit operands: `pusha`, `popa`, `pushf`, `popf`
/// and `leave`.
fn decode_implicit(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    Ok(Some(match d.opcode_byte() {
        0x60 => Instr::Pusha { size },
        0x61 => Instr::Popa { size },
        0x9C => Instr::Pushf { size },
        0x9D => Instr::Popf { size },
        _ => Instr::Leave { size },
    }))
}

/// `50`-`57` push, `58`-`5F` pop.
fn decode_push_pop_reg(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let byte = d.opcode_byte();
    let operand = Register::from_encoding(byte & 0b111, d.dword_size()).into();
    Ok(Some(if byte < 0x58 {
        Instr::Push { operand }
    } else {
        Instr::Pop { operand }
    }))
}

/// `FF /6`.
fn decode_push_rm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if !d.group_is(6)? {
        return Ok(None);
    }

    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let operand = d.read_rm(modrm, size)?;
    Ok(Some(Instr::Push { operand }))
}

/// `8F /0`.
fn decode_pop_rm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    if !d.group_is(0)? {
        return Ok(None);
    }

    let size = d.dword_size();
    let modrm = d.read_modrm()?;
    let operand = d.read_rm(modrm, size)?;
    Ok(Some(Instr::Pop { operand }))
}

/// `68`: `push imm`. `6A`: `push imm8`, sign-extended.
fn decode_push_imm(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let size = d.dword_size();
    let imm = if d.opcode_byte() == 0x6A {
        d.read_imm8_sext(size)?
    } else {
        d.read_imm(size)?
    };
    Ok(Some(Instr::Push { operand: imm.into() }))
}

/// The segment register selected by a one- or two-byte push/pop opcode.
fn stack_segment(opcode: u32) -> Segment {
    match opcode {
        0x06 | 0x07 => Segment::Es,
        0x0E => Segment::Cs,
        0x16 | 0x17 => Segment::Ss,
        0x1E | 0x1F => Segment::Ds,
        0x0FA0 | 0x0FA1 => Segment::Fs,
        _ => Segment::Gs,
    }
}

fn decode_push_seg(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    Ok(Some(Instr::PushSeg {
        seg: stack_segment(d.opcode()),
        size: d.dword_size(),
    }))
}

fn decode_pop_seg(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    Ok(Some(Instr::PopSeg {
        seg: stack_segment(d.opcode()),
        size: d.dword_size(),
    }))
}

/// `C8 iw ib`.
fn decode_enter(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
    let alloc = d.read_u16()?;
    let level = d.read()?;
    Ok(Some(Instr::Enter { alloc, level }))
}

impl<H: SyscallHandler> Interpreter<H> {
    /// Pushing `ESP` stores its value from before the push.
    pub(crate) fn exec_push(&mut self, operand: &Operand) -> Result<(), CpuError> {
        let value = self.read_operand(operand)?;
        self.push(value, operand.size())
    }

    /// A memory destination that uses `ESP` is addressed with the
    /// incremented `ESP`.
    pub(crate) fn exec_pop(&mut self, operand: &Operand) -> Result<(), CpuError> {
        let value = self.pop(operand.size())?;
        match operand {
            Operand::Mem(mem) => {
                let dest = Operand::Mem(self.relocate(mem));
                self.write_operand(&dest, value)
            }
            _ => self.write_operand(operand, value),
        }
    }

    pub(crate) fn exec_push_seg(&mut self, seg: Segment, size: OpSize) -> Result<(), CpuError> {
        let selector = self.mem.segments().selector(seg);
        self.push(u32::from(selector.0), size)
    }

    /// `ESP` is only adjusted once the segment was loaded successfully.
    pub(crate) fn exec_pop_seg(&mut self, seg: Segment, size: OpSize) -> Result<(), CpuError> {
        let esp = self.state.esp();
        let selector = self.mem.read(Segment::Ss, esp, size)?;
        self.load_segment(seg, selector as u16)?;
        self.state.set_esp(esp.wrapping_add(size.bytes()));
        Ok(())
    }

    pub(crate) fn exec_pusha(&mut self, size: OpSize) -> Result<(), CpuError> {
        let esp = self.state.esp();
        for index in 0..8 {
            let value = if index == 4 { esp } else { self.state.get(index, size) };
            self.push(value, size)?;
        }
        Ok(())
    }

    pub(crate) fn exec_popa(&mut self, size: OpSize) -> Result<(), CpuError> {
        for index in (0..8).rev() {
            let value = self.pop(size)?;
            if index != 4 {
                self.state.set(index, size, value);
            }
        }
        Ok(())
    }

    pub(crate) fn exec_pushf(&mut self, size: OpSize) -> Result<(), CpuError> {
        let eflags = self.state.eflags();
        self.push(eflags, size)
    }

    /// A 16-bit `popf` only replaces the low half of `EFLAGS`.
    pub(crate) fn exec_popf(&mut self, size: OpSize) -> Result<(), CpuError> {
        let value = self.pop(size)?;
        let eflags = match size {
            OpSize::Bits32 => value,
            _ => self.state.eflags() & 0xFFFF_0000 | value & 0xFFFF,
        };
        self.state.set_eflags(eflags);
        Ok(())
    }

    pub(crate) fn exec_enter(&mut self, alloc: u16, level: u8) -> Result<(), CpuError> {
        let level = level % 32;
        let ebp = self.state.ebp();
        self.push(ebp, OpSize::Bits32)?;
        let frame = self.state.esp();

        if level > 0 {
            let mut outer = ebp;
            for _ in 1..level {
                outer = outer.wrapping_sub(4);
                let value = self.mem.read(Segment::Ss, outer, OpSize::Bits32)?;
                self.push(value, OpSize::Bits32)?;
            }
            self.push(frame, OpSize::Bits32)?;
        }

        let esp = self.state.esp();
        let program_break = self.mem.program_break();
        let new = esp.checked_sub(u32::from(alloc))
            .filter(|&new| new >= program_break)
            .ok_or(CpuError::StackOverflow { esp, program_break })?;

        self.state.set_ebp(frame);
        self.state.set_esp(new);
        Ok(())
    }

    pub(crate) fn exec_leave(&mut self, size: OpSize) -> Result<(), CpuError> {
        let ebp = self.state.ebp();
        let value = self.mem.read(Segment::Ss, ebp, size)?;
        self.state.set_esp(ebp.wrapping_add(size.bytes()));
        self.state.set(Register::Ebp.index(), size, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::flags::Flags;
    use cpu::interpret::testutil::*;

    #[test]
    fn lifo() {
        // push eax ; push ecx ; push 0x4d89b ; pop edx ; pop ebx ; pop esi
        let cpu = exec("50 51 68 9B D8 04 00 5A 5B 5E", |cpu| {
            cpu.state_mut().set_eax(1);
            cpu.state_mut().set_ecx(2);
        });
        assert_eq!(cpu.state().edx(), 0x4D89B);
        assert_eq!(cpu.state().ebx(), 2);
        assert_eq!(cpu.state().esi(), 1);
        assert_eq!(cpu.state().esp(), MEMORY_SIZE - 1);
    }

    #[test]
    fn push_sizes() {
        // push -1 (imm8) ; push ax
        let cpu = exec("6A FF 66 50", |cpu| cpu.state_mut().set_eax(0x1234_5678));
        let esp = cpu.state().esp();
        assert_eq!(esp, MEMORY_SIZE - 1 - 6);
        assert_eq!(cpu.mem().get(esp, OpSize::Bits16).unwrap(), 0x5678);
        assert_eq!(cpu.mem().get(esp + 2, OpSize::Bits32).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn push_esp_pushes_old_value() {
        let cpu = exec("54", |_| {});
        let esp = cpu.state().esp();
        assert_eq!(cpu.mem().get(esp, OpSize::Bits32).unwrap(), esp + 4);
    }

    #[test]
    fn pop_to_esp_relative_memory() {
        // push 0x11 ; push 0x22 ; pop dword [esp]
        let cpu = exec("6A 11 6A 22 8F 04 24", |_| {});
        let esp = cpu.state().esp();
        assert_eq!(esp, MEMORY_SIZE - 1 - 4);
        assert_eq!(cpu.mem().get(esp, OpSize::Bits32).unwrap(), 0x22);
    }

    #[test]
    fn push_pop_memory() {
        // push dword [esp+0x4] ; pop dword [ebx]
        let cpu = exec("FF 74 24 04 8F 03", |cpu| {
            cpu.state_mut().set_esp(0x800);
            cpu.state_mut().set_ebx(0x100);
            cpu.mem_mut().set(0x804, OpSize::Bits32, 0xCAFE).unwrap();
        });
        assert_eq!(cpu.mem().get(0x100, OpSize::Bits32).unwrap(), 0xCAFE);
        assert_eq!(cpu.state().esp(), 0x800);
    }

    #[test]
    fn pusha_popa() {
        // pusha ; xor eax, eax ; xor ebx, ebx ; popa
        let cpu = exec("60 31 C0 31 DB 61", |cpu| {
            cpu.state_mut().set_eax(0xA);
            cpu.state_mut().set_ebx(0xB);
            cpu.state_mut().set_edi(0xD);
        });
        assert_eq!(cpu.state().eax(), 0xA);
        assert_eq!(cpu.state().ebx(), 0xB);
        assert_eq!(cpu.state().edi(), 0xD);
        assert_eq!(cpu.state().esp(), MEMORY_SIZE - 1);

        let mut cpu = machine("60");
        cpu.step().unwrap();
        let esp = cpu.state().esp();
        assert_eq!(esp, MEMORY_SIZE - 1 - 32);
        // the stored ESP is the one from before the first push
        assert_eq!(cpu.mem().get(esp + 12, OpSize::Bits32).unwrap(), MEMORY_SIZE - 1);
    }

    #[test]
    fn flags_round_trip() {
        // stc ; pushf ; clc ; popf
        let cpu = exec("F9 9C F8 9D", |_| {});
        assert!(cpu.state().flag(Flags::CF));

        // pushf stores the reserved bit
        let cpu = exec("9C", |_| {});
        let esp = cpu.state().esp();
        assert_eq!(cpu.mem().get(esp, OpSize::Bits32).unwrap(), 0x2);
    }

    #[test]
    fn enter_leave() {
        // enter 0x10, 0 ; leave
        let cpu = exec("C8 10 00 00", |cpu| {
            cpu.state_mut().set_esp(0x800);
            cpu.state_mut().set_ebp(0x900);
        });
        assert_eq!(cpu.state().ebp(), 0x7FC);
        assert_eq!(cpu.state().esp(), 0x7EC);
        assert_eq!(cpu.mem().get(0x7FC, OpSize::Bits32).unwrap(), 0x900);

        let cpu = exec("C8 10 00 00 C9", |cpu| {
            cpu.state_mut().set_esp(0x800);
            cpu.state_mut().set_ebp(0x900);
        });
        assert_eq!(cpu.state().ebp(), 0x900);
        assert_eq!(cpu.state().esp(), 0x800);

        // enter 0, 2 copies one outer frame pointer
        let cpu = exec("C8 00 00 02", |cpu| {
            cpu.state_mut().set_esp(0x800);
            cpu.state_mut().set_ebp(0x900);
            cpu.mem_mut().set(0x8FC, OpSize::Bits32, 0x1234).unwrap();
        });
        assert_eq!(cpu.state().ebp(), 0x7FC);
        assert_eq!(cpu.state().esp(), 0x7F4);
        assert_eq!(cpu.mem().get(0x7F8, OpSize::Bits32).unwrap(), 0x1234);
        assert_eq!(cpu.mem().get(0x7F4, OpSize::Bits32).unwrap(), 0x7FC);
    }

    #[test]
    fn stack_overflow() {
        // push eax with ESP just above the program break
        let (cpu, result) = try_exec("50", |cpu| cpu.state_mut().set_esp(3));
        assert_eq!(result, Err(CpuError::StackOverflow { esp: 3, program_break: 1 }));
        assert_eq!(cpu.state().esp(), 3);
        assert_eq!(cpu.state().eip(), 0);

        // ESP = 5 leaves exactly enough room
        let cpu = exec("50", |cpu| cpu.state_mut().set_esp(5));
        assert_eq!(cpu.state().esp(), 1);

        // enter with a huge allocation
        let (_, result) = try_exec("C8 00 F0 00", |cpu| cpu.state_mut().set_esp(0x800));
        match result {
            Err(CpuError::StackOverflow { .. }) => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn segment_push_pop() {
        use cpu::segment::{Descriptor, Selector};

        // push 0x1b ; pop gs ; push gs ; pop eax
        let cpu = exec("6A 1B 0F A9 0F A8 58", |cpu| {
            let desc = Descriptor { base: 0x100, limit: 0xFF, access: Descriptor::PRESENT | 0x13, flags: 0 };
            cpu.gdt_mut().set(3, desc.encode());
        });
        assert_eq!(cpu.mem().segments().selector(Segment::Gs), Selector(0x1B));
        assert_eq!(cpu.state().eax(), 0x1B);
        assert_eq!(cpu.state().esp(), MEMORY_SIZE - 1);

        // a failing pop leaves ESP alone
        let (cpu, result) = try_exec("6A 7F 1F", |_| {});
        match result {
            Err(CpuError::Unsupported(_)) => {}
            other => panic!("{:?}", other),
        }
        assert_eq!(cpu.state().esp(), MEMORY_SIZE - 1 - 4);
    }
}
