//! x86 interpreter.
//!
//! The `Interpreter` owns the whole emulated machine: registers, memory, the
//! x87 unit, the descriptor table and the dispatch table. `step` decodes and
//! executes one instruction, `run` loops until the program halts, exits, runs
//! off the end of memory or faults. Faults are terminal: the error propagates
//! out of `run` and `EIP` is left pointing at the faulting instruction.
//!
//! The instruction semantics live in the `cpu::ops` modules, which add their
//! `exec_*` methods to `Interpreter`.

use cpu::decode::{DecodeError, Decoder};
use cpu::dispatch::DispatchTable;
use cpu::flags::Flags;
use cpu::fpu::Fpu;
use cpu::instr::*;
use cpu::modrm;
use cpu::segment::{DescriptorTable, Selector};
use cpu::state::State;
use memory::{Memory, MemoryFault};
use utils::NoDebug;

use std::error::Error;
use std::fmt;

/// Receives the system calls a program makes through `int 0x80`.
pub trait SyscallHandler {
    /// Performs system call `number`.
    ///
    /// `args` holds the contents of `EBX`, `ECX`, `EDX`, `ESI` and `EDI`.
    /// Returning an error stops the interpreter.
    fn syscall(&mut self, number: u32, args: [u32; 5], ctx: SyscallContext) -> Result<SyscallOutcome, CpuError>;
}

/// The parts of the machine a system call may modify.
#[derive(Debug)]
pub struct SyscallContext<'a> {
    pub state: &'a mut State,
    pub mem: &'a mut Memory,
    pub gdt: &'a mut DescriptorTable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Store the value in `EAX` and continue.
    Return(u32),
    /// Terminate the process with an exit status.
    Exit(i32),
}

/// Without an operating system, every system call is unsupported.
impl SyscallHandler for () {
    fn syscall(&mut self, number: u32, _: [u32; 5], _: SyscallContext) -> Result<SyscallOutcome, CpuError> {
        Err(CpuError::unsupported(format!("system call {:#X} (no kernel attached)", number)))
    }
}

/// Callback invoked with the address and decoded form of every instruction
/// before it is executed.
pub type Tracer = Box<FnMut(u32, &Instr)>;

#[derive(Debug)]
pub struct Interpreter<H: SyscallHandler = ()> {
    pub(crate) state: State,
    pub(crate) mem: Memory,
    pub(crate) fpu: Fpu,
    pub(crate) gdt: DescriptorTable,
    table: DispatchTable,
    pub(crate) handler: H,
    pub(crate) running: bool,
    pub(crate) exit_code: Option<i32>,
    tracer: NoDebug<Option<Tracer>>,
}

impl<H: SyscallHandler> Interpreter<H> {
    /// Creates a new interpreter.
    ///
    /// # Parameters
    ///
    /// * `mem`: The memory to operate on, with the program already loaded.
    /// * `eip`: Initial value of the `eip` register. Points to the first
    ///   instruction that will be executed.
    /// * `handler`: Receives the system calls made by the program.
    ///
    /// `ESP` and `EBP` start out at the last byte of memory. All other
    /// registers and flags are zero.
    pub fn new(mem: Memory, eip: u32, handler: H) -> Self {
        Self {
            state: State::new(eip, mem.top()),
            mem,
            fpu: Fpu::new(),
            gdt: DescriptorTable::default(),
            table: DispatchTable::new(),
            handler,
            running: true,
            exit_code: None,
            tracer: NoDebug(None),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn mem(&self) -> &Memory {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    pub fn fpu(&self) -> &Fpu {
        &self.fpu
    }

    pub fn fpu_mut(&mut self) -> &mut Fpu {
        &mut self.fpu
    }

    pub fn gdt(&self) -> &DescriptorTable {
        &self.gdt
    }

    pub fn gdt_mut(&mut self) -> &mut DescriptorTable {
        &mut self.gdt
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Installs a callback that sees every instruction before it executes.
    pub fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = NoDebug(Some(tracer));
    }

    /// Returns `false` once the program has halted or exited.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The exit status passed to the `exit` system call, if it was made.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Fetch, decode and execute the next instruction.
    ///
    /// On error, `EIP` still points at the instruction that failed.
    pub fn step(&mut self) -> Result<(), CpuError> {
        let eip = self.state.eip();
        let (instr, next, segment) = {
            let mut decoder = Decoder::new(&self.mem, &self.state, eip);
            let instr = decoder.decode_next(&self.table)?;
            (instr, decoder.current_address(), decoder.segment())
        };

        trace!("{:#010X}: {}", eip, instr);
        if let Some(ref mut tracer) = *self.tracer {
            tracer(eip, &instr);
        }

        self.state.set_eip(next);
        self.mem.set_segment_override(segment);
        let result = self.execute(&instr);
        self.mem.reset_segment_override();

        if result.is_err() {
            self.state.set_eip(eip);
        }
        result
    }

    /// Executes instructions until the program halts, exits or `EIP` leaves
    /// the memory.
    pub fn run(&mut self) -> Result<(), CpuError> {
        while self.running && self.mem.contains(Segment::Cs, self.state.eip()) {
            self.step()?;
        }

        Ok(())
    }

    /// Execute a decoded instruction and perform its side effects.
    fn execute(&mut self, instr: &Instr) -> Result<(), CpuError> {
        use cpu::instr::Instr::*;

        match instr {
            Alu { op, dest, src } => self.exec_alu(*op, dest, src),
            Test { lhs, rhs } => self.exec_test(lhs, rhs),
            Inc { operand } => self.exec_inc_dec(operand, true),
            Dec { operand } => self.exec_inc_dec(operand, false),
            Neg { operand } => self.exec_neg(operand),
            Not { operand } => self.exec_not(operand),
            Shift { op, dest, count } => self.exec_shift(*op, dest, count),
            DoubleShift { left, dest, src, count } => self.exec_double_shift(*left, dest, *src, count),
            BitTest { base, bit } => self.exec_bit_test(base, bit),
            BitScan { reverse, dest, src } => self.exec_bit_scan(*reverse, *dest, src),
            Mul { operand } => self.exec_mul(operand),
            Imul { operand } => self.exec_imul(operand),
            ImulTrunc { dest, src1, src2 } => self.exec_imul_trunc(*dest, src1, src2),
            Div { operand } => self.exec_div(operand),
            Idiv { operand } => self.exec_idiv(operand),
            Mov { dest, src } => self.exec_mov(dest, src),
            MovZx { dest, src } => self.exec_movzx(*dest, src),
            MovSx { dest, src } => self.exec_movsx(*dest, src),
            MovFromSeg { dest, seg } => self.exec_mov_from_seg(dest, *seg),
            MovToSeg { seg, src } => self.exec_mov_to_seg(*seg, src),
            Lea { dest, src } => {
                self.state.set_reg(*dest, src.offset);
                Ok(())
            }
            Xchg { a, b } => self.exec_xchg(a, b),
            CondMove { cc, dest, src } => self.exec_cmov(*cc, *dest, src),
            SetIf { cc, operand } => {
                let value = self.condition(*cc) as u32;
                self.write_operand(operand, value)
            }
            Cbw | Cwde | Cwd | Cdq => {
                self.exec_convert(instr);
                Ok(())
            }
            Lahf => {
                self.exec_lahf();
                Ok(())
            }
            Sahf => {
                self.exec_sahf();
                Ok(())
            }
            Str { op, size, rep } => self.exec_str(*op, *size, *rep),
            Push { operand } => self.exec_push(operand),
            Pop { operand } => self.exec_pop(operand),
            PushSeg { seg, size } => self.exec_push_seg(*seg, *size),
            PopSeg { seg, size } => self.exec_pop_seg(*seg, *size),
            Pusha { size } => self.exec_pusha(*size),
            Popa { size } => self.exec_popa(*size),
            Pushf { size } => self.exec_pushf(*size),
            Popf { size } => self.exec_popf(*size),
            Enter { alloc, level } => self.exec_enter(*alloc, *level),
            Leave { size } => self.exec_leave(*size),
            Jump { target } => self.exec_jump(target),
            JumpIf { cc, target } => {
                if self.condition(*cc) {
                    self.exec_jump(target)?;
                }
                Ok(())
            }
            Jecxz { target } => {
                if self.state.ecx() == 0 {
                    self.exec_jump(target)?;
                }
                Ok(())
            }
            Loop { kind, target } => self.exec_loop(*kind, target),
            Call { target } => self.exec_call(target),
            Ret { pop } => self.exec_ret(*pop),
            Int { vector } => self.exec_int(*vector),
            IntO => {
                if self.state.flag(Flags::OF) {
                    Err(CpuError::unsupported("overflow trap (interrupt 4)"))
                } else {
                    Ok(())
                }
            }
            Hlt => {
                info!("hlt at {:#010X}, stopping", self.state.eip().wrapping_sub(1));
                self.running = false;
                Ok(())
            }
            Clc | Stc | Cmc | Cld | Std | Cli | Sti => {
                self.exec_flag_op(instr);
                Ok(())
            }
            Nop => Ok(()),
            Cpuid => {
                self.exec_cpuid();
                Ok(())
            }
            Fpu(fpu) => self.exec_fpu(fpu),
        }
    }

    /// Reads an operand's value, zero-extended to 32 bits.
    pub(crate) fn read_operand(&self, op: &Operand) -> Result<u32, CpuError> {
        Ok(match op {
            Operand::Reg(reg) => self.state.reg(*reg),
            Operand::Imm(imm) => imm.zero_extended(),
            Operand::Mem(mem) => self.mem.read(mem.segment, mem.offset, mem.size)?,
        })
    }

    /// Writes the low bits of `value` (according to the operand's size) to a
    /// register or memory operand.
    pub(crate) fn write_operand(&mut self, op: &Operand, value: u32) -> Result<(), CpuError> {
        match op {
            Operand::Reg(reg) => self.state.set_reg(*reg, value),
            Operand::Mem(mem) => self.mem.write(mem.segment, mem.offset, mem.size, value)?,
            Operand::Imm(imm) => {
                return Err(CpuError::unsupported(format!("write to immediate operand {:#x}", imm)));
            }
        }

        Ok(())
    }

    /// Recomputes the offset of a memory operand from the current registers.
    pub(crate) fn relocate(&self, mem: &MemoryLocation) -> MemoryLocation {
        MemoryLocation {
            offset: modrm::effective_address(&self.state, &mem.addressing),
            ..mem.clone()
        }
    }

    /// Pushes the low `size` bits of `value` onto the stack.
    ///
    /// The stack may not grow below the program break.
    pub(crate) fn push(&mut self, value: u32, size: OpSize) -> Result<(), CpuError> {
        let esp = self.state.esp();
        let program_break = self.mem.program_break();
        let new = esp.checked_sub(size.bytes())
            .filter(|&new| new >= program_break)
            .ok_or(CpuError::StackOverflow { esp, program_break })?;

        self.mem.write(Segment::Ss, new, size, value)?;
        self.state.set_esp(new);
        Ok(())
    }

    /// Pops a `size`-bit value off the stack.
    pub(crate) fn pop(&mut self, size: OpSize) -> Result<u32, CpuError> {
        let esp = self.state.esp();
        let value = self.mem.read(Segment::Ss, esp, size)?;
        self.state.set_esp(esp.wrapping_add(size.bytes()));
        Ok(value)
    }

    /// Evaluates a condition code against the current flags.
    pub(crate) fn condition(&self, cc: ConditionCode) -> bool {
        use cpu::instr::ConditionCode::*;

        let flag = |f| self.state.flag(f);
        match cc {
            Overflow => flag(Flags::OF),
            NotOverflow => !flag(Flags::OF),
            Carry => flag(Flags::CF),
            NotCarry => !flag(Flags::CF),
            Equal => flag(Flags::ZF),
            NotEqual => !flag(Flags::ZF),
            BelowOrEqual => flag(Flags::CF) || flag(Flags::ZF),
            Above => !flag(Flags::CF) && !flag(Flags::ZF),
            Sign => flag(Flags::SF),
            NotSign => !flag(Flags::SF),
            Parity => flag(Flags::PF),
            NotParity => !flag(Flags::PF),
            Less => flag(Flags::SF) != flag(Flags::OF),
            GreaterOrEqual => flag(Flags::SF) == flag(Flags::OF),
            LessOrEqual => flag(Flags::ZF) || flag(Flags::SF) != flag(Flags::OF),
            Greater => !flag(Flags::ZF) && flag(Flags::SF) == flag(Flags::OF),
        }
    }

    /// Loads a segment register from the descriptor table.
    pub(crate) fn load_segment(&mut self, seg: Segment, selector: u16) -> Result<(), CpuError> {
        let selector = Selector(selector);
        if selector.table_indicator() != 0 {
            return Err(CpuError::unsupported(format!("LDT selector {:#06X}", selector.0)));
        }

        let raw = self.gdt.get(selector.index()).ok_or_else(|| {
            CpuError::unsupported(format!("selector {:#06X} beyond the end of the GDT", selector.0))
        })?;
        self.mem.segments_mut().load(seg, selector, raw);
        Ok(())
    }
}

/// A fatal error raised while executing a program.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuError {
    /// No instruction matches the bytes at `EIP`.
    Decode(DecodeError),
    /// A memory access outside of the guest memory.
    MemoryFault(MemoryFault),
    /// A push would move `ESP` below the program break.
    StackOverflow {
        esp: u32,
        program_break: u32,
    },
    /// Division by zero, or a quotient that doesn't fit the destination.
    DivideError,
    /// A recognized instruction or feature that isn't implemented.
    Unsupported(String),
}

impl CpuError {
    #[cold]
    pub fn unsupported<S: Into<String>>(what: S) -> Self {
        CpuError::Unsupported(what.into())
    }
}

impl From<DecodeError> for CpuError {
    #[cold]
    fn from(e: DecodeError) -> Self {
        CpuError::Decode(e)
    }
}

impl From<MemoryFault> for CpuError {
    #[cold]
    fn from(e: MemoryFault) -> Self {
        CpuError::MemoryFault(e)
    }
}

impl fmt::Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CpuError::Decode(e) => e.fmt(f),
            CpuError::MemoryFault(e) => e.fmt(f),
            CpuError::StackOverflow { esp, program_break } => write!(
                f, "stack overflow: push at esp={:#010X} would cross the program break at {:#010X}",
                esp, program_break,
            ),
            CpuError::DivideError => f.write_str("divide error"),
            CpuError::Unsupported(what) => write!(f, "unsupported: {}", what),
        }
    }
}

impl Error for CpuError {}
