//! Linux i386 system call layer.
//!
//! Programs enter the kernel with `int 0x80`, passing the call number in `EAX`
//! and up to 5 arguments in `EBX`, `ECX`, `EDX`, `ESI` and `EDI`. The result
//! is stored in `EAX`, with failures reported as negated `errno` values.
//! Files are host files, opened on behalf of the program.
//!
//! # Adding a new system call
//!
//! When the program makes an unimplemented system call, the emulator stops
//! with an error naming it. In order to implement it:
//!
//! * The call needs to be in the table in `kernel/table.rs`, marked with
//!   `func!` and its arity.
//! * The call itself is a method of the `Syscall` type, placed in the module
//!   of the subsystem it belongs to (`fs`, `mm`, `ps` or `sys`). Its arguments
//!   are taken as a single tuple of types implementing `From<u32>`, see
//!   `kernel/types.rs`.
//! * The `dispatch!` invocation in `Kernel::syscall` needs to map the call's
//!   number to the new method.

mod fs;
mod mm;
mod ps;
mod sys;
mod table;
pub mod types;

pub use self::fs::{FileTable, OpenFile};

use self::table::SyscallKind;
use self::types::{FromRawArgs, SyscallReturnValue};
use cpu::interpret::{CpuError, SyscallContext, SyscallHandler, SyscallOutcome};
use cpu::segment::DescriptorTable;
use cpu::State;
use memory::Memory;

/// Host-side kernel data.
///
/// Stored outside of the guest memory, so the program can't corrupt it.
#[derive(Debug)]
pub struct Kernel {
    files: FileTable,
    mm: mm::Subsystem,
    /// Address registered by `set_tid_address`.
    clear_child_tid: u32,
}

impl Kernel {
    /// Creates the kernel for a process whose image ends at `code_end`
    /// (inclusive).
    ///
    /// File descriptors 0, 1 and 2 are connected to the emulator's standard
    /// streams.
    pub fn new(code_end: u32) -> Self {
        Self {
            files: FileTable::new(),
            mm: mm::Subsystem::new(code_end),
            clear_child_tid: 0,
        }
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileTable {
        &mut self.files
    }
}

impl SyscallHandler for Kernel {
    /// Performs a system call.
    ///
    /// This only returns `Err` for unknown and unimplemented calls. Errors of
    /// the call itself are reported to the program.
    fn syscall(&mut self, number: u32, args: [u32; 5], ctx: SyscallContext) -> Result<SyscallOutcome, CpuError> {
        let info = table::get_syscall_info(number)
            .ok_or_else(|| CpuError::unsupported(format!("unknown syscall {:#X}", number)))?;
        if info.kind == SyscallKind::Unimplemented {
            return Err(CpuError::unsupported(format!("syscall {:#X} ({})", number, info.name)));
        }
        trace!("syscall {:#X}, raw arguments {:X?}", number, &args[..info.arity()]);

        let mut syscall = Syscall {
            kernel: self,
            state: ctx.state,
            mem: ctx.mem,
            gdt: ctx.gdt,
        };

        macro_rules! dispatch {
            ( $( $nr:tt => $func:ident, )* ) => {
                match number {
                    $( $nr => {
                        let args = FromRawArgs::from_args(&args);
                        info!("{}{:?}", stringify!($func), args);
                        syscall.$func(args).into_outcome()
                    } )*
                    _ => return Err(CpuError::unsupported(format!("syscall {:#X} ({})", number, info.name))),
                }
            };
        }

        let outcome = dispatch! {
            0x001 => exit,
            0x003 => read,
            0x004 => write,
            0x005 => open,
            0x006 => close,
            0x00A => unlink,
            0x02D => brk,
            0x036 => ioctl,
            0x05B => munmap,
            0x07A => newuname,
            0x08C => llseek,
            0x092 => writev,
            0x0C0 => mmap2,
            0x0F3 => set_thread_area,
            0x0FC => exit_group,
            0x102 => set_tid_address,
            0x109 => clock_gettime,
        };

        if let SyscallOutcome::Return(value) = outcome {
            info!("{} -> {:#X} ({})", info.name, value, value as i32);
        }
        Ok(outcome)
    }
}

/// System call context.
///
/// All system calls are implemented as methods on this type, and an instance
/// is created for every call. This also makes this type useful as an index of
/// the implemented calls in the documentation.
#[derive(Debug)]
pub struct Syscall<'a> {
    kernel: &'a mut Kernel,
    state: &'a mut State,
    mem: &'a mut Memory,
    gdt: &'a mut DescriptorTable,
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::testutil::*;
    use cpu::interpret::testutil::bytes;
    use cpu::interpret::Interpreter;

    #[test]
    fn unknown_syscalls() {
        let mut p = Process::new();
        match p.try_call(0x14, &[]) {
            Err(CpuError::Unsupported(msg)) => assert!(msg.contains("getpid"), "{}", msg),
            other => panic!("unexpected result {:?}", other),
        }
        match p.try_call(0x3FF, &[]) {
            Err(CpuError::Unsupported(msg)) => assert!(msg.contains("0x3FF"), "{}", msg),
            other => panic!("unexpected result {:?}", other),
        }
    }

    /// Runs a program that prints a message through `int 0x80` and exits.
    #[test]
    fn hello() {
        let code = bytes("
            B8 04 00 00 00
            BB 01 00 00 00
            B9 20 00 00 00
            BA 05 00 00 00
            CD 80
            89 C3
            B8 01 00 00 00
            CD 80
            F4
        ");
        let mut mem = Memory::new(0x100);
        mem.set_bytes(0, &code).unwrap();
        mem.set_bytes(0x20, b"hello").unwrap();
        mem.set_program_break(0x25);

        let mut kernel = Kernel::new(0x24);
        kernel.files_mut().set(1, OpenFile::buffer());
        let mut cpu = Interpreter::new(mem, 0, kernel);
        cpu.run().unwrap();

        assert!(!cpu.is_running());
        // the exit status is the return value of `write`
        assert_eq!(cpu.exit_code(), Some(5));
        assert_eq!(cpu.handler().files().get(1).and_then(|f| f.contents()).unwrap(), b"hello");
    }
}
