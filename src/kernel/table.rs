//! Stores static information about the i386 system calls.

/// A system call known to the kernel.
#[derive(Debug)]
pub struct SyscallInfo {
    /// Name without the `sys_` prefix.
    pub name: &'static str,
    /// Value of `EAX` selecting the call.
    pub number: u32,
    pub kind: SyscallKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SyscallKind {
    /// Implemented, taking `arity` arguments.
    Implemented {
        arity: usize,
    },
    /// Known to exist, but not implemented.
    ///
    /// Calling one of these stops the program.
    Unimplemented,
}

impl SyscallInfo {
    /// Number of argument registers to log.
    pub fn arity(&self) -> usize {
        match self.kind {
            SyscallKind::Implemented { arity } => arity,
            SyscallKind::Unimplemented => 0,
        }
    }
}

/// Defines a `SyscallInfo` for an implemented system call.
macro_rules! func {
    ($nr:tt: $name:ident arity=$arity:tt) => {
        SyscallInfo {
            name: stringify!($name),
            number: $nr,
            kind: SyscallKind::Implemented { arity: $arity },
        }
    };
}

/// Defines a `SyscallInfo` for a known but unimplemented system call.
macro_rules! unimp {
    ($nr:tt: $name:ident) => {
        SyscallInfo {
            name: stringify!($name),
            number: $nr,
            kind: SyscallKind::Unimplemented,
        }
    };
}

/// Sorted by number.
static SYSCALL_TABLE: &'static [SyscallInfo] = &[
    func!  (0x001: exit                arity=1),
    unimp! (0x002: fork),
    func!  (0x003: read                arity=3),
    func!  (0x004: write               arity=3),
    func!  (0x005: open                arity=3),
    func!  (0x006: close               arity=1),
    unimp! (0x007: waitpid),
    unimp! (0x008: creat),
    unimp! (0x009: link),
    func!  (0x00A: unlink              arity=1),
    unimp! (0x00B: execve),
    unimp! (0x00C: chdir),
    unimp! (0x00D: time),
    unimp! (0x013: lseek),
    unimp! (0x014: getpid),
    unimp! (0x021: access),
    unimp! (0x025: kill),
    unimp! (0x026: rename),
    unimp! (0x027: mkdir),
    unimp! (0x029: dup),
    unimp! (0x02A: pipe),
    func!  (0x02D: brk                 arity=1),
    func!  (0x036: ioctl               arity=3),
    unimp! (0x037: fcntl),
    unimp! (0x03F: dup2),
    unimp! (0x04E: gettimeofday),
    func!  (0x05B: munmap              arity=2),
    func!  (0x07A: newuname            arity=1),
    unimp! (0x07D: mprotect),
    func!  (0x08C: llseek              arity=5),
    func!  (0x092: writev              arity=3),
    unimp! (0x0AE: rt_sigaction),
    unimp! (0x0AF: rt_sigprocmask),
    unimp! (0x0B7: getcwd),
    func!  (0x0C0: mmap2               arity=5),
    unimp! (0x0C3: stat64),
    unimp! (0x0C5: fstat64),
    unimp! (0x0C7: getuid32),
    unimp! (0x0F0: futex),
    func!  (0x0F3: set_thread_area     arity=1),
    func!  (0x0FC: exit_group          arity=1),
    func!  (0x102: set_tid_address     arity=1),
    func!  (0x109: clock_gettime       arity=2),
    unimp! (0x127: openat),
    unimp! (0x180: getrandom),
];

/// Looks up a system call by number.
pub fn get_syscall_info(number: u32) -> Option<&'static SyscallInfo> {
    SYSCALL_TABLE.binary_search_by_key(&number, |info| info.number)
        .ok()
        .map(|index| &SYSCALL_TABLE[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Checks that the table is sorted, which the binary search relies on.
    #[test]
    fn sorted() {
        for pair in SYSCALL_TABLE.windows(2) {
            assert!(pair[0].number < pair[1].number,
                    "{} and {} are out of order", pair[0].name, pair[1].name);
        }
    }

    #[test]
    fn lookup() {
        let info = get_syscall_info(0x04).unwrap();
        assert_eq!(info.name, "write");
        assert_eq!(info.arity(), 3);
        assert_eq!(get_syscall_info(0x14).unwrap().kind, SyscallKind::Unimplemented);
        assert!(get_syscall_info(0x1234).is_none());
    }
}
