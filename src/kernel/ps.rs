//! Process lifetime.

use super::types::*;
use super::Syscall;
use cpu::interpret::SyscallOutcome;

/// The only thread of the only process.
const TID: u32 = 1;

impl<'a> Syscall<'a> {
    /// Terminates the process. Only the low 8 bits of `status` are kept.
    pub fn exit(&mut self, (status,): (Int,)) -> SyscallOutcome {
        let closed = self.kernel.files.close_from(3);
        if closed > 0 {
            debug!("closed {} files left open by the program", closed);
        }
        SyscallOutcome::Exit(status.0 & 0xFF)
    }

    /// There are no other threads, so this is the same as `exit`.
    pub fn exit_group(&mut self, args: (Int,)) -> SyscallOutcome {
        self.exit(args)
    }

    pub fn set_tid_address(&mut self, (tidptr,): (UserPtr<u32>,)) -> SysResult {
        self.kernel.clear_child_tid = tidptr.addr();
        Ok(TID)
    }
}

#[cfg(test)]
mod tests {
    use cpu::interpret::SyscallOutcome;
    use kernel::testutil::*;
    use kernel::OpenFile;

    #[test]
    fn exit_status() {
        let mut p = Process::new();
        p.kernel.files_mut().set(5, OpenFile::buffer());
        assert_eq!(p.try_call(1, &[0x1234]).unwrap(), SyscallOutcome::Exit(0x34));
        assert!(p.kernel.files().get(5).is_none());
        assert!(p.kernel.files().get(1).is_some());

        assert_eq!(p.try_call(0xFC, &[-1i32 as u32]).unwrap(), SyscallOutcome::Exit(0xFF));
    }

    #[test]
    fn tid() {
        let mut p = Process::new();
        assert_eq!(p.call(0x102, &[0x800]), 1);
        assert_eq!(p.kernel.clear_child_tid, 0x800);
    }
}
