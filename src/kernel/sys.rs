//! System information: `uname` and clocks.

use super::types::*;
use super::Syscall;
use cpu::instr::{OpSize, Segment};

use std::time::{SystemTime, UNIX_EPOCH};

/// Size of each field of `struct new_utsname`.
const UTSNAME_FIELD: u32 = 65;

/// The fields of `struct new_utsname`, in order.
const UTSNAME: [&str; 6] = [
    "Linux",
    "x86vm",
    "4.19.0",
    "#1 x86vm",
    "i686",
    "(none)",
];

const CLOCK_REALTIME: u32 = 0;
const CLOCK_MONOTONIC: u32 = 1;

impl<'a> Syscall<'a> {
    pub fn newuname(&mut self, (buf,): (UserPtr<Utsname>,)) -> SysResult {
        let mut data = vec![0; UTSNAME.len() * UTSNAME_FIELD as usize];
        for (field, value) in data.chunks_mut(UTSNAME_FIELD as usize).zip(UTSNAME.iter()) {
            field[..value.len()].copy_from_slice(value.as_bytes());
        }
        self.mem.write_bytes(Segment::Ds, buf.addr(), &data)?;
        Ok(0)
    }

    /// Every clock reads the host's wall-clock time.
    pub fn clock_gettime(&mut self, (clock, tp): (u32, UserPtr<Timespec>)) -> SysResult {
        match clock {
            CLOCK_REALTIME | CLOCK_MONOTONIC => {}
            _ => debug!("clock {} read as CLOCK_REALTIME", clock),
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Errno::EINVAL)?;

        self.mem.write(Segment::Ds, tp.addr(), OpSize::Bits32, now.as_secs() as u32)?;
        self.mem.write(Segment::Ds, tp.addr().wrapping_add(4), OpSize::Bits32, now.subsec_nanos())?;
        Ok(0)
    }
}
