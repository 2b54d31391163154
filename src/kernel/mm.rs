//! Memory management: the program break, anonymous mappings and thread-local
//! storage descriptors.
//!
//! There is no paging. Mappings are carved out of the space between the
//! program break and the stack: new ones extend the break, and unmapped ones
//! go into a free list that later mappings are served from first.

use super::types::*;
use super::Syscall;
use cpu::instr::{OpSize, Segment};
use cpu::segment::Descriptor;

use std::u32;

const MAP_FIXED: u32 = 0x10;
const MAP_ANONYMOUS: u32 = 0x20;
/// Mapping lengths are rounded up to a multiple of this.
const MAP_ALIGN: u32 = 16;

/// A free block `start..end` below the program break.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Block {
    start: u32,
    end: u32,
}

impl Block {
    fn len(&self) -> u32 {
        self.end - self.start
    }
}

/// The memory management subsystem.
#[derive(Debug)]
pub struct Subsystem {
    /// The break can't be moved to or below this address.
    code_end: u32,
    /// Unmapped blocks, sorted by address.
    ///
    /// Adjacent blocks are always merged.
    free: Vec<Block>,
}

impl Subsystem {
    pub fn new(code_end: u32) -> Self {
        Self {
            code_end,
            free: Vec::new(),
        }
    }

    /// Takes `len` bytes from the first free block large enough.
    fn take(&mut self, len: u32) -> Option<u32> {
        let index = self.free.iter().position(|block| block.len() >= len)?;
        let start = self.free[index].start;
        if self.free[index].len() == len {
            self.free.remove(index);
        } else {
            self.free[index].start += len;
        }
        Some(start)
    }

    /// Adds `block` to the free list, merging it with its neighbours.
    fn release(&mut self, block: Block) {
        let index = self.free.iter()
            .position(|free| free.start > block.start)
            .unwrap_or(self.free.len());
        self.free.insert(index, block);

        if index + 1 < self.free.len() && self.free[index].end >= self.free[index + 1].start {
            self.free[index].end = self.free[index].end.max(self.free[index + 1].end);
            self.free.remove(index + 1);
        }
        if index > 0 && self.free[index - 1].end >= self.free[index].start {
            self.free[index - 1].end = self.free[index - 1].end.max(self.free[index].end);
            self.free.remove(index);
        }
    }

    /// Drops everything at or above `brk` from the free list.
    fn clip(&mut self, brk: u32) {
        self.free.retain(|block| block.start < brk);
        if let Some(last) = self.free.last_mut() {
            last.end = last.end.min(brk);
        }
    }

    /// Like `clip`, but also returns where the break can be lowered to if the
    /// last free block ends at `brk`.
    fn trim(&mut self, brk: u32) -> u32 {
        self.clip(brk);
        match self.free.last() {
            Some(last) if last.end == brk => {
                let start = last.start;
                self.free.pop();
                start
            }
            _ => brk,
        }
    }
}

fn align_up(len: u32) -> Option<u32> {
    len.checked_add(MAP_ALIGN - 1).map(|len| len & !(MAP_ALIGN - 1))
}

impl<'a> Syscall<'a> {
    /// Moves the program break.
    ///
    /// Returns the new break, or the current one if the request can't be
    /// satisfied (which includes `brk(0)`, used to query it).
    pub fn brk(&mut self, (addr,): (u32,)) -> SysResult {
        let current = self.mem.program_break();
        if addr <= self.kernel.mm.code_end || addr == current {
            return Ok(current);
        }
        if addr >= self.state.esp() {
            warn!("refusing to move the program break to {:#010X}, stack is at {:#010X}",
                addr, self.state.esp());
            return Ok(current);
        }

        if addr > current {
            self.mem.fill(Segment::Ds, current, addr - current, 0)?;
        } else {
            self.kernel.mm.clip(addr);
        }
        self.mem.set_program_break(addr);
        Ok(addr)
    }

    /// Maps anonymous zeroed memory. The address hint and the protection are
    /// ignored.
    pub fn mmap2(&mut self, (_addr, length, _prot, flags, _fd): (u32, u32, u32, u32, Fd)) -> SysResult {
        if flags & MAP_ANONYMOUS == 0 || flags & MAP_FIXED != 0 {
            warn!("unsupported mapping (flags {:#X})", flags);
            return Err(Errno::EINVAL);
        }
        if length == 0 {
            return Err(Errno::EINVAL);
        }
        let length = align_up(length).ok_or(Errno::ENOMEM)?;

        let start = match self.kernel.mm.take(length) {
            Some(start) => start,
            None => {
                let start = self.mem.program_break();
                match start.checked_add(length) {
                    Some(end) if end < self.state.esp() => self.mem.set_program_break(end),
                    _ => return Err(Errno::ENOMEM),
                }
                start
            }
        };

        self.mem.fill(Segment::Ds, start, length, 0)?;
        Ok(start)
    }

    pub fn munmap(&mut self, (addr, length): (u32, u32)) -> SysResult {
        let length = match align_up(length) {
            Some(0) | None => return Err(Errno::EINVAL),
            Some(length) => length,
        };
        let brk = self.mem.program_break();
        let end = match addr.checked_add(length) {
            Some(end) if addr > self.kernel.mm.code_end && end <= brk => end,
            _ => return Err(Errno::EINVAL),
        };

        let mm = &mut self.kernel.mm;
        let new_brk = if end == brk {
            mm.trim(addr)
        } else {
            mm.release(Block { start: addr, end });
            brk
        };
        if new_brk != brk {
            debug!("program break lowered to {:#010X}", new_brk);
            self.mem.set_program_break(new_brk);
        }
        Ok(0)
    }

    /// Installs a TLS segment descriptor in the GDT.
    ///
    /// `u_info` points to a `struct user_desc`: the entry number (-1 to pick a
    /// free one, which is then written back), the base, the limit and a word
    /// of flag bits.
    pub fn set_thread_area(&mut self, (u_info,): (UserPtr<UserDesc>,)) -> SysResult {
        let ptr = u_info.addr();
        let mut words = [0; 4];
        for (i, word) in words.iter_mut().enumerate() {
            *word = self.mem.read(Segment::Ds, ptr.wrapping_add(i as u32 * 4), OpSize::Bits32)?;
        }
        let [entry, base, limit, bits] = words;

        let seg_32bit = bits & 1 != 0;
        let contents = (bits >> 1) & 0b11;
        let read_exec_only = bits & (1 << 3) != 0;
        let limit_in_pages = bits & (1 << 4) != 0;
        let seg_not_present = bits & (1 << 5) != 0;
        let useable = bits & (1 << 6) != 0;

        let index = if entry == u32::MAX {
            self.gdt.find_free().ok_or(Errno::ESRCH)?
        } else {
            entry as usize
        };
        if index == 0 || index >= self.gdt.len() {
            return Err(Errno::EINVAL);
        }

        let raw = if base == 0 && limit == 0 && read_exec_only && seg_not_present
            && !seg_32bit && contents == 0 && !limit_in_pages && !useable {
            // an empty descriptor clears the entry
            [0; 8]
        } else {
            let mut access = 0b0001_0001 | (3 << 5) | (contents << 2) as u8;
            if !read_exec_only {
                access |= 1 << 1;
            }
            if !seg_not_present {
                access |= Descriptor::PRESENT;
            }
            let mut flags = 0;
            if seg_32bit {
                flags |= Descriptor::DB;
            }
            if limit_in_pages {
                flags |= Descriptor::GRANULARITY;
            }
            if useable {
                flags |= 1;
            }

            Descriptor {
                base,
                limit: limit & 0xFFFFF,
                access,
                flags,
            }.encode()
        };

        self.gdt.set(index, raw);
        self.mem.write(Segment::Ds, ptr, OpSize::Bits32, index as u32)?;
        Ok(0)
    }
}
