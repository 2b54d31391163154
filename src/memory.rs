//! Guest memory.
//!
//! The emulated process sees one contiguous, bounded byte buffer. Programs
//! address it through segments: every access names an offset which is added to
//! the hidden base of a segment register to form the effective address. Any
//! access that doesn't fit entirely inside the buffer is a `MemoryFault`.
//!
//! Most instructions use whatever segment is currently selected as the
//! *override* (by default `DS`). Segment override prefixes replace it for the
//! duration of a single instruction. Instruction fetch always goes through
//! `CS`, the stack through `SS` and string destinations through `ES`.
//!
//! The buffer also carries the *program break*, the end of the data area. It
//! is moved by the system call layer and the stack is never allowed to grow
//! below it.

use cpu::instr::OpSize;
use cpu::segment::{Segment, SegmentRegisters};
use utils::NoDebug;

use std::{cmp, fmt, u32};
use std::error::Error;

/// Bounded, segmented guest memory.
#[derive(Debug)]
pub struct Memory {
    mem: NoDebug<Vec<u8>>,
    segments: SegmentRegisters,
    segment_override: Segment,
    program_break: u32,
}

impl Memory {
    /// Creates a zero-filled memory of `size` bytes.
    ///
    /// All segments are flat and the program break starts out at 0.
    pub fn new(size: u32) -> Self {
        Self {
            mem: NoDebug(vec![0; size as usize]),
            segments: SegmentRegisters::new(),
            segment_override: Segment::Ds,
            program_break: 0,
        }
    }

    /// Returns the capacity of the memory in bytes.
    pub fn size(&self) -> u32 {
        self.mem.len() as u32
    }

    /// Grows the memory to `new_size` bytes. The new area is zero-filled.
    ///
    /// Requests to shrink the memory are ignored.
    pub fn grow(&mut self, new_size: u32) {
        if new_size as usize > self.mem.len() {
            debug!("growing memory from {:#X} to {:#X} bytes", self.mem.len(), new_size);
            self.mem.resize(new_size as usize, 0);
        }
    }

    pub fn program_break(&self) -> u32 {
        self.program_break
    }

    pub fn set_program_break(&mut self, brk: u32) {
        debug!("program break {:#010X} -> {:#010X}", self.program_break, brk);
        self.program_break = brk;
    }

    pub fn segments(&self) -> &SegmentRegisters {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut SegmentRegisters {
        &mut self.segments
    }

    /// Returns the segment currently used for data accesses.
    pub fn segment_override(&self) -> Segment {
        self.segment_override
    }

    pub fn set_segment_override(&mut self, seg: Segment) {
        self.segment_override = seg;
    }

    /// Reverts the data segment back to `DS`.
    pub fn reset_segment_override(&mut self) {
        self.segment_override = Segment::Ds;
    }

    /// Computes the buffer index for a `len`-byte access at `seg:offset`.
    fn linear(&self, seg: Segment, offset: u32, len: u32) -> Result<usize, MemoryFault> {
        let base = u64::from(self.segments.hidden_base(seg));
        let effective = base + u64::from(offset);
        if effective + u64::from(len) > self.mem.len() as u64 {
            return Err(MemoryFault {
                segment: seg,
                offset,
                len,
                capacity: self.size(),
            });
        }

        Ok(effective as usize)
    }

    /// Reads a little-endian value of the given size, zero-extended to `u32`.
    pub fn read(&self, seg: Segment, offset: u32, size: OpSize) -> Result<u32, MemoryFault> {
        let addr = self.linear(seg, offset, size.bytes())?;
        let b = &self.mem[addr..addr + size.bytes() as usize];
        Ok(match size {
            OpSize::Bits8 => u32::from(b[0]),
            OpSize::Bits16 => u32::from(b[0]) | u32::from(b[1]) << 8,
            OpSize::Bits32 => {
                u32::from(b[0]) |
                u32::from(b[1]) << 8 |
                u32::from(b[2]) << 16 |
                u32::from(b[3]) << 24
            }
        })
    }

    /// Writes the low `size` bytes of `value` in little-endian order.
    pub fn write(&mut self, seg: Segment, offset: u32, size: OpSize, value: u32) -> Result<(), MemoryFault> {
        let addr = self.linear(seg, offset, size.bytes())?;
        for i in 0..size.bytes() as usize {
            self.mem[addr + i] = (value >> (8 * i)) as u8;
        }
        Ok(())
    }

    pub fn read_bytes(&self, seg: Segment, offset: u32, len: u32) -> Result<&[u8], MemoryFault> {
        let addr = self.linear(seg, offset, len)?;
        Ok(&self.mem[addr..addr + len as usize])
    }

    pub fn write_bytes(&mut self, seg: Segment, offset: u32, data: &[u8]) -> Result<(), MemoryFault> {
        let addr = self.linear(seg, offset, data.len() as u32)?;
        self.mem[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Sets `len` bytes starting at `seg:offset` to `byte`.
    pub fn fill(&mut self, seg: Segment, offset: u32, len: u32, byte: u8) -> Result<(), MemoryFault> {
        let addr = self.linear(seg, offset, len)?;
        for b in &mut self.mem[addr..addr + len as usize] {
            *b = byte;
        }
        Ok(())
    }

    /// Reads a value relative to the current segment override.
    pub fn get(&self, offset: u32, size: OpSize) -> Result<u32, MemoryFault> {
        self.read(self.segment_override, offset, size)
    }

    /// Like `get`, but sign-extends the value to 32 bits.
    pub fn get_signed(&self, offset: u32, size: OpSize) -> Result<i32, MemoryFault> {
        self.get(offset, size).map(|value| size.sign_extend(value) as i32)
    }

    /// Writes a value relative to the current segment override.
    pub fn set(&mut self, offset: u32, size: OpSize, value: u32) -> Result<(), MemoryFault> {
        let seg = self.segment_override;
        self.write(seg, offset, size, value)
    }

    pub fn get_bytes(&self, offset: u32, len: u32) -> Result<&[u8], MemoryFault> {
        self.read_bytes(self.segment_override, offset, len)
    }

    pub fn set_bytes(&mut self, offset: u32, data: &[u8]) -> Result<(), MemoryFault> {
        let seg = self.segment_override;
        self.write_bytes(seg, offset, data)
    }

    /// Fetches an instruction byte from `cs:eip`.
    pub fn fetch(&self, eip: u32) -> Result<u8, MemoryFault> {
        self.read(Segment::Cs, eip, OpSize::Bits8).map(|b| b as u8)
    }

    /// Reads a NUL-terminated string of at most `max` bytes (terminator
    /// excluded) starting at `seg:offset`.
    pub fn read_c_string(&self, seg: Segment, offset: u32, max: u32) -> Result<Vec<u8>, MemoryFault> {
        let mut s = Vec::new();
        for i in 0..max {
            let b = self.read(seg, offset.wrapping_add(i), OpSize::Bits8)? as u8;
            if b == 0 {
                break;
            }
            s.push(b);
        }
        Ok(s)
    }

    /// Returns whether `eip` points inside the buffer.
    pub fn contains(&self, seg: Segment, offset: u32) -> bool {
        self.linear(seg, offset, 1).is_ok()
    }

    /// Returns the offset of the last byte of the buffer.
    pub fn top(&self) -> u32 {
        cmp::max(self.size(), 1) - 1
    }
}

/// An access that does not fit inside the guest memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFault {
    pub segment: Segment,
    pub offset: u32,
    /// Access size in bytes.
    pub len: u32,
    /// Memory capacity at the time of the fault.
    pub capacity: u32,
}

impl fmt::Display for MemoryFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "memory fault: {}-byte access at {}:{:#010X} (memory size {:#X})",
            self.len, self.segment, self.offset, self.capacity,
        )
    }
}

impl Error for MemoryFault {}
