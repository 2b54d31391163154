//! Puts a program into guest memory and prepares the initial process state.
//!
//! Two image formats are supported: flat binaries, which are copied to a fixed
//! offset and entered at their first byte, and ELF executables, whose loadable
//! segments are copied to their virtual addresses.

use cpu::instr::{OpSize, Segment};
use cpu::State;
use elf::{Elf, ElfError};
use memory::{Memory, MemoryFault};

use std::error::Error;
use std::fmt;

pub const PAGE_SIZE: u32 = 0x1000;

/// Where a program ended up in memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Image {
    /// Initial `EIP`.
    pub entry: u32,
    /// Last byte of the loaded program. The program break can never be moved
    /// below this.
    pub code_end: u32,
    /// Initial program break.
    pub program_break: u32,
}

fn page_align(addr: u32) -> Option<u32> {
    addr.checked_add(PAGE_SIZE - 1).map(|end| end & !(PAGE_SIZE - 1))
}

/// Copies a flat binary to `offset` and starts execution there.
///
/// The memory is not grown. The program break is placed right after the
/// image.
pub fn load_flat(mem: &mut Memory, data: &[u8], offset: u32) -> Result<Image, LoaderError> {
    if data.is_empty() {
        return Err(LoaderError::EmptyImage);
    }

    mem.write_bytes(Segment::Ds, offset, data)?;
    let end = offset + data.len() as u32;
    info!("loaded flat image to {:#010X}-{:#010X}", offset, end - 1);
    mem.set_program_break(end);

    Ok(Image {
        entry: offset,
        code_end: end - 1,
        program_break: end,
    })
}

/// Loads the `PT_LOAD` segments of an ELF executable.
///
/// The memory is grown to hold the highest segment, rounded up to a page,
/// plus `extra` bytes for the heap and the stack. The program break starts at
/// that page boundary.
pub fn load_elf(mem: &mut Memory, elf: &Elf, extra: u32) -> Result<Image, LoaderError> {
    let highest = elf.segments()
        .filter(|ph| ph.memsz > 0)
        .map(|ph| ph.end())
        .max()
        .ok_or(LoaderError::NoLoadableSegments)?;
    let program_break = page_align(highest).ok_or(LoaderError::TooLarge)?;
    let size = program_break.checked_add(extra).ok_or(LoaderError::TooLarge)?;
    mem.grow(size);

    for ph in elf.segments().filter(|ph| ph.memsz > 0) {
        info!(
            "mapping segment to {:#010X}-{:#010X} ({} bytes from file offset {:#X})",
            ph.vaddr, ph.end(), ph.filesz, ph.offset,
        );
        mem.write_bytes(Segment::Ds, ph.vaddr, elf.segment_data(ph))?;
        mem.fill(Segment::Ds, ph.vaddr + ph.filesz, ph.memsz - ph.filesz, 0)?;
    }

    info!("entry point {:#010X}, program break {:#010X}", elf.entry(), program_break);
    mem.set_program_break(program_break);

    Ok(Image {
        entry: elf.entry(),
        code_end: highest - 1,
        program_break,
    })
}

/// Lays out the i386 System V start-up stack below the current `ESP`.
///
/// From `ESP` upwards, the program finds `argc`, the `argv` pointers followed
/// by a NULL, an empty environment (a single NULL) and an auxiliary vector
/// holding only `AT_NULL`. The argument strings are stored above that, and
/// `ESP` ends up 16-byte aligned.
pub fn setup_stack(state: &mut State, mem: &mut Memory, args: &[String]) -> Result<(), LoaderError> {
    let no_space = LoaderError::NoStackSpace;
    let mut sp = state.esp();

    let mut argv = Vec::with_capacity(args.len());
    for arg in args {
        let mut bytes = arg.clone().into_bytes();
        bytes.push(0);
        sp = sp.checked_sub(bytes.len() as u32).ok_or(no_space.clone())?;
        mem.write_bytes(Segment::Ss, sp, &bytes)?;
        argv.push(sp);
    }

    // argc, argv[], NULL, envp NULL, AT_NULL (type and value)
    let words: Vec<u32> = Some(args.len() as u32).into_iter()
        .chain(argv)
        .chain(vec![0; 4])
        .collect();
    let table_size = words.len() as u32 * 4;
    sp = sp.checked_sub(table_size).ok_or(no_space.clone())? & !0xF;
    if sp < mem.program_break() {
        return Err(no_space);
    }

    for (i, word) in words.iter().enumerate() {
        mem.write(Segment::Ss, sp + i as u32 * 4, OpSize::Bits32, *word)?;
    }

    debug!("start-up stack at {:#010X} with {} arguments", sp, args.len());
    state.set_esp(sp);
    Ok(())
}

/// Errors that prevent a program from being loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderError {
    Elf(ElfError),
    /// The image doesn't fit in the guest memory.
    MemoryFault(MemoryFault),
    EmptyImage,
    /// The executable has nothing to load.
    NoLoadableSegments,
    /// The image plus the requested memory exceed the 32-bit address space.
    TooLarge,
    /// The start-up stack would overlap the program.
    NoStackSpace,
}

impl From<ElfError> for LoaderError {
    fn from(e: ElfError) -> Self {
        LoaderError::Elf(e)
    }
}

impl From<MemoryFault> for LoaderError {
    fn from(e: MemoryFault) -> Self {
        LoaderError::MemoryFault(e)
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoaderError::Elf(e) => write!(f, "invalid executable: {}", e),
            LoaderError::MemoryFault(e) => write!(f, "image doesn't fit in memory: {}", e),
            LoaderError::EmptyImage => f.write_str("empty image"),
            LoaderError::NoLoadableSegments => f.write_str("executable has no loadable segments"),
            LoaderError::TooLarge => f.write_str("image exceeds the 32-bit address space"),
            LoaderError::NoStackSpace => f.write_str("no room for the start-up stack"),
        }
    }
}

impl Error for LoaderError {}
