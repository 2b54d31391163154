//! Parser for 32-bit little-endian i386 ELF executables.
//!
//! Only the parts needed to load a statically linked program are read: the
//! file header (for validation and the entry point) and the program header
//! table. Sections and symbols are ignored.

use std::error::Error;
use std::fmt;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;

/// Size of the ELF32 file header.
const EHDR_SIZE: usize = 52;
/// Minimum size of an ELF32 program header table entry.
const PHDR_SIZE: usize = 32;

/// Program header type of a loadable segment.
pub const PT_LOAD: u32 = 1;

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from(data[at]) | u16::from(data[at + 1]) << 8
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from(read_u16(data, at)) | u32::from(read_u16(data, at + 2)) << 16
}

/// An entry of the program header table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramHeader {
    /// `p_type`
    pub kind: u32,
    /// Offset of the segment's data in the file.
    pub offset: u32,
    /// Virtual address the segment is loaded to.
    pub vaddr: u32,
    /// Number of bytes stored in the file.
    pub filesz: u32,
    /// Number of bytes the segment occupies in memory. The bytes past
    /// `filesz` are zero-filled.
    pub memsz: u32,
    /// `PF_X`, `PF_W` and `PF_R`.
    pub flags: u32,
}

impl ProgramHeader {
    fn parse(raw: &[u8]) -> Self {
        Self {
            kind: read_u32(raw, 0),
            offset: read_u32(raw, 4),
            vaddr: read_u32(raw, 8),
            filesz: read_u32(raw, 16),
            memsz: read_u32(raw, 20),
            flags: read_u32(raw, 24),
        }
    }

    pub fn is_load(&self) -> bool {
        self.kind == PT_LOAD
    }

    /// First address past the segment in memory.
    pub fn end(&self) -> u32 {
        self.vaddr + self.memsz
    }
}

/// A parsed ELF executable, borrowing the file contents.
#[derive(Debug)]
pub struct Elf<'a> {
    data: &'a [u8],
    entry: u32,
    program_headers: Vec<ProgramHeader>,
}

impl<'a> Elf<'a> {
    /// Parses and validates an i386 executable.
    ///
    /// Besides the header fields, this checks that every loadable segment's
    /// file data lies inside `data` and that its memory image doesn't wrap
    /// around the 4 GB address space.
    pub fn parse(data: &'a [u8]) -> Result<Self, ElfError> {
        if data.len() < EHDR_SIZE {
            return Err(ElfError::Truncated);
        }
        if data[..4] != ELF_MAGIC {
            return Err(ElfError::BadMagic);
        }
        if data[4] != ELFCLASS32 {
            return Err(ElfError::UnsupportedClass(data[4]));
        }
        if data[5] != ELFDATA2LSB {
            return Err(ElfError::UnsupportedEncoding(data[5]));
        }

        let kind = read_u16(data, 16);
        if kind != ET_EXEC {
            return Err(ElfError::UnsupportedType(kind));
        }
        let machine = read_u16(data, 18);
        if machine != EM_386 {
            return Err(ElfError::UnsupportedMachine(machine));
        }

        let entry = read_u32(data, 24);
        let phoff = read_u32(data, 28) as usize;
        let phentsize = usize::from(read_u16(data, 42));
        let phnum = usize::from(read_u16(data, 44));

        if phnum > 0 && phentsize < PHDR_SIZE {
            return Err(ElfError::BadProgramHeaderTable);
        }
        let table_end = phentsize.checked_mul(phnum)
            .and_then(|len| len.checked_add(phoff))
            .ok_or(ElfError::BadProgramHeaderTable)?;
        if table_end > data.len() {
            return Err(ElfError::BadProgramHeaderTable);
        }

        let mut program_headers = Vec::with_capacity(phnum);
        for index in 0..phnum {
            let start = phoff + index * phentsize;
            let ph = ProgramHeader::parse(&data[start..start + PHDR_SIZE]);

            if ph.is_load() {
                let file_end = ph.offset.checked_add(ph.filesz);
                let fits_file = file_end.map_or(false, |end| end as usize <= data.len());
                let fits_memory = ph.filesz <= ph.memsz && ph.vaddr.checked_add(ph.memsz).is_some();
                if !fits_file || !fits_memory {
                    return Err(ElfError::BadSegment { index });
                }
            }

            program_headers.push(ph);
        }

        Ok(Self { data, entry, program_headers })
    }

    /// Address of the first instruction.
    pub fn entry(&self) -> u32 {
        self.entry
    }

    pub fn program_headers(&self) -> &[ProgramHeader] {
        &self.program_headers
    }

    /// The `PT_LOAD` program headers, in file order.
    pub fn segments<'b>(&'b self) -> impl Iterator<Item = &'b ProgramHeader> + 'b {
        self.program_headers.iter().filter(|ph| ph.is_load())
    }

    /// The bytes stored in the file for a loadable segment.
    ///
    /// `ph` must be one of this file's program headers.
    pub fn segment_data(&self, ph: &ProgramHeader) -> &'a [u8] {
        let start = ph.offset as usize;
        &self.data[start..start + ph.filesz as usize]
    }
}

/// Reasons for rejecting an executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElfError {
    /// The file is shorter than the ELF header.
    Truncated,
    BadMagic,
    /// Not a 32-bit file.
    UnsupportedClass(u8),
    /// Not little-endian.
    UnsupportedEncoding(u8),
    /// Not an executable (`ET_EXEC`). Shared objects and position independent
    /// executables can't be loaded.
    UnsupportedType(u16),
    /// Built for another architecture than i386.
    UnsupportedMachine(u16),
    /// The program header table doesn't fit in the file.
    BadProgramHeaderTable,
    /// A loadable segment points outside of the file or the address space.
    BadSegment {
        index: usize,
    },
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ElfError::Truncated => f.write_str("file too short to be an ELF executable"),
            ElfError::BadMagic => f.write_str("not an ELF file (bad magic)"),
            ElfError::UnsupportedClass(class) => write!(f, "unsupported ELF class {} (expected 32-bit)", class),
            ElfError::UnsupportedEncoding(enc) => {
                write!(f, "unsupported data encoding {} (expected little-endian)", enc)
            }
            ElfError::UnsupportedType(kind) => write!(f, "unsupported ELF type {} (expected an executable)", kind),
            ElfError::UnsupportedMachine(machine) => write!(f, "unsupported machine {} (expected i386)", machine),
            ElfError::BadProgramHeaderTable => f.write_str("program header table out of bounds"),
            ElfError::BadSegment { index } => write!(f, "program header {} describes an invalid segment", index),
        }
    }
}

impl Error for ElfError {}

/// Builds executables in memory for the loader tests.
#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A loadable segment: virtual address, file data and memory size.
    pub struct Segment<'a> {
        pub vaddr: u32,
        pub data: &'a [u8],
        pub memsz: u32,
    }

    fn put_u16(buf: &mut Vec<u8>, value: u16) {
        buf.push(value as u8);
        buf.push((value >> 8) as u8);
    }

    fn put_u32(buf: &mut Vec<u8>, value: u32) {
        put_u16(buf, value as u16);
        put_u16(buf, (value >> 16) as u16);
    }

    pub fn build(entry: u32, segments: &[Segment]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ELF_MAGIC);
        buf.extend_from_slice(&[ELFCLASS32, ELFDATA2LSB, 1, 0]);
        buf.resize(16, 0);
        put_u16(&mut buf, ET_EXEC);
        put_u16(&mut buf, EM_386);
        put_u32(&mut buf, 1);
        put_u32(&mut buf, entry);
        put_u32(&mut buf, EHDR_SIZE as u32);   // e_phoff
        put_u32(&mut buf, 0);                  // e_shoff
        put_u32(&mut buf, 0);                  // e_flags
        put_u16(&mut buf, EHDR_SIZE as u16);
        put_u16(&mut buf, PHDR_SIZE as u16);
        put_u16(&mut buf, segments.len() as u16);
        put_u16(&mut buf, 40);                 // e_shentsize
        put_u16(&mut buf, 0);                  // e_shnum
        put_u16(&mut buf, 0);                  // e_shstrndx
        assert_eq!(buf.len(), EHDR_SIZE);

        let mut offset = EHDR_SIZE + PHDR_SIZE * segments.len();
        for seg in segments {
            put_u32(&mut buf, PT_LOAD);
            put_u32(&mut buf, offset as u32);
            put_u32(&mut buf, seg.vaddr);
            put_u32(&mut buf, seg.vaddr);
            put_u32(&mut buf, seg.data.len() as u32);
            put_u32(&mut buf, seg.memsz);
            put_u32(&mut buf, 0b101);
            put_u32(&mut buf, 0x1000);
            offset += seg.data.len();
        }
        for seg in segments {
            buf.extend_from_slice(seg.data);
        }

        buf
    }
}
