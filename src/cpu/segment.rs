//! Segment registers, segment descriptors and the global descriptor table.
//!
//! Linux runs its processes in a flat address space: `CS`, `DS`, `ES` and `SS`
//! all describe the whole 4 GB with a base of 0. The only segments that matter
//! in practice are `GS` (and sometimes `FS`), which the C library points at its
//! thread control block via `set_thread_area`.
//!
//! Every segment register consists of the *visible* 16-bit selector and a
//! *hidden* descriptor cache. Address translation only ever consults the cache,
//! which is refreshed when a selector is loaded.

use std::fmt;

/// One of the six x86 segment registers.
///
/// The discriminants match the 3-bit `Sreg` encoding used by `mov Sreg, r/m16`
/// and friends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum Segment {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
}

impl Segment {
    pub fn name(&self) -> &'static str {
        match self {
            Segment::Es => "es",
            Segment::Cs => "cs",
            Segment::Ss => "ss",
            Segment::Ds => "ds",
            Segment::Fs => "fs",
            Segment::Gs => "gs",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A segment selector as loaded into a segment register.
///
/// ```notrust
/// 15                 3  2  1  0
/// +--------------------+--+-----+
/// |       index        |TI| RPL |
/// +--------------------+--+-----+
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Selector(pub u16);

impl Selector {
    /// Index of the descriptor in the descriptor table.
    pub fn index(&self) -> usize {
        (self.0 >> 3) as usize
    }

    /// Table indicator. `0` selects the GDT, `1` the LDT.
    pub fn table_indicator(&self) -> u8 {
        ((self.0 >> 2) & 1) as u8
    }

    /// Requested privilege level.
    pub fn rpl(&self) -> u8 {
        (self.0 & 0b11) as u8
    }
}

/// The decoded contents of an 8-byte segment descriptor.
///
/// Raw layout (little-endian):
///
/// ```notrust
/// byte 0-1  limit bits 0..16
/// byte 2-3  base bits 0..16
/// byte 4    base bits 16..24
/// byte 5    access byte (type, S, DPL, P)
/// byte 6    low nibble: limit bits 16..20, high nibble: AVL, L, DB, G
/// byte 7    base bits 24..32
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
    pub base: u32,
    /// 20-bit segment limit.
    pub limit: u32,
    pub access: u8,
    /// The 4 flag bits from the high nibble of byte 6.
    pub flags: u8,
}

impl Descriptor {
    /// Access byte bit 7, "segment present".
    pub const PRESENT: u8 = 1 << 7;
    /// Flag nibble bit 3, limit is in 4K pages.
    pub const GRANULARITY: u8 = 1 << 3;
    /// Flag nibble bit 2, 32-bit segment.
    pub const DB: u8 = 1 << 2;

    /// The descriptor used for the flat segments a process starts out with.
    pub fn flat() -> Self {
        Self {
            base: 0,
            limit: 0xFFFFF,
            access: Self::PRESENT | 0b0001_0011,
            flags: Self::GRANULARITY | Self::DB,
        }
    }

    pub fn decode(raw: [u8; 8]) -> Self {
        let limit_1 = u32::from(raw[0]) | u32::from(raw[1]) << 8;
        let base_1 = u32::from(raw[2]) | u32::from(raw[3]) << 8;
        let base_2 = u32::from(raw[4]);
        let limit_2 = u32::from(raw[6] & 0x0F);
        let base_3 = u32::from(raw[7]);

        Self {
            base: base_3 << 24 | base_2 << 16 | base_1,
            limit: limit_2 << 16 | limit_1,
            access: raw[5],
            flags: raw[6] >> 4,
        }
    }

    pub fn encode(&self) -> [u8; 8] {
        [
            self.limit as u8,
            (self.limit >> 8) as u8,
            self.base as u8,
            (self.base >> 8) as u8,
            (self.base >> 16) as u8,
            self.access,
            ((self.limit >> 16) & 0x0F) as u8 | (self.flags << 4),
            (self.base >> 24) as u8,
        ]
    }

    pub fn present(&self) -> bool {
        self.access & Self::PRESENT != 0
    }

    /// Descriptor privilege level.
    pub fn dpl(&self) -> u8 {
        (self.access >> 5) & 0b11
    }

    /// Whether this is a system segment (S bit clear) rather than code/data.
    pub fn is_system(&self) -> bool {
        self.access & (1 << 4) == 0
    }
}

#[derive(Debug, Copy, Clone, Default)]
struct SegmentRegister {
    selector: Selector,
    cache: Descriptor,
}

/// The six segment registers with their hidden descriptor caches.
#[derive(Debug, Clone)]
pub struct SegmentRegisters {
    regs: [SegmentRegister; 6],
}

impl SegmentRegisters {
    /// Creates a segment register set in which every segment is flat.
    pub fn new() -> Self {
        let flat = SegmentRegister {
            selector: Selector(0),
            cache: Descriptor::flat(),
        };

        Self {
            regs: [flat; 6],
        }
    }

    pub fn selector(&self, seg: Segment) -> Selector {
        self.regs[seg as usize].selector
    }

    pub fn descriptor(&self, seg: Segment) -> &Descriptor {
        &self.regs[seg as usize].cache
    }

    /// Returns the base address from the segment's hidden cache.
    pub fn hidden_base(&self, seg: Segment) -> u32 {
        self.regs[seg as usize].cache.base
    }

    /// Loads `selector` into `seg` and refreshes the hidden cache from the raw
    /// descriptor bytes.
    pub fn load(&mut self, seg: Segment, selector: Selector, raw: [u8; 8]) {
        let cache = Descriptor::decode(raw);
        debug!("load {} <- {:#06X} (base={:#010X}, limit={:#07X}, access={:#04X})",
            seg, selector.0, cache.base, cache.limit, cache.access);
        self.regs[seg as usize] = SegmentRegister { selector, cache };
    }
}

impl Default for SegmentRegisters {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of GDT entries a fresh process starts with.
pub const GDT_ENTRIES: usize = 6;

/// The global descriptor table.
///
/// This lives outside of guest memory. It is written by the system call layer
/// (`set_thread_area`) and read by segment register loads.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    entries: Vec<[u8; 8]>,
}

impl DescriptorTable {
    /// Creates a table with `len` zeroed (non-present) entries.
    pub fn new(len: usize) -> Self {
        Self {
            entries: vec![[0; 8]; len],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<[u8; 8]> {
        self.entries.get(index).cloned()
    }

    /// Overwrites entry `index`. Returns `false` if the index is out of range.
    pub fn set(&mut self, index: usize, raw: [u8; 8]) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) => {
                debug!("GDT[{}] <- {:?}", index, Descriptor::decode(raw));
                *entry = raw;
                true
            }
            None => false,
        }
    }

    /// Finds the first entry (excluding the null descriptor) whose present bit
    /// is clear.
    pub fn find_free(&self) -> Option<usize> {
        self.entries.iter()
            .enumerate()
            .skip(1)
            .find(|(_, raw)| !Descriptor::decode(**raw).present())
            .map(|(index, _)| index)
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new(GDT_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_fields() {
        // base = 0x12345678, limit = 0xABCDE, access = 0x92, flags = 0xC
        let raw = [0xDE, 0xBC, 0x78, 0x56, 0x34, 0x92, 0xCA, 0x12];
        let desc = Descriptor::decode(raw);
        assert_eq!(desc.base, 0x12345678);
        assert_eq!(desc.limit, 0xABCDE);
        assert_eq!(desc.access, 0x92);
        assert_eq!(desc.flags, 0xC);
        assert!(desc.present());
        assert!(!desc.is_system());
        assert_eq!(desc.dpl(), 0);
        assert_eq!(desc.encode(), raw);
    }

    #[test]
    fn selector_fields() {
        let sel = Selector(0x33);
        assert_eq!(sel.index(), 6);
        assert_eq!(sel.table_indicator(), 0);
        assert_eq!(sel.rpl(), 3);
        assert_eq!(Selector(0b1100).table_indicator(), 1);
    }

    #[test]
    fn hidden_cache_is_used() {
        let mut segs = SegmentRegisters::new();
        assert_eq!(segs.hidden_base(Segment::Gs), 0);

        let desc = Descriptor { base: 0x4000, limit: 0xFFFFF, access: Descriptor::PRESENT, flags: 0 };
        segs.load(Segment::Gs, Selector(3 << 3 | 3), desc.encode());
        assert_eq!(segs.hidden_base(Segment::Gs), 0x4000);
        assert_eq!(segs.selector(Segment::Gs), Selector(0x1B));
        assert_eq!(segs.hidden_base(Segment::Ds), 0);
    }

    #[test]
    fn gdt_free_entries() {
        let mut gdt = DescriptorTable::default();
        assert_eq!(gdt.len(), GDT_ENTRIES);
        assert_eq!(gdt.find_free(), Some(1));
        assert!(gdt.set(1, Descriptor::flat().encode()));
        assert_eq!(gdt.find_free(), Some(2));
        assert!(!gdt.set(GDT_ENTRIES, [0; 8]));
        assert_eq!(gdt.get(GDT_ENTRIES), None);
    }
}
