//! The opcode dispatch table.
//!
//! Several unrelated instructions can share one opcode byte (the "groups"
//! disambiguated by the `Reg` field of the Mod-Reg-R/M byte, and the x87
//! escapes). Instead of one big decoder `match`, every opcode maps to an
//! ordered list of *candidate* decoders. Each candidate checks whether the
//! encoding is its own and either decodes the whole instruction or returns
//! `None` without consuming any bytes, so the next candidate sees the same
//! decoder state.

use cpu::decode::Decoder;
use cpu::instr::Instr;
use cpu::interpret::CpuError;
use cpu::ops;

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

/// A candidate decoder for an opcode.
///
/// Called with the decoder positioned right behind the opcode. Returns
/// `Ok(None)` if the encoding doesn't match, which must not consume any bytes.
pub type Candidate = fn(&mut Decoder) -> Result<Option<Instr>, CpuError>;

/// Maps opcode identities to their candidate decoders.
///
/// Built once before execution starts and never modified afterwards.
pub struct DispatchTable {
    entries: HashMap<u32, Vec<Candidate>>,
}

impl DispatchTable {
    /// Creates the table containing every supported instruction.
    pub fn new() -> Self {
        let mut table = Self::empty();
        ops::register_all(&mut table);
        table
    }

    pub(crate) fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Appends `candidate` to the list of decoders tried for `opcode`.
    pub(crate) fn register(&mut self, opcode: u32, candidate: Candidate) {
        self.entries.entry(opcode).or_insert_with(Vec::new).push(candidate);
    }

    pub(crate) fn register_range(&mut self, opcodes: RangeInclusive<u32>, candidate: Candidate) {
        for opcode in opcodes {
            self.register(opcode, candidate);
        }
    }

    /// Returns the candidates registered for `opcode`, in registration order.
    pub fn candidates(&self, opcode: u32) -> &[Candidate] {
        self.entries.get(&opcode).map(|c| &c[..]).unwrap_or(&[])
    }

    /// Number of opcode identities with at least one candidate.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Tries the candidates for the decoder's current opcode in order and
    /// returns the first match.
    pub(crate) fn dispatch(&self, d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
        let opcode = d.opcode();
        for candidate in self.candidates(opcode) {
            let pos = d.current_address();
            if let Some(instr) = candidate(d)? {
                return Ok(Some(instr));
            }

            debug_assert_eq!(pos, d.current_address(),
                "candidate for opcode {:#X} consumed bytes before rejecting", opcode);
            trace!("{:#010X}: candidate for opcode {:#X} rejected the encoding", d.start(), opcode);
        }

        Ok(None)
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("opcodes", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu::state::State;
    use memory::Memory;

    fn reject(_: &mut Decoder) -> Result<Option<Instr>, CpuError> {
        Ok(None)
    }

    fn accept(d: &mut Decoder) -> Result<Option<Instr>, CpuError> {
        d.read()?;
        Ok(Some(Instr::Nop))
    }

    #[test]
    fn candidates_in_order() {
        let mut table = DispatchTable::empty();
        table.register(0x90, reject);
        table.register(0x90, accept);
        table.register_range(0x0F00..=0x0F02, reject);
        assert_eq!(table.candidates(0x90).len(), 2);
        assert_eq!(table.candidates(0x0F01).len(), 1);
        assert_eq!(table.candidates(0x91).len(), 0);
        assert_eq!(table.len(), 4);

        let mut mem = Memory::new(4);
        mem.set_bytes(0, &[0x90, 0x00]).unwrap();
        let state = State::new(0, 0);
        let mut d = Decoder::new(&mem, &state, 0);
        assert_eq!(d.decode_next(&table).unwrap(), Instr::Nop);
        assert_eq!(d.current_address(), 2);
    }

    #[test]
    fn full_table() {
        let table = DispatchTable::new();
        // every ALU form and both opcode maps are populated
        for opcode in (0x00..=0x3D).filter(|op| op & 0b110 != 0b110) {
            assert!(!table.candidates(opcode).is_empty(), "{:#X}", opcode);
        }
        assert!(!table.candidates(0x0FAF).is_empty());
        assert!(!table.candidates(0xD9E8).is_empty());
    }
}
