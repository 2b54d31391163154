//! x86 processor state.
//!
//! The 8 general purpose registers are stored as plain `u32`s, indexed by
//! their 3-bit encoding. Narrower views are computed from the full register,
//! so writing any width is immediately visible through all other widths.

use cpu::flags::{Flags, EFLAGS_RESERVED};
use cpu::instr::{OpSize, Register};

/// CPU state consisting of the emulated registers.
#[derive(Debug, Clone)]
pub struct State {
    /// `eax`, `ecx`, `edx`, `ebx`, `esp`, `ebp`, `esi`, `edi`.
    regs: [u32; 8],
    eip: u32,
    flags: Flags,
}

impl State {
    /// Create a new state with all registers zeroed.
    ///
    /// # Parameters
    ///
    /// * `eip`: Initial value for `eip` (address of the first instruction).
    /// * `esp`: Initial value for the stack and frame pointers. Should normally
    ///   point at the top of the memory, since the stack grows downwards.
    pub fn new(eip: u32, esp: u32) -> Self {
        let mut state = Self {
            regs: [0; 8],
            eip,
            flags: Flags::empty(),
        };
        state.set_esp(esp);
        state.set_ebp(esp);
        state
    }

    /// Reads a register by its encoding.
    ///
    /// For 8-bit accesses, indices 0-3 select the low byte of `eax`..`ebx`
    /// and 4-7 select their high byte. The value is zero-extended.
    pub fn get(&self, index: u8, size: OpSize) -> u32 {
        let index = usize::from(index & 0b111);
        match size {
            OpSize::Bits8 if index < 4 => self.regs[index] & 0xFF,
            OpSize::Bits8 => (self.regs[index - 4] >> 8) & 0xFF,
            OpSize::Bits16 => self.regs[index] & 0xFFFF,
            OpSize::Bits32 => self.regs[index],
        }
    }

    /// Like `get`, but sign-extends the value.
    pub fn get_signed(&self, index: u8, size: OpSize) -> i32 {
        size.sign_extend(self.get(index, size)) as i32
    }

    /// Writes the low `size` bits of `value` to a register, leaving the
    /// remaining bits of the register untouched.
    pub fn set(&mut self, index: u8, size: OpSize, value: u32) {
        let index = usize::from(index & 0b111);
        match size {
            OpSize::Bits8 if index < 4 => {
                self.regs[index] = (self.regs[index] & 0xFFFF_FF00) | (value & 0xFF);
            }
            OpSize::Bits8 => {
                let reg = &mut self.regs[index - 4];
                *reg = (*reg & 0xFFFF_00FF) | (value & 0xFF) << 8;
            }
            OpSize::Bits16 => {
                self.regs[index] = (self.regs[index] & 0xFFFF_0000) | (value & 0xFFFF);
            }
            OpSize::Bits32 => self.regs[index] = value,
        }
    }

    /// Reads a register, zero-extended to 32 bits.
    pub fn reg(&self, reg: Register) -> u32 {
        self.get(reg.index(), reg.size())
    }

    pub fn set_reg(&mut self, reg: Register, value: u32) {
        self.set(reg.index(), reg.size(), value);
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    pub fn flag(&self, flag: Flags) -> bool {
        self.flags.contains(flag)
    }

    /// Sets or clears `flags`.
    pub fn update_flags(&mut self, flags: Flags, value: bool) {
        self.flags.set(flags, value);
    }

    /// Replaces the flags in `mask` with the corresponding bits of `flags`.
    pub fn set_status(&mut self, mask: Flags, flags: Flags) {
        self.flags = (self.flags - mask) | (flags & mask);
    }

    /// Returns the materialized `EFLAGS` register.
    pub fn eflags(&self) -> u32 {
        self.flags.bits() | EFLAGS_RESERVED
    }

    /// Loads `EFLAGS`. Bits that aren't modeled are dropped.
    pub fn set_eflags(&mut self, value: u32) {
        self.flags = Flags::from_bits_truncate(value);
    }
}

macro_rules! accessors {
    (
        $index:expr => [ $getter32:ident/$setter32:ident ]
    ) => {
        pub fn $getter32(&self) -> u32 { self.regs[$index] }
        pub fn $setter32(&mut self, value: u32) { self.regs[$index] = value; }
    };
    (
        $index:expr => [ $getter32:ident/$setter32:ident, $getter16:ident/$setter16:ident ]
    ) => {
        accessors!($index => [$getter32/$setter32]);
        pub fn $getter16(&self) -> u16 { self.regs[$index] as u16 }
        pub fn $setter16(&mut self, value: u16) { self.set($index, OpSize::Bits16, value.into()); }
    };
    (
        $index:expr => [ $getter32:ident/$setter32:ident, $getter16:ident/$setter16:ident, $getter8h:ident/$setter8h:ident, $getter8l:ident/$setter8l:ident ]
    ) => {
        accessors!($index => [$getter32/$setter32, $getter16/$setter16]);
        pub fn $getter8h(&self) -> u8 { (self.regs[$index] >> 8) as u8 }
        pub fn $setter8h(&mut self, value: u8) { self.set($index + 4, OpSize::Bits8, value.into()); }
        pub fn $getter8l(&self) -> u8 { self.regs[$index] as u8 }
        pub fn $setter8l(&mut self, value: u8) { self.set($index, OpSize::Bits8, value.into()); }
    };
}

impl State {
    accessors!(0 => [eax/set_eax, ax/set_ax, ah/set_ah, al/set_al]);
    accessors!(1 => [ecx/set_ecx, cx/set_cx, ch/set_ch, cl/set_cl]);
    accessors!(2 => [edx/set_edx, dx/set_dx, dh/set_dh, dl/set_dl]);
    accessors!(3 => [ebx/set_ebx, bx/set_bx, bh/set_bh, bl/set_bl]);
    accessors!(4 => [esp/set_esp, sp/set_sp]);
    accessors!(5 => [ebp/set_ebp, bp/set_bp]);
    accessors!(6 => [esi/set_esi, si/set_si]);
    accessors!(7 => [edi/set_edi, di/set_di]);

    pub fn eip(&self) -> u32 { self.eip }
    pub fn set_eip(&mut self, value: u32) { self.eip = value; }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let mut state = State::new(0, 0);
        assert_eq!(state.eax(), 0);
        assert_eq!(state.ax(), 0);
        assert_eq!(state.ah(), 0);
        assert_eq!(state.al(), 0);
        state.set_eax(!0);
        assert_eq!(state.eax(), !0);
        assert_eq!(state.ax(), !0);
        assert_eq!(state.ah(), !0);
        assert_eq!(state.al(), !0);
        state.set_al(0);
        assert_eq!(state.ah(), !0);
        assert_eq!(state.al(), 0);
        state.set_eax(!0);
        state.set_ah(0);
        assert_eq!(state.ah(), 0);
        assert_eq!(state.al(), !0);
        assert_eq!(state.eax(), 0xFFFF_00FF);
    }

    #[test]
    fn views_alias() {
        let mut state = State::new(0, 0);
        state.set(2, OpSize::Bits32, 0x1234_5678);
        assert_eq!(state.get(2, OpSize::Bits16), 0x5678);
        assert_eq!(state.get(2, OpSize::Bits8), 0x78);
        // index 6 in byte mode is `dh`
        assert_eq!(state.get(6, OpSize::Bits8), 0x56);

        state.set(6, OpSize::Bits8, 0xAB);
        assert_eq!(state.edx(), 0x1234_AB78);
        state.set(2, OpSize::Bits16, 0xFFFF_0001);
        assert_eq!(state.edx(), 0x1234_0001);
        assert_eq!(state.get_signed(2, OpSize::Bits8), 1);

        state.set_reg(Register::Si, 0x8000);
        assert_eq!(state.get_signed(6, OpSize::Bits16), -0x8000);
        assert_eq!(state.esi(), 0x8000);
    }

    #[test]
    fn initial_stack() {
        let state = State::new(0x100, 0xFFF);
        assert_eq!(state.eip(), 0x100);
        assert_eq!(state.esp(), 0xFFF);
        assert_eq!(state.ebp(), 0xFFF);
        assert_eq!(state.eax(), 0);
    }

    #[test]
    fn eflags_materialization() {
        let mut state = State::new(0, 0);
        assert_eq!(state.eflags(), 0x2);
        state.set_eflags(0xFFFF_FFFF);
        assert!(state.flag(Flags::OF));
        assert_eq!(state.eflags(), Flags::all().bits() | 0x2);
        state.update_flags(Flags::CF | Flags::OF, false);
        assert!(!state.flag(Flags::CF));
        assert!(state.flag(Flags::ZF));
    }
}
