//! x87 register file.
//!
//! The eight data registers form a circular stack: `ST(i)` is physical
//! register `(TOP + i) % 8`. Pushing decrements `TOP`, popping increments it.
//! Exceptions are always handled with the masked response (the default value
//! is stored and execution continues); unmasked exceptions only set the
//! summary bits in the status word.

use cpu::f80::{Exceptions, RoundingMode, F80};

use num_traits::FromPrimitive;

bitflags! {
    /// The x87 status word, except for the `TOP` field.
    pub struct StatusWord: u16 {
        const IE = 1 << 0;
        const DE = 1 << 1;
        const ZE = 1 << 2;
        const OE = 1 << 3;
        const UE = 1 << 4;
        const PE = 1 << 5;
        /// Stack fault: the invalid operation was a stack overflow or
        /// underflow.
        const SF = 1 << 6;
        /// Error summary.
        const ES = 1 << 7;
        const C0 = 1 << 8;
        const C1 = 1 << 9;
        const C2 = 1 << 10;
        const C3 = 1 << 14;
        /// Busy (mirrors `ES`).
        const B = 1 << 15;

        const EXCEPTIONS = Self::IE.bits | Self::DE.bits | Self::ZE.bits | Self::OE.bits
            | Self::UE.bits | Self::PE.bits;
        const CONDITION = Self::C0.bits | Self::C1.bits | Self::C2.bits | Self::C3.bits;
    }
}

/// Control word after `fninit`: all exceptions masked, 64-bit precision,
/// round to nearest.
pub const DEFAULT_CONTROL_WORD: u16 = 0x037F;

#[derive(Debug, Clone)]
pub struct Fpu {
    /// Physical registers, indexed without regard to `top`.
    regs: [F80; 8],
    /// Bit `i` is set if physical register `i` is empty.
    empty: u8,
    top: u8,
    status: StatusWord,
    control: u16,
}

impl Fpu {
    pub fn new() -> Self {
        Self {
            regs: [F80::ZERO; 8],
            empty: 0xFF,
            top: 0,
            status: StatusWord::empty(),
            control: DEFAULT_CONTROL_WORD,
        }
    }

    /// `fninit`
    pub fn init(&mut self) {
        *self = Fpu::new();
    }

    /// Index of the physical register that is currently `ST(0)`.
    pub fn top(&self) -> u8 {
        self.top
    }

    fn physical(&self, i: u8) -> usize {
        usize::from((self.top + i) % 8)
    }

    pub fn is_empty(&self, i: u8) -> bool {
        self.empty & (1 << self.physical(i)) != 0
    }

    /// Number of non-empty registers.
    pub fn depth(&self) -> u32 {
        8 - self.empty.count_ones()
    }

    /// Pushes `value`, making it the new `ST(0)`.
    ///
    /// If the register wrapped onto is still in use, this is a stack overflow
    /// and the real indefinite is pushed instead.
    pub fn push(&mut self, value: F80) {
        self.top = (self.top + 7) % 8;
        let value = if self.is_empty(0) {
            value
        } else {
            self.stack_fault(true);
            F80::INDEFINITE
        };
        self.set_st(0, value);
    }

    /// Removes `ST(0)` and returns its value.
    pub fn pop(&mut self) -> F80 {
        let value = self.st(0);
        let phys = self.physical(0);
        self.empty |= 1 << phys;
        self.top = (self.top + 1) % 8;
        value
    }

    /// Reads `ST(i)`. Reading an empty register is a stack underflow and
    /// yields the real indefinite.
    pub fn st(&mut self, i: u8) -> F80 {
        if self.is_empty(i) {
            self.stack_fault(false);
            return F80::INDEFINITE;
        }
        self.regs[self.physical(i)]
    }

    pub fn set_st(&mut self, i: u8, value: F80) {
        let phys = self.physical(i);
        self.regs[phys] = value;
        self.empty &= !(1 << phys);
    }

    fn stack_fault(&mut self, overflow: bool) {
        warn!("x87 stack {}", if overflow { "overflow" } else { "underflow" });
        self.raise(Exceptions::IE);
        self.status.insert(StatusWord::SF);
        self.status.set(StatusWord::C1, overflow);
    }

    /// Records the exceptions signalled by an operation.
    pub fn raise(&mut self, exc: Exceptions) {
        if exc.is_empty() {
            return;
        }

        self.status |= StatusWord::from_bits_truncate(exc.bits());
        let unmasked = exc.bits() & !self.control & StatusWord::EXCEPTIONS.bits();
        if unmasked != 0 {
            debug!("unmasked x87 exception {:?}", Exceptions::from_bits_truncate(unmasked));
            self.status |= StatusWord::ES | StatusWord::B;
        }
    }

    /// `fnclex`: clears the exception flags, the stack fault and the summary
    /// bits.
    pub fn clear_exceptions(&mut self) {
        self.status &= StatusWord::CONDITION;
    }

    pub fn status(&self) -> StatusWord {
        self.status
    }

    /// The status word with `TOP` in bits 11 to 13.
    pub fn status_word(&self) -> u16 {
        self.status.bits() | u16::from(self.top) << 11
    }

    /// Sets the condition code bits `C3`, `C2` and `C0`, and clears `C1`.
    pub fn set_condition(&mut self, c3: bool, c2: bool, c0: bool) {
        self.status.remove(StatusWord::CONDITION);
        self.status.set(StatusWord::C3, c3);
        self.status.set(StatusWord::C2, c2);
        self.status.set(StatusWord::C0, c0);
    }

    /// Sets only `C1`, which stores and loads use to report rounding
    /// direction and stack faults.
    pub fn set_c1(&mut self, c1: bool) {
        self.status.set(StatusWord::C1, c1);
    }

    pub fn control_word(&self) -> u16 {
        self.control
    }

    pub fn set_control_word(&mut self, control: u16) {
        debug!("x87 control word {:#06X}", control);
        self.control = control;
    }

    /// The rounding-control field of the control word.
    pub fn rounding_mode(&self) -> RoundingMode {
        RoundingMode::from_u16((self.control >> 10) & 0b11).unwrap_or(RoundingMode::Nearest)
    }

    /// The tag word: two bits per physical register (valid, zero, special,
    /// empty).
    pub fn tag_word(&self) -> u16 {
        (0..8).fold(0, |tags, phys| {
            let value = &self.regs[phys];
            let tag = if self.empty & (1 << phys) != 0 {
                0b11
            } else if value.is_zero() {
                0b01
            } else if value.is_nan() || value.is_infinite() || value.is_denormal() {
                0b10
            } else {
                0b00
            };
            tags | tag << (phys * 2)
        })
    }
}

impl Default for Fpu {
    fn default() -> Self {
        Fpu::new()
    }
}
