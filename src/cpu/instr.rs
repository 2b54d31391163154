//! Decoded x86 instruction representation.

pub use cpu::imm::Immediate;
pub use cpu::segment::Segment;

use std::fmt;

/// A decoded x86 instruction.
///
/// Note that these decoded instructions do not carry *all* information from the
/// raw machine code stream: For example, shorthand encodings are
/// indistinguishable from their longer forms, and duplicate prefix bytes are
/// dropped. Apart from that, one `Instr` still corresponds to one x86
/// instruction.
///
/// Memory operands are resolved by the decoder: they carry the effective
/// offset computed from the register contents at the time of decoding, next to
/// the addressing form used to print them.
///
/// Unless otherwise noted, an `Operand` called `dest` may not be an immediate.
///
/// `Instr` also implements `Display`, which prints a basic disassembly of the
/// instruction. Jump and call targets are printed as absolute addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Perform a binary arithmetic or logic function on `dest` and `src` and
    /// store the result in `dest`.
    ///
    /// Reads and modifies flags according to `op`.
    Alu {
        op: AluOp,
        dest: Operand,
        src: Operand,
    },

    /// Calculate the bitwise AND of `lhs` and `rhs` and set the flags
    /// accordingly, but do not modify `lhs` or `rhs`.
    Test {
        lhs: Operand,
        rhs: Operand,
    },

    /// Add 1 to `operand`. Preserves CF.
    Inc {
        operand: Operand,
    },

    /// Subtract 1 from `operand`. Preserves CF.
    Dec {
        operand: Operand,
    },

    /// Replace `operand` with its two's complement.
    ///
    /// `operand = 0 - operand`
    ///
    /// Modifies all flags. CF is set unless the operand was 0.
    Neg {
        operand: Operand,
    },

    /// Invert every bit in `operand` and store the result back in `operand`.
    ///
    /// Does not read or modify any flags.
    Not {
        operand: Operand,
    },

    /// Shift-group operation.
    Shift {
        op: ShiftOp,
        /// Shifted value and destination.
        dest: Operand,
        /// 8-bit shift amount (immediate or `cl`).
        count: Operand,
    },

    /// `shld`/`shrd`: shift `dest`, filling the vacated bits from `src`.
    DoubleShift {
        /// `true` for `shld`, `false` for `shrd`.
        left: bool,
        dest: Operand,
        src: Register,
        count: Operand,
    },

    /// Copy bit `bit` of `base` into CF.
    BitTest {
        base: Operand,
        bit: Operand,
    },

    /// Determine the bit index of the least or most significant bit set in the
    /// operand.
    BitScan {
        /// If `true`, search for the most significant set bit. If `false`, find
        /// the least significant bit.
        reverse: bool,
        dest: Register,
        src: Operand,
    },

    /// Unsigned multiplication of `A` register with `operand`.
    ///
    /// Depending on the size of `operand`, multiplies it with `AL`, `AX` or
    /// `EAX`. The result has up to 64 bits and is stored in `AX`, `DX:AX`, or
    /// `EDX:EAX`, respectively.
    ///
    /// Modifies OF and CF.
    Mul {
        operand: Operand,
    },

    /// `imul` with a single operand. Same register usage as `Mul`.
    Imul {
        operand: Operand,
    },

    /// Truncating `imul` with 2 or 3 operands.
    ///
    /// `dest = src1 * src2`.
    ImulTrunc {
        dest: Register,
        src1: Operand,
        src2: Operand,
    },

    /// Unsigned division of `AX`, `DX:AX` or `EDX:EAX` by `operand`.
    Div {
        operand: Operand,
    },

    /// Signed division, see `Div`.
    Idiv {
        operand: Operand,
    },

    /// Store `src` in `dest`.
    ///
    /// Does not read or modify any flags.
    Mov {
        dest: Operand,
        src: Operand,
    },

    /// Move with zero-extend. `src` may be smaller than `dest`.
    MovZx {
        dest: Register,
        src: Operand,
    },

    /// Move with sign-extend. `src` may be smaller than `dest`.
    MovSx {
        dest: Register,
        src: Operand,
    },

    /// Store a segment selector in a register or memory.
    MovFromSeg {
        dest: Operand,
        seg: Segment,
    },

    /// Load a segment register. The descriptor is fetched from the GDT.
    MovToSeg {
        seg: Segment,
        src: Operand,
    },

    /// Load Effective Address.
    ///
    /// Store the offset computed for `src` in `dest`.
    ///
    /// Does not read or modify any flags.
    Lea {
        /// May be a 16-bit register, in which case the low 16-bit of the
        /// address are stored.
        dest: Register,
        /// The memory location whose address to compute.
        src: MemoryLocation,
    },

    /// Exchange the contents of two operands.
    Xchg {
        a: Operand,
        b: Operand,
    },

    /// Move `src` to `dest` if the condition holds.
    ///
    /// `src` is read even when the condition doesn't hold.
    CondMove {
        cc: ConditionCode,
        dest: Register,
        src: Operand,
    },

    /// Set byte to 0 or 1, depending on status flag.
    ///
    /// This is **not** a conditional store - it will always overwrite the
    /// operand.
    SetIf {
        /// Flag to test for.
        cc: ConditionCode,
        operand: Operand,
    },

    /// Sign-extend `AL` into `AX`.
    Cbw,
    /// Sign-extend `AX` into `EAX`.
    Cwde,
    /// Write the most significant bit of `AX` into all of `DX`.
    Cwd,
    /// Write the most significant bit of `EAX` into all of `EDX`.
    Cdq,

    /// Load `SF`, `ZF`, `AF`, `PF` and `CF` into `AH`.
    Lahf,
    /// Store `AH` into `SF`, `ZF`, `AF`, `PF` and `CF`.
    Sahf,

    /// String operation (`movs`, `stos`, `lods`, `scas`, `cmps`).
    Str {
        /// The operation to perform.
        op: StrOp,
        /// The amount of data to move (per iteration). Also specifies the part
        /// of the `a` register to use.
        size: OpSize,
        /// Repeat prefix, if any.
        ///
        /// This will perform the operation as many times as specified in
        /// `ECX`, decrementing its value each time.
        rep: Option<Rep>,
    },

    /// Push a 16- or 32-bit value onto the stack and decrement `ESP`.
    ///
    /// First, `ESP` is decremented by the size of `value` in bytes. Then,
    /// `value` is stored to memory at address `SS:ESP`.
    ///
    /// If `value` is the `ESP` register itself, the value *before* `ESP` is
    /// decremented is pushed onto the stack.
    Push {
        operand: Operand,
    },

    /// Pop a 16- or 32-bit value from the stack into a register or memory
    /// location.
    Pop {
        operand: Operand,
    },

    /// Push a segment selector, zero-extended to `size`.
    PushSeg {
        seg: Segment,
        size: OpSize,
    },

    /// Pop a selector and load it into a segment register.
    PopSeg {
        seg: Segment,
        size: OpSize,
    },

    /// Push all general purpose registers.
    Pusha {
        size: OpSize,
    },

    /// Pop all general purpose registers (the stored `ESP` is discarded).
    Popa {
        size: OpSize,
    },

    /// Push `EFLAGS`.
    Pushf {
        size: OpSize,
    },

    /// Pop `EFLAGS`.
    Popf {
        size: OpSize,
    },

    /// Create a stack frame for a procedure.
    Enter {
        /// Bytes of local storage to reserve.
        alloc: u16,
        /// Lexical nesting level (only the low 5 bits are used).
        level: u8,
    },

    /// Remove the procedure's stack frame.
    ///
    /// Equivalent to:
    ///
    /// ```notrust
    /// mov esp, ebp
    /// pop ebp
    /// ```
    ///
    /// With a 16-bit operand size, the `pop ebp` instead becomes `pop bp`.
    Leave {
        size: OpSize,
    },

    /// Unconditional jump.
    Jump {
        target: Operand,
    },

    /// Branch if the condition `cc` holds.
    ///
    /// Reads the flags specified by `cc`. Does not modify any flags.
    JumpIf {
        cc: ConditionCode,
        target: Operand,
    },

    /// Branch if `ECX` is 0.
    Jecxz {
        target: Operand,
    },

    /// Decrement `ECX` and branch if it's not 0 (and the optional condition on
    /// `ZF` holds).
    Loop {
        kind: LoopKind,
        target: Operand,
    },

    /// Call a procedure.
    ///
    /// Pushes `EIP` (after the `call` instruction) onto the stack, decrements
    /// `ESP` by 4, then sets `EIP = target`.
    Call {
        /// Target address. Might be stored in register or memory.
        target: Operand,
    },

    /// Near return to caller.
    ///
    /// First, pops the 32-bit return address `addr` off the stack. Then,
    /// `ESP = ESP + pop` is done in order to remove `pop` bytes of arguments
    /// from the stack (where `pop` may be 0). Finally, sets `EIP = addr`.
    Ret {
        pop: u16,
    },

    /// Raise interrupt.
    Int {
        vector: u8,
    },

    /// Raise interrupt 4 if overflow flag is set.
    IntO,

    /// Halt the processor. Stops the run loop.
    Hlt,

    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    Cli,
    Sti,

    Nop,

    /// Query processor identification and feature information.
    Cpuid,

    /// x87 floating-point instruction.
    Fpu(FpuInstr),
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use cpu::disasm::print_instr;

        let mut s = String::new();
        print_instr(self, &mut s);
        f.write_str(&s)
    }
}

/// A decoded operand, usually from a Mod-Reg-R/M byte and the following bytes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Operand {
    /// The operand is the value inside a register, or the register itself.
    Reg(Register),

    /// Immediate value.
    Imm(Immediate),

    /// The operand is stored in memory.
    Mem(MemoryLocation),
}

impl Operand {
    pub fn size(&self) -> OpSize {
        match self {
            Operand::Reg(reg) => reg.size(),
            Operand::Imm(imm) => imm.size(),
            Operand::Mem(mem) => mem.size,
        }
    }

    pub fn is_memory(&self) -> bool {
        match self {
            Operand::Mem(_) => true,
            _ => false,
        }
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg)
    }
}

impl From<Immediate> for Operand {
    fn from(imm: Immediate) -> Self {
        Operand::Imm(imm)
    }
}

impl From<MemoryLocation> for Operand {
    fn from(mem: MemoryLocation) -> Self {
        Operand::Mem(mem)
    }
}

/// A resolved location in segmented memory.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MemoryLocation {
    /// The operand's size. Since we only store an address, we wouldn't know
    /// this if we didn't store it.
    pub size: OpSize,
    /// The segment whose base is added to `offset`. Without a segment
    /// override prefix, this is `addressing.default_segment()`.
    pub segment: Segment,
    /// The addressing form the location was encoded with.
    pub addressing: Addressing,
    /// The effective offset, computed from `addressing` when the instruction
    /// was decoded.
    pub offset: u32,
}

impl MemoryLocation {
    /// Returns the same location with a different access size.
    pub fn with_size(&self, size: OpSize) -> Self {
        MemoryLocation {
            size,
            ..self.clone()
        }
    }

    /// Returns the location `delta` bytes further into memory.
    pub fn displaced(&self, delta: u32) -> Self {
        MemoryLocation {
            offset: self.offset.wrapping_add(delta),
            ..self.clone()
        }
    }
}

/// Addressing modes for operands in memory.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Addressing {
    /// Register-indirect addressing with optional displacement.
    ///
    /// The operand is in memory, at the address specified by the sum of the
    /// value stored in the `base` register and the address displacement `disp`.
    ///
    /// x86 has support for 32-bit displacement, 8-bit displacement, and no
    /// displacement at all (the latter saving instruction size). All of these
    /// are collapsed into `Disp` when decoded. It is also possible to use a
    /// "displacement-only" mode without a base register, which is also
    /// represented as this variant.
    Disp {
        /// 32-bit base register. Might be `None` if "displacement-only"
        /// addressing is used.
        base: Option<Register>,
        /// Fixed displacement added to the base register contents.
        disp: i32,
    },

    /// Address calculation using a Scale Index Byte.
    ///
    /// The address is computed using the following formula:
    ///
    /// `base + index * scale + disp`
    ///
    /// Where `base` and `index` represent the value stored inside the `base`
    /// and `index` registers, respectively.
    Sib {
        /// The scale value multiplied with the value of the `index` register.
        ///
        /// 1, 2, 4, or 8.
        scale: u8,
        /// Index register multiplied with `scale`. If `None`, just base
        /// register and displacement are used to calculate the address.
        index: Option<Register>,
        /// Base offset register.
        ///
        /// Might be `None` if `Mod=00` and `Base=101`, which is
        /// "displacement-only" SIB mode.
        base: Option<Register>,
        /// Fixed displacement.
        disp: i32,
    },
}

impl Addressing {
    pub fn absolute(virt_addr: u32) -> Self {
        Addressing::Disp {
            base: None,
            disp: virt_addr as i32,
        }
    }

    /// The segment used when no override prefix is present: `SS` for
    /// addresses based on `EBP` or `ESP`, `DS` for everything else.
    pub fn default_segment(&self) -> Segment {
        let base = match *self {
            Addressing::Disp { base, .. } | Addressing::Sib { base, .. } => base,
        };
        match base {
            Some(Register::Ebp) | Some(Register::Esp) => Segment::Ss,
            _ => Segment::Ds,
        }
    }
}

/// Operand or operation size (in 32-bit mode).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpSize {
    Bits8,
    Bits16,
    Bits32,
}

impl OpSize {
    pub fn bytes(&self) -> u32 {
        match self {
            OpSize::Bits8 => 1,
            OpSize::Bits16 => 2,
            OpSize::Bits32 => 4,
        }
    }

    pub fn bits(&self) -> u32 {
        self.bytes() * 8
    }

    /// All bits that fit into a value of this size.
    pub fn mask(&self) -> u32 {
        match self {
            OpSize::Bits8 => 0xFF,
            OpSize::Bits16 => 0xFFFF,
            OpSize::Bits32 => 0xFFFF_FFFF,
        }
    }

    /// The most significant bit of a value of this size.
    pub fn sign_bit(&self) -> u32 {
        1 << (self.bits() - 1)
    }

    pub fn is_negative(&self, value: u32) -> bool {
        value & self.sign_bit() != 0
    }

    /// Sign-extends the low `self` bits of `value` to 32 bits.
    pub fn sign_extend(&self, value: u32) -> u32 {
        match self {
            OpSize::Bits8 => value as u8 as i8 as i32 as u32,
            OpSize::Bits16 => value as u16 as i16 as i32 as u32,
            OpSize::Bits32 => value,
        }
    }

    /// The NASM size keyword (`byte`, `word`, `dword`).
    pub fn keyword(&self) -> &'static str {
        match self {
            OpSize::Bits8 => "byte",
            OpSize::Bits16 => "word",
            OpSize::Bits32 => "dword",
        }
    }
}

impl fmt::Display for OpSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// An enumeration of all general purpose x86 registers with *any* size.
///
/// Within each size, the registers are listed in the order of their 3-bit
/// encoding in the Mod-Reg-R/M byte.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Register {
    Al,
    Cl,
    Dl,
    Bl,
    Ah,
    Ch,
    Dh,
    Bh,

    Ax,
    Cx,
    Dx,
    Bx,
    /// 16-bit Stack Pointer.
    Sp,
    /// 16-bit Base Pointer.
    Bp,
    /// 16-bit Source Register.
    Si,
    /// 16-bit Destination Register.
    Di,

    Eax,
    Ecx,
    Edx,
    Ebx,
    Esp,
    Ebp,
    Esi,
    Edi,
}

impl Register {
    /// Convert a 3-bit register encoding to the register, given the register
    /// size.
    pub fn from_encoding(enc: u8, size: OpSize) -> Self {
        use self::Register::*;

        const BITS8: [Register; 8] = [Al, Cl, Dl, Bl, Ah, Ch, Dh, Bh];
        const BITS16: [Register; 8] = [Ax, Cx, Dx, Bx, Sp, Bp, Si, Di];
        const BITS32: [Register; 8] = [Eax, Ecx, Edx, Ebx, Esp, Ebp, Esi, Edi];

        let enc = usize::from(enc & 0b111);
        match size {
            OpSize::Bits8 => BITS8[enc],
            OpSize::Bits16 => BITS16[enc],
            OpSize::Bits32 => BITS32[enc],
        }
    }

    /// The `al`/`ax`/`eax` register of the given size.
    pub fn accumulator(size: OpSize) -> Self {
        Self::from_encoding(0, size)
    }

    /// Returns the 3-bit encoding of the register.
    pub fn index(&self) -> u8 {
        *self as u8 % 8
    }

    pub fn size(&self) -> OpSize {
        match *self as u8 / 8 {
            0 => OpSize::Bits8,
            1 => OpSize::Bits16,
            _ => OpSize::Bits32,
        }
    }

    pub fn name(&self) -> &'static str {
        use self::Register::*;
        match self {
            Al => "al",
            Cl => "cl",
            Dl => "dl",
            Bl => "bl",
            Ah => "ah",
            Ch => "ch",
            Dh => "dh",
            Bh => "bh",
            Ax => "ax",
            Cx => "cx",
            Dx => "dx",
            Bx => "bx",
            Sp => "sp",
            Bp => "bp",
            Si => "si",
            Di => "di",
            Eax => "eax",
            Ecx => "ecx",
            Edx => "edx",
            Ebx => "ebx",
            Esp => "esp",
            Ebp => "ebp",
            Esi => "esi",
            Edi => "edi",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Specifies the operation to perform for ALU instructions.
///
/// All of these share a common encoding (but might have a shorter aliased
/// encoding in some cases):
///
/// ```notrust
/// +-----------------+
/// | 0 0 A A A 0 D S |
/// +-----------------+
/// ```
///
/// (but note that instructions that take an immediate are encoded differently)
///
/// Where:
///
/// * `A`: Value of `AluOp` (3-bit ALU operation).
/// * `D`: Direction bit in ModR/M byte (0 = Add Reg to R/M field, 1 = Add R/M
///   field to Reg field).
/// * `S`: Size bit (0 = 8-bit operands, 1 = 16- or 32-bit operands) - sometimes
///   called `W` bit (width).
/// * `0`: Fixed 0 bit for ALU opcode.
///
/// Since we're always in 32-bit protected mode, choosing `S=1` will result in
/// 32-bit operands. 16-bit operands can still be selected by using an
/// operand-size prefix byte (`0x66`) before the opcode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum AluOp {
    Add = 0,
    Or = 1,
    /// Add with carry.
    Adc = 2,
    /// Subtract with borrow.
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    /// Set `EFLAGS` like `sub` would, but do not change `dest`.
    Cmp = 7,
}

impl AluOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Or => "or",
            AluOp::Adc => "adc",
            AluOp::Sbb => "sbb",
            AluOp::And => "and",
            AluOp::Sub => "sub",
            AluOp::Xor => "xor",
            AluOp::Cmp => "cmp",
        }
    }
}

/// Shift instruction group opcode.
///
/// Stored in the `Reg` field of the Mod-Reg-R/M byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    /// Rotate through carry.
    Rcl = 2,
    Rcr = 3,
    Shl = 4,
    Shr = 5,
    /// Same as `Shl`.
    Sal = 6,
    Sar = 7,
}

impl ShiftOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            ShiftOp::Rol => "rol",
            ShiftOp::Ror => "ror",
            ShiftOp::Rcl => "rcl",
            ShiftOp::Rcr => "rcr",
            ShiftOp::Shl | ShiftOp::Sal => "shl",
            ShiftOp::Shr => "shr",
            ShiftOp::Sar => "sar",
        }
    }
}

/// A condition for conditional branches, `setcc` or `cmovcc`.
///
/// Note that these have a lot of alternate names.
///
/// The discriminant is set according to the x86 instruction encoding. Condition
/// codes are encoded in 4 bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ConditionCode {
    /// OF=1
    Overflow = 0x0,
    /// OF=0
    NotOverflow = 0x1,
    /// CF=1
    ///
    /// Aka "below".
    Carry = 0x2,
    /// CF=0
    ///
    /// Aka "above or equal".
    NotCarry = 0x3,
    /// ZF=1
    Equal = 0x4,
    /// ZF=0
    ///
    /// Aka "not zero".
    NotEqual = 0x5,
    /// CF=1 or ZF=1
    BelowOrEqual = 0x6,
    /// CF=0 and ZF=0
    Above = 0x7,
    /// SF=1
    Sign = 0x8,
    /// SF=0
    NotSign = 0x9,
    /// PF=1
    ///
    /// Aka "parity even".
    Parity = 0xA,
    /// PF=0
    ///
    /// Aka "parity odd".
    NotParity = 0xB,
    /// SF!=OF
    Less = 0xC,
    /// SF=OF
    GreaterOrEqual = 0xD,
    /// ZF=1 or SF!=OF
    LessOrEqual = 0xE,
    /// ZF=0 and SF=OF
    Greater = 0xF,
}

impl ConditionCode {
    /// The mnemonic suffix (`jXX`, `setXX`, `cmovXX`).
    pub fn suffix(&self) -> &'static str {
        use self::ConditionCode::*;
        match self {
            Overflow => "o",
            NotOverflow => "no",
            Carry => "c",
            NotCarry => "nc",
            Equal => "e",
            NotEqual => "ne",
            BelowOrEqual => "be",
            Above => "a",
            Sign => "s",
            NotSign => "ns",
            Parity => "p",
            NotParity => "np",
            Less => "l",
            GreaterOrEqual => "ge",
            LessOrEqual => "le",
            Greater => "g",
        }
    }
}

/// "String" operation (more like batch memory operation).
///
/// The source operand is always `DS:ESI` (the segment can be overridden), the
/// destination operand is always `ES:EDI`. After each element, the used index
/// registers are advanced by the element size, forward if `DF` is 0 and
/// backward if it is 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StrOp {
    /// Move string within memory.
    Movs,
    /// Store `al`/`ax`/`eax` to memory.
    Stos,
    /// Load string from memory into `al`/`ax`/`eax`.
    Lods,
    /// Compare `al`/`ax`/`eax` with memory.
    Scas,
    /// Compare two strings in memory.
    Cmps,
}

impl StrOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            StrOp::Movs => "movs",
            StrOp::Stos => "stos",
            StrOp::Lods => "lods",
            StrOp::Scas => "scas",
            StrOp::Cmps => "cmps",
        }
    }

    /// Whether the operation sets flags and can terminate `repe`/`repne`
    /// early.
    pub fn compares(&self) -> bool {
        match self {
            StrOp::Scas | StrOp::Cmps => true,
            _ => false,
        }
    }
}

/// Repeat prefix of a string instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rep {
    /// `0xF3` on a non-comparing instruction.
    Rep,
    /// `0xF3` on `scas`/`cmps`: repeat while equal.
    Repe,
    /// `0xF2`: repeat while not equal.
    Repne,
}

impl Rep {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Rep::Rep => "rep",
            Rep::Repe => "repe",
            Rep::Repne => "repne",
        }
    }
}

/// Variant of the `loop` instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopKind {
    /// `0xE2`: loop while `ECX != 0`.
    Loop,
    /// `0xE1`: loop while `ECX != 0` and `ZF = 1`.
    Loope,
    /// `0xE0`: loop while `ECX != 0` and `ZF = 0`.
    Loopne,
}

/// Memory format of an x87 operand.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FpuFormat {
    /// binary32
    F32,
    /// binary64
    F64,
    /// binary80 extended precision
    F80,
    I16,
    I32,
    I64,
}

impl FpuFormat {
    pub fn bytes(&self) -> u32 {
        match self {
            FpuFormat::I16 => 2,
            FpuFormat::F32 | FpuFormat::I32 => 4,
            FpuFormat::F64 | FpuFormat::I64 => 8,
            FpuFormat::F80 => 10,
        }
    }

    pub fn is_integer(&self) -> bool {
        match self {
            FpuFormat::I16 | FpuFormat::I32 | FpuFormat::I64 => true,
            _ => false,
        }
    }

    /// The NASM size keyword.
    pub fn keyword(&self) -> &'static str {
        match self.bytes() {
            2 => "word",
            4 => "dword",
            8 => "qword",
            _ => "tword",
        }
    }
}

/// An x87 operand: either a stack register `ST(i)` or a memory location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FpuOperand {
    St(u8),
    Mem(FpuFormat, MemoryLocation),
}

/// Binary x87 arithmetic operation.
///
/// The discriminants match the `Reg` field of the `D8` memory forms (2 and 3
/// are the compare instructions).
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum FpuArith {
    Add = 0,
    Mul = 1,
    Sub = 4,
    /// Reverse subtraction: `dest = src - dest`.
    Subr = 5,
    Div = 6,
    /// Reverse division: `dest = src / dest`.
    Divr = 7,
}

impl FpuArith {
    /// The operation with reversed operand order.
    ///
    /// The `DC` and `DE` register forms encode `fsub`/`fsubr` and
    /// `fdiv`/`fdivr` the other way around.
    pub fn reversed(&self) -> Self {
        match self {
            FpuArith::Sub => FpuArith::Subr,
            FpuArith::Subr => FpuArith::Sub,
            FpuArith::Div => FpuArith::Divr,
            FpuArith::Divr => FpuArith::Div,
            other => *other,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            FpuArith::Add => "fadd",
            FpuArith::Mul => "fmul",
            FpuArith::Sub => "fsub",
            FpuArith::Subr => "fsubr",
            FpuArith::Div => "fdiv",
            FpuArith::Divr => "fdivr",
        }
    }
}

/// Constant loaded by `fld1`/`fldz`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FpuConst {
    One,
    Zero,
}

/// A decoded x87 instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum FpuInstr {
    /// `fld`/`fild`: push a value onto the register stack.
    Load(FpuOperand),
    /// `fld1`/`fldz`.
    LoadConst(FpuConst),
    /// `fst`/`fstp`/`fist`/`fistp`: store `ST(0)`, optionally popping it.
    ///
    /// Integer stores round according to the control word.
    Store {
        dest: FpuOperand,
        pop: bool,
    },
    /// `fisttp`: store `ST(0)` as an integer, rounding towards zero, and pop.
    StoreTruncate {
        format: FpuFormat,
        dest: MemoryLocation,
    },
    /// `ST(dest) = ST(dest) op src`, then optionally pop.
    Arith {
        op: FpuArith,
        dest: u8,
        src: FpuOperand,
        pop: bool,
    },
    /// `fcom`/`fucom` family: compare `ST(0)` with `src` and set `C0`, `C2` and
    /// `C3`. Pops the stack `pops` times afterwards.
    Compare {
        src: FpuOperand,
        pops: u8,
        /// Unordered compares don't signal invalid-operation on quiet NaNs.
        unordered: bool,
    },
    /// `fcomi`/`fucomi` family: like `Compare`, but sets `ZF`, `PF` and `CF`.
    CompareFlags {
        src: u8,
        pop: bool,
        unordered: bool,
    },
    /// `ftst`: compare `ST(0)` with 0.0.
    Test,
    /// `fchs`
    ChangeSign,
    /// `fabs`
    Abs,
    /// `fxch`
    Exchange(u8),
    /// `fldcw`
    LoadControl(MemoryLocation),
    /// `fnstcw`
    StoreControl(MemoryLocation),
    /// `fnstsw` to memory, or to `AX` if `None`.
    StoreStatus(Option<MemoryLocation>),
    /// `fninit`
    Init,
    /// `fnclex`
    ClearExceptions,
    /// `fnop`
    Nop,
    /// `fwait`. Exceptions are never delivered, so there's nothing to wait
    /// for.
    Wait,
}
