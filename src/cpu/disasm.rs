//! Instruction disassembler and pretty printer.
//!
//! Prints NASM-like syntax: the mnemonic, a space, and the operands separated
//! by `,` without spaces. Memory operands and immediates get a size keyword
//! (`byte`, `word`, `dword`) when no register operand pins their size down.

use cpu::instr::*;

use termcolor::{Color, ColorSpec, WriteColor};

use std::borrow::Cow;
use std::io::{self, Write};

/// Trait for assembly printing contexts.
///
/// This can be implemented to color specific parts of an instruction.
pub trait AsmPrinter {
    /// Print an instruction mnemonic/name.
    fn print_mnemonic(&mut self, mnemonic: &str);

    /// Prints a register operand (or part of an operand).
    fn print_register(&mut self, name: &str);

    /// Prints an immediate operand.
    fn print_immediate(&mut self, imm: &str);

    /// Prints an address or an address offset of an operand.
    fn print_addr_or_offset(&mut self, addr: &str);

    /// Prints a jump or call target.
    fn print_jump_target(&mut self, target: &str);

    /// Print a string of symbol characters like `&,[]+ `.
    fn print_symbols(&mut self, sym: &str);

    /// Called when the instruction is fully printed.
    fn done(&mut self);
}

/// Prints the instruction to a string, without formatting.
impl AsmPrinter for String {
    fn print_mnemonic(&mut self, mnemonic: &str) {
        self.push_str(mnemonic);
    }

    fn print_register(&mut self, name: &str) {
        self.push_str(name);
    }

    fn print_immediate(&mut self, imm: &str) {
        self.push_str(imm);
    }

    fn print_addr_or_offset(&mut self, addr: &str) {
        self.push_str(addr);
    }

    fn print_jump_target(&mut self, target: &str) {
        self.push_str(target);
    }

    fn print_symbols(&mut self, sym: &str) {
        self.push_str(sym);
    }

    fn done(&mut self) {}
}

const COLOR_MNEMONIC: Color = Color::Blue;
const COLOR_REGISTER: Color = Color::Red;
const COLOR_IMMEDIATE: Color = Color::Green;
const COLOR_ADDR: Color = Color::Cyan;
const COLOR_TARGET: Color = Color::Yellow;

/// Prints colored instructions to a terminal, one per line, prefixed with
/// their address.
///
/// Printing can't fail through the `AsmPrinter` interface, so the first I/O
/// error is kept and reported by `finish`.
#[derive(Debug)]
pub struct TermPrinter<W: WriteColor> {
    w: W,
    result: io::Result<()>,
}

impl<W: WriteColor> TermPrinter<W> {
    pub fn new(w: W) -> Self {
        Self { w, result: Ok(()) }
    }

    /// Prints the address column and `instr`.
    pub fn print_at(&mut self, addr: u32, instr: &Instr) {
        self.print(COLOR_ADDR, &format!("{:08X}  ", addr));
        print_instr(instr, self);
    }

    /// Returns the first error encountered while printing.
    pub fn finish(&mut self) -> io::Result<()> {
        let result = ::std::mem::replace(&mut self.result, Ok(()));
        result.and_then(|_| self.w.flush())
    }

    fn write(&mut self, color: Option<Color>, text: &str) {
        if self.result.is_err() {
            return;
        }

        let w = &mut self.w;
        self.result = w.set_color(ColorSpec::new().set_fg(color))
            .and_then(|_| write!(w, "{}", text))
            .and_then(|_| w.reset());
    }

    fn print(&mut self, color: Color, text: &str) {
        self.write(Some(color), text);
    }
}

impl<W: WriteColor> AsmPrinter for TermPrinter<W> {
    fn print_mnemonic(&mut self, mnemonic: &str) {
        self.print(COLOR_MNEMONIC, mnemonic);
    }

    fn print_register(&mut self, name: &str) {
        self.print(COLOR_REGISTER, name);
    }

    fn print_immediate(&mut self, imm: &str) {
        self.print(COLOR_IMMEDIATE, imm);
    }

    fn print_addr_or_offset(&mut self, addr: &str) {
        self.print(COLOR_ADDR, addr);
    }

    fn print_jump_target(&mut self, target: &str) {
        self.print(COLOR_TARGET, target);
    }

    fn print_symbols(&mut self, sym: &str) {
        self.write(None, sym);
    }

    fn done(&mut self) {
        self.write(None, "\n");
    }
}

/// Printer hint for immediates: print them as decimal or hexadecimal.
#[derive(Copy, Clone)]
enum ImmReprHint {
    Dec,
    Hex,
}

/// One printed operand.
enum Arg<'a> {
    /// A general operand. Memory and immediates may get a size keyword.
    Sized(Cow<'a, Operand>),
    /// Printed without a size keyword (shift counts, bit indices).
    Bare(&'a Operand),
    /// An absolute jump or call target, or an indirect one.
    Target(&'a Operand),
    /// A number that is part of the encoding (`ret 16`, `int 0x80`).
    Num(u32),
    Seg(Segment),
    St(u8),
    /// x87 memory operand, which always carries its format keyword.
    FpuMem(FpuFormat, &'a MemoryLocation),
}

fn op(operand: &Operand) -> Arg {
    Arg::Sized(Cow::Borrowed(operand))
}

fn reg(reg: Register) -> Arg<'static> {
    Arg::Sized(Cow::Owned(Operand::Reg(reg)))
}

fn fpu_op(operand: &FpuOperand) -> Arg {
    match operand {
        FpuOperand::St(i) => Arg::St(*i),
        FpuOperand::Mem(format, mem) => Arg::FpuMem(*format, mem),
    }
}

fn size_suffix(size: OpSize) -> &'static str {
    match size {
        OpSize::Bits8 => "b",
        OpSize::Bits16 => "w",
        OpSize::Bits32 => "d",
    }
}

/// Breaks an instruction up into repeat prefix, mnemonic and operands.
fn layout(instr: &Instr) -> (Option<Rep>, Cow<'static, str>, Vec<Arg>) {
    use cpu::instr::Instr::*;

    let m = |mnemonic: &'static str| Cow::Borrowed(mnemonic);
    let (mnemonic, args) = match instr {
        Alu { op: alu, dest, src } => (m(alu.mnemonic()), vec![op(dest), op(src)]),
        Test { lhs, rhs } => (m("test"), vec![op(lhs), op(rhs)]),
        Inc { operand } => (m("inc"), vec![op(operand)]),
        Dec { operand } => (m("dec"), vec![op(operand)]),
        Neg { operand } => (m("neg"), vec![op(operand)]),
        Not { operand } => (m("not"), vec![op(operand)]),
        Shift { op: shift, dest, count } => (m(shift.mnemonic()), vec![op(dest), Arg::Bare(count)]),
        DoubleShift { left, dest, src, count } => (
            m(if *left { "shld" } else { "shrd" }),
            vec![op(dest), reg(*src), Arg::Bare(count)],
        ),
        BitTest { base, bit } => (m("bt"), vec![op(base), Arg::Bare(bit)]),
        BitScan { reverse, dest, src } => (m(if *reverse { "bsr" } else { "bsf" }), vec![reg(*dest), op(src)]),
        Mul { operand } => (m("mul"), vec![op(operand)]),
        Imul { operand } => (m("imul"), vec![op(operand)]),
        ImulTrunc { dest, src1, src2 } => {
            if *src1 == Operand::Reg(*dest) {
                (m("imul"), vec![reg(*dest), op(src2)])
            } else {
                (m("imul"), vec![reg(*dest), op(src1), op(src2)])
            }
        }
        Div { operand } => (m("div"), vec![op(operand)]),
        Idiv { operand } => (m("idiv"), vec![op(operand)]),
        Mov { dest, src } => (m("mov"), vec![op(dest), op(src)]),
        MovZx { dest, src } => (m("movzx"), vec![reg(*dest), op(src)]),
        MovSx { dest, src } => (m("movsx"), vec![reg(*dest), op(src)]),
        MovFromSeg { dest, seg } => (m("mov"), vec![op(dest), Arg::Seg(*seg)]),
        MovToSeg { seg, src } => (m("mov"), vec![Arg::Seg(*seg), op(src)]),
        Lea { dest, src } => (m("lea"), vec![reg(*dest), Arg::Sized(Cow::Owned(Operand::Mem(src.clone())))]),
        Xchg { a, b } => (m("xchg"), vec![op(a), op(b)]),
        CondMove { cc, dest, src } => (Cow::Owned(format!("cmov{}", cc.suffix())), vec![reg(*dest), op(src)]),
        SetIf { cc, operand } => (Cow::Owned(format!("set{}", cc.suffix())), vec![op(operand)]),
        Cbw => (m("cbw"), vec![]),
        Cwde => (m("cwde"), vec![]),
        Cwd => (m("cwd"), vec![]),
        Cdq => (m("cdq"), vec![]),
        Lahf => (m("lahf"), vec![]),
        Sahf => (m("sahf"), vec![]),
        Str { op: str_op, size, rep } => {
            let mnemonic = format!("{}{}", str_op.mnemonic(), size_suffix(*size));
            return (*rep, Cow::Owned(mnemonic), vec![]);
        }
        Push { operand } => (m("push"), vec![op(operand)]),
        Pop { operand } => (m("pop"), vec![op(operand)]),
        PushSeg { seg, .. } => (m("push"), vec![Arg::Seg(*seg)]),
        PopSeg { seg, .. } => (m("pop"), vec![Arg::Seg(*seg)]),
        Pusha { size } => (Cow::Owned(format!("pusha{}", size_suffix(*size))), vec![]),
        Popa { size } => (Cow::Owned(format!("popa{}", size_suffix(*size))), vec![]),
        Pushf { size } => (Cow::Owned(format!("pushf{}", size_suffix(*size))), vec![]),
        Popf { size } => (Cow::Owned(format!("popf{}", size_suffix(*size))), vec![]),
        Enter { alloc, level } => (m("enter"), vec![Arg::Num(u32::from(*alloc)), Arg::Num(u32::from(*level))]),
        Leave { .. } => (m("leave"), vec![]),
        Jump { target } => (m("jmp"), vec![Arg::Target(target)]),
        JumpIf { cc, target } => (Cow::Owned(format!("j{}", cc.suffix())), vec![Arg::Target(target)]),
        Jecxz { target } => (m("jecxz"), vec![Arg::Target(target)]),
        Loop { kind, target } => {
            let mnemonic = match kind {
                LoopKind::Loop => "loop",
                LoopKind::Loope => "loope",
                LoopKind::Loopne => "loopne",
            };
            (m(mnemonic), vec![Arg::Target(target)])
        }
        Call { target } => (m("call"), vec![Arg::Target(target)]),
        Ret { pop: 0 } => (m("ret"), vec![]),
        Ret { pop } => (m("ret"), vec![Arg::Num(u32::from(*pop))]),
        Int { vector } => (m("int"), vec![Arg::Num(u32::from(*vector))]),
        IntO => (m("into"), vec![]),
        Hlt => (m("hlt"), vec![]),
        Clc => (m("clc"), vec![]),
        Stc => (m("stc"), vec![]),
        Cmc => (m("cmc"), vec![]),
        Cld => (m("cld"), vec![]),
        Std => (m("std"), vec![]),
        Cli => (m("cli"), vec![]),
        Sti => (m("sti"), vec![]),
        Nop => (m("nop"), vec![]),
        Cpuid => (m("cpuid"), vec![]),
        Fpu(fpu) => layout_fpu(fpu),
    };

    (None, mnemonic, args)
}

fn layout_fpu(instr: &FpuInstr) -> (Cow<'static, str>, Vec<Arg>) {
    let m = |mnemonic: &'static str| Cow::Borrowed(mnemonic);
    let int = |operand: &FpuOperand| match operand {
        FpuOperand::Mem(format, _) if format.is_integer() => "i",
        _ => "",
    };
    let p = |pop: bool| if pop { "p" } else { "" };

    match instr {
        FpuInstr::Load(src) => (Cow::Owned(format!("f{}ld", int(src))), vec![fpu_op(src)]),
        FpuInstr::LoadConst(FpuConst::One) => (m("fld1"), vec![]),
        FpuInstr::LoadConst(FpuConst::Zero) => (m("fldz"), vec![]),
        FpuInstr::Store { dest, pop } => (Cow::Owned(format!("f{}st{}", int(dest), p(*pop))), vec![fpu_op(dest)]),
        FpuInstr::StoreTruncate { format, dest } => (m("fisttp"), vec![Arg::FpuMem(*format, dest)]),
        FpuInstr::Arith { op: arith, dest, src, pop } => {
            let mnemonic = format!("f{}{}{}", int(src), &arith.mnemonic()[1..], p(*pop));
            let args = match src {
                FpuOperand::St(_) => vec![Arg::St(*dest), fpu_op(src)],
                FpuOperand::Mem(..) => vec![fpu_op(src)],
            };
            (Cow::Owned(mnemonic), args)
        }
        FpuInstr::Compare { src, pops, unordered } => {
            let mnemonic = format!(
                "f{}{}com{}",
                if *unordered { "u" } else { "" },
                int(src),
                "p".repeat(usize::from(*pops))
            );
            let args = if *pops == 2 { vec![] } else { vec![fpu_op(src)] };
            (Cow::Owned(mnemonic), args)
        }
        FpuInstr::CompareFlags { src, pop, unordered } => {
            let mnemonic = format!("f{}comi{}", if *unordered { "u" } else { "" }, p(*pop));
            (Cow::Owned(mnemonic), vec![Arg::St(0), Arg::St(*src)])
        }
        FpuInstr::Test => (m("ftst"), vec![]),
        FpuInstr::ChangeSign => (m("fchs"), vec![]),
        FpuInstr::Abs => (m("fabs"), vec![]),
        FpuInstr::Exchange(i) => (m("fxch"), vec![Arg::St(*i)]),
        FpuInstr::LoadControl(mem) => (m("fldcw"), vec![Arg::FpuMem(FpuFormat::I16, mem)]),
        FpuInstr::StoreControl(mem) => (m("fnstcw"), vec![Arg::FpuMem(FpuFormat::I16, mem)]),
        FpuInstr::StoreStatus(Some(mem)) => (m("fnstsw"), vec![Arg::FpuMem(FpuFormat::I16, mem)]),
        FpuInstr::StoreStatus(None) => (m("fnstsw"), vec![reg(Register::Ax)]),
        FpuInstr::Init => (m("fninit"), vec![]),
        FpuInstr::ClearExceptions => (m("fnclex"), vec![]),
        FpuInstr::Nop => (m("fnop"), vec![]),
        FpuInstr::Wait => (m("fwait"), vec![]),
    }
}

/// Whether immediates of an instruction are printed in decimal.
fn imm_hint(instr: &Instr) -> ImmReprHint {
    use cpu::instr::Instr::*;

    match instr {
        Alu { op: AluOp::Add, .. }
        | Alu { op: AluOp::Adc, .. }
        | Alu { op: AluOp::Sbb, .. }
        | Alu { op: AluOp::Sub, .. }
        | Imul { .. }
        | ImulTrunc { .. }
        | Idiv { .. }
        | Shift { .. }
        | Ret { .. }
        | Enter { .. } => ImmReprHint::Dec,
        _ => ImmReprHint::Hex,
    }
}

/// Prints `instr` to `p`.
///
/// Memory operands and immediates are ambiguous on their own. If every
/// operand is ambiguous and they all have the same size, the first one gets a
/// size keyword (`cmp dword [eax],0x5`). If the sizes differ, every ambiguous
/// operand gets one (`movzx eax,byte [ecx]`). Shift counts and bit indices
/// don't take part in this.
pub fn print_instr<P: AsmPrinter>(instr: &Instr, p: &mut P) {
    let (rep, mnemonic, args) = layout(instr);
    let hint = imm_hint(instr);

    if let Some(rep) = rep {
        p.print_mnemonic(rep.mnemonic());
        p.print_symbols(" ");
    }
    p.print_mnemonic(&mnemonic);

    let sizes: Vec<_> = args.iter()
        .filter_map(|arg| match arg {
            Arg::Sized(operand) => Some(operand.size()),
            _ => None,
        })
        .collect();
    let same_sizes = sizes.windows(2).all(|w| w[0] == w[1]);
    let all_ambiguous = !sizes.is_empty() && args.iter().all(|arg| match arg {
        Arg::Sized(operand) => !is_register(operand),
        Arg::Bare(_) => true,
        _ => false,
    });
    let mut keyword = !same_sizes || all_ambiguous;

    for (i, arg) in args.iter().enumerate() {
        p.print_symbols(if i == 0 { " " } else { "," });

        match arg {
            Arg::Sized(operand) => {
                if keyword && !is_register(operand) {
                    p.print_immediate(operand.size().keyword());
                    p.print_symbols(" ");
                    keyword = !same_sizes;
                }
                print_operand(p, operand, hint);
            }
            Arg::Bare(operand) => print_operand(p, operand, hint),
            Arg::Target(Operand::Imm(imm)) => {
                p.print_jump_target(&format!("{:#010X}", imm.zero_extended()));
            }
            Arg::Target(operand) => {
                if let Operand::Mem(mem) = operand {
                    p.print_immediate(mem.size.keyword());
                    p.print_symbols(" ");
                }
                print_operand(p, operand, hint);
            }
            Arg::Num(n) => {
                let s = match hint {
                    ImmReprHint::Dec => n.to_string(),
                    ImmReprHint::Hex => format!("{:#x}", n),
                };
                p.print_immediate(&s);
            }
            Arg::Seg(seg) => p.print_register(&seg.to_string()),
            Arg::St(i) => p.print_register(&format!("st({})", i)),
            Arg::FpuMem(format, mem) => {
                p.print_immediate(format.keyword());
                p.print_symbols(" ");
                print_memory(p, mem);
            }
        }
    }

    p.done();
}

fn is_register(operand: &Operand) -> bool {
    match operand {
        Operand::Reg(_) => true,
        _ => false,
    }
}

fn print_operand<P: AsmPrinter>(p: &mut P, operand: &Operand, hint: ImmReprHint) {
    match operand {
        Operand::Reg(reg) => p.print_register(reg.name()),
        Operand::Imm(imm) => {
            let s = match hint {
                ImmReprHint::Dec => format!("{}", imm),
                ImmReprHint::Hex => format!("{:#x}", imm),
            };
            p.print_immediate(&s);
        }
        Operand::Mem(mem) => print_memory(p, mem),
    }
}

fn print_displacement<P: AsmPrinter>(p: &mut P, disp: i32) {
    if disp != 0 {
        p.print_symbols(if disp > 0 { "+" } else { "-" });
        p.print_addr_or_offset(&format!("{:#x}", disp.wrapping_abs() as u32));
    }
}

fn print_memory<P: AsmPrinter>(p: &mut P, mem: &MemoryLocation) {
    p.print_symbols("[");
    if mem.segment != mem.addressing.default_segment() {
        p.print_register(&mem.segment.to_string());
        p.print_symbols(":");
    }

    match mem.addressing {
        Addressing::Disp { base: Some(base), disp } => {
            p.print_register(base.name());
            print_displacement(p, disp);
        }
        Addressing::Disp { base: None, disp } | Addressing::Sib { base: None, index: None, disp, .. } => {
            p.print_addr_or_offset(&format!("{:#x}", disp));
        }
        Addressing::Sib { scale, index, base, disp } => {
            if let Some(base) = base {
                p.print_register(base.name());
            }
            if let Some(index) = index {
                if base.is_some() {
                    p.print_symbols("+");
                }
                p.print_register(index.name());
                if scale > 1 {
                    p.print_symbols("*");
                    p.print_addr_or_offset(&scale.to_string());
                }
            }
            print_displacement(p, disp);
        }
    }

    p.print_symbols("]");
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    fn mem(addressing: Addressing, segment: Segment) -> MemoryLocation {
        MemoryLocation { size: OpSize::Bits32, segment, addressing, offset: 0 }
    }

    fn print(instr: &Instr) -> String {
        let mut s = String::new();
        print_instr(instr, &mut s);
        s
    }

    #[test]
    fn addressing_forms() {
        let sib = Addressing::Sib { scale: 8, index: Some(Register::Esi), base: None, disp: -4 };
        let instr = Instr::Inc { operand: Operand::Mem(mem(sib, Segment::Ss)) };
        assert_eq!(print(&instr), "inc dword [ss:esi*8-0x4]");

        let bare = Addressing::Sib { scale: 1, index: None, base: None, disp: 0x1234 };
        let instr = Instr::Push { operand: Operand::Mem(mem(bare, Segment::Ds)) };
        assert_eq!(print(&instr), "push dword [0x1234]");

        let min = Addressing::Disp { base: Some(Register::Eax), disp: i32::min_value() };
        let instr = Instr::Not { operand: Operand::Mem(mem(min, Segment::Ds)) };
        assert_eq!(print(&instr), "not dword [eax-0x80000000]");
    }

    #[test]
    fn segment_shown_only_when_overridden() {
        let frame = Addressing::Disp { base: Some(Register::Ebp), disp: 8 };
        let instr = Instr::Push { operand: Operand::Mem(mem(frame.clone(), Segment::Ss)) };
        assert_eq!(print(&instr), "push dword [ebp+0x8]");
        let instr = Instr::Push { operand: Operand::Mem(mem(frame, Segment::Ds)) };
        assert_eq!(print(&instr), "push dword [ds:ebp+0x8]");
    }

    #[test]
    fn mnemonics_with_operand_size() {
        assert_eq!(print(&Instr::Pusha { size: OpSize::Bits32 }), "pushad");
        assert_eq!(print(&Instr::Popf { size: OpSize::Bits16 }), "popfw");
        assert_eq!(print(&Instr::Enter { alloc: 16, level: 1 }), "enter 16,1");
        let instr = Instr::Str { op: StrOp::Lods, size: OpSize::Bits16, rep: None };
        assert_eq!(print(&instr), "lodsw");
    }

    #[test]
    fn colored_output() {
        let instr = Instr::Mov { dest: Operand::Reg(Register::Eax), src: Operand::Imm(Immediate::Imm32(1)) };

        let mut printer = TermPrinter::new(Buffer::no_color());
        printer.print_at(0x1000, &instr);
        printer.finish().unwrap();
        assert_eq!(String::from_utf8_lossy(printer.w.as_slice()), "00001000  mov eax,0x1\n");

        let mut printer = TermPrinter::new(Buffer::ansi());
        printer.print_at(0x1000, &instr);
        printer.finish().unwrap();
        assert!(printer.w.as_slice().starts_with(b"\x1b["));
    }
}
