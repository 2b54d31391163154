//! Emulation of a 32-bit x86 CPU running a Linux process.
//!
//! The CPU runs in flat protected mode: instruction fetch, stack and data all
//! go through segment registers, but only `FS` and `GS` ever get a base other
//! than 0. The x87 floating-point unit is emulated in software with full
//! 80-bit precision.

mod flags;
mod modrm;
mod ops;
mod prefix;
mod state;
pub mod decode;
pub mod disasm;
pub mod dispatch;
pub mod f80;
pub mod fpu;
pub mod imm;
pub mod instr;
pub mod interpret;
pub mod segment;

pub use self::flags::Flags;
pub use self::state::State;
