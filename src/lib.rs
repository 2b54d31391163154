//! An interpreter for statically linked 32-bit x86 Linux programs.
//!
//! The crate is split into the emulated machine (`cpu` and `memory`), the
//! loaders that put a program into memory (`elf` and `loader`) and the
//! `kernel`, which implements the Linux system calls the program makes.
//!
//! ```notrust
//! x86vm hello.elf
//! x86vm --type flat --offset 0x100 program.bin
//! ```

#![doc(html_root_url = "https://docs.rs/x86vm/0.1.0")]
#![warn(missing_debug_implementations)]

#[macro_use] extern crate bitflags;
#[macro_use] extern crate bitpat;
#[macro_use] extern crate log;
#[macro_use] extern crate num_derive;
extern crate num_traits;
extern crate termcolor;

pub mod cpu;
pub mod elf;
pub mod kernel;
pub mod loader;
pub mod memory;
mod utils;
