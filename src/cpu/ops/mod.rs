//! Instruction semantics, one module per instruction category.
//!
//! Every module contributes two things: the candidate decoders for its
//! opcodes (added to the `DispatchTable` by `register`) and the `exec_*`
//! methods the interpreter calls for the decoded instructions.

pub mod arith;
pub mod control;
pub mod logic;
pub mod misc;
pub mod mov;
pub mod muldiv;
pub mod shift;
pub mod stack;
pub mod string;
pub mod x87;

use cpu::dispatch::DispatchTable;

/// Adds the candidates of all instruction categories to `table`.
///
/// Opcodes shared between categories (like the `FF` group) get the
/// candidates in the order the modules are listed here.
pub(crate) fn register_all(table: &mut DispatchTable) {
    arith::register(table);
    logic::register(table);
    shift::register(table);
    muldiv::register(table);
    mov::register(table);
    string::register(table);
    stack::register(table);
    control::register(table);
    misc::register(table);
    x87::register(table);
}
