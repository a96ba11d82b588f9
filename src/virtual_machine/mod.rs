//! Stack-based bytecode virtual machine.
//!
//! Programs are byte strings of one-byte opcodes, some followed by inline
//! data or a jump target. Values are byte strings on a data stack, with an
//! alt stack for temporaries.
//!
//! # Modules
//!
//! - [`isa`]: opcode table with mnemonics and base gas
//! - [`assembler`]: text assembly, disassembly and instruction decoding
//! - [`errors`]: assembly and execution errors
//! - [`vm`]: interpreter, gas accounting, execution context and [`vm::verify`]

pub mod assembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod vm;
