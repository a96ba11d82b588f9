//! Equity contracts and the stack virtual machine that runs them.
//!
//! [`compiler`] turns contract source into bytecode and instantiated programs;
//! [`virtual_machine`] verifies those programs against a transaction context.

pub mod compiler;
pub mod crypto;
pub mod types;
pub mod utils;
pub mod virtual_machine;
