//! Hash functions and signature verification used by the VM's crypto opcodes.

pub mod hashes;
pub mod key_pair;
