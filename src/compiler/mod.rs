//! Equity contract compiler.
//!
//! Source goes through [`lexer`] and [`parser`] into an [`ast`], is checked by
//! [`checks`] against the types in [`types`] and [`env`], and is lowered by
//! [`codegen`] into stack-VM bytecode. Each contract compiles to a
//! [`CompiledContract`] holding its body and what a wallet needs to spend it.
//!
//! # Pipeline
//!
//! - [`checks`]: inheritance, recursion detection, numbering, type checking,
//!   unused names and compile order
//! - [`codegen`]: clause dispatch and statements over a [`stack::StackModel`],
//!   emitted through a [`builder::Builder`]
//! - [`optimize`]: peephole rewrites before assembly
//! - [`instantiate`]: binds arguments to a body, and reads them back
//! - [`driver`]: pragmas, imports and the compile entry points

pub mod artifact;
pub mod ast;
pub mod builder;
pub mod builtins;
pub mod checks;
pub mod codegen;
pub mod driver;
pub mod env;
pub mod errors;
pub mod instantiate;
pub mod lexer;
pub mod optimize;
pub mod parser;
pub mod stack;
pub mod types;

pub use artifact::CompiledContract;
pub use driver::{CompileOptions, compile, compile_file, compile_with};
pub use errors::CompileError;
pub use instantiate::ContractArg;
