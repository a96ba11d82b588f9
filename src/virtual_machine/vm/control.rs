//! Pushes, jumps, verification and predicate calls.

use super::VM;
use super::gas::{GasCategory, MAX_PREDICATE_DEPTH};
use super::numeric::u64_to_bytes;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::expansion_mnemonic;

impl VM<'_> {
    pub(super) fn op_push_small(&mut self, _instr: &'static str, n: u8) -> Result<(), VMError> {
        self.push(u64_to_bytes(n as u64))
    }

    pub(super) fn op_push_data(&mut self, _instr: &'static str, data: Vec<u8>) -> Result<(), VMError> {
        self.push(data)
    }

    pub(super) fn op_nop(&mut self, _instr: &'static str) -> Result<(), VMError> {
        Ok(())
    }

    pub(super) fn op_jump(&mut self, _instr: &'static str, target: u32) -> Result<(), VMError> {
        self.jump_to(target)
    }

    pub(super) fn op_jumpif(&mut self, _instr: &'static str, target: u32) -> Result<(), VMError> {
        if self.pop_bool()? {
            self.jump_to(target)?;
        }
        Ok(())
    }

    pub(super) fn op_verify(&mut self, _instr: &'static str) -> Result<(), VMError> {
        if !self.pop_bool()? {
            return Err(VMError::VerifyFailed);
        }
        Ok(())
    }

    pub(super) fn op_fail(&mut self, _instr: &'static str) -> Result<(), VMError> {
        Err(VMError::Fail)
    }

    /// Reserved opcode: a 1-gas no-op unless the transaction version reserves it.
    pub(super) fn op_expansion(&mut self, opcode: u8) -> Result<(), VMError> {
        if self.expansion_reserved {
            return Err(VMError::DisallowedOpcode {
                mnemonic: expansion_mnemonic(opcode),
            });
        }
        self.apply_cost(1, GasCategory::OpcodeBase)
    }

    /// `n predicate limit CHECKPREDICATE -> bool`
    ///
    /// Runs `predicate` in a child VM whose data stack is the top `n` items of
    /// this one. A limit of 0 hands the child all remaining gas. The parent is
    /// charged only what the child consumed. Past [`MAX_PREDICATE_DEPTH`]
    /// nested predicates the child is not run and the result is `false`.
    pub(super) fn op_check_predicate(&mut self, instr: &'static str) -> Result<(), VMError> {
        let limit = self.pop_u64(instr)?;
        let predicate = self.pop()?;
        let n = self.pop_count(instr)?;

        let depth = self.data_stack.len();
        if n > depth {
            return Err(VMError::DataStackUnderflow);
        }
        let limit = if limit == 0 { self.run_limit } else { limit };
        if limit > self.run_limit {
            return Err(VMError::RunLimitExceeded {
                needed: limit,
                available: self.run_limit,
            });
        }

        let items = self.data_stack.split_off(depth - n);
        for item in &items {
            self.defer_cost(-Self::item_cost(item));
        }

        if self.depth >= MAX_PREDICATE_DEPTH {
            return self.push_bool(false);
        }

        let mut child = VM::new(predicate, self.context, limit);
        child.depth = self.depth + 1;
        child.trace = self.trace;
        child.data_stack = items;
        let ok = child.run().is_ok() && !child.false_result();

        self.apply_cost(limit - child.run_limit, GasCategory::Predicate)?;
        self.push_bool(ok)
    }
}
