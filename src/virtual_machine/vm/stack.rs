//! Data and alt stack manipulation.

use super::VM;
use super::numeric::as_bool;
use crate::virtual_machine::errors::VMError;

impl VM<'_> {
    pub(super) fn op_to_alt_stack(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let item = self.data_stack.pop().ok_or(VMError::DataStackUnderflow)?;
        self.alt_stack.push(item);
        Ok(())
    }

    pub(super) fn op_from_alt_stack(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let item = self.alt_stack.pop().ok_or(VMError::AltStackUnderflow)?;
        self.data_stack.push(item);
        Ok(())
    }

    pub(super) fn op_2drop(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.require_items(2)?;
        self.pop()?;
        self.pop()?;
        Ok(())
    }

    pub(super) fn op_2dup(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.copy_top_run(2, 0)
    }

    pub(super) fn op_3dup(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.copy_top_run(3, 0)
    }

    /// `x1 x2 x3 x4 -> x1 x2 x3 x4 x1 x2`
    pub(super) fn op_2over(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.copy_top_run(2, 2)
    }

    /// `x1 x2 x3 x4 x5 x6 -> x3 x4 x5 x6 x1 x2`
    pub(super) fn op_2rot(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.require_items(6)?;
        self.move_to_top(5)?;
        self.move_to_top(5)
    }

    /// `x1 x2 x3 x4 -> x3 x4 x1 x2`
    pub(super) fn op_2swap(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.require_items(4)?;
        self.move_to_top(3)?;
        self.move_to_top(3)
    }

    pub(super) fn op_ifdup(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let top = self.peek(0)?;
        if as_bool(&top) {
            self.push(top)?;
        }
        Ok(())
    }

    pub(super) fn op_depth(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.push_u64(self.data_stack.len() as u64)
    }

    pub(super) fn op_drop(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.pop().map(|_| ())
    }

    pub(super) fn op_dup(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let top = self.peek(0)?;
        self.push(top)
    }

    pub(super) fn op_nip(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.require_items(2)?;
        self.op_swap("SWAP")?;
        self.pop().map(|_| ())
    }

    pub(super) fn op_over(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let item = self.peek(1)?;
        self.push(item)
    }

    /// `xn ... x0 n PICK -> xn ... x0 xn`
    pub(super) fn op_pick(&mut self, instr: &'static str) -> Result<(), VMError> {
        let n = self.pop_count(instr)?;
        let item = self.peek(n)?;
        self.push(item)
    }

    /// `xn ... x0 n ROLL -> ... x0 xn`
    pub(super) fn op_roll(&mut self, instr: &'static str) -> Result<(), VMError> {
        let n = self.pop_count(instr)?;
        self.move_to_top(n)
    }

    pub(super) fn op_rot(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.move_to_top(2)
    }

    pub(super) fn op_swap(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.move_to_top(1)
    }

    /// `x1 x2 -> x2 x1 x2`
    pub(super) fn op_tuck(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.require_items(2)?;
        let top = self.peek(0)?;
        let idx = self.stack_index(1)?;
        self.defer_cost(Self::item_cost(&top));
        self.data_stack.insert(idx, top);
        Ok(())
    }

    /// Pushes copies of `count` adjacent items whose topmost sits `skip` below the top.
    fn copy_top_run(&mut self, count: usize, skip: usize) -> Result<(), VMError> {
        self.require_items(count + skip)?;
        for _ in 0..count {
            let item = self.peek(count + skip - 1)?;
            self.push(item)?;
        }
        Ok(())
    }
}
