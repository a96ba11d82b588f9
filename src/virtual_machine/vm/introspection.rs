//! Opcodes that read the transaction context.

use super::VM;
use super::context::OutputQuery;
use crate::virtual_machine::errors::VMError;

impl VM<'_> {
    /// `index amount asset vm_version code CHECKOUTPUT -> bool`
    pub(super) fn op_check_output(&mut self, instr: &'static str) -> Result<(), VMError> {
        let code = self.pop()?;
        let vm_version = self.pop_u64(instr)?;
        let asset_id = self.pop()?;
        let amount = self.pop_u64(instr)?;
        let index = self.pop_u64(instr)?;

        let check = self
            .context
            .check_output
            .as_ref()
            .ok_or(VMError::ContextMissing {
                field: "check_output",
            })?;
        let ok = check(OutputQuery {
            index,
            amount,
            asset_id: &asset_id,
            vm_version,
            code: &code,
            expansion: self.expansion_reserved,
        })?;
        self.push_bool(ok)
    }

    pub(super) fn op_asset(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let asset = self
            .context
            .asset_id
            .clone()
            .ok_or(VMError::ContextMissing { field: "asset_id" })?;
        self.push(asset)
    }

    pub(super) fn op_amount(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let amount = self
            .context
            .amount
            .ok_or(VMError::ContextMissing { field: "amount" })?;
        self.push_u64(amount)
    }

    pub(super) fn op_program(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.push(self.context.code.clone())
    }

    pub(super) fn op_index(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let index = self
            .context
            .dest_pos
            .ok_or(VMError::ContextMissing { field: "dest_pos" })?;
        self.push_u64(index)
    }

    pub(super) fn op_entry_id(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.push(self.context.entry_id.as_slice().to_vec())
    }

    pub(super) fn op_output_id(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let id = self.context.spent_output_id.ok_or(VMError::ContextMissing {
            field: "spent_output_id",
        })?;
        self.push(id.as_slice().to_vec())
    }

    pub(super) fn op_block_height(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let height = self.context.block_height.ok_or(VMError::ContextMissing {
            field: "block_height",
        })?;
        self.push_u64(height)
    }
}
