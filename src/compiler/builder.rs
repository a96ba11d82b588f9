//! Opcode emission with a running stack model.
//!
//! Every `add_*` method updates the model to match what the emitted opcodes do
//! at run time. A `VERIFY` is held back until the next emission so that a
//! clause ending in one can leave its boolean as the program result instead.

use super::errors::CompileError;
use super::stack::{StackEntry, StackModel};
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::vm::numeric::u64_to_bytes;
use std::fmt;

/// Symbolic instruction, before label resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Op {
    /// Minimal integer push.
    Int(u64),
    /// Byte-string push.
    Data(Vec<u8>),
    /// Instruction without inline operands.
    Code(Instruction),
    Jump(String),
    JumpIf(String),
    Label(String),
}

impl Op {
    /// Item pushed by a push op.
    pub fn push_value(&self) -> Option<Vec<u8>> {
        match self {
            Op::Int(n) => Some(u64_to_bytes(*n)),
            Op::Data(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    pub fn is(&self, instr: Instruction) -> bool {
        *self == Op::Code(instr)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Int(n) => write!(f, "{n}"),
            Op::Data(bytes) if bytes.is_empty() => f.write_str("0"),
            Op::Data(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Op::Code(instr) => f.write_str(instr.mnemonic()),
            Op::Jump(label) => write!(f, "JUMP:${label}"),
            Op::JumpIf(label) => write!(f, "JUMPIF:${label}"),
            Op::Label(label) => write!(f, "${label}"),
        }
    }
}

/// Assembly text for `ops`.
pub fn render(ops: &[Op]) -> String {
    ops.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// One emission and the stack model right after it.
#[derive(Clone, Debug)]
pub struct Item {
    pub ops: Vec<Op>,
    pub stack: StackModel,
}

#[derive(Debug)]
struct PendingVerify {
    item: Item,
    operand: StackEntry,
}

#[derive(Debug, Default)]
pub struct Builder {
    items: Vec<Item>,
    pending_verify: Option<PendingVerify>,
    stack: StackModel,
    alt: Vec<StackEntry>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack(&self) -> &StackModel {
        &self.stack
    }

    /// Replaces the model, at a jump target or clause entry.
    pub fn set_stack(&mut self, stack: StackModel) {
        self.stack = stack;
    }

    fn emit(&mut self, ops: Vec<Op>) {
        if let Some(pending) = self.pending_verify.take() {
            self.items.push(pending.item);
        }
        self.items.push(Item {
            ops,
            stack: self.stack.clone(),
        });
    }

    fn emit_code(&mut self, instr: Instruction) {
        self.emit(vec![Op::Code(instr)]);
    }

    pub fn add_int(&mut self, n: u64) {
        self.stack.push(StackEntry::Temp(n.to_string()));
        self.emit(vec![Op::Int(n)]);
    }

    pub fn add_bool(&mut self, b: bool) {
        self.stack.push(StackEntry::Temp(b.to_string()));
        self.emit(vec![Op::Int(u64::from(b))]);
    }

    pub fn add_data(&mut self, bytes: Vec<u8>, label: String) {
        self.stack.push(StackEntry::Temp(label));
        self.emit(vec![Op::Data(bytes)]);
    }

    pub fn add_dup(&mut self) -> Result<(), CompileError> {
        self.stack.dup()?;
        self.emit_code(Instruction::Dup);
        Ok(())
    }

    pub fn add_swap(&mut self) -> Result<(), CompileError> {
        self.stack.swap()?;
        self.emit_code(Instruction::Swap);
        Ok(())
    }

    pub fn add_over(&mut self) -> Result<(), CompileError> {
        self.stack.over()?;
        self.emit_code(Instruction::Over);
        Ok(())
    }

    pub fn add_drop(&mut self) -> Result<(), CompileError> {
        self.stack.pop()?;
        self.emit_code(Instruction::Drop);
        Ok(())
    }

    pub fn add_roll(&mut self, depth: usize) -> Result<(), CompileError> {
        self.stack.roll(depth)?;
        self.emit(vec![Op::Int(depth as u64), Op::Code(Instruction::Roll)]);
        Ok(())
    }

    pub fn add_pick(&mut self, depth: usize) -> Result<(), CompileError> {
        self.stack.pick(depth)?;
        self.emit(vec![Op::Int(depth as u64), Op::Code(Instruction::Pick)]);
        Ok(())
    }

    pub fn add_verify(&mut self) -> Result<(), CompileError> {
        let operand = self.stack.pop()?;
        if let Some(pending) = self.pending_verify.take() {
            self.items.push(pending.item);
        }
        self.pending_verify = Some(PendingVerify {
            item: Item {
                ops: vec![Op::Code(Instruction::Verify)],
                stack: self.stack.clone(),
            },
            operand,
        });
        Ok(())
    }

    /// Drops a held-back `VERIFY`, leaving its operand on the stack.
    /// Returns whether there was one.
    pub fn forget_pending_verify(&mut self) -> bool {
        match self.pending_verify.take() {
            Some(pending) => {
                self.stack.push(pending.operand);
                true
            }
            None => false,
        }
    }

    /// Emits `instrs`, which together pop `pops` items and push one.
    pub fn add_ops(
        &mut self,
        instrs: &[Instruction],
        pops: usize,
        label: String,
    ) -> Result<(), CompileError> {
        self.stack.drop_n(pops)?;
        self.stack.push(StackEntry::Temp(label));
        self.emit(instrs.iter().copied().map(Op::Code).collect());
        Ok(())
    }

    pub fn add_amount(&mut self, label: String) {
        self.stack.push(StackEntry::Temp(label));
        self.emit_code(Instruction::Amount);
    }

    pub fn add_asset(&mut self, label: String) {
        self.stack.push(StackEntry::Temp(label));
        self.emit_code(Instruction::Asset);
    }

    pub fn add_txsighash(&mut self) {
        self.stack.push(StackEntry::Temp("txsighash".to_string()));
        self.emit_code(Instruction::TxSigHash);
    }

    /// `index amount asset version program CHECKOUTPUT`
    pub fn add_check_output(&mut self, label: String) -> Result<(), CompileError> {
        self.add_ops(&[Instruction::CheckOutput], 5, label)
    }

    pub fn add_cat(&mut self, label: String) -> Result<(), CompileError> {
        self.add_ops(&[Instruction::Cat], 2, label)
    }

    pub fn add_cat_push_data(&mut self, label: String) -> Result<(), CompileError> {
        self.add_ops(&[Instruction::CatPushData], 2, label)
    }

    pub fn add_to_alt_stack(&mut self) -> Result<(), CompileError> {
        let entry = self.stack.pop()?;
        self.alt.push(entry);
        self.emit_code(Instruction::ToAltStack);
        Ok(())
    }

    pub fn add_from_alt_stack(&mut self) -> Result<(), CompileError> {
        let entry = self
            .alt
            .pop()
            .ok_or(CompileError::StackUnderflow { needed: 1 })?;
        self.stack.push(entry);
        self.emit_code(Instruction::FromAltStack);
        Ok(())
    }

    pub fn add_nop(&mut self) {
        self.emit_code(Instruction::Nop);
    }

    pub fn add_jump(&mut self, label: &str) {
        self.emit(vec![Op::Jump(label.to_string())]);
    }

    pub fn add_jump_if(&mut self, label: &str) -> Result<(), CompileError> {
        self.stack.pop()?;
        self.emit(vec![Op::JumpIf(label.to_string())]);
        Ok(())
    }

    pub fn add_jump_target(&mut self, label: &str) {
        self.emit(vec![Op::Label(label.to_string())]);
    }

    pub fn rename_top(&mut self, entry: StackEntry) -> Result<(), CompileError> {
        self.stack.rename_top(entry)
    }

    /// Flat op list plus every emission with its stack snapshot.
    pub fn finish(mut self) -> (Vec<Op>, Vec<Item>) {
        if let Some(pending) = self.pending_verify.take() {
            self.items.push(pending.item);
        }
        let ops = self
            .items
            .iter()
            .flat_map(|item| item.ops.iter().cloned())
            .collect();
        (ops, self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> StackEntry {
        StackEntry::Var(name.to_string())
    }

    #[test]
    fn renders_assembly_tokens() {
        let ops = vec![
            Op::Int(4),
            Op::Code(Instruction::Roll),
            Op::JumpIf("cancel".into()),
            Op::Data(vec![]),
            Op::Data(vec![0xab]),
            Op::Label("cancel".into()),
            Op::Jump("_end".into()),
        ];
        assert_eq!(render(&ops), "4 ROLL JUMPIF:$cancel 0 0xab $cancel JUMP:$_end");
    }

    #[test]
    fn pending_verify_is_flushed_by_next_emission() {
        let mut b = Builder::new();
        b.add_bool(true);
        b.add_verify().unwrap();
        assert!(b.stack().is_empty());
        b.add_int(7);
        let (ops, items) = b.finish();
        assert_eq!(ops, vec![Op::Int(1), Op::Code(Instruction::Verify), Op::Int(7)]);
        assert_eq!(items.len(), 3);
        assert!(items[1].stack.is_empty());
    }

    #[test]
    fn forgotten_verify_restores_operand() {
        let mut b = Builder::new();
        b.set_stack(StackModel::new(vec![var("ok")]));
        b.add_verify().unwrap();
        assert!(b.forget_pending_verify());
        assert_eq!(b.stack().vars(), ["ok"]);
        assert!(!b.forget_pending_verify());
        let (ops, _) = b.finish();
        assert!(ops.is_empty());
    }

    #[test]
    fn model_tracks_emissions() {
        let mut b = Builder::new();
        b.set_stack(StackModel::new(vec![var("a"), var("b"), var("c")]));
        b.add_pick(2).unwrap();
        b.add_roll(2).unwrap();
        b.add_ops(&[Instruction::Equal], 2, "a == b".into()).unwrap();
        b.add_to_alt_stack().unwrap();
        assert_eq!(b.stack().to_string(), "[a, c]");
        b.add_from_alt_stack().unwrap();
        assert_eq!(b.stack().to_string(), "[a, c, a == b]");
        assert!(b.add_from_alt_stack().is_err());
    }
}
