//! Code generation for checked contracts.
//!
//! Values live on the operand stack for the whole clause, so codegen never
//! allocates storage. Each clause starts with its arguments below the contract
//! parameters:
//!
//! ```text
//! [clause args..] [param N .. param 1] [body, when recursive] [selector, clause >= 2]
//! ```
//!
//! Every reference is emitted from the [`StackModel`]: a name's last use moves
//! it to the top (`SWAP`, `ROLL`), earlier uses copy it (`DUP`, `OVER`, `PICK`).
//! Remaining uses come from a per-clause count taken before the clause is
//! compiled.

use super::artifact::ValueInfo;
use super::ast::{Clause, Contract, Expr, Statement, ValueBinding, ValueRef};
use super::builder::{Builder, Item, Op, render};
use super::builtins::{self, Builtin};
use super::checks::{count_in_expr, count_refs};
use super::errors::{CompileError, WithContext};
use super::optimize::optimize;
use super::stack::{StackEntry, StackModel};
use crate::virtual_machine::assembler::assemble;
use crate::virtual_machine::isa::Instruction;
use std::collections::{HashMap, HashSet};

const SELECTOR: &str = "clause selector";
const END_LABEL: &str = "_end";

/// Already compiled contract that other contracts may lock into.
#[derive(Clone, Debug)]
pub struct Callee {
    pub body: Vec<u8>,
    pub recursive: bool,
}

/// Facts about one clause collected while generating it.
#[derive(Debug, Default)]
pub struct ClauseRecord {
    pub values: Vec<ValueInfo>,
    pub contracts: Vec<String>,
    pub block_height: Vec<String>,
}

#[derive(Debug)]
pub struct Generated {
    /// Optimized ops.
    pub ops: Vec<Op>,
    pub body: Vec<u8>,
    /// Assembly text of `ops`.
    pub opcodes: String,
    /// Unoptimized emissions with their stack snapshots.
    pub items: Vec<Item>,
    pub clauses: Vec<ClauseRecord>,
}

/// Compiles `contract`. Every contract it calls must be in `callees`.
pub fn generate(
    contract: &Contract,
    callees: &HashMap<String, Callee>,
) -> Result<Generated, CompileError> {
    let mut generator = Codegen {
        contract,
        callees,
        b: Builder::new(),
        counts: HashMap::new(),
        pinned: HashSet::new(),
        branch_locals: Vec::new(),
        next_if: 0,
        record: ClauseRecord::default(),
    };
    let clauses = generator.contract_body()?;
    let (ops, items) = generator.b.finish();
    let ops = optimize(ops);
    let opcodes = render(&ops);
    let body = assemble(&opcodes).map_err(|e| CompileError::Assembly {
        reason: e.to_string(),
    })?;
    Ok(Generated {
        ops,
        body,
        opcodes,
        items,
        clauses,
    })
}

struct Codegen<'a> {
    contract: &'a Contract,
    callees: &'a HashMap<String, Callee>,
    b: Builder,
    /// Remaining references per name in the current clause.
    counts: HashMap<String, usize>,
    /// Names that must stay in place, inside `if` branches.
    pinned: HashSet<String>,
    /// Locals defined by each enclosing branch.
    branch_locals: Vec<Vec<String>>,
    next_if: usize,
    record: ClauseRecord,
}

impl<'a> Codegen<'a> {
    fn contract_body(&mut self) -> Result<Vec<ClauseRecord>, CompileError> {
        let contract = self.contract;
        let mut base: Vec<StackEntry> = contract
            .params
            .iter()
            .rev()
            .map(|p| StackEntry::Var(p.name.clone()))
            .collect();
        if contract.recursive {
            base.push(StackEntry::Var(contract.name.clone()));
        }

        let n = contract.clauses.len();
        if n > 1 {
            let mut stack = vec![StackEntry::Temp(SELECTOR.to_string())];
            stack.extend(base.iter().cloned());
            self.b.set_stack(StackModel::new(stack));
            self.b.add_roll(base.len())?;
            for i in (2..n).rev() {
                self.b.add_dup()?;
                self.b.add_int(i as u64);
                self.b
                    .add_ops(&[Instruction::NumEqual], 2, format!("{SELECTOR} == {i}"))?;
                self.b.add_jump_if(&contract.clauses[i].name)?;
            }
            self.b.add_jump_if(&contract.clauses[1].name)?;
        }

        let mut records = Vec::with_capacity(n);
        for (i, clause) in contract.clauses.iter().enumerate() {
            if i > 0 {
                self.b.add_jump_target(&clause.name);
            }
            let mut stack: Vec<StackEntry> = clause
                .params
                .iter()
                .map(|p| StackEntry::Var(p.name.clone()))
                .collect();
            stack.extend(base.iter().cloned());
            if i >= 2 {
                stack.push(StackEntry::Temp(SELECTOR.to_string()));
            }
            self.b.set_stack(StackModel::new(stack));
            if i >= 2 {
                self.b.add_drop()?;
            }
            self.clause(clause)
                .context_with(|| format!("in clause {}", clause.name))?;
            records.push(std::mem::take(&mut self.record));
            if i + 1 < n {
                self.b.add_jump(END_LABEL);
            }
        }
        if n > 1 {
            self.b.add_jump_target(END_LABEL);
        }
        Ok(records)
    }

    fn clause(&mut self, clause: &'a Clause) -> Result<(), CompileError> {
        self.counts = count_refs(&clause.statements, clause, &self.contract.name);
        self.pinned.clear();
        self.branch_locals.clear();
        for stmt in &clause.statements {
            self.statement(clause, stmt)?;
        }
        if !self.b.forget_pending_verify() {
            self.b.add_bool(true);
        }
        Ok(())
    }

    // ==================== Statements ====================

    fn statement(&mut self, clause: &'a Clause, stmt: &'a Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::If {
                cond,
                then_body,
                else_body,
            } => self.if_statement(clause, cond, then_body, else_body),
            Statement::Define { name, init, .. } => {
                match init {
                    Some(init) => self.expr(init)?,
                    None => self.b.add_int(0),
                }
                self.b.rename_top(StackEntry::Var(name.clone()))?;
                if let Some(frame) = self.branch_locals.last_mut() {
                    frame.push(name.clone());
                }
                Ok(())
            }
            Statement::Assign { name, expr } => self.assign(name, expr),
            Statement::Verify(expr) => {
                self.expr(expr)?;
                self.b.add_verify()
            }
            Statement::Lock {
                value,
                program,
                index,
            } => self
                .lock(clause, value, program, *index)
                .context_with(|| "in lock statement".to_string()),
            Statement::Unlock { value, .. } => {
                self.record.values.push(ValueInfo {
                    name: value.to_string(),
                    program: None,
                    asset: None,
                    amount: None,
                });
                Ok(())
            }
        }
    }

    /// `index amount asset 1 program CHECKOUTPUT VERIFY`
    fn lock(
        &mut self,
        clause: &'a Clause,
        value: &'a ValueRef,
        program: &'a Expr,
        index: u64,
    ) -> Result<(), CompileError> {
        self.b.add_int(index);
        let (amount, asset) = match value {
            ValueRef::Named(name)
                if matches!(&self.contract.value, ValueBinding::Named(v) if v == name) =>
            {
                self.b.add_amount(format!("{name}.amount"));
                self.b.add_asset(format!("{name}.asset"));
                (None, None)
            }
            ValueRef::Named(name) => {
                let req = clause
                    .requirement(name)
                    .ok_or_else(|| CompileError::UndefinedName { name: name.clone() })?;
                self.expr(&req.amount)?;
                self.expr(&req.asset)?;
                (Some(req.amount.to_string()), Some(req.asset.to_string()))
            }
            ValueRef::Split { amount, asset } => {
                self.expr(amount)?;
                self.expr(asset)?;
                (Some(amount.to_string()), Some(asset.to_string()))
            }
        };
        self.b.add_int(1);
        self.expr(program)?;
        self.b
            .add_check_output(format!("checkOutput({value}, {program})"))?;
        self.b.add_verify()?;
        self.record.values.push(ValueInfo {
            name: value.to_string(),
            program: Some(program.to_string()),
            asset,
            amount,
        });
        Ok(())
    }

    fn assign(&mut self, name: &str, expr: &'a Expr) -> Result<(), CompileError> {
        let var = StackEntry::Var(name.to_string());
        if self.pinned.contains(name) {
            // Overwrite in place so the enclosing branch keeps its layout.
            self.expr(expr)?;
            let depth = self.find(name)?;
            self.b.add_roll(depth)?;
            self.b.add_drop()?;
            self.b.rename_top(var)?;
            for _ in 1..depth {
                self.b.add_roll(depth - 1)?;
            }
            return Ok(());
        }

        let in_rhs = count_in_expr(expr, name);
        if in_rhs > 0 {
            let total = self.counts.get(name).copied().unwrap_or(0);
            self.counts.insert(name.to_string(), in_rhs);
            self.expr(expr)?;
            self.counts
                .insert(name.to_string(), total.saturating_sub(in_rhs));
        } else {
            if let Some(depth) = self.b.stack().find(name) {
                self.b.add_roll(depth)?;
                self.b.add_drop()?;
            }
            self.expr(expr)?;
        }
        self.b.rename_top(var)
    }

    fn if_statement(
        &mut self,
        clause: &'a Clause,
        cond: &'a Expr,
        then_body: &'a [Statement],
        else_body: &'a [Statement],
    ) -> Result<(), CompileError> {
        let n = self.next_if;
        self.next_if += 1;
        let else_label = format!("_else_{n}");
        let endif_label = format!("_endif_{n}");

        self.expr(cond)?;
        self.b.add_int(0);
        self.b
            .add_ops(&[Instruction::Equal], 2, format!("!({cond})"))?;
        self.b.add_nop();
        let skip_to = if else_body.is_empty() {
            &endif_label
        } else {
            &else_label
        };
        self.b.add_jump_if(skip_to)?;

        let counts = self.counts.clone();
        let stack = self.b.stack().clone();
        let pinned = self.pinned.clone();
        self.pinned.extend(stack.vars());

        self.branch(clause, then_body)?;
        if !else_body.is_empty() {
            self.b.add_jump(&endif_label);
            self.b.add_jump_target(&else_label);
            self.b.set_stack(stack.clone());
            self.counts = counts.clone();
            self.branch(clause, else_body)?;
        }
        self.b.add_jump_target(&endif_label);

        self.pinned = pinned;
        self.b.set_stack(stack);
        let mut inside = count_refs(then_body, clause, &self.contract.name);
        for (name, n) in count_refs(else_body, clause, &self.contract.name) {
            *inside.entry(name).or_default() += n;
        }
        self.counts = counts;
        for (name, used) in inside {
            if let Some(left) = self.counts.get_mut(&name) {
                *left = left.saturating_sub(used);
            }
        }
        Ok(())
    }

    /// Compiles a branch body and drops the locals it defined.
    fn branch(&mut self, clause: &'a Clause, body: &'a [Statement]) -> Result<(), CompileError> {
        self.branch_locals.push(Vec::new());
        for stmt in body {
            self.statement(clause, stmt)?;
        }
        let locals = self.branch_locals.pop().unwrap_or_default();
        for local in locals.iter().rev() {
            if let Some(depth) = self.b.stack().find(local) {
                self.b.add_roll(depth)?;
                self.b.add_drop()?;
            }
        }
        Ok(())
    }

    // ==================== Expressions ====================

    fn find(&self, name: &str) -> Result<usize, CompileError> {
        self.b
            .stack()
            .find(name)
            .ok_or_else(|| CompileError::UndefinedName {
                name: name.to_string(),
            })
    }

    /// Brings `name` to the top, moving it on its last use and copying it otherwise.
    fn reference(&mut self, name: &str) -> Result<(), CompileError> {
        if let ValueBinding::Split { amount, asset } = &self.contract.value {
            if name == amount {
                self.b.add_amount(name.to_string());
                return Ok(());
            }
            if name == asset {
                self.b.add_asset(name.to_string());
                return Ok(());
            }
        }

        let depth = self.find(name)?;
        let count = self.counts.entry(name.to_string()).or_default();
        *count = count.saturating_sub(1);
        let last = *count == 0 && !self.pinned.contains(name);
        match (depth, last) {
            (0, true) => {}
            (0, false) => self.b.add_dup()?,
            (1, true) => self.b.add_swap()?,
            (1, false) => self.b.add_over()?,
            (d, true) => self.b.add_roll(d)?,
            (d, false) => self.b.add_pick(d)?,
        }
        if last {
            self.b.rename_top(StackEntry::Temp(name.to_string()))?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &'a Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Binary { op, left, right } => {
                self.expr(left)?;
                self.expr(right)?;
                self.b.add_ops(op.opcodes(), 2, expr.to_string())
            }
            Expr::Unary { op, operand } => {
                self.expr(operand)?;
                self.b.add_ops(op.opcodes(), 1, expr.to_string())
            }
            Expr::Var(name) => self.reference(name),
            Expr::Int(n) => {
                self.b.add_int(*n);
                Ok(())
            }
            Expr::Bool(b) => {
                self.b.add_bool(*b);
                Ok(())
            }
            Expr::Bytes(bytes) => {
                self.b.add_data(bytes.clone(), expr.to_string());
                Ok(())
            }
            Expr::List(_) => Err(CompileError::ListOutsideCall),
            Expr::Call { name, args } => match builtins::lookup(name) {
                Some(builtin) if builtin.name == builtins::CHECK_TX_MULTISIG => {
                    self.multisig(args, expr)
                }
                Some(builtin) => self.builtin_call(builtin, args, expr),
                None => self.contract_call(name, args, expr),
            },
        }
    }

    /// Pushes a call argument and returns how many items it occupies.
    fn argument(&mut self, arg: &'a Expr) -> Result<usize, CompileError> {
        match arg {
            Expr::List(items) => {
                for item in items.iter().rev() {
                    self.expr(item)?;
                }
                self.b.add_int(items.len() as u64);
                Ok(items.len() + 1)
            }
            _ => {
                self.expr(arg)?;
                Ok(1)
            }
        }
    }

    fn builtin_call(
        &mut self,
        builtin: &Builtin,
        args: &'a [Expr],
        call: &Expr,
    ) -> Result<(), CompileError> {
        let mut items = 0;
        for arg in args.iter().rev() {
            items += self.argument(arg)?;
        }
        if builtin.is_block_height() {
            if let Some(height) = args.first() {
                self.record.block_height.push(height.to_string());
            }
        }
        self.b.add_ops(builtin.opcodes, items, call.to_string())
    }

    /// `sigs.. nsigs` to the alt stack, `TXSIGHASH`, `keys.. nkeys`, then
    /// `nsigs` back under `nkeys`.
    fn multisig(&mut self, args: &'a [Expr], call: &Expr) -> Result<(), CompileError> {
        let [keys, sigs] = args else {
            return Err(CompileError::type_error(format!(
                "{} takes 2 arguments, got {}",
                builtins::CHECK_TX_MULTISIG,
                args.len()
            )));
        };
        let sig_items = self.argument(sigs)?;
        self.b.add_to_alt_stack()?;
        self.b.add_txsighash();
        let key_items = self.argument(keys)?;
        self.b.add_from_alt_stack()?;
        self.b.add_swap()?;
        self.b.add_ops(
            &[Instruction::CheckMultiSig],
            sig_items + 1 + key_items,
            call.to_string(),
        )
    }

    /// Builds the program of a contract instance from the call's arguments.
    fn contract_call(
        &mut self,
        name: &str,
        args: &'a [Expr],
        call: &Expr,
    ) -> Result<(), CompileError> {
        let label = call.to_string();
        self.b.add_data(Vec::new(), label.clone());
        for arg in args.iter().rev() {
            self.expr(arg)?;
            self.b.add_cat_push_data(label.clone())?;
        }

        let recursive = if name == self.contract.name {
            if !self.contract.recursive {
                return Err(CompileError::ForwardReference {
                    name: name.to_string(),
                });
            }
            self.reference(name)?;
            true
        } else {
            let callee = self
                .callees
                .get(name)
                .ok_or_else(|| CompileError::ForwardReference {
                    name: name.to_string(),
                })?;
            if callee.recursive {
                self.b.add_data(callee.body.clone(), name.to_string());
            } else {
                self.b
                    .add_data(vec![Instruction::Depth.opcode()], "DEPTH".to_string());
                self.b.add_cat(label.clone())?;
                self.b.add_data(callee.body.clone(), name.to_string());
            }
            callee.recursive
        };

        self.b.add_cat_push_data(label.clone())?;
        let tail = if recursive {
            vec![
                Instruction::Depth.opcode(),
                Instruction::Over.opcode(),
                Instruction::False.opcode(),
                Instruction::CheckPredicate.opcode(),
            ]
        } else {
            vec![
                Instruction::False.opcode(),
                Instruction::CheckPredicate.opcode(),
            ]
        };
        self.b.add_data(tail, "0 CHECKPREDICATE".to_string());
        self.b.add_cat(label)?;

        if !self.record.contracts.iter().any(|c| c == name) {
            self.record.contracts.push(name.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::checks::{check_contract, resolve_inheritance};
    use crate::compiler::parser::parse;
    use crate::compiler::types::Type;

    fn generate_all(src: &str) -> Vec<Generated> {
        let mut contracts = parse(src).unwrap().contracts;
        resolve_inheritance(&mut contracts).unwrap();
        let signatures: HashMap<String, Vec<Type>> = contracts
            .iter()
            .map(|c| (c.name.clone(), c.params.iter().map(|p| p.ty.clone()).collect()))
            .collect();
        let mut callees = HashMap::new();
        let mut out = Vec::new();
        for contract in &mut contracts {
            check_contract(contract, &signatures).unwrap();
            let generated = generate(contract, &callees).unwrap();
            callees.insert(
                contract.name.clone(),
                Callee {
                    body: generated.body.clone(),
                    recursive: contract.recursive,
                },
            );
            out.push(generated);
        }
        out
    }

    #[test]
    fn repeated_reference_copies_then_moves() {
        let g = generate_all(
            "contract Twice(n: Integer) locks v { clause c() { verify n + n > 3 unlock v } }",
        );
        assert_eq!(g[0].opcodes, "DUP ADD 3 GREATERTHAN");
    }

    #[test]
    fn three_clause_dispatch_drops_selector() {
        let g = generate_all(
            "contract Three(a: Integer) locks v {
               clause x() { verify a == 1 unlock v }
               clause y() { verify a == 2 unlock v }
               clause z() { verify a == 3 unlock v }
             }",
        );
        assert_eq!(
            g[0].opcodes,
            "SWAP DUP 2 NUMEQUAL JUMPIF:$z JUMPIF:$y 1 EQUAL JUMP:$_end \
             $y 2 EQUAL JUMP:$_end $z DROP 3 EQUAL $_end"
        );
    }

    #[test]
    fn lock_into_other_contract() {
        let g = generate_all(
            "contract Inner(k: PublicKey) locks v {
               clause s(sig: Signature) { verify checkTxSig(k, sig) unlock v }
             }
             contract Outer(k: PublicKey) locks v {
               clause move() { lock v with Inner(k) }
             }",
        );
        assert_eq!(g[0].body, hex::decode("ae7cac").unwrap());
        assert_eq!(
            g[1].opcodes,
            "0 AMOUNT ASSET 1 0 5 ROLL CATPUSHDATA 0x7403ae7cac00c0 CAT CHECKOUTPUT"
        );
        assert_eq!(g[1].clauses[0].contracts, ["Inner"]);
        assert_eq!(
            g[1].clauses[0].values[0].program.as_deref(),
            Some("Inner(k)")
        );
    }

    #[test]
    fn branch_locals_are_dropped() {
        let g = generate_all(
            "contract Branchy(a: Integer, b: Integer) locks v {
               clause c(x: Integer) {
                 if x > a {
                   define d: Integer = x - a
                   verify d < b
                 } else {
                   verify x == a
                 }
                 unlock v
               }
             }",
        );
        let stacks: Vec<String> = g[0]
            .items
            .iter()
            .filter(|item| matches!(item.ops.first(), Some(Op::Label(_))))
            .map(|item| item.stack.to_string())
            .collect();
        assert_eq!(stacks, ["[x, b, a]", "[x, b, a]"]);
    }
}
