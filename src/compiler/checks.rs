//! Static checks run before code generation.
//!
//! [`resolve_inheritance`] runs once over a compilation unit, then
//! [`check_contract`] runs over each contract in turn:
//!
//! 1. recursion detection
//! 2. no `Signature` contract parameters
//! 3. every contract parameter used by some clause
//! 4. lock/unlock numbering, with the if-branch symmetry rule
//! 5. type check
//! 6. every clause parameter used by its clause
//! 7. every local referenced

use super::artifact::HashCall;
use super::ast::{
    Clause, Contract, Expr, Statement, ValueBinding, ValueRef, walk_statements,
};
use super::builtins::{self, ArgKind, Builtin};
use super::env::{Environ, Role};
use super::errors::{CompileError, WithContext};
use super::types::{BinaryOp, Type};
use std::collections::{HashMap, HashSet};

/// What the checks learn about a contract beyond its syntax.
#[derive(Debug, Default)]
pub struct ContractFacts {
    /// Hash refinements of `Hash`-typed contract parameters.
    pub inferred: HashMap<String, Type>,
    /// Hash calls per clause, in clause order.
    pub hash_calls: Vec<Vec<HashCall>>,
}

// ==================== Inheritance ====================

/// Prepends inherited clauses to every contract, parents first.
pub fn resolve_inheritance(contracts: &mut [Contract]) -> Result<(), CompileError> {
    let resolved = {
        let by_name: HashMap<&str, &Contract> =
            contracts.iter().map(|c| (c.name.as_str(), c)).collect();
        contracts
            .iter()
            .map(|c| {
                inherited_clauses(&c.name, &by_name, &mut Vec::new())
                    .context_with(|| format!("in contract {}", c.name))
            })
            .collect::<Result<Vec<_>, _>>()?
    };
    for (contract, clauses) in contracts.iter_mut().zip(resolved) {
        if clauses.is_empty() {
            return Err(CompileError::NoClauses {
                name: contract.name.clone(),
            });
        }
        contract.clauses = clauses;
    }
    Ok(())
}

fn inherited_clauses(
    name: &str,
    by_name: &HashMap<&str, &Contract>,
    visiting: &mut Vec<String>,
) -> Result<Vec<Clause>, CompileError> {
    if visiting.iter().any(|v| v == name) {
        return Err(CompileError::InheritanceCycle {
            name: name.to_string(),
        });
    }
    let contract = by_name
        .get(name)
        .ok_or_else(|| CompileError::UndefinedName {
            name: name.to_string(),
        })?;
    visiting.push(name.to_string());
    let mut clauses = Vec::new();
    for parent_name in &contract.extends {
        let parent = by_name
            .get(parent_name.as_str())
            .ok_or_else(|| CompileError::UndefinedName {
                name: parent_name.clone(),
            })?;
        if parent.value != contract.value {
            return Err(CompileError::ValueMismatch {
                child: contract.name.clone(),
                parent: parent.name.clone(),
            });
        }
        clauses.extend(inherited_clauses(parent_name, by_name, visiting)?);
    }
    visiting.pop();
    clauses.extend(contract.clauses.iter().cloned());
    Ok(clauses)
}

// ==================== Reference counts ====================

fn count_expr(expr: &Expr, contract_name: &str, counts: &mut HashMap<String, usize>) {
    expr.walk(&mut |e| match e {
        Expr::Var(name) => *counts.entry(name.clone()).or_default() += 1,
        Expr::Call { name, .. } if name == contract_name => {
            *counts.entry(name.clone()).or_default() += 1
        }
        _ => {}
    });
}

/// References to each name in `stmts`, through both arms of every `if`.
///
/// A self call references the contract's own body; locking a required
/// payment references its amount and asset expressions.
pub fn count_refs(
    stmts: &[Statement],
    clause: &Clause,
    contract_name: &str,
) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    let count_value = |value: &ValueRef, counts: &mut HashMap<String, usize>| {
        let (amount, asset) = match value {
            ValueRef::Split { amount, asset } => (amount, asset),
            ValueRef::Named(name) => match clause.requirement(name) {
                Some(req) => (&req.amount, &req.asset),
                None => return,
            },
        };
        count_expr(amount, contract_name, counts);
        count_expr(asset, contract_name, counts);
    };
    walk_statements(stmts, &mut |stmt| match stmt {
        Statement::If { cond, .. } => count_expr(cond, contract_name, &mut counts),
        Statement::Define { init, .. } => {
            if let Some(init) = init {
                count_expr(init, contract_name, &mut counts);
            }
        }
        Statement::Assign { expr, .. } | Statement::Verify(expr) => {
            count_expr(expr, contract_name, &mut counts)
        }
        Statement::Lock { value, program, .. } => {
            count_value(value, &mut counts);
            count_expr(program, contract_name, &mut counts);
        }
        Statement::Unlock { value, .. } => count_value(value, &mut counts),
    });
    counts
}

/// References to `name` within one expression.
pub fn count_in_expr(expr: &Expr, name: &str) -> usize {
    let mut n = 0;
    expr.walk(&mut |e| {
        if matches!(e, Expr::Var(v) if v == name) {
            n += 1;
        }
    });
    n
}

/// Names a clause references anywhere, requirements included.
fn clause_uses(clause: &Clause, contract_name: &str) -> HashMap<String, usize> {
    let mut counts = count_refs(&clause.statements, clause, contract_name);
    for req in &clause.reqs {
        count_expr(&req.amount, contract_name, &mut counts);
        count_expr(&req.asset, contract_name, &mut counts);
    }
    counts
}

// ==================== Per-contract checks ====================

/// Whether some `lock` in the contract locks into a call of the contract itself.
pub fn is_recursive(contract: &Contract) -> bool {
    let mut recursive = false;
    for clause in &contract.clauses {
        walk_statements(&clause.statements, &mut |stmt| {
            if let Statement::Lock { program, .. } = stmt {
                program.walk(&mut |e| {
                    if matches!(e, Expr::Call { name, .. } if *name == contract.name) {
                        recursive = true;
                    }
                });
            }
        });
    }
    recursive
}

/// Runs every per-contract check, numbering lock and unlock statements in place.
///
/// `signatures` maps every contract of the unit to its parameter types.
pub fn check_contract(
    contract: &mut Contract,
    signatures: &HashMap<String, Vec<Type>>,
) -> Result<ContractFacts, CompileError> {
    contract.recursive = is_recursive(contract);

    if let Some(param) = contract.params.iter().find(|p| p.ty == Type::Signature) {
        return Err(CompileError::SignatureParam {
            name: param.name.clone(),
        });
    }

    let used: HashSet<String> = contract
        .clauses
        .iter()
        .flat_map(|clause| clause_uses(clause, &contract.name).into_keys())
        .collect();
    if let Some(param) = contract.params.iter().find(|p| !used.contains(&p.name)) {
        return Err(CompileError::UnusedParam {
            name: param.name.clone(),
        });
    }

    for clause in &mut contract.clauses {
        let mut next = 0;
        number(&mut clause.statements, &mut next, true)
            .context_with(|| format!("in clause {}", clause.name))?;
    }
    let contract: &Contract = contract;

    let global = Environ::global();
    let mut unit = global.child();
    let mut names: Vec<&String> = signatures.keys().collect();
    names.sort();
    for name in names {
        unit.add(name, None, Role::Contract)?;
    }
    let mut env = unit.child();
    for param in &contract.params {
        env.add(&param.name, Some(param.ty.clone()), Role::ContractParam)?;
    }
    match &contract.value {
        ValueBinding::Named(name) => env.add(name, None, Role::ContractValue)?,
        ValueBinding::Split { amount, asset } => {
            env.add(amount, Some(Type::Amount), Role::ContractValue)?;
            env.add(asset, Some(Type::Asset), Role::ContractValue)?;
        }
    }
    for clause in &contract.clauses {
        env.add(&clause.name, None, Role::Clause)?;
    }

    let mut facts = ContractFacts::default();
    for clause in &contract.clauses {
        let mut checker = TypeChecker {
            contract,
            clause,
            signatures,
            hash_calls: Vec::new(),
            refinements: HashMap::new(),
        };
        checker
            .check_clause(&env)
            .context_with(|| format!("in clause {}", clause.name))?;

        for (name, ty) in checker.refinements {
            let declared = contract.params.iter().find(|p| p.name == name);
            if declared.is_some_and(|p| p.ty == Type::Hash) {
                facts.inferred.insert(name, ty);
            }
        }
        facts.hash_calls.push(checker.hash_calls);

        let uses = clause_uses(clause, &contract.name);
        if let Some(param) = clause.params.iter().find(|p| !uses.contains_key(&p.name)) {
            return Err(CompileError::UnusedParam {
                name: param.name.clone(),
            })
            .context_with(|| format!("in clause {}", clause.name));
        }

        let mut unused = None;
        walk_statements(&clause.statements, &mut |stmt| {
            if let Statement::Define { name, .. } = stmt {
                if unused.is_none() && !uses.contains_key(name) {
                    unused = Some(name.clone());
                }
            }
        });
        if let Some(name) = unused {
            return Err(CompileError::UnusedLocal { name })
                .context_with(|| format!("in clause {}", clause.name));
        }
    }
    Ok(facts)
}

/// Assigns output indexes to lock and unlock statements.
///
/// A non-terminal `if` must number the same count in both branches, so that
/// the statements after it see one index sequence.
fn number(stmts: &mut [Statement], next: &mut u64, terminal: bool) -> Result<(), CompileError> {
    let last = stmts.len().saturating_sub(1);
    for (i, stmt) in stmts.iter_mut().enumerate() {
        let tail = terminal && i == last;
        match stmt {
            Statement::Lock { index, .. } | Statement::Unlock { index, .. } => {
                *index = *next;
                *next += 1;
            }
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                let start = *next;
                number(then_body, next, tail)?;
                let mut else_next = start;
                number(else_body, &mut else_next, tail)?;
                let then_count = (*next - start) as usize;
                let else_count = (else_next - start) as usize;
                if !tail && then_count != else_count {
                    return Err(CompileError::LockCountMismatch {
                        then_count,
                        else_count,
                    });
                }
                *next = (*next).max(else_next);
            }
            Statement::Define { .. } | Statement::Assign { .. } | Statement::Verify(_) => {}
        }
    }
    Ok(())
}

// ==================== Type check ====================

struct TypeChecker<'a> {
    contract: &'a Contract,
    clause: &'a Clause,
    signatures: &'a HashMap<String, Vec<Type>>,
    hash_calls: Vec<HashCall>,
    refinements: HashMap<String, Type>,
}

impl TypeChecker<'_> {
    fn check_clause(&mut self, contract_env: &Environ<'_>) -> Result<(), CompileError> {
        let mut env = contract_env.child();
        for param in &self.clause.params {
            env.add(&param.name, Some(param.ty.clone()), Role::ClauseParam)?;
        }
        for req in &self.clause.reqs {
            let amount = self.check_expr(&env, &req.amount)?;
            if !amount.is_numeric() {
                return Err(CompileError::type_error(format!(
                    "amount of payment \"{}\" must be Amount, got {amount}",
                    req.name
                )));
            }
            self.expect(&env, &req.asset, &Type::Asset, "asset of payment")?;
            env.add(&req.name, None, Role::ClauseValue)?;
        }
        let clause = self.clause;
        self.check_statements(&mut env, &clause.statements)
    }

    fn check_statements(
        &mut self,
        env: &mut Environ<'_>,
        stmts: &[Statement],
    ) -> Result<(), CompileError> {
        for stmt in stmts {
            match stmt {
                Statement::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    self.expect(env, cond, &Type::Boolean, "if condition")?;
                    self.check_statements(&mut env.child(), then_body)?;
                    self.check_statements(&mut env.child(), else_body)?;
                }
                Statement::Define { name, ty, init } => {
                    if let Some(init) = init {
                        self.expect(env, init, ty, &format!("initial value of \"{name}\""))?;
                    }
                    if env.lookup(name).is_some() {
                        return Err(CompileError::DuplicateName { name: name.clone() });
                    }
                    env.add(name, Some(ty.clone()), Role::ClauseLocal)?;
                }
                Statement::Assign { name, expr } => {
                    let entry = env.lookup(name).ok_or_else(|| CompileError::UndefinedName {
                        name: name.clone(),
                    })?;
                    if entry.role != Role::ClauseLocal {
                        return Err(CompileError::WrongRole {
                            name: name.clone(),
                            role: entry.role.to_string(),
                            expected: "local".to_string(),
                        });
                    }
                    let ty = entry.ty.clone().unwrap_or(Type::Integer);
                    self.expect(env, expr, &ty, &format!("value assigned to \"{name}\""))?;
                }
                Statement::Verify(expr) => {
                    self.expect(env, expr, &Type::Boolean, "verify")?;
                }
                Statement::Lock { value, program, .. } => {
                    self.check_lock(env, value, program)
                        .context_with(|| "in lock statement".to_string())?;
                }
                Statement::Unlock { value, .. } => self.check_unlock(value)?,
            }
        }
        Ok(())
    }

    fn check_lock(
        &mut self,
        env: &Environ<'_>,
        value: &ValueRef,
        program: &Expr,
    ) -> Result<(), CompileError> {
        match value {
            ValueRef::Named(name) => {
                let is_contract_value = matches!(&self.contract.value, ValueBinding::Named(v) if v == name);
                if !is_contract_value && self.clause.requirement(name).is_none() {
                    return Err(CompileError::type_error(format!(
                        "\"{name}\" is neither the contract value nor a required payment"
                    )));
                }
            }
            ValueRef::Split { amount, asset } => {
                let ty = self.check_expr(env, amount)?;
                if !ty.is_numeric() {
                    return Err(CompileError::type_error(format!(
                        "locked amount must be Amount, got {ty}"
                    )));
                }
                self.expect(env, asset, &Type::Asset, "locked asset")?;
            }
        }
        self.expect(env, program, &Type::Program, "lock destination")
    }

    fn check_unlock(&self, value: &ValueRef) -> Result<(), CompileError> {
        let releases_contract_value = match (&self.contract.value, value) {
            (ValueBinding::Named(v), ValueRef::Named(name)) => v == name,
            (ValueBinding::Split { amount, asset }, ValueRef::Split { amount: a, asset: b }) => {
                *a == Expr::Var(amount.clone()) && *b == Expr::Var(asset.clone())
            }
            _ => false,
        };
        if releases_contract_value {
            Ok(())
        } else {
            Err(CompileError::type_error(format!(
                "unlock must release the contract value \"{}\", not \"{value}\"",
                self.contract.value
            )))
        }
    }

    fn expect(
        &mut self,
        env: &Environ<'_>,
        expr: &Expr,
        want: &Type,
        what: &str,
    ) -> Result<(), CompileError> {
        let got = self.check_expr(env, expr)?;
        if want.accepts(&got) {
            Ok(())
        } else {
            Err(CompileError::type_error(format!(
                "{what} must be {want}, got {got}"
            )))
        }
    }

    fn check_expr(&mut self, env: &Environ<'_>, expr: &Expr) -> Result<Type, CompileError> {
        match expr {
            Expr::Binary { op, left, right } => {
                let lt = self.check_expr(env, left)?;
                let rt = self.check_expr(env, right)?;
                let ty = op.result_type(&lt, &rt)?;
                if *op == BinaryOp::Eq {
                    self.refine(left, &lt, &rt);
                    self.refine(right, &rt, &lt);
                }
                Ok(ty)
            }
            Expr::Unary { op, operand } => {
                let ty = self.check_expr(env, operand)?;
                op.result_type(&ty)
            }
            Expr::Var(name) => env.value_type(name),
            Expr::Int(_) => Ok(Type::Integer),
            Expr::Bool(_) => Ok(Type::Boolean),
            Expr::Bytes(_) => Ok(Type::String),
            Expr::List(_) => Err(CompileError::ListOutsideCall),
            Expr::Call { name, args } => {
                if let Some(builtin) = builtins::lookup(name) {
                    return self.check_builtin(env, builtin, args);
                }
                match env.lookup(name) {
                    Some(entry) if entry.role == Role::Contract => {
                        self.check_contract_call(env, name, args)
                    }
                    Some(entry) => Err(CompileError::WrongRole {
                        name: name.clone(),
                        role: entry.role.to_string(),
                        expected: "function".to_string(),
                    }),
                    None => Err(CompileError::UndefinedName { name: name.clone() }),
                }
            }
        }
    }

    /// Records a one-step hash refinement of a `Hash` variable.
    fn refine(&mut self, side: &Expr, side_ty: &Type, other_ty: &Type) {
        if let Expr::Var(name) = side {
            if *side_ty == Type::Hash && matches!(other_ty, Type::Sha3(_) | Type::Sha256(_)) {
                self.refinements.insert(name.clone(), other_ty.clone());
            }
        }
    }

    fn check_builtin(
        &mut self,
        env: &Environ<'_>,
        builtin: &Builtin,
        args: &[Expr],
    ) -> Result<Type, CompileError> {
        if args.len() != builtin.args.len() {
            return Err(CompileError::type_error(format!(
                "{} takes {} arguments, got {}",
                builtin.name,
                builtin.args.len(),
                args.len()
            )));
        }
        let mut types = Vec::with_capacity(args.len());
        for (i, (arg, kind)) in args.iter().zip(builtin.args).enumerate() {
            let ty = match (kind, arg) {
                (ArgKind::List(item_ty), Expr::List(items)) => {
                    if items.is_empty() {
                        return Err(CompileError::type_error(format!(
                            "argument {} of {} must not be empty",
                            i + 1,
                            builtin.name
                        )));
                    }
                    for item in items {
                        let got = self.check_expr(env, item)?;
                        if !kind.accepts(&got) {
                            return Err(CompileError::type_error(format!(
                                "argument {} of {} must be {}, got an item of type {got}",
                                i + 1,
                                builtin.name,
                                kind.describe()
                            )));
                        }
                    }
                    (*item_ty).clone()
                }
                (ArgKind::List(_), _) => {
                    return Err(CompileError::type_error(format!(
                        "argument {} of {} must be {}",
                        i + 1,
                        builtin.name,
                        kind.describe()
                    )));
                }
                _ => {
                    let got = self.check_expr(env, arg)?;
                    if !kind.accepts(&got) {
                        return Err(CompileError::type_error(format!(
                            "argument {} of {} must be {}, got {got}",
                            i + 1,
                            builtin.name,
                            kind.describe()
                        )));
                    }
                    got
                }
            };
            types.push(ty);
        }
        let keys = multisig_len(builtin, args, 0);
        let sigs = multisig_len(builtin, args, 1);
        if let (Some(keys), Some(sigs)) = (keys, sigs) {
            if sigs > keys {
                return Err(CompileError::type_error(format!(
                    "{} has {sigs} signatures for {keys} public keys",
                    builtin.name
                )));
            }
        }
        if builtin.is_hash() {
            if let (Some(arg), Some(ty)) = (args.first(), types.first()) {
                self.hash_calls.push(HashCall {
                    hash_type: builtin.name.to_string(),
                    arg: arg.to_string(),
                    arg_type: ty.to_string(),
                });
            }
        }
        Ok(builtin.result_type(&types))
    }

    fn check_contract_call(
        &mut self,
        env: &Environ<'_>,
        name: &str,
        args: &[Expr],
    ) -> Result<Type, CompileError> {
        let params = self
            .signatures
            .get(name)
            .ok_or_else(|| CompileError::UndefinedName {
                name: name.to_string(),
            })?;
        if params.len() != args.len() {
            return Err(CompileError::type_error(format!(
                "contract {name} takes {} arguments, got {}",
                params.len(),
                args.len()
            )));
        }
        for (i, (arg, want)) in args.iter().zip(params).enumerate() {
            self.expect(env, arg, want, &format!("argument {} of {name}", i + 1))?;
        }
        Ok(Type::Program)
    }
}

/// Item count of list argument `i` of a `checkTxMultiSig` call.
fn multisig_len(builtin: &Builtin, args: &[Expr], i: usize) -> Option<usize> {
    if builtin.name != builtins::CHECK_TX_MULTISIG {
        return None;
    }
    match args.get(i) {
        Some(Expr::List(items)) => Some(items.len()),
        _ => None,
    }
}

// ==================== Compile order ====================

/// Contract indexes ordered so that every callee precedes its callers.
///
/// Calls between distinct contracts that form a cycle can never be compiled
/// and are reported as forward references.
pub fn dependency_order(contracts: &[Contract]) -> Result<Vec<usize>, CompileError> {
    let index: HashMap<&str, usize> = contracts
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();
    let mut order = Vec::with_capacity(contracts.len());
    let mut state = vec![Visit::New; contracts.len()];
    for i in 0..contracts.len() {
        visit(i, contracts, &index, &mut state, &mut order)?;
    }
    Ok(order)
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    New,
    Active,
    Done,
}

fn visit(
    i: usize,
    contracts: &[Contract],
    index: &HashMap<&str, usize>,
    state: &mut [Visit],
    order: &mut Vec<usize>,
) -> Result<(), CompileError> {
    match state[i] {
        Visit::Done => return Ok(()),
        Visit::Active => {
            return Err(CompileError::ForwardReference {
                name: contracts[i].name.clone(),
            });
        }
        Visit::New => {}
    }
    state[i] = Visit::Active;
    for callee in callees(&contracts[i]) {
        if let Some(&j) = index.get(callee.as_str()) {
            visit(j, contracts, index, state, order)?;
        }
    }
    state[i] = Visit::Done;
    order.push(i);
    Ok(())
}

/// Names of other contracts called anywhere in `contract`.
fn callees(contract: &Contract) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut note = |e: &Expr| {
        if let Expr::Call { name, .. } = e {
            if *name != contract.name && builtins::lookup(name).is_none() && !out.contains(name) {
                out.push(name.clone());
            }
        }
    };
    for clause in &contract.clauses {
        for req in &clause.reqs {
            req.amount.walk(&mut note);
            req.asset.walk(&mut note);
        }
        walk_statements(&clause.statements, &mut |stmt| match stmt {
            Statement::If { cond: e, .. }
            | Statement::Assign { expr: e, .. }
            | Statement::Verify(e) => e.walk(&mut note),
            Statement::Define { init, .. } => {
                if let Some(e) = init {
                    e.walk(&mut note);
                }
            }
            Statement::Lock { value, program, .. } => {
                if let ValueRef::Split { amount, asset } = value {
                    amount.walk(&mut note);
                    asset.walk(&mut note);
                }
                program.walk(&mut note);
            }
            Statement::Unlock { .. } => {}
        });
    }
    out
}
