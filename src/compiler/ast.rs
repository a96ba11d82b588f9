//! Syntax tree of contract source.

use super::errors::Position;
use super::types::{BinaryOp, Type, UnaryOp};
use std::fmt;

/// One parsed source file.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub pragmas: Vec<Pragma>,
    pub imports: Vec<Import>,
    pub contracts: Vec<Contract>,
}

#[derive(Clone, Debug)]
pub struct Pragma {
    /// Semantic-version constraint as written.
    pub constraint: String,
    pub pos: Position,
}

#[derive(Clone, Debug)]
pub struct Import {
    pub path: String,
    pub pos: Position,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// How a contract names the value it locks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValueBinding {
    /// `locks value`
    Named(String),
    /// `locks amount of asset`
    Split { amount: String, asset: String },
}

impl fmt::Display for ValueBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueBinding::Named(name) => f.write_str(name),
            ValueBinding::Split { amount, asset } => write!(f, "{amount} of {asset}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Contract {
    pub name: String,
    pub params: Vec<Param>,
    pub extends: Vec<String>,
    pub value: ValueBinding,
    pub clauses: Vec<Clause>,
    /// Set by recursion detection.
    pub recursive: bool,
    pub pos: Position,
}

impl Contract {
    /// Whether `name` refers to the locked value or one of its halves.
    pub fn is_value_name(&self, name: &str) -> bool {
        match &self.value {
            ValueBinding::Named(v) => v == name,
            ValueBinding::Split { amount, asset } => amount == name || asset == name,
        }
    }
}

/// `requires name: amount of asset`
#[derive(Clone, Debug)]
pub struct Requirement {
    pub name: String,
    pub amount: Expr,
    pub asset: Expr,
}

#[derive(Clone, Debug)]
pub struct Clause {
    pub name: String,
    pub params: Vec<Param>,
    pub reqs: Vec<Requirement>,
    pub statements: Vec<Statement>,
    pub pos: Position,
}

impl Clause {
    pub fn requirement(&self, name: &str) -> Option<&Requirement> {
        self.reqs.iter().find(|r| r.name == name)
    }
}

/// Value operand of `lock` and `unlock`.
#[derive(Clone, Debug)]
pub enum ValueRef {
    /// The contract value or a required payment.
    Named(String),
    Split { amount: Expr, asset: Expr },
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRef::Named(name) => f.write_str(name),
            ValueRef::Split { amount, asset } => write!(f, "{amount} of {asset}"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Statement {
    If {
        cond: Expr,
        then_body: Vec<Statement>,
        /// Empty when there is no `else`.
        else_body: Vec<Statement>,
    },
    Define {
        name: String,
        ty: Type,
        init: Option<Expr>,
    },
    Assign {
        name: String,
        expr: Expr,
    },
    Verify(Expr),
    Lock {
        value: ValueRef,
        program: Expr,
        /// Output index, numbered by the clause-index check.
        index: u64,
    },
    Unlock {
        value: ValueRef,
        index: u64,
    },
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::If { .. } => "if",
            Statement::Define { .. } => "define",
            Statement::Assign { .. } => "assign",
            Statement::Verify(_) => "verify",
            Statement::Lock { .. } => "lock",
            Statement::Unlock { .. } => "unlock",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Var(String),
    Int(u64),
    Bool(bool),
    Bytes(Vec<u8>),
    /// Only valid as a call argument.
    List(Vec<Expr>),
}

impl Expr {
    /// Calls `f` on this expression and every subexpression, parents first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::Unary { operand, .. } => operand.walk(f),
            Expr::Call { args, .. } | Expr::List(args) => {
                for arg in args {
                    arg.walk(f);
                }
            }
            Expr::Var(_) | Expr::Int(_) | Expr::Bool(_) | Expr::Bytes(_) => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary { op, left, right } => {
                let side = |e: &Expr| match e {
                    Expr::Binary { .. } => format!("({e})"),
                    _ => e.to_string(),
                };
                write!(f, "{} {op} {}", side(left), side(right))
            }
            Expr::Unary { op, operand } => match operand.as_ref() {
                Expr::Binary { .. } => write!(f, "{}({operand})", op.symbol()),
                _ => write!(f, "{}{operand}", op.symbol()),
            },
            Expr::Call { name, args } => write!(f, "{name}({})", join(args)),
            Expr::Var(name) => f.write_str(name),
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Expr::List(items) => write!(f, "[{}]", join(items)),
        }
    }
}

fn join(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Calls `f` on every statement in `stmts`, descending into `if` bodies.
pub fn walk_statements<'a>(stmts: &'a [Statement], f: &mut impl FnMut(&'a Statement)) {
    for stmt in stmts {
        f(stmt);
        if let Statement::If {
            then_body,
            else_body,
            ..
        } = stmt
        {
            walk_statements(then_body, f);
            walk_statements(else_body, f);
        }
    }
}
