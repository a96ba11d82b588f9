//! Contract value types and the operator table.

use super::errors::CompileError;
use crate::virtual_machine::isa::Instruction;
use std::fmt;
use std::str::FromStr;

/// Type of a contract value.
///
/// `Sha3(T)` and `Sha256(T)` are refinements of `Hash` recording what was
/// hashed. They are inferred, never written in source.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Type {
    Amount,
    Asset,
    Boolean,
    Hash,
    Integer,
    Program,
    PublicKey,
    Signature,
    String,
    Sha3(Box<Type>),
    Sha256(Box<Type>),
}

impl Type {
    /// `Integer` or `Amount`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer | Type::Amount)
    }

    /// `Hash` or one of its refinements.
    pub fn is_hash(&self) -> bool {
        matches!(self, Type::Hash | Type::Sha3(_) | Type::Sha256(_))
    }

    /// Types stored as raw byte strings rather than numbers or booleans.
    pub fn is_bytes(&self) -> bool {
        !matches!(self, Type::Integer | Type::Amount | Type::Boolean)
    }

    /// Whether a value of type `other` may stand where `self` is expected.
    ///
    /// `Integer` and `Amount` interchange; `Hash` accepts its refinements and
    /// a refinement accepts a plain `Hash`.
    pub fn accepts(&self, other: &Type) -> bool {
        if self == other || (self.is_numeric() && other.is_numeric()) {
            return true;
        }
        matches!(
            (self, other),
            (Type::Hash, Type::Sha3(_) | Type::Sha256(_)) | (Type::Sha3(_) | Type::Sha256(_), Type::Hash)
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Amount => write!(f, "Amount"),
            Type::Asset => write!(f, "Asset"),
            Type::Boolean => write!(f, "Boolean"),
            Type::Hash => write!(f, "Hash"),
            Type::Integer => write!(f, "Integer"),
            Type::Program => write!(f, "Program"),
            Type::PublicKey => write!(f, "PublicKey"),
            Type::Signature => write!(f, "Signature"),
            Type::String => write!(f, "String"),
            Type::Sha3(inner) => write!(f, "Sha3({inner})"),
            Type::Sha256(inner) => write!(f, "Sha256({inner})"),
        }
    }
}

impl FromStr for Type {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let wrapped = |prefix: &str| {
            s.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('('))
                .and_then(|rest| rest.strip_suffix(')'))
        };
        if let Some(inner) = wrapped("Sha3") {
            return Ok(Type::Sha3(Box::new(inner.parse()?)));
        }
        if let Some(inner) = wrapped("Sha256") {
            return Ok(Type::Sha256(Box::new(inner.parse()?)));
        }
        Ok(match s {
            "Amount" => Type::Amount,
            "Asset" => Type::Asset,
            "Boolean" => Type::Boolean,
            "Hash" => Type::Hash,
            "Integer" => Type::Integer,
            "Program" => Type::Program,
            "PublicKey" => Type::PublicKey,
            "Signature" => Type::Signature,
            "String" => Type::String,
            _ => {
                return Err(CompileError::UnknownType {
                    name: s.to_string(),
                });
            }
        })
    }
}

impl From<Type> for String {
    fn from(ty: Type) -> String {
        ty.to_string()
    }
}

impl TryFrom<String> for Type {
    type Error = CompileError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    BoolOr,
    BoolAnd,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    Xor,
    Or,
    Add,
    Sub,
    And,
    Shl,
    Shr,
    Mod,
    Mul,
    Div,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 18] = [
        BinaryOp::BoolOr,
        BinaryOp::BoolAnd,
        BinaryOp::Gt,
        BinaryOp::Lt,
        BinaryOp::Ge,
        BinaryOp::Le,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::Xor,
        BinaryOp::Or,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::And,
        BinaryOp::Shl,
        BinaryOp::Shr,
        BinaryOp::Mod,
        BinaryOp::Mul,
        BinaryOp::Div,
    ];

    pub fn from_symbol(s: &str) -> Option<BinaryOp> {
        BinaryOp::ALL.into_iter().find(|op| op.symbol() == s)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::BoolOr => "||",
            BinaryOp::BoolAnd => "&&",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Xor => "^",
            BinaryOp::Or => "|",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::And => "&",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Mod => "%",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Binding strength, higher binds tighter. All levels associate left.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::BoolOr => 1,
            BinaryOp::BoolAnd => 2,
            BinaryOp::Gt
            | BinaryOp::Lt
            | BinaryOp::Ge
            | BinaryOp::Le
            | BinaryOp::Eq
            | BinaryOp::Ne => 3,
            BinaryOp::Xor | BinaryOp::Or | BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::And
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::Mod
            | BinaryOp::Mul
            | BinaryOp::Div => 5,
        }
    }

    pub fn opcodes(&self) -> &'static [Instruction] {
        match self {
            BinaryOp::BoolOr => &[Instruction::BoolOr],
            BinaryOp::BoolAnd => &[Instruction::BoolAnd],
            BinaryOp::Gt => &[Instruction::GreaterThan],
            BinaryOp::Lt => &[Instruction::LessThan],
            BinaryOp::Ge => &[Instruction::GreaterThanOrEqual],
            BinaryOp::Le => &[Instruction::LessThanOrEqual],
            BinaryOp::Eq => &[Instruction::Equal],
            BinaryOp::Ne => &[Instruction::Equal, Instruction::Not],
            BinaryOp::Xor => &[Instruction::Xor],
            BinaryOp::Or => &[Instruction::Or],
            BinaryOp::Add => &[Instruction::Add],
            BinaryOp::Sub => &[Instruction::Sub],
            BinaryOp::And => &[Instruction::And],
            BinaryOp::Shl => &[Instruction::LShift],
            BinaryOp::Shr => &[Instruction::RShift],
            BinaryOp::Mod => &[Instruction::Mod],
            BinaryOp::Mul => &[Instruction::Mul],
            BinaryOp::Div => &[Instruction::Div],
        }
    }

    /// Result type for the given operand types, or why they are rejected.
    pub fn result_type(&self, left: &Type, right: &Type) -> Result<Type, CompileError> {
        let sym = self.symbol();
        match self {
            BinaryOp::BoolOr | BinaryOp::BoolAnd => {
                if *left == Type::Boolean && *right == Type::Boolean {
                    Ok(Type::Boolean)
                } else {
                    Err(CompileError::type_error(format!(
                        "{sym} needs Boolean operands, got {left} and {right}"
                    )))
                }
            }
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le => {
                if left.is_numeric() && right.is_numeric() {
                    Ok(Type::Boolean)
                } else {
                    Err(CompileError::type_error(format!(
                        "{sym} needs Integer operands, got {left} and {right}"
                    )))
                }
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if *left == Type::Boolean || *right == Type::Boolean {
                    return Err(CompileError::BooleanEquality);
                }
                if left.accepts(right) {
                    Ok(Type::Boolean)
                } else {
                    Err(CompileError::type_error(format!(
                        "{sym} compares {left} with {right}"
                    )))
                }
            }
            BinaryOp::Xor | BinaryOp::Or | BinaryOp::And => {
                if left == right {
                    Ok(left.clone())
                } else {
                    Err(CompileError::type_error(format!(
                        "{sym} needs operands of one type, got {left} and {right}"
                    )))
                }
            }
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::Mod
            | BinaryOp::Mul
            | BinaryOp::Div => {
                if left.is_numeric() && right.is_numeric() {
                    Ok(Type::Integer)
                } else {
                    Err(CompileError::type_error(format!(
                        "{sym} needs Integer operands, got {left} and {right}"
                    )))
                }
            }
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    /// `~`, bitwise complement.
    Invert,
    /// `!`, boolean negation.
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Invert => "~",
            UnaryOp::Not => "!",
        }
    }

    pub fn opcodes(&self) -> &'static [Instruction] {
        match self {
            UnaryOp::Invert => &[Instruction::Invert],
            UnaryOp::Not => &[Instruction::Not],
        }
    }

    pub fn result_type(&self, operand: &Type) -> Result<Type, CompileError> {
        match self {
            UnaryOp::Not if *operand == Type::Boolean => Ok(Type::Boolean),
            UnaryOp::Invert if *operand != Type::Boolean => Ok(operand.clone()),
            _ => Err(CompileError::type_error(format!(
                "{} does not apply to {operand}",
                self.symbol()
            ))),
        }
    }
}
