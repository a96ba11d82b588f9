//! Builtin function table.

use super::types::Type;
use crate::virtual_machine::isa::Instruction;

/// Accepted argument shape.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArgKind {
    /// `Integer` or `Amount`.
    Numeric,
    /// Anything stored as a byte string.
    Bytes,
    /// Any non-list value.
    Any,
    Exact(&'static Type),
    /// List literal whose items all have the given type.
    List(&'static Type),
}

impl ArgKind {
    pub fn accepts(&self, ty: &Type) -> bool {
        match self {
            ArgKind::Numeric => ty.is_numeric(),
            ArgKind::Bytes => ty.is_bytes(),
            ArgKind::Any => true,
            ArgKind::Exact(want) | ArgKind::List(want) => want.accepts(ty),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ArgKind::Numeric => "Integer".to_string(),
            ArgKind::Bytes => "a byte string".to_string(),
            ArgKind::Any => "a value".to_string(),
            ArgKind::Exact(ty) => ty.to_string(),
            ArgKind::List(ty) => format!("a list of {ty}"),
        }
    }
}

/// Result type of a builtin call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Returns {
    Fixed(&'static Type),
    /// `Sha3(T)` of the first argument's type.
    Sha3Of,
    /// `Sha256(T)` of the first argument's type.
    Sha256Of,
}

#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub args: &'static [ArgKind],
    pub returns: Returns,
    /// Applied after the arguments are pushed last-to-first.
    pub opcodes: &'static [Instruction],
}

impl Builtin {
    pub fn result_type(&self, args: &[Type]) -> Type {
        match self.returns {
            Returns::Fixed(ty) => ty.clone(),
            Returns::Sha3Of => Type::Sha3(Box::new(args.first().cloned().unwrap_or(Type::String))),
            Returns::Sha256Of => {
                Type::Sha256(Box::new(args.first().cloned().unwrap_or(Type::String)))
            }
        }
    }

    /// Whether calls are recorded as hash-call annotations.
    pub fn is_hash(&self) -> bool {
        matches!(self.returns, Returns::Sha3Of | Returns::Sha256Of)
    }

    /// Whether the argument is a block height bound.
    pub fn is_block_height(&self) -> bool {
        matches!(self.name, "below" | "above")
    }
}

pub const CHECK_TX_MULTISIG: &str = "checkTxMultiSig";

const HASH: &Type = &Type::Hash;
const INTEGER: &Type = &Type::Integer;
const STRING: &Type = &Type::String;
const BOOLEAN: &Type = &Type::Boolean;
const PUBLIC_KEY: &Type = &Type::PublicKey;
const SIGNATURE: &Type = &Type::Signature;

pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "sha3",
        args: &[ArgKind::Any],
        returns: Returns::Sha3Of,
        opcodes: &[Instruction::Sha3],
    },
    Builtin {
        name: "sha256",
        args: &[ArgKind::Any],
        returns: Returns::Sha256Of,
        opcodes: &[Instruction::Sha256],
    },
    Builtin {
        name: "ripemd160",
        args: &[ArgKind::Any],
        returns: Returns::Fixed(HASH),
        opcodes: &[Instruction::Ripemd160],
    },
    Builtin {
        name: "sm3",
        args: &[ArgKind::Any],
        returns: Returns::Fixed(HASH),
        opcodes: &[Instruction::Sm3],
    },
    Builtin {
        name: "size",
        args: &[ArgKind::Bytes],
        returns: Returns::Fixed(INTEGER),
        opcodes: &[Instruction::Size, Instruction::Swap, Instruction::Drop],
    },
    Builtin {
        name: "abs",
        args: &[ArgKind::Numeric],
        returns: Returns::Fixed(INTEGER),
        opcodes: &[Instruction::Abs],
    },
    Builtin {
        name: "min",
        args: &[ArgKind::Numeric, ArgKind::Numeric],
        returns: Returns::Fixed(INTEGER),
        opcodes: &[Instruction::Min],
    },
    Builtin {
        name: "max",
        args: &[ArgKind::Numeric, ArgKind::Numeric],
        returns: Returns::Fixed(INTEGER),
        opcodes: &[Instruction::Max],
    },
    Builtin {
        name: "concat",
        args: &[ArgKind::Bytes, ArgKind::Bytes],
        returns: Returns::Fixed(STRING),
        opcodes: &[Instruction::Swap, Instruction::Cat],
    },
    Builtin {
        name: "concatpush",
        args: &[ArgKind::Bytes, ArgKind::Bytes],
        returns: Returns::Fixed(STRING),
        opcodes: &[Instruction::Swap, Instruction::CatPushData],
    },
    Builtin {
        name: "below",
        args: &[ArgKind::Numeric],
        returns: Returns::Fixed(BOOLEAN),
        opcodes: &[Instruction::BlockHeight, Instruction::GreaterThan],
    },
    Builtin {
        name: "above",
        args: &[ArgKind::Numeric],
        returns: Returns::Fixed(BOOLEAN),
        opcodes: &[Instruction::BlockHeight, Instruction::LessThan],
    },
    Builtin {
        name: "checkTxSig",
        args: &[ArgKind::Exact(PUBLIC_KEY), ArgKind::Exact(SIGNATURE)],
        returns: Returns::Fixed(BOOLEAN),
        opcodes: &[Instruction::TxSigHash, Instruction::Swap, Instruction::CheckSig],
    },
    // Emitted by hand: the signature count rides the alt stack while the
    // sighash is pushed.
    Builtin {
        name: CHECK_TX_MULTISIG,
        args: &[ArgKind::List(PUBLIC_KEY), ArgKind::List(SIGNATURE)],
        returns: Returns::Fixed(BOOLEAN),
        opcodes: &[Instruction::CheckMultiSig],
    },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_every_builtin() {
        for name in [
            "sha3",
            "sha256",
            "ripemd160",
            "sm3",
            "size",
            "abs",
            "min",
            "max",
            "concat",
            "concatpush",
            "below",
            "above",
            "checkTxSig",
            "checkTxMultiSig",
        ] {
            assert!(lookup(name).is_some(), "{name}");
        }
        assert!(lookup("keccak").is_none());
    }

    #[test]
    fn hash_results_refine() {
        let sha3 = lookup("sha3").unwrap();
        assert!(sha3.is_hash());
        assert_eq!(
            sha3.result_type(&[Type::PublicKey]),
            Type::Sha3(Box::new(Type::PublicKey))
        );
        assert_eq!(lookup("sm3").unwrap().result_type(&[Type::String]), Type::Hash);
    }

    #[test]
    fn arg_kinds() {
        assert!(ArgKind::Numeric.accepts(&Type::Amount));
        assert!(!ArgKind::Bytes.accepts(INTEGER));
        assert!(ArgKind::Bytes.accepts(&Type::Sha3(Box::new(Type::String))));
        assert!(!ArgKind::Exact(PUBLIC_KEY).accepts(SIGNATURE));
    }
}
