//! Compiled contract description, serialized as JSON at the tool boundary.

use super::errors::CompileError;
use super::instantiate::{ContractArg, instantiate};
use super::types::Type;
use crate::virtual_machine::assembler::push_u64;
use serde::{Deserialize, Serialize};

/// A `sha3`/`sha256` call recorded on a clause.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HashCall {
    pub hash_type: String,
    /// Argument source text.
    pub arg: String,
    pub arg_type: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    pub declared_type: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inferred_type: Option<Type>,
}

/// A `requires` payment.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReqInfo {
    pub name: String,
    pub amount: String,
    pub asset: String,
}

/// A value moved by a lock or unlock statement.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub name: String,
    /// Destination of a lock; absent for unlock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClauseInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub reqs: Vec<ReqInfo>,
    pub values: Vec<ValueInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hash_calls: Vec<HashCall>,
    /// Contracts called by the clause.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contracts: Vec<String>,
    /// Expressions passed to `below` and `above`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_height: Vec<String>,
}

/// Ops of one emission and the stack model after it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub opcodes: String,
    pub stack: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CompiledContract {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub clauses: Vec<ClauseInfo>,
    /// Locked value as declared.
    pub value: String,
    #[serde(with = "hex_bytes")]
    pub body_bytecode: Vec<u8>,
    pub body_opcodes: String,
    pub recursive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Step>>,
}

/// Value a spender pushes to select a clause.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClauseSelector {
    pub name: String,
    pub index: u64,
    /// Encoded push of `index`.
    pub selector: Vec<u8>,
}

impl CompiledContract {
    /// Selectors for each clause. A single-clause contract takes none.
    pub fn clause_selectors(&self) -> Vec<ClauseSelector> {
        if self.clauses.len() < 2 {
            return Vec::new();
        }
        self.clauses
            .iter()
            .zip(0u64..)
            .map(|(clause, index)| ClauseSelector {
                name: clause.name.clone(),
                index,
                selector: push_u64(index),
            })
            .collect()
    }

    /// Program locking value into this contract with `args`.
    pub fn instantiate(&self, args: &[ContractArg]) -> Result<Vec<u8>, CompileError> {
        instantiate(&self.body_bytecode, &self.params, self.recursive, args)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
