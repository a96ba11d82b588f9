//! Scoped symbol tables.

use super::builtins::BUILTINS;
use super::errors::CompileError;
use super::lexer::Keyword;
use super::types::Type;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Keyword,
    Builtin,
    Contract,
    ContractParam,
    /// The locked value, or the amount and asset halves of it.
    ContractValue,
    Clause,
    ClauseParam,
    /// A payment named by `requires`.
    ClauseValue,
    ClauseLocal,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Keyword => "keyword",
            Role::Builtin => "builtin",
            Role::Contract => "contract",
            Role::ContractParam => "contract parameter",
            Role::ContractValue => "contract value",
            Role::Clause => "clause",
            Role::ClauseParam => "clause parameter",
            Role::ClauseValue => "clause value",
            Role::ClauseLocal => "local",
        })
    }
}

#[derive(Clone, Debug)]
pub struct Entry {
    pub ty: Option<Type>,
    pub role: Role,
}

/// One scope, chained to its parent.
#[derive(Debug, Default)]
pub struct Environ<'p> {
    entries: HashMap<String, Entry>,
    parent: Option<&'p Environ<'p>>,
}

impl Environ<'static> {
    /// Root scope holding keywords and builtins.
    pub fn global() -> Environ<'static> {
        let mut env = Environ::default();
        for kw in Keyword::RESERVED {
            env.entries.insert(
                kw.to_string(),
                Entry {
                    ty: None,
                    role: Role::Keyword,
                },
            );
        }
        for builtin in BUILTINS {
            env.entries.insert(
                builtin.name.to_string(),
                Entry {
                    ty: None,
                    role: Role::Builtin,
                },
            );
        }
        env
    }
}

impl<'p> Environ<'p> {
    pub fn child(&self) -> Environ<'_> {
        Environ {
            entries: HashMap::new(),
            parent: Some(self),
        }
    }

    /// Adds `name` to this scope. A name may be added once per scope and may
    /// never shadow a keyword or builtin.
    pub fn add(&mut self, name: &str, ty: Option<Type>, role: Role) -> Result<(), CompileError> {
        let reserved = self
            .lookup(name)
            .is_some_and(|e| matches!(e.role, Role::Keyword | Role::Builtin));
        if reserved || self.entries.contains_key(name) {
            return Err(CompileError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.entries.insert(name.to_string(), Entry { ty, role });
        Ok(())
    }

    /// First entry for `name` walking outwards.
    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        match self.entries.get(name) {
            Some(entry) => Some(entry),
            None => self.parent.and_then(|p| p.lookup(name)),
        }
    }

    /// Type of a value-carrying name.
    pub fn value_type(&self, name: &str) -> Result<Type, CompileError> {
        let entry = self.lookup(name).ok_or_else(|| CompileError::UndefinedName {
            name: name.to_string(),
        })?;
        entry.ty.clone().ok_or_else(|| CompileError::WrongRole {
            name: name.to_string(),
            role: entry.role.to_string(),
            expected: "value".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents() {
        let global = Environ::global();
        let mut contract = global.child();
        contract
            .add("key", Some(Type::PublicKey), Role::ContractParam)
            .unwrap();
        let mut clause = contract.child();
        clause
            .add("sig", Some(Type::Signature), Role::ClauseParam)
            .unwrap();

        assert_eq!(clause.value_type("key").unwrap(), Type::PublicKey);
        assert_eq!(clause.lookup("sha3").unwrap().role, Role::Builtin);
        assert!(contract.lookup("sig").is_none());
    }

    #[test]
    fn duplicates_rejected_per_scope() {
        let global = Environ::global();
        let mut env = global.child();
        env.add("x", Some(Type::Integer), Role::ContractParam).unwrap();
        assert!(matches!(
            env.add("x", Some(Type::Integer), Role::ContractParam),
            Err(CompileError::DuplicateName { .. })
        ));
        let mut inner = env.child();
        inner.add("x", Some(Type::Boolean), Role::ClauseLocal).unwrap();
        assert_eq!(inner.value_type("x").unwrap(), Type::Boolean);

        assert!(env.add("verify", None, Role::ClauseLocal).is_err());
        assert!(env.add("checkTxSig", None, Role::ClauseLocal).is_err());
    }

    #[test]
    fn non_values_have_no_type() {
        let global = Environ::global();
        let err = global.value_type("sha3").unwrap_err();
        assert!(err.to_string().contains("is a builtin"));
        assert!(matches!(
            global.value_type("nope"),
            Err(CompileError::UndefinedName { .. })
        ));
    }
}
