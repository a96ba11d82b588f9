//! Compile-time model of the operand stack.
//!
//! Each entry names what the runtime stack holds at the same position, so the
//! code generator can ask how deep a variable currently sits.

use super::errors::CompileError;
use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StackEntry {
    /// The home slot of a named value.
    Var(String),
    /// An intermediate result, labelled with the expression that produced it.
    Temp(String),
}

impl StackEntry {
    fn as_temp(&self) -> StackEntry {
        match self {
            StackEntry::Var(name) | StackEntry::Temp(name) => StackEntry::Temp(name.clone()),
        }
    }
}

impl fmt::Display for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackEntry::Var(name) | StackEntry::Temp(name) => f.write_str(name),
        }
    }
}

/// Ordered entries, top last.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StackModel {
    entries: Vec<StackEntry>,
}

impl StackModel {
    pub fn new(entries: Vec<StackEntry>) -> Self {
        StackModel { entries }
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth of the topmost home slot of `name`, 0 being the top.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .rev()
            .position(|e| matches!(e, StackEntry::Var(n) if n == name))
    }

    /// Names of every home slot, bottom first.
    pub fn vars(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                StackEntry::Var(name) => Some(name.clone()),
                StackEntry::Temp(_) => None,
            })
            .collect()
    }

    fn index(&self, depth: usize) -> Result<usize, CompileError> {
        self.entries
            .len()
            .checked_sub(depth + 1)
            .ok_or(CompileError::StackUnderflow { needed: depth + 1 })
    }

    pub fn push(&mut self, entry: StackEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Result<StackEntry, CompileError> {
        self.entries
            .pop()
            .ok_or(CompileError::StackUnderflow { needed: 1 })
    }

    /// Removes `n` entries.
    pub fn drop_n(&mut self, n: usize) -> Result<(), CompileError> {
        let keep = self
            .entries
            .len()
            .checked_sub(n)
            .ok_or(CompileError::StackUnderflow { needed: n })?;
        self.entries.truncate(keep);
        Ok(())
    }

    /// Moves the entry at `depth` to the top.
    pub fn roll(&mut self, depth: usize) -> Result<(), CompileError> {
        let i = self.index(depth)?;
        let entry = self.entries.remove(i);
        self.entries.push(entry);
        Ok(())
    }

    /// Copies the entry at `depth` to the top. The copy is a temporary.
    pub fn pick(&mut self, depth: usize) -> Result<(), CompileError> {
        let i = self.index(depth)?;
        let copy = self.entries[i].as_temp();
        self.entries.push(copy);
        Ok(())
    }

    pub fn swap(&mut self) -> Result<(), CompileError> {
        self.roll(1)
    }

    pub fn dup(&mut self) -> Result<(), CompileError> {
        self.pick(0)
    }

    pub fn over(&mut self) -> Result<(), CompileError> {
        self.pick(1)
    }

    pub fn rename_top(&mut self, entry: StackEntry) -> Result<(), CompileError> {
        let top = self
            .entries
            .last_mut()
            .ok_or(CompileError::StackUnderflow { needed: 1 })?;
        *top = entry;
        Ok(())
    }
}

impl fmt::Display for StackModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.entries.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
