//! Byte-string splicing and bitwise logic.

use super::VM;
use crate::virtual_machine::assembler::push_data;
use crate::virtual_machine::errors::VMError;

impl VM<'_> {
    /// `a b CAT -> a||b`
    pub(super) fn op_cat(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let b = self.pop()?;
        let mut a = self.pop()?;
        a.extend_from_slice(&b);
        self.push(a)
    }

    /// `str offset size SUBSTR -> str[offset..offset+size]`
    pub(super) fn op_substr(&mut self, instr: &'static str) -> Result<(), VMError> {
        let size = self.pop_count(instr)?;
        let offset = self.pop_count(instr)?;
        let s = self.pop()?;
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= s.len())
            .ok_or_else(|| {
                VMError::bad_value(format!(
                    "SUBSTR {offset}+{size} exceeds length {}",
                    s.len()
                ))
            })?;
        self.push(s[offset..end].to_vec())
    }

    /// `str size LEFT -> str[..size]`
    pub(super) fn op_left(&mut self, instr: &'static str) -> Result<(), VMError> {
        let size = self.pop_count(instr)?;
        let mut s = self.pop()?;
        if size > s.len() {
            return Err(VMError::bad_value(format!(
                "LEFT {size} exceeds length {}",
                s.len()
            )));
        }
        s.truncate(size);
        self.push(s)
    }

    /// `str size RIGHT -> str[len-size..]`
    pub(super) fn op_right(&mut self, instr: &'static str) -> Result<(), VMError> {
        let size = self.pop_count(instr)?;
        let s = self.pop()?;
        if size > s.len() {
            return Err(VMError::bad_value(format!(
                "RIGHT {size} exceeds length {}",
                s.len()
            )));
        }
        self.push(s[s.len() - size..].to_vec())
    }

    /// `str SIZE -> str len(str)`
    pub(super) fn op_size(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let len = self.peek(0)?.len();
        self.push_u64(len as u64)
    }

    /// `a b CATPUSHDATA -> a||push(b)`
    pub(super) fn op_cat_push_data(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let b = self.pop()?;
        let mut a = self.pop()?;
        a.extend_from_slice(&push_data(&b));
        self.push(a)
    }

    pub(super) fn op_invert(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let item = self.pop()?;
        self.push(item.iter().map(|b| !b).collect())
    }

    /// Bitwise AND, truncated to the shorter operand.
    pub(super) fn op_and(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(a.iter().zip(&b).map(|(x, y)| x & y).collect())
    }

    pub(super) fn op_or(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.bitwise_extend(|x, y| x | y)
    }

    pub(super) fn op_xor(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.bitwise_extend(|x, y| x ^ y)
    }

    pub(super) fn op_equal(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push_bool(a == b)
    }

    pub(super) fn op_equal_verify(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let b = self.pop()?;
        let a = self.pop()?;
        if a != b {
            return Err(VMError::VerifyFailed);
        }
        Ok(())
    }

    /// Applies `f` bytewise, zero-extending the shorter operand.
    fn bitwise_extend(&mut self, f: impl Fn(u8, u8) -> u8) -> Result<(), VMError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let len = a.len().max(b.len());
        let out = (0..len)
            .map(|i| {
                f(
                    a.get(i).copied().unwrap_or(0),
                    b.get(i).copied().unwrap_or(0),
                )
            })
            .collect();
        self.push(out)
    }
}
