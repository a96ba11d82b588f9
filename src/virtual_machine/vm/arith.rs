//! Unsigned 256-bit arithmetic and comparison.
//!
//! Results that do not fit 256 bits fail with [`VMError::RangeError`]; nothing
//! wraps.

use super::VM;
use crate::virtual_machine::errors::VMError;
use primitive_types::U256;

const WORD_BITS: u64 = 256;

impl VM<'_> {
    fn unary_num(
        &mut self,
        f: impl FnOnce(U256) -> Result<U256, VMError>,
    ) -> Result<(), VMError> {
        let x = self.pop_u256()?;
        self.push_u256(f(x)?)
    }

    /// Pops `y` then `x` and pushes `f(x, y)`.
    fn binary_num(
        &mut self,
        f: impl FnOnce(U256, U256) -> Result<U256, VMError>,
    ) -> Result<(), VMError> {
        let y = self.pop_u256()?;
        let x = self.pop_u256()?;
        self.push_u256(f(x, y)?)
    }

    fn compare(&mut self, f: impl FnOnce(U256, U256) -> bool) -> Result<(), VMError> {
        let y = self.pop_u256()?;
        let x = self.pop_u256()?;
        self.push_bool(f(x, y))
    }

    pub(super) fn op_1add(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary_num(|x| {
            x.checked_add(U256::one())
                .ok_or(VMError::RangeError { op: instr })
        })
    }

    pub(super) fn op_1sub(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary_num(|x| {
            x.checked_sub(U256::one())
                .ok_or(VMError::RangeError { op: instr })
        })
    }

    pub(super) fn op_2mul(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary_num(|x| {
            x.checked_mul(U256::from(2u8))
                .ok_or(VMError::RangeError { op: instr })
        })
    }

    pub(super) fn op_2div(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.unary_num(|x| Ok(x >> 1u8))
    }

    /// Only zero has an unsigned negation.
    pub(super) fn op_negate(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary_num(|x| {
            if x.is_zero() {
                Ok(x)
            } else {
                Err(VMError::RangeError { op: instr })
            }
        })
    }

    pub(super) fn op_abs(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.unary_num(Ok)
    }

    pub(super) fn op_not(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let x = self.pop_u256()?;
        self.push_bool(x.is_zero())
    }

    pub(super) fn op_0notequal(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let x = self.pop_u256()?;
        self.push_bool(!x.is_zero())
    }

    pub(super) fn op_add(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| x.checked_add(y).ok_or(VMError::RangeError { op: instr }))
    }

    pub(super) fn op_sub(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| x.checked_sub(y).ok_or(VMError::RangeError { op: instr }))
    }

    pub(super) fn op_mul(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| x.checked_mul(y).ok_or(VMError::RangeError { op: instr }))
    }

    pub(super) fn op_div(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| x.checked_div(y).ok_or(VMError::DivisionByZero))
    }

    pub(super) fn op_mod(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| x.checked_rem(y).ok_or(VMError::ModuloByZero))
    }

    /// `x y LSHIFT -> x << y`, failing when set bits would be shifted out.
    pub(super) fn op_lshift(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| {
            if x.is_zero() || y.is_zero() {
                return Ok(x);
            }
            if y >= U256::from(WORD_BITS) || U256::from(x.leading_zeros()) < y {
                return Err(VMError::RangeError { op: instr });
            }
            Ok(x << y)
        })
    }

    pub(super) fn op_rshift(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| {
            if y >= U256::from(WORD_BITS) {
                return Ok(U256::zero());
            }
            Ok(x >> y)
        })
    }

    pub(super) fn op_booland(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let b = self.pop_bool()?;
        let a = self.pop_bool()?;
        self.push_bool(a && b)
    }

    pub(super) fn op_boolor(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let b = self.pop_bool()?;
        let a = self.pop_bool()?;
        self.push_bool(a || b)
    }

    pub(super) fn op_numequal(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|x, y| x == y)
    }

    pub(super) fn op_numequal_verify(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let y = self.pop_u256()?;
        let x = self.pop_u256()?;
        if x != y {
            return Err(VMError::VerifyFailed);
        }
        Ok(())
    }

    pub(super) fn op_numnotequal(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|x, y| x != y)
    }

    pub(super) fn op_lessthan(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|x, y| x < y)
    }

    pub(super) fn op_greaterthan(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|x, y| x > y)
    }

    pub(super) fn op_lessthanorequal(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|x, y| x <= y)
    }

    pub(super) fn op_greaterthanorequal(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|x, y| x >= y)
    }

    pub(super) fn op_min(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| Ok(x.min(y)))
    }

    pub(super) fn op_max(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.binary_num(|x, y| Ok(x.max(y)))
    }

    /// `x min max WITHIN -> min <= x < max`
    pub(super) fn op_within(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let max = self.pop_u256()?;
        let min = self.pop_u256()?;
        let x = self.pop_u256()?;
        self.push_bool(min <= x && x < max)
    }
}
