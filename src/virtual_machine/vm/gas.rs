//! Gas accounting.
//!
//! Two layers: [`GasState`] converts a transaction's BTM value into a budget and
//! tracks usage across all of its programs, while [`GasProfile`] records how a
//! single VM run spent its budget.

use crate::virtual_machine::errors::VMError;

/// BTM units per unit of gas.
pub const VM_GAS_RATE: u64 = 200;

/// Gas charged per byte of serialized transaction.
pub const STORAGE_GAS_RATE: u64 = 1;

/// Upper bound on the gas a single transaction may buy.
pub const MAX_GAS_AMOUNT: u64 = 200_000;

/// Gas granted before the transaction's fee has been validated.
pub const DEFAULT_GAS_CREDIT: u64 = 30_000;

/// Fixed cost of pushing or popping a stack item, on top of its length.
pub const STACK_ITEM_COST: u64 = 8;

/// Minimum cost charged by a hashing opcode.
pub const MIN_HASH_COST: u64 = 64;

/// Cost charged per public key by the multisig opcodes.
pub const PUBKEY_COST: u64 = 1024;

/// Deepest `CHECKPREDICATE` nesting a program may reach.
pub const MAX_PREDICATE_DEPTH: usize = 16;

/// Number of gas categories tracked by [`GasProfile`].
const GAS_CATEGORY_COUNT: usize = 6;

/// Categories of gas consumption for profiling and debugging.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GasCategory {
    /// Base cost of every executed opcode.
    OpcodeBase = 0,
    /// Inline push data and stack item sizes.
    StackData = 1,
    /// Length-dependent hashing cost.
    Hashing = 2,
    /// Per-key cost of multisig checks.
    Signature = 3,
    /// Gas consumed by child predicate runs.
    Predicate = 4,
    /// Witness items pushed before execution starts.
    Arguments = 5,
}

impl GasCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GasCategory::OpcodeBase => "Opcode Base",
            GasCategory::StackData => "Stack Data",
            GasCategory::Hashing => "Hashing",
            GasCategory::Signature => "Signature",
            GasCategory::Predicate => "Predicate",
            GasCategory::Arguments => "Arguments",
        }
    }

    /// All categories in discriminant order.
    const ALL: [GasCategory; GAS_CATEGORY_COUNT] = [
        GasCategory::OpcodeBase,
        GasCategory::StackData,
        GasCategory::Hashing,
        GasCategory::Signature,
        GasCategory::Predicate,
        GasCategory::Arguments,
    ];
}

/// Gas consumption profile of one VM run.
///
/// Backed by a flat array indexed by [`GasCategory`] discriminant.
#[derive(Clone, Debug)]
pub struct GasProfile {
    counts: [u64; GAS_CATEGORY_COUNT],
}

impl Default for GasProfile {
    fn default() -> Self {
        Self {
            counts: [0; GAS_CATEGORY_COUNT],
        }
    }
}

impl GasProfile {
    /// Creates a new empty gas profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds gas to the specified category.
    #[inline(always)]
    pub fn add(&mut self, category: GasCategory, amount: u64) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(amount);
    }

    /// Returns the gas recorded for one category.
    pub fn get(&self, category: GasCategory) -> u64 {
        self.counts[category as usize]
    }

    /// Returns the total gas across all categories.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Returns an iterator over all categories and their gas costs.
    pub fn iter(&self) -> impl Iterator<Item = (GasCategory, u64)> {
        GasCategory::ALL.into_iter().zip(self.counts)
    }
}

/// Transaction-level gas state shared by every program of one transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GasState {
    /// BTM value the gas was bought with.
    pub btm_value: u64,
    /// Gas still available.
    pub gas_left: u64,
    /// Gas consumed so far, storage included once validated.
    pub gas_used: u64,
    /// Set once the storage charge has been paid.
    pub gas_valid: bool,
    /// Charge for the serialized transaction size.
    pub storage_gas: u64,
}

fn gas_error(reason: &str) -> VMError {
    VMError::GasCalculation {
        reason: reason.to_string(),
    }
}

impl GasState {
    /// Initializes the budget from the transaction's BTM value and size.
    pub fn set_gas(&mut self, btm_value: u64, tx_size: u64) -> Result<(), VMError> {
        self.btm_value = btm_value;
        let bought = btm_value / VM_GAS_RATE;
        self.gas_left = bought
            .checked_add(DEFAULT_GAS_CREDIT)
            .ok_or_else(|| gas_error("gas budget overflows"))?
            .min(MAX_GAS_AMOUNT);
        self.storage_gas = tx_size
            .checked_mul(STORAGE_GAS_RATE)
            .ok_or_else(|| gas_error("storage gas overflows"))?;
        Ok(())
    }

    /// Pays the storage charge and commits the budget.
    pub fn set_gas_valid(&mut self) -> Result<(), VMError> {
        self.gas_left = self
            .gas_left
            .checked_sub(self.storage_gas)
            .ok_or_else(|| gas_error("storage gas exceeds the budget"))?;
        self.gas_used = self
            .gas_used
            .checked_add(self.storage_gas)
            .ok_or_else(|| gas_error("gas used overflows"))?;
        self.gas_valid = true;
        Ok(())
    }

    /// Records a program run that left `gas_left` of the budget.
    pub fn update_usage(&mut self, gas_left: u64) -> Result<(), VMError> {
        let used = self
            .gas_left
            .checked_sub(gas_left)
            .ok_or_else(|| gas_error("gas left grew during a run"))?;
        self.gas_used = self
            .gas_used
            .checked_add(used)
            .ok_or_else(|| gas_error("gas used overflows"))?;
        self.gas_left = gas_left;
        Ok(())
    }

    /// Budget a program run may use right now.
    pub fn run_limit(&self) -> u64 {
        if self.gas_valid {
            self.gas_left
        } else {
            self.gas_left.min(DEFAULT_GAS_CREDIT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_gas_buys_from_btm() {
        let mut gas = GasState::default();
        gas.set_gas(1_000_000, 100).unwrap();
        assert_eq!(gas.gas_left, 1_000_000 / VM_GAS_RATE + DEFAULT_GAS_CREDIT);
        assert_eq!(gas.storage_gas, 100);
        assert!(!gas.gas_valid);
    }

    #[test]
    fn set_gas_caps_at_max() {
        let mut gas = GasState::default();
        gas.set_gas(u64::MAX / 2, 0).unwrap();
        assert_eq!(gas.gas_left, MAX_GAS_AMOUNT);
    }

    #[test]
    fn set_gas_valid_pays_storage() {
        let mut gas = GasState::default();
        gas.set_gas(0, 500).unwrap();
        gas.set_gas_valid().unwrap();
        assert_eq!(gas.gas_left, DEFAULT_GAS_CREDIT - 500);
        assert_eq!(gas.gas_used, 500);
        assert!(gas.gas_valid);
    }

    #[test]
    fn set_gas_valid_rejects_oversized_tx() {
        let mut gas = GasState::default();
        gas.set_gas(0, DEFAULT_GAS_CREDIT + 1).unwrap();
        assert!(matches!(
            gas.set_gas_valid(),
            Err(VMError::GasCalculation { .. })
        ));
    }

    #[test]
    fn update_usage_moves_gas() {
        let mut gas = GasState::default();
        gas.set_gas(0, 0).unwrap();
        gas.update_usage(DEFAULT_GAS_CREDIT - 40).unwrap();
        assert_eq!(gas.gas_used, 40);
        assert_eq!(gas.gas_left, DEFAULT_GAS_CREDIT - 40);
        assert!(gas.update_usage(DEFAULT_GAS_CREDIT).is_err());
    }

    #[test]
    fn run_limit_capped_until_valid() {
        let mut gas = GasState::default();
        gas.set_gas(100 * VM_GAS_RATE * 1000, 0).unwrap();
        assert_eq!(gas.run_limit(), DEFAULT_GAS_CREDIT);
        gas.set_gas_valid().unwrap();
        assert_eq!(gas.run_limit(), gas.gas_left);
        assert!(gas.run_limit() > DEFAULT_GAS_CREDIT);
    }

    #[test]
    fn profile_accumulates() {
        let mut profile = GasProfile::new();
        profile.add(GasCategory::OpcodeBase, 3);
        profile.add(GasCategory::Hashing, 64);
        profile.add(GasCategory::OpcodeBase, 1);
        assert_eq!(profile.get(GasCategory::OpcodeBase), 4);
        assert_eq!(profile.total(), 68);
        assert_eq!(profile.iter().count(), 6);
    }
}
