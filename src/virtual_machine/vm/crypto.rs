//! Hashing and signature opcodes.

use super::VM;
use super::gas::{GasCategory, MIN_HASH_COST, PUBKEY_COST};
use crate::crypto::hashes;
use crate::crypto::key_pair::SignatureScheme;
use crate::virtual_machine::errors::VMError;

/// Length of the message signed by `CHECKSIG` and `CHECKMULTISIG`.
const SIG_MESSAGE_LEN: usize = 32;

impl VM<'_> {
    /// Replaces the top item with `digest(top)`, charging at least [`MIN_HASH_COST`].
    fn hash_top(&mut self, digest: impl FnOnce(&[u8]) -> Vec<u8>) -> Result<(), VMError> {
        let data = self.pop()?;
        let cost = (data.len() as u64).max(MIN_HASH_COST);
        self.apply_cost(cost, GasCategory::Hashing)?;
        self.push(digest(&data))
    }

    pub(super) fn op_ripemd160(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.hash_top(|data| hashes::ripemd160(data).to_vec())
    }

    pub(super) fn op_sha256(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.hash_top(|data| hashes::sha256(data).to_vec())
    }

    pub(super) fn op_sm3(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.hash_top(|data| hashes::sm3(data).to_vec())
    }

    pub(super) fn op_sha3(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.hash_top(|data| hashes::sha3_256(data).to_vec())
    }

    pub(super) fn op_hash160(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.hash_top(|data| hashes::hash160(data).to_vec())
    }

    pub(super) fn op_checksig(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.check_sig(SignatureScheme::Schnorr)
    }

    pub(super) fn op_checksig_sm2(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.check_sig(SignatureScheme::Sm2)
    }

    pub(super) fn op_checkmultisig(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.check_multisig(instr, SignatureScheme::Schnorr)
    }

    pub(super) fn op_checkmultisig_sm2(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.check_multisig(instr, SignatureScheme::Sm2)
    }

    pub(super) fn op_txsighash(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let sig_hash = self
            .context
            .tx_sig_hash
            .as_ref()
            .ok_or(VMError::ContextMissing {
                field: "tx_sig_hash",
            })?;
        let hash = sig_hash();
        self.push(hash.as_slice().to_vec())
    }

    /// `sig msg pubkey -> bool`
    ///
    /// A message that is not 32 bytes is an error; a public key of the wrong
    /// length only makes the check false.
    fn check_sig(&mut self, scheme: SignatureScheme) -> Result<(), VMError> {
        let pubkey = self.pop()?;
        let msg = self.pop()?;
        let sig = self.pop()?;
        if msg.len() != SIG_MESSAGE_LEN {
            return Err(VMError::bad_value(format!(
                "signature message of {} bytes, expected {SIG_MESSAGE_LEN}",
                msg.len()
            )));
        }
        if !scheme.pubkey_len_ok(&pubkey) {
            return self.push_bool(false);
        }
        self.push_bool(scheme.verify(&pubkey, &msg, &sig))
    }

    /// `sigs.. msg pubkeys.. nsigs npubkeys -> bool`
    ///
    /// Signatures are matched in order, each consuming public keys left to
    /// right until one verifies it. A key is never reused.
    fn check_multisig(&mut self, instr: &'static str, scheme: SignatureScheme) -> Result<(), VMError> {
        let num_pubkeys = self.pop_count(instr)?;
        let cost = (num_pubkeys as u64)
            .checked_mul(PUBKEY_COST)
            .ok_or_else(|| VMError::bad_value("too many public keys"))?;
        self.apply_cost(cost, GasCategory::Signature)?;

        let num_sigs = self.pop_count(instr)?;
        if num_sigs > num_pubkeys || (num_pubkeys > 0 && num_sigs == 0) {
            return Err(VMError::bad_value(format!(
                "{num_sigs} signatures for {num_pubkeys} public keys"
            )));
        }

        let pubkeys = (0..num_pubkeys)
            .map(|_| self.pop())
            .collect::<Result<Vec<_>, _>>()?;
        let msg = self.pop()?;
        if msg.len() != SIG_MESSAGE_LEN {
            return Err(VMError::bad_value(format!(
                "signature message of {} bytes, expected {SIG_MESSAGE_LEN}",
                msg.len()
            )));
        }
        let sigs = (0..num_sigs)
            .map(|_| self.pop())
            .collect::<Result<Vec<_>, _>>()?;

        if pubkeys.iter().any(|key| !scheme.pubkey_len_ok(key)) {
            return self.push_bool(false);
        }

        let mut keys = pubkeys.iter();
        let mut remaining = sigs.iter().peekable();
        while let Some(sig) = remaining.peek() {
            let Some(key) = keys.next() else {
                break;
            };
            if scheme.verify(key, &msg, sig) {
                remaining.next();
            }
        }
        self.push_bool(remaining.peek().is_none())
    }
}
