//! Signature keys checked by `CHECKSIG`, `CHECKMULTISIG` and their SM2 variants.
//!
//! Two schemes are supported:
//! - Schnorr over secp256k1 (BIP-340): 32-byte x-only public keys, 64-byte signatures
//! - SM2: SEC1-encoded public keys (33 or 65 bytes), 64-byte signatures
//!
//! Signing keys are exposed so callers (wallet tooling, tests) can produce
//! witnesses that the VM accepts; key storage is out of scope.

use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature as SchnorrSignature, SigningKey, VerifyingKey};
use sm2::dsa::{Signature as Sm2Signature, SigningKey as Sm2SigningKey, VerifyingKey as Sm2VerifyingKey};

/// Length of an x-only Schnorr public key.
pub const SCHNORR_PUBKEY_LEN: usize = 32;

/// Length of a Schnorr or SM2 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Distinguishing identifier used for SM2 signatures.
pub const SM2_DIST_ID: &str = "1234567812345678";

/// Signature schemes understood by the VM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureScheme {
    Schnorr,
    Sm2,
}

impl SignatureScheme {
    /// Returns whether `pubkey` has an acceptable length for this scheme.
    ///
    /// The VM pushes `false` rather than failing when this does not hold.
    pub fn pubkey_len_ok(&self, pubkey: &[u8]) -> bool {
        match self {
            SignatureScheme::Schnorr => pubkey.len() == SCHNORR_PUBKEY_LEN,
            SignatureScheme::Sm2 => pubkey.len() == 33 || pubkey.len() == 65,
        }
    }

    /// Verifies `signature` over `msg` with the raw public key bytes.
    ///
    /// Malformed keys or signatures verify as `false`.
    pub fn verify(&self, pubkey: &[u8], msg: &[u8], signature: &[u8]) -> bool {
        match self {
            SignatureScheme::Schnorr => PublicKey::from_bytes(pubkey)
                .is_some_and(|key| key.verify(msg, signature)),
            SignatureScheme::Sm2 => Sm2PublicKey::from_bytes(pubkey)
                .is_some_and(|key| key.verify(msg, signature)),
        }
    }
}

/// Schnorr signing key.
pub struct PrivateKey {
    key: SigningKey,
}

/// Schnorr verifying key.
#[derive(Clone, Debug)]
pub struct PublicKey {
    pub key: VerifyingKey,
}

impl PrivateKey {
    /// Creates a private key from raw bytes.
    ///
    /// Returns `None` if the bytes do not represent a valid scalar for secp256k1.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_bytes(bytes).ok().map(|key| Self { key })
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: *self.key.verifying_key(),
        }
    }

    /// Signs arbitrary data, producing a 64-byte Schnorr signature.
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        let signature: SchnorrSignature = self.key.sign(data);
        signature.to_bytes()
    }
}

impl PublicKey {
    /// Parses a 32-byte x-only public key.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SCHNORR_PUBKEY_LEN {
            return None;
        }
        VerifyingKey::from_bytes(bytes).ok().map(|key| Self { key })
    }

    /// Returns the 32-byte x-only encoding.
    pub fn to_bytes(&self) -> [u8; SCHNORR_PUBKEY_LEN] {
        self.key.to_bytes().into()
    }

    /// Verifies a Schnorr signature against the given data.
    ///
    /// Signatures that are not exactly [`SIGNATURE_LEN`] bytes are rejected.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        if signature.len() != SIGNATURE_LEN {
            return false;
        }
        SchnorrSignature::try_from(signature)
            .is_ok_and(|signature| self.key.verify(data, &signature).is_ok())
    }
}

/// SM2 signing key.
pub struct Sm2PrivateKey {
    key: Sm2SigningKey,
}

/// SM2 verifying key.
#[derive(Clone, Debug)]
pub struct Sm2PublicKey {
    key: Sm2VerifyingKey,
}

impl Sm2PrivateKey {
    /// Creates a private key from raw bytes, using [`SM2_DIST_ID`].
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let secret = sm2::SecretKey::from_slice(bytes).ok()?;
        Sm2SigningKey::new(SM2_DIST_ID, &secret)
            .ok()
            .map(|key| Self { key })
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> Sm2PublicKey {
        Sm2PublicKey {
            key: self.key.verifying_key().clone(),
        }
    }

    /// Signs arbitrary data, producing a 64-byte SM2 signature.
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        let signature: Sm2Signature = self.key.sign(data);
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(signature.to_bytes().as_slice());
        out
    }
}

impl Sm2PublicKey {
    /// Parses a SEC1-encoded public key.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Sm2VerifyingKey::from_sec1_bytes(SM2_DIST_ID, bytes)
            .ok()
            .map(|key| Self { key })
    }

    /// Returns the uncompressed SEC1 encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.key.to_sec1_bytes().to_vec()
    }

    /// Verifies an SM2 signature against the given data.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        if signature.len() != SIGNATURE_LEN {
            return false;
        }
        Sm2Signature::try_from(signature)
            .is_ok_and(|signature| self.key.verify(data, &signature).is_ok())
    }
}
