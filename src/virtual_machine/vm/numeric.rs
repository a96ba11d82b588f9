//! Conversions between stack items and numbers.
//!
//! Stack items are byte strings. Numbers are unsigned 256-bit integers stored
//! little-endian with trailing zero bytes trimmed, so zero is the empty string.
//! Any item with a non-zero byte is truthy.

use crate::virtual_machine::errors::VMError;
use primitive_types::U256;

/// Largest number of bytes a numeric operand may have.
pub const MAX_NUMBER_LEN: usize = 32;

/// Decodes a stack item as an unsigned 256-bit integer.
pub fn bytes_to_u256(data: &[u8]) -> Result<U256, VMError> {
    if data.len() > MAX_NUMBER_LEN {
        return Err(VMError::bad_value(format!(
            "number of {} bytes exceeds {MAX_NUMBER_LEN}",
            data.len()
        )));
    }
    Ok(U256::from_little_endian(data))
}

/// Encodes a number as its minimal little-endian byte string.
pub fn u256_to_bytes(n: U256) -> Vec<u8> {
    let mut buf = [0u8; MAX_NUMBER_LEN];
    n.to_little_endian(&mut buf);
    let len = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    buf[..len].to_vec()
}

/// Encodes a `u64` as its minimal little-endian byte string.
pub fn u64_to_bytes(n: u64) -> Vec<u8> {
    u256_to_bytes(U256::from(n))
}

/// Decodes a stack item as a `u64`, failing with a range error when it does not fit.
pub fn bytes_to_u64(data: &[u8], op: &'static str) -> Result<u64, VMError> {
    let n = bytes_to_u256(data)?;
    if n > U256::from(u64::MAX) {
        return Err(VMError::RangeError { op });
    }
    Ok(n.low_u64())
}

/// Truthiness of a stack item.
pub fn as_bool(data: &[u8]) -> bool {
    data.iter().any(|&b| b != 0)
}

/// Canonical encoding of a boolean.
pub fn bool_to_bytes(b: bool) -> Vec<u8> {
    if b { vec![1] } else { Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_empty() {
        assert!(u256_to_bytes(U256::zero()).is_empty());
        assert_eq!(bytes_to_u256(&[]).unwrap(), U256::zero());
    }

    #[test]
    fn minimal_little_endian() {
        assert_eq!(u64_to_bytes(0x0102), vec![0x02, 0x01]);
        assert_eq!(bytes_to_u256(&[0x02, 0x01, 0x00]).unwrap(), U256::from(0x0102));
    }

    #[test]
    fn max_round_trips() {
        let bytes = u256_to_bytes(U256::MAX);
        assert_eq!(bytes, vec![0xff; 32]);
        assert_eq!(bytes_to_u256(&bytes).unwrap(), U256::MAX);
    }

    #[test]
    fn oversized_number_is_bad_value() {
        assert!(matches!(
            bytes_to_u256(&[1u8; 33]),
            Err(VMError::BadValue { .. })
        ));
    }

    #[test]
    fn u64_range_checked() {
        assert_eq!(bytes_to_u64(&[5], "PICK").unwrap(), 5);
        assert!(matches!(
            bytes_to_u64(&[1u8; 9], "PICK"),
            Err(VMError::RangeError { op: "PICK" })
        ));
    }

    #[test]
    fn truthiness() {
        assert!(!as_bool(&[]));
        assert!(!as_bool(&[0, 0]));
        assert!(as_bool(&[0, 1]));
        assert_eq!(bool_to_bytes(true), vec![1]);
        assert!(bool_to_bytes(false).is_empty());
    }
}
