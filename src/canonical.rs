//! Canonical serialization for deterministic fingerprints.
//!
//! Responses, table rows and the comparator registry all carry short
//! fingerprints so callers can cache and compare results across runs.
//!
//! ## Determinism Guarantees
//!
//! - Struct fields serialize in declaration order
//! - Maps in fingerprinted data are `BTreeMap`, never `HashMap`
//! - Floats are quantized before hashing (see [`quantize`])

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Quantization factor applied to floats before they take part in a hash.
pub const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Serialize a value to canonical JSON bytes.
///
/// Serialization of the crate's own types cannot fail (no non-string map
/// keys, no non-finite floats reach the serializer), so a failure yields an
/// empty buffer rather than a panic.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Compute the canonical xxh64 hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute the canonical hash and render it as 16 hex digits.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Quantize a float to an integer so that hashing is stable across
/// platforms and float formatting differences.
pub fn quantize(value: f64) -> i64 {
    (value * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_hash_is_stable_for_equal_maps() {
        let mut a = BTreeMap::new();
        a.insert("deck", 1);
        a.insert("block", 2);

        let mut b = BTreeMap::new();
        b.insert("block", 2);
        b.insert("deck", 1);

        assert_eq!(canonical_hash_hex(&a), canonical_hash_hex(&b));
        assert_eq!(canonical_hash_hex(&a).len(), 16);
    }

    #[test]
    fn test_quantize_absorbs_float_noise() {
        assert_eq!(quantize(0.1 + 0.2), quantize(0.3));
        assert_ne!(quantize(0.3), quantize(0.300002));
    }
}
