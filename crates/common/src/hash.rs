//! Part digest computation.

/// Compute the XXH128 digest of a byte slice.
///
/// Used as the integrity digest recorded on a completed transfer part.
///
/// # Arguments
/// * `data` - Bytes to hash
///
/// # Returns
/// 32-character lowercase hex string (128 bits).
pub fn hash_bytes(data: &[u8]) -> String {
    let hash: u128 = xxhash_rust::xxh3::xxh3_128(data);
    format!("{:032x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_empty() {
        let hash: String = hash_bytes(b"");
        assert_eq!(hash.len(), 32);
    }

    #[test]
    fn test_hash_bytes_deterministic() {
        let hash: String = hash_bytes(b"ACGTACGT");
        assert_eq!(hash, hash_bytes(b"ACGTACGT"));
    }

    #[test]
    fn test_hash_bytes_different_inputs() {
        assert_ne!(hash_bytes(b"ACGT"), hash_bytes(b"TGCA"));
    }
}
