// src/utils/hash.rs
use blake3::Hasher;

/// Derive a short, stable identifier for a history entry from its
/// timestamp, so entries stay referenceable even when the caller supplied
/// none.
pub fn entry_hash(timestamp_ms: i64) -> String {
    let mut hasher = Hasher::new();
    hasher.update(&timestamp_ms.to_le_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_hash_is_deterministic() {
        assert_eq!(entry_hash(1_700_000_000_000), entry_hash(1_700_000_000_000));
        assert_ne!(entry_hash(1), entry_hash(2));
        assert_eq!(entry_hash(42).len(), 16);
    }
}
