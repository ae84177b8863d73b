//! Stable plan fingerprints.

use blake3::Hasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        use std::fmt::Write as _;
        self.0.iter().fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_str(s: &str) -> Hash256 {
    let mut h = Hasher::new();
    h.update(s.as_bytes());
    Hash256(h.finalize().into())
}

/// Fingerprint of a plan's query string; equal plans print equal strings.
pub fn hash_query_string(query: &str) -> Hash256 {
    hash_str(query.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_hash_ignores_padding() {
        assert_eq!(hash_query_string(" IN:2 "), hash_query_string("IN:2"));
        assert_eq!(hash_str("IN:2").to_hex().len(), 64);
    }

    #[test]
    fn test_distinct_plans_hash_apart() {
        assert_ne!(hash_query_string("IN:2 TAG:(x)"), hash_query_string("IN:3"));
    }
}
