//! SHA-256 hashing and hash-chain primitives.

use sha2::Sha256;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Well-known predecessor of the first audit link.
pub const GENESIS_HASH: &str = "GENESIS_HASH_2026";

/// Hex digest helpers.
pub struct Digest;

impl Digest {
    /// Hashes a UTF-8 string and returns the lowercase hex digest.
    #[must_use]
    pub fn hex(input: &str) -> String {
        Self::hex_parts(&[input])
    }

    /// Hashes the concatenation of `parts` without separators.
    ///
    /// Equivalent to `Digest::hex(&parts.concat())` without allocating the
    /// joined string.
    #[must_use]
    pub fn hex_parts(parts: &[&str]) -> String {
        use sha2::Digest as _;

        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Links a data digest to its predecessor: `digest(data_hash || prev_hash)`.
    #[must_use]
    pub fn chain(data_hash: &str, prev_hash: &str) -> String {
        Self::hex_parts(&[data_hash, prev_hash])
    }
}

/// Returns true if `value` looks like a digest produced by [`Digest`].
#[must_use]
pub fn is_digest_hex(value: &str) -> bool {
    value.len() == DIGEST_HEX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
