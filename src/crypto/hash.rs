//! SHA-256 wrapper. The rest of the crate always consumes the lowercase hex
//! rendering of a digest, never the raw bytes, so header/weak-header/block
//! identifiers compare and serialize identically everywhere.

use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// The all-zero 64-hex-character digest used for genesis' `prev_hash`,
/// the genesis coinbase's padding, and an empty Merkle root / weak-header set.
pub const ZERO_HASH_64: &str = "0000000000000000000000000000000000000000000000000000000000000000";
