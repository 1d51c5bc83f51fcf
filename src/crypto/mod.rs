//! Cryptographic primitives: hashing, Merkle commitments, signatures.
//!
//! SHA-256 and ECDSA/NIST-P192 are treated as opaque oracles per the
//! protocol contract; this module only wraps them with the exact byte/string
//! forms the rest of the crate (and the wire protocol) depend on.

pub mod hash;
pub mod merkle;
pub mod signatures;

pub use hash::sha256_hex;
pub use merkle::{MerkleError, MerkleTree};
pub use signatures::{KeyPair, PrivateKey, PublicKey, SignatureError};
