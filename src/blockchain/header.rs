//! Header record shared by strong blocks and weak headers (§3, §9 "Dynamic
//! dispatch on block-shape").
//!
//! `Header` is the structural core. A weak header wraps the same core in
//! `WeakHeader`, a distinct type with its own weak-specific validation, so
//! callers never need to branch on a runtime "is this weak?" flag.

use std::ops::{Deref, DerefMut};

use num_bigint::BigUint;
use num_traits::Num;
use serde::{Deserialize, Serialize};

use crate::crypto::sha256_hex;

/// Top 12 bits zero: the easiest possible strong target, used as the
/// denominator for proof-of-work weight.
const MAX_TARGET_HEX: &str =
    "000FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";
/// Top 16 bits zero: the genesis child's initial strong target.
const INIT_STRONG_TARGET_HEX: &str =
    "0000FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";

/// On average 2^WEAK_TARGET_POWER weak headers are mined per strong block.
pub const WEAK_TARGET_POWER: u32 = 3;

fn parse_hex_target(hex: &str) -> BigUint {
    BigUint::from_str_radix(hex, 16).expect("constant target hex is well-formed")
}

pub fn max_target() -> BigUint {
    parse_hex_target(MAX_TARGET_HEX)
}

pub fn init_strong_target() -> BigUint {
    parse_hex_target(INIT_STRONG_TARGET_HEX)
}

/// Serializes/deserializes a `BigUint` as a plain base-10 string, since JSON
/// numbers cannot losslessly carry 256-bit integers.
mod biguint_decimal {
    use num_bigint::BigUint;
    use num_traits::Num;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, s: S) -> Result<S::Ok, S::Error> {
        value.to_str_radix(10).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(d)?;
        BigUint::from_str_radix(&s, 10).map_err(serde::de::Error::custom)
    }
}

/// The shared header record. Fields and their order below are part of the
/// wire protocol: the header identifier is SHA-256 of the ASCII
/// concatenation of the textual form of every field in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub prev_hash: String,
    /// Wall-clock seconds, fractional. Textual form for the identifier is
    /// `f64`'s default (shortest round-trippable decimal) rendering, which
    /// matches Python's `str(float)`.
    pub timestamp: f64,
    pub nonce: u64,
    pub root: String,
    pub whdrs_hash: String,
    pub coinbase: String,
    #[serde(with = "biguint_decimal")]
    pub target: BigUint,
}

impl Header {
    pub fn new(
        prev_hash: impl Into<String>,
        timestamp: f64,
        nonce: u64,
        root: impl Into<String>,
        whdrs_hash: impl Into<String>,
        coinbase: impl Into<String>,
        target: BigUint,
    ) -> Self {
        Header {
            prev_hash: prev_hash.into(),
            timestamp,
            nonce,
            root: root.into(),
            whdrs_hash: whdrs_hash.into(),
            coinbase: coinbase.into(),
            target,
        }
    }

    /// The header identifier: SHA-256 of the ASCII concatenation of the
    /// textual forms of every field, in declaration order.
    pub fn id(&self) -> String {
        let mut s = String::new();
        s.push_str(&self.prev_hash);
        s.push_str(&self.timestamp.to_string());
        s.push_str(&self.nonce.to_string());
        s.push_str(&self.root);
        s.push_str(&self.whdrs_hash);
        s.push_str(&self.coinbase);
        s.push_str(&self.target.to_str_radix(10));
        sha256_hex(s.as_bytes())
    }

    /// The identifier's value as an integer, for proof-of-work comparisons.
    pub fn id_as_int(&self) -> BigUint {
        BigUint::from_str_radix(&self.id(), 16).expect("sha256 hex is valid base-16")
    }

    pub fn weak_target(&self) -> BigUint {
        &self.target << WEAK_TARGET_POWER
    }

    /// The canonical JSON form, `indent = 4`, field order as declared, with
    /// the derived `hash` field prepended (matches `Header.to_json()`).
    pub fn to_json_string(&self) -> String {
        #[derive(Serialize)]
        struct WithHash<'a> {
            hash: String,
            #[serde(flatten)]
            header: &'a Header,
        }
        serde_json::to_string_pretty(&WithHash {
            hash: self.id(),
            header: self,
        })
        .expect("Header serializes")
    }
}

/// A weak header: the same record, validated against a different rule set
/// (§4.3, item 8) and contributing chain weight without extending the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeakHeader(pub Header);

impl Deref for WeakHeader {
    type Target = Header;
    fn deref(&self) -> &Header {
        &self.0
    }
}

impl DerefMut for WeakHeader {
    fn deref_mut(&mut self) -> &mut Header {
        &mut self.0
    }
}

impl WeakHeader {
    pub fn id(&self) -> String {
        self.0.id()
    }

    pub fn to_json_string(&self) -> String {
        self.0.to_json_string()
    }
}
