//! Account-to-account transfer record (§3, §4.6).

use serde::{Deserialize, Serialize};

use crate::crypto::sha256_hex;
use crate::crypto::signatures::{self, PrivateKey, PublicKey, SignatureError};

/// Fixed-point amount, hundredths of a unit, matching the two-decimal
/// precision the balance model requires. Always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_hundredths(hundredths: u64) -> Self {
        Amount(hundredths)
    }

    pub fn from_units(units: u64) -> Self {
        Amount(units * 100)
    }

    pub fn hundredths(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// The part of a transaction that is hashed for its identifier and signed.
/// Excludes `signature` itself, matching the original's hash/sign contract.
#[derive(Serialize)]
struct SignedPayload<'a> {
    sender: &'a str,
    receiver: &'a str,
    amount: Amount,
    comment: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hex-encoded sender public key.
    pub sender: String,
    /// Hex-encoded receiver public key.
    pub receiver: String,
    pub amount: Amount,
    #[serde(default)]
    pub comment: String,
    /// Hex-encoded ECDSA signature over `id()`.
    pub signature: String,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: Amount,
        comment: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Transaction {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            comment: comment.into(),
            signature: signature.into(),
        }
    }

    /// Builds and signs a transaction with `sk`. `sk` must correspond to
    /// `sender_hex`.
    pub fn signed(
        sender_hex: impl Into<String>,
        receiver: impl Into<String>,
        amount: Amount,
        comment: impl Into<String>,
        sk: &PrivateKey,
    ) -> Self {
        let mut txn = Transaction::new(sender_hex, receiver, amount, comment, String::new());
        let sig = signatures::sign(sk, txn.id().as_bytes());
        txn.signature = sig;
        txn
    }

    /// The transaction identifier: SHA-256 of the canonical JSON form of
    /// `{sender, receiver, amount, comment}` (signature excluded). This is a
    /// deliberate departure from the original implementation's
    /// `str(dict)`-based hash; see DESIGN.md.
    pub fn id(&self) -> String {
        let payload = SignedPayload {
            sender: &self.sender,
            receiver: &self.receiver,
            amount: self.amount,
            comment: &self.comment,
        };
        let canonical = serde_json::to_string(&payload).expect("payload serializes");
        sha256_hex(canonical.as_bytes())
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self).expect("Transaction serializes")
    }

    /// Verifies `signature` against `sender`'s public key over `id()`.
    /// A malformed sender key is treated as a failed verification.
    pub fn validate_sig(&self) -> bool {
        let Ok(pk) = signatures::public_key_from_hex(&self.sender) else {
            return false;
        };
        signatures::verify(&pk, self.id().as_bytes(), &self.signature)
    }

    pub fn sender_public_key(&self) -> Result<PublicKey, SignatureError> {
        signatures::public_key_from_hex(&self.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signatures::{generate_keypair, public_key_to_hex};

    #[test]
    fn signed_transaction_validates() {
        let (sk, vk) = generate_keypair();
        let sender = public_key_to_hex(&vk);
        let txn = Transaction::signed(sender, "receiver-hex", Amount::from_units(5), "rent", &sk);
        assert!(txn.validate_sig());
    }

    #[test]
    fn tampered_amount_fails_validation() {
        let (sk, vk) = generate_keypair();
        let sender = public_key_to_hex(&vk);
        let mut txn = Transaction::signed(sender, "receiver-hex", Amount::from_units(5), "", &sk);
        txn.amount = Amount::from_units(500);
        assert!(!txn.validate_sig());
    }

    #[test]
    fn id_ignores_signature_field() {
        let mut txn = Transaction::new("s", "r", Amount::from_units(1), "c", "sig-a");
        let id_a = txn.id();
        txn.signature = "sig-b".to_string();
        assert_eq!(id_a, txn.id());
    }

    #[test]
    fn amount_display_is_two_decimal() {
        assert_eq!(Amount::from_hundredths(1250).to_string(), "12.50");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }
}
