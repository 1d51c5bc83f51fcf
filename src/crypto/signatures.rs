//! ECDSA over NIST P-192, the signature oracle the protocol assumes (§6).
//!
//! Keys and signatures are exchanged as lowercase hex on the wire and in
//! transaction records, matching `Transaction::sender`/`receiver` (hex
//! public keys) and `Transaction::signature` (hex signature).

use p192::ecdsa::signature::{Signer, Verifier};
use p192::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

pub type PrivateKey = SigningKey;
pub type PublicKey = VerifyingKey;
pub type KeyPair = (PrivateKey, PublicKey);

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed public key hex")]
    MalformedPublicKey,
    #[error("malformed private key hex")]
    MalformedPrivateKey,
    #[error("malformed signature hex")]
    MalformedSignature,
}

/// Generates a fresh NIST P-192 keypair.
pub fn generate_keypair() -> KeyPair {
    let sk = SigningKey::random(&mut OsRng);
    let vk = VerifyingKey::from(&sk);
    (sk, vk)
}

pub fn public_key_to_hex(pk: &PublicKey) -> String {
    hex::encode(pk.to_encoded_point(true).as_bytes())
}

pub fn public_key_from_hex(s: &str) -> Result<PublicKey, SignatureError> {
    let bytes = hex::decode(s).map_err(|_| SignatureError::MalformedPublicKey)?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| SignatureError::MalformedPublicKey)
}

pub fn private_key_to_hex(sk: &PrivateKey) -> String {
    hex::encode(sk.to_bytes())
}

pub fn private_key_from_hex(s: &str) -> Result<PrivateKey, SignatureError> {
    let bytes = hex::decode(s).map_err(|_| SignatureError::MalformedPrivateKey)?;
    SigningKey::from_slice(&bytes).map_err(|_| SignatureError::MalformedPrivateKey)
}

/// Signs `message` (the opaque byte sequence the caller derived, e.g. the
/// hex identifier string of a transaction) and returns a hex signature.
pub fn sign(sk: &PrivateKey, message: &[u8]) -> String {
    let sig: Signature = sk.sign(message);
    hex::encode(sig.to_bytes())
}

/// Verifies a hex-encoded signature against `message` under `pk`. A
/// malformed signature is treated as a failed verification, not an error:
/// callers only ever need "did this transaction's signature check out".
pub fn verify(pk: &PublicKey, message: &[u8], signature_hex: &str) -> bool {
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(&bytes) else {
        return false;
    };
    pk.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let (sk, vk) = generate_keypair();
        let msg = b"transfer 5 units";
        let sig = sign(&sk, msg);
        assert!(verify(&vk, msg, &sig));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let (sk, vk) = generate_keypair();
        let sig = sign(&sk, b"original");
        assert!(!verify(&vk, b"tampered", &sig));
    }

    #[test]
    fn key_hex_round_trips() {
        let (sk, vk) = generate_keypair();
        let sk2 = private_key_from_hex(&private_key_to_hex(&sk)).unwrap();
        let vk2 = public_key_from_hex(&public_key_to_hex(&vk)).unwrap();
        assert_eq!(sign(&sk, b"x"), sign(&sk2, b"x"));
        assert!(verify(&vk2, b"x", &sign(&sk, b"x")));
    }
}
