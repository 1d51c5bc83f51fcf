//! Crate-wide error type. Business-logic outcomes (is this block/transaction
//! acceptable?) are modeled as their own enums, not as `NodeError` variants;
//! this type is for failures that abort an operation outright.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("merkle error: {0}")]
    Merkle(#[from] crate::crypto::MerkleError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl From<crate::crypto::SignatureError> for NodeError {
    fn from(e: crate::crypto::SignatureError) -> Self {
        NodeError::Crypto(e.to_string())
    }
}

impl From<config::ConfigError> for NodeError {
    fn from(e: config::ConfigError) -> Self {
        NodeError::Config(e.to_string())
    }
}
