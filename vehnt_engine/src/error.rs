//! Error types shared by every stage of the voting power pipeline

use solana_client::client_error::ClientError;
use solana_sdk::pubkey::ParsePubkeyError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode {kind} account: {reason}")]
    Decode {
        kind: &'static str,
        reason: String,
    },

    #[error("Voting mint config {index} not found ({available} configured)")]
    MissingConfig {
        index: u8,
        available: usize,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn decode(kind: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Decode {
            kind,
            reason: reason.into(),
        }
    }

    /// Only transport failures are worth retrying; everything else will fail
    /// the same way on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }
}

impl From<ClientError> for EngineError {
    fn from(e: ClientError) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<ParsePubkeyError> for EngineError {
    fn from(e: ParsePubkeyError) -> Self {
        EngineError::InvalidInput(format!("invalid address: {}", e))
    }
}
