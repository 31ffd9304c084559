//! Ledger Errors

use thiserror::Error;

/// Error from a ledger read or write
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The chain could not be reached or answered garbage
    #[error("Ledger unavailable: {0}")]
    Transport(String),

    /// The transaction was mined and reverted, or rejected before mining
    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },

    /// The signer declined to sign
    #[error("User rejected the transaction")]
    UserRejected,
}

impl LedgerError {
    pub fn reverted(reason: impl Into<String>) -> Self {
        LedgerError::Reverted {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request could succeed without user action
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transport(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
