//! Error types for the presale core
//!
//! Errors fall into five classes with different handling rules:
//! - connectivity (wallet missing, no accounts): fatal to the action, never retried
//! - ledger rejection: surfaced verbatim, never retried automatically
//! - not eligible (claim closed, already claimed, unknown user, no refills):
//!   raised locally before any transaction is submitted
//! - transient read: a ledger query did not answer; safe to ask again
//! - storage: off-chain bookkeeping failed

use lib_ledger::LedgerError;
use lib_records::RecordError;
use lib_types::{Address, UnknownPackage};
use thiserror::Error;

use crate::wallet::WalletError;

/// Presale core error type
#[derive(Error, Debug)]
pub enum PresaleError {
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Ledger errors pass through unchanged
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Record store error: {0}")]
    Records(#[from] RecordError),

    #[error("Claiming is not enabled yet")]
    ClaimNotOpen,

    #[error("Tokens already claimed")]
    AlreadyClaimed,

    #[error("User not found: {0}")]
    UserNotFound(Address),

    #[error("No refills available")]
    NoRefillsAvailable,

    #[error(transparent)]
    UnknownPackage(#[from] UnknownPackage),

    #[error("Admin action requires a signing address in ledger mode")]
    AdminSignerMissing,
}

/// Handling class of a `PresaleError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Connectivity,
    LedgerRejection,
    NotEligible,
    /// A ledger read failed in transit; nothing was submitted
    TransientRead,
    Storage,
}

impl PresaleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PresaleError::Wallet(_) => ErrorClass::Connectivity,
            PresaleError::Ledger(e) if e.is_transient() => ErrorClass::TransientRead,
            PresaleError::Ledger(_) => ErrorClass::LedgerRejection,
            PresaleError::Records(_) => ErrorClass::Storage,
            PresaleError::ClaimNotOpen
            | PresaleError::AlreadyClaimed
            | PresaleError::UserNotFound(_)
            | PresaleError::NoRefillsAvailable
            | PresaleError::UnknownPackage(_)
            | PresaleError::AdminSignerMissing => ErrorClass::NotEligible,
        }
    }
}

/// Result type alias for presale operations
pub type PresaleResult<T> = std::result::Result<T, PresaleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_are_transparent() {
        let err: PresaleError = LedgerError::reverted("execution reverted: paused").into();
        assert_eq!(err.to_string(), "Transaction reverted: execution reverted: paused");
        assert_eq!(err.class(), ErrorClass::LedgerRejection);
    }

    #[test]
    fn test_classes() {
        assert_eq!(PresaleError::ClaimNotOpen.class(), ErrorClass::NotEligible);
        assert_eq!(
            PresaleError::from(WalletError::NoAccounts).class(),
            ErrorClass::Connectivity
        );
        assert_eq!(
            PresaleError::from(LedgerError::Transport("timeout".into())).class(),
            ErrorClass::TransientRead
        );
    }
}
