//! Wallet collaborator
//!
//! The wallet is consumed only as "an address, obtainable once, changeable
//! asynchronously". Acquisition may never resolve if the user ignores the
//! prompt; this core imposes no timeout.

use async_trait::async_trait;
use lib_types::Address;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// Wallet connectivity errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("No wallet provider detected")]
    NotInstalled,

    #[error("Connection request rejected")]
    Rejected,

    #[error("No accounts found; unlock the wallet and try again")]
    NoAccounts,
}

/// Source of the user's account addresses
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet for accounts, prompting the user if needed
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;
}

/// Wallet with a fixed answer, for previews and tests
#[derive(Debug, Clone)]
pub struct StaticWallet {
    accounts: Result<Vec<Address>, WalletError>,
}

impl StaticWallet {
    pub fn with_accounts(accounts: Vec<Address>) -> Self {
        Self {
            accounts: Ok(accounts),
        }
    }

    pub fn failing(error: WalletError) -> Self {
        Self {
            accounts: Err(error),
        }
    }
}

#[async_trait]
impl WalletProvider for StaticWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.accounts.clone()
    }
}

/// The address the user is currently viewing as
///
/// Cloning shares the same channel. Reconciliation follows this context and
/// stops polling when it is cleared.
#[derive(Debug, Clone)]
pub struct ActiveAddress {
    tx: Arc<watch::Sender<Option<Address>>>,
}

impl Default for ActiveAddress {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveAddress {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Switch to `address`; no-op if already active
    pub fn set(&self, address: Address) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == Some(address) {
                false
            } else {
                *current = Some(address);
                true
            }
        });
        if changed {
            info!("Active address is now {}", address.short());
        }
    }

    /// Clear the context (wallet disconnected or view closed)
    pub fn clear(&self) {
        let changed = self.tx.send_if_modified(|current| current.take().is_some());
        if changed {
            info!("Active address cleared");
        }
    }

    pub fn current(&self) -> Option<Address> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Address>> {
        self.tx.subscribe()
    }
}
