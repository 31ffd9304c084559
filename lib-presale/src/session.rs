//! User session flows
//!
//! Each write goes to the ledger first. Off-chain bookkeeping happens only
//! after confirmation and is best-effort: the transaction already happened,
//! so a bookkeeping failure is logged and reported, never raised.

use chrono::Utc;
use lib_ledger::{LedgerAdapter, TxReceipt};
use lib_records::{RecordStore, RecordUpdate};
use lib_types::{package, Address, Amount, PackageId, TOKEN_DECIMALS};
use std::sync::Arc;
use tracing::{info, warn};

use crate::claim::ClaimGate;
use crate::config::PresaleConfig;
use crate::errors::{PresaleError, PresaleResult};
use crate::referral::{ReferralEngine, RegistrationOutcome};
use crate::wallet::{ActiveAddress, WalletError, WalletProvider};

/// A confirmed ledger write and whether the mirror caught up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub receipt: TxReceipt,
    /// False if the off-chain record could not be updated
    pub record_updated: bool,
}

/// Presale actions for one connected user
pub struct PresaleSession {
    store: Arc<dyn RecordStore>,
    ledger: Arc<dyn LedgerAdapter>,
    referrals: ReferralEngine,
    gate: Arc<ClaimGate>,
    active: ActiveAddress,
}

impl PresaleSession {
    pub fn new(store: Arc<dyn RecordStore>, ledger: Arc<dyn LedgerAdapter>, referral_reward: u64) -> Self {
        Self {
            referrals: ReferralEngine::new(store.clone(), referral_reward),
            gate: Arc::new(ClaimGate::new(ledger.clone())),
            active: ActiveAddress::new(),
            store,
            ledger,
        }
    }

    pub fn from_config(store: Arc<dyn RecordStore>, ledger: Arc<dyn LedgerAdapter>, config: &PresaleConfig) -> Self {
        Self::new(store, ledger, config.referral.reward)
    }

    pub fn active(&self) -> &ActiveAddress {
        &self.active
    }

    pub fn gate(&self) -> &Arc<ClaimGate> {
        &self.gate
    }

    pub fn referrals(&self) -> &ReferralEngine {
        &self.referrals
    }

    /// Acquire the wallet's first account, register it, make it active
    pub async fn connect(
        &self,
        wallet: &dyn WalletProvider,
        referrer: Option<Address>,
    ) -> PresaleResult<RegistrationOutcome> {
        let accounts = wallet.request_accounts().await?;
        let address = accounts.into_iter().next().ok_or(WalletError::NoAccounts)?;
        self.switch_account(address, referrer).await
    }

    /// The wallet reported a different account
    pub async fn switch_account(
        &self,
        address: Address,
        referrer: Option<Address>,
    ) -> PresaleResult<RegistrationOutcome> {
        let outcome = self.referrals.register(address, referrer).await?;
        self.active.set(address);
        Ok(outcome)
    }

    pub fn disconnect(&self) {
        self.active.clear();
    }

    /// Buy `package_id` at its catalog price
    pub async fn purchase(
        &self,
        address: &Address,
        package_id: PackageId,
        referrer: Option<Address>,
    ) -> PresaleResult<Confirmation> {
        let terms = package(package_id);
        let receipt = self
            .ledger
            .buy_package(address, package_id, terms.price, referrer.as_ref())
            .await?;
        info!(
            "{} bought {} ({})",
            address.short(),
            package_id,
            receipt.tx_hash
        );

        let record_updated = self.record_purchase(address, package_id, referrer, &receipt).await;
        Ok(Confirmation {
            receipt,
            record_updated,
        })
    }

    /// Claim purchased tokens
    pub async fn claim(&self, address: &Address) -> PresaleResult<Confirmation> {
        if self.store.get_record(address).await?.is_none() {
            return Err(PresaleError::UserNotFound(*address));
        }

        let authorization = self.gate.authorize(address).await?;
        let receipt = self.gate.submit(authorization).await?;

        let record_updated = self
            .bookkeep(address, &RecordUpdate::claim(receipt.tx_hash, Utc::now()), "claim")
            .await;
        Ok(Confirmation {
            receipt,
            record_updated,
        })
    }

    /// Spend one refill on `package_id`
    pub async fn refill(&self, address: &Address, package_id: PackageId) -> PresaleResult<Confirmation> {
        let available = self.ledger.refill_count(address).await?;
        if available == 0 {
            return Err(PresaleError::NoRefillsAvailable);
        }

        let receipt = self.ledger.refill(address, package_id).await?;
        info!(
            "{} refilled {} ({})",
            address.short(),
            package_id,
            receipt.tx_hash
        );

        let mut update = RecordUpdate::refill(receipt.tx_hash, Utc::now());
        update.refill_count = Some(available - 1);
        let record_updated = self.bookkeep(address, &update, "refill").await;
        Ok(Confirmation {
            receipt,
            record_updated,
        })
    }

    /// Register if needed, then mirror the purchase and post-purchase totals
    async fn record_purchase(
        &self,
        address: &Address,
        package_id: PackageId,
        referrer: Option<Address>,
        receipt: &TxReceipt,
    ) -> bool {
        if let Err(e) = self.referrals.register(*address, referrer).await {
            warn!(
                "Purchase {} confirmed but registering {} failed: {}",
                receipt.tx_hash,
                address.short(),
                e
            );
            return false;
        }

        let mut update = RecordUpdate::purchase(package_id, receipt.tx_hash, Utc::now());
        let (balance, refills) = tokio::join!(
            self.ledger.token_balance(address),
            self.ledger.refill_count(address),
        );
        match balance {
            Ok(balance) => update.token_balance = Some(whole_tokens(balance)),
            Err(e) => warn!("Could not mirror balance for {}: {}", address.short(), e),
        }
        match refills {
            Ok(refills) => update.refill_count = Some(refills),
            Err(e) => warn!("Could not mirror refills for {}: {}", address.short(), e),
        }

        self.bookkeep(address, &update, "purchase").await
    }

    async fn bookkeep(&self, address: &Address, update: &RecordUpdate, action: &str) -> bool {
        match self.store.update_record(address, update).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "{} confirmed for {} but record update failed: {}",
                    action,
                    address.short(),
                    e
                );
                false
            }
        }
    }
}

fn whole_tokens(amount: Amount) -> u64 {
    u64::try_from(amount / 10u128.pow(TOKEN_DECIMALS)).unwrap_or(u64::MAX)
}
