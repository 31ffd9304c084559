//! In-process presale contract
//!
//! Mirrors the contract's observable rules closely enough to develop and
//! test against without a chain:
//!
//! - `buy_package` requires the exact catalog price, credits tokens and
//!   refills, and records the first valid referrer
//! - `claim` reverts while the global switch is off or after a prior claim
//! - `refill` reverts with no refills left
//! - only the owner may flip the global switch
//!
//! Fault injection (failing reads, reverting the next write, confirmation
//! delay) and a submitted-writes counter let callers assert that local
//! fast-fail paths never reach the chain.

use async_trait::async_trait;
use lib_types::{package, Address, Amount, Package, PackageId, TxHash, TOKEN_DECIMALS};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::adapter::{LedgerAdapter, ReadKind, TxReceipt};
use crate::errors::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Default)]
struct Account {
    balance: Amount,
    refills: u64,
    claimed: bool,
    referrer: Option<Address>,
    referral_count: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<Address, Account>,
    global_claim: bool,
    block_number: u64,
}

#[derive(Debug, Default)]
struct Faults {
    failing_reads: HashSet<ReadKind>,
    all_reads: bool,
    revert_next_write: Option<String>,
    confirmation_delay: Option<Duration>,
}

/// In-memory presale contract
#[derive(Debug)]
pub struct InMemoryLedger {
    owner: Address,
    state: RwLock<LedgerState>,
    faults: Mutex<Faults>,
    writes_submitted: AtomicU64,
}

impl InMemoryLedger {
    /// Create a ledger controlled by `owner`
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            state: RwLock::new(LedgerState::default()),
            faults: Mutex::new(Faults::default()),
            writes_submitted: AtomicU64::new(0),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Total write transactions submitted, including reverted ones
    pub fn writes_submitted(&self) -> u64 {
        self.writes_submitted.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Make one kind of read fail with `Transport` until cleared
    pub fn fail_read(&self, kind: ReadKind) {
        self.faults.lock().failing_reads.insert(kind);
    }

    /// Make every read fail with `Transport` until cleared
    pub fn fail_all_reads(&self) {
        self.faults.lock().all_reads = true;
    }

    /// Clear all read faults
    pub fn heal_reads(&self) {
        let mut faults = self.faults.lock();
        faults.failing_reads.clear();
        faults.all_reads = false;
    }

    /// Revert the next write with `reason`
    pub fn revert_next_write(&self, reason: impl Into<String>) {
        self.faults.lock().revert_next_write = Some(reason.into());
    }

    /// Delay every write's confirmation
    pub fn set_confirmation_delay(&self, delay: Option<Duration>) {
        self.faults.lock().confirmation_delay = delay;
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn check_read(&self, kind: ReadKind) -> LedgerResult<()> {
        let faults = self.faults.lock();
        if faults.all_reads || faults.failing_reads.contains(&kind) {
            return Err(LedgerError::Transport(format!("{} query failed", kind.as_str())));
        }
        Ok(())
    }

    /// Count the submission, wait for "confirmation", consume a pending revert
    async fn submit(&self) -> LedgerResult<()> {
        self.writes_submitted.fetch_add(1, Ordering::SeqCst);
        let delay = self.faults.lock().confirmation_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.faults.lock().revert_next_write.take() {
            return Err(LedgerError::reverted(reason));
        }
        Ok(())
    }

    fn mine(state: &mut LedgerState, caller: &Address, op: &str) -> TxReceipt {
        state.block_number += 1;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&state.block_number.to_le_bytes());
        hasher.update(caller.as_bytes());
        hasher.update(op.as_bytes());
        TxReceipt {
            tx_hash: TxHash::new(*hasher.finalize().as_bytes()),
            block_number: state.block_number,
        }
    }

    fn token_units(tokens: u64) -> Amount {
        Amount::from(tokens) * 10u128.pow(TOKEN_DECIMALS)
    }
}

#[async_trait]
impl LedgerAdapter for InMemoryLedger {
    async fn token_balance(&self, address: &Address) -> LedgerResult<Amount> {
        self.check_read(ReadKind::TokenBalance)?;
        Ok(self
            .state
            .read()
            .accounts
            .get(address)
            .map(|a| a.balance)
            .unwrap_or(0))
    }

    async fn refill_count(&self, address: &Address) -> LedgerResult<u64> {
        self.check_read(ReadKind::RefillCount)?;
        Ok(self
            .state
            .read()
            .accounts
            .get(address)
            .map(|a| a.refills)
            .unwrap_or(0))
    }

    async fn claim_status(&self, address: &Address) -> LedgerResult<bool> {
        self.check_read(ReadKind::ClaimStatus)?;
        Ok(self
            .state
            .read()
            .accounts
            .get(address)
            .map(|a| a.claimed)
            .unwrap_or(false))
    }

    async fn global_claim_status(&self) -> LedgerResult<bool> {
        self.check_read(ReadKind::GlobalClaimStatus)?;
        Ok(self.state.read().global_claim)
    }

    async fn referrer_of(&self, address: &Address) -> LedgerResult<Option<Address>> {
        self.check_read(ReadKind::Referrer)?;
        Ok(self
            .state
            .read()
            .accounts
            .get(address)
            .and_then(|a| a.referrer))
    }

    async fn referral_count(&self, address: &Address) -> LedgerResult<u64> {
        self.check_read(ReadKind::ReferralCount)?;
        Ok(self
            .state
            .read()
            .accounts
            .get(address)
            .map(|a| a.referral_count)
            .unwrap_or(0))
    }

    async fn package_terms(&self, id: PackageId) -> LedgerResult<Package> {
        self.check_read(ReadKind::PackageTerms)?;
        Ok(*package(id))
    }

    async fn buy_package(
        &self,
        caller: &Address,
        id: PackageId,
        value: Amount,
        referrer: Option<&Address>,
    ) -> LedgerResult<TxReceipt> {
        self.submit().await?;
        let terms = package(id);
        if value != terms.price {
            return Err(LedgerError::reverted("Incorrect payment amount"));
        }

        let mut state = self.state.write();
        let already_referred = state
            .accounts
            .get(caller)
            .map(|a| a.referrer.is_some())
            .unwrap_or(false);
        let valid_referrer = referrer
            .filter(|r| !r.is_zero() && *r != caller && !already_referred)
            .copied();

        let account = state.accounts.entry(*caller).or_default();
        account.balance += Self::token_units(terms.token_amount);
        account.refills += terms.refill_allowance;
        if let Some(r) = valid_referrer {
            account.referrer = Some(r);
            state.accounts.entry(r).or_default().referral_count += 1;
        }

        let receipt = Self::mine(&mut state, caller, "buyPackage");
        info!("buyPackage({}) by {} in block {}", id, caller.short(), receipt.block_number);
        Ok(receipt)
    }

    async fn claim(&self, caller: &Address) -> LedgerResult<TxReceipt> {
        self.submit().await?;
        let mut state = self.state.write();
        if !state.global_claim {
            return Err(LedgerError::reverted("Claiming is not enabled"));
        }
        let account = state.accounts.entry(*caller).or_default();
        if account.claimed {
            return Err(LedgerError::reverted("Already claimed"));
        }
        account.claimed = true;

        let receipt = Self::mine(&mut state, caller, "claim");
        info!("claim() by {} in block {}", caller.short(), receipt.block_number);
        Ok(receipt)
    }

    async fn refill(&self, caller: &Address, id: PackageId) -> LedgerResult<TxReceipt> {
        self.submit().await?;
        let mut state = self.state.write();
        let account = state.accounts.entry(*caller).or_default();
        if account.refills == 0 {
            return Err(LedgerError::reverted("No refills left"));
        }
        account.refills -= 1;
        account.balance += Self::token_units(package(id).token_amount);

        let receipt = Self::mine(&mut state, caller, "refill");
        debug!("refill({}) by {} in block {}", id, caller.short(), receipt.block_number);
        Ok(receipt)
    }

    async fn set_global_claim_status(&self, caller: &Address, status: bool) -> LedgerResult<TxReceipt> {
        self.submit().await?;
        if *caller != self.owner {
            return Err(LedgerError::reverted("Ownable: caller is not the owner"));
        }
        let mut state = self.state.write();
        state.global_claim = status;

        let receipt = Self::mine(&mut state, caller, "setGlobalClaimStatus");
        info!("Global claim status set to {} in block {}", status, receipt.block_number);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    const OWNER: u8 = 0xEE;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(addr(OWNER))
    }

    #[tokio::test]
    async fn test_buy_requires_exact_price() {
        let ledger = ledger();
        let price = package(PackageId::Basic).price;
        let err = ledger
            .buy_package(&addr(1), PackageId::Basic, price - 1, None)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::reverted("Incorrect payment amount"));
        assert_eq!(ledger.token_balance(&addr(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_buy_credits_tokens_refills_and_referrer() {
        let ledger = ledger();
        let terms = package(PackageId::Standard);
        ledger
            .buy_package(&addr(1), PackageId::Standard, terms.price, Some(&addr(2)))
            .await
            .unwrap();

        assert_eq!(
            ledger.token_balance(&addr(1)).await.unwrap(),
            2_200 * 10u128.pow(18)
        );
        assert_eq!(ledger.refill_count(&addr(1)).await.unwrap(), 4);
        assert_eq!(ledger.referrer_of(&addr(1)).await.unwrap(), Some(addr(2)));
        assert_eq!(ledger.referral_count(&addr(2)).await.unwrap(), 1);

        // referrer is set once
        ledger
            .buy_package(&addr(1), PackageId::Standard, terms.price, Some(&addr(3)))
            .await
            .unwrap();
        assert_eq!(ledger.referrer_of(&addr(1)).await.unwrap(), Some(addr(2)));
        assert_eq!(ledger.referral_count(&addr(3)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_self_referral_ignored_on_chain() {
        let ledger = ledger();
        let price = package(PackageId::Basic).price;
        ledger
            .buy_package(&addr(1), PackageId::Basic, price, Some(&addr(1)))
            .await
            .unwrap();
        assert_eq!(ledger.referrer_of(&addr(1)).await.unwrap(), None);
        assert_eq!(ledger.referral_count(&addr(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_is_one_shot() {
        let ledger = ledger();
        assert_eq!(
            ledger.claim(&addr(1)).await.unwrap_err(),
            LedgerError::reverted("Claiming is not enabled")
        );

        ledger.set_global_claim_status(&addr(OWNER), true).await.unwrap();
        ledger.claim(&addr(1)).await.unwrap();
        assert!(ledger.claim_status(&addr(1)).await.unwrap());
        assert_eq!(
            ledger.claim(&addr(1)).await.unwrap_err(),
            LedgerError::reverted("Already claimed")
        );

        // turning the switch off does not reset per-address flags
        ledger.set_global_claim_status(&addr(OWNER), false).await.unwrap();
        assert!(ledger.claim_status(&addr(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_only_owner_sets_global_flag() {
        let ledger = ledger();
        let err = ledger.set_global_claim_status(&addr(1), true).await.unwrap_err();
        assert!(matches!(err, LedgerError::Reverted { .. }));
        assert!(!ledger.global_claim_status().await.unwrap());
    }

    #[tokio::test]
    async fn test_refill_consumes_allowance() {
        let ledger = ledger();
        assert_eq!(
            ledger.refill(&addr(1), PackageId::Standard).await.unwrap_err(),
            LedgerError::reverted("No refills left")
        );

        let price = package(PackageId::Standard).price;
        ledger
            .buy_package(&addr(1), PackageId::Standard, price, None)
            .await
            .unwrap();
        ledger.refill(&addr(1), PackageId::Standard).await.unwrap();
        assert_eq!(ledger.refill_count(&addr(1)).await.unwrap(), 3);
        assert_eq!(
            ledger.token_balance(&addr(1)).await.unwrap(),
            4_400 * 10u128.pow(18)
        );
    }

    #[tokio::test]
    async fn test_read_faults() {
        let ledger = ledger();
        ledger.fail_read(ReadKind::RefillCount);
        assert!(ledger.refill_count(&addr(1)).await.unwrap_err().is_transient());
        assert!(ledger.token_balance(&addr(1)).await.is_ok());

        ledger.fail_all_reads();
        assert!(ledger.global_claim_status().await.is_err());

        ledger.heal_reads();
        assert!(ledger.global_claim_status().await.is_ok());
        assert!(ledger.refill_count(&addr(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_reverted_writes_are_counted() {
        let ledger = ledger();
        ledger.revert_next_write("out of gas");
        let err = ledger.set_global_claim_status(&addr(OWNER), true).await.unwrap_err();
        assert_eq!(err, LedgerError::reverted("out of gas"));
        assert_eq!(ledger.writes_submitted(), 1);

        let receipt = ledger.set_global_claim_status(&addr(OWNER), true).await.unwrap();
        assert_eq!(ledger.writes_submitted(), 2);
        assert_eq!(receipt.block_number, 1);
    }

    #[tokio::test]
    async fn test_receipts_are_distinct() {
        let ledger = ledger();
        let a = ledger.set_global_claim_status(&addr(OWNER), true).await.unwrap();
        let b = ledger.set_global_claim_status(&addr(OWNER), false).await.unwrap();
        assert_ne!(a.tx_hash, b.tx_hash);
        assert_eq!(b.block_number, a.block_number + 1);
    }
}
