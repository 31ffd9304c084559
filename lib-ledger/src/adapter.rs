//! Ledger adapter trait
//!
//! The presale contract is consumed only through this interface. Reads are
//! cheap and side-effect free. Writes return only after the transaction is
//! confirmed and never retry on their own: a second submission of a payment
//! or claim is the caller's (ultimately the user's) decision.

use async_trait::async_trait;
use lib_types::{Address, Amount, Package, PackageId, TxHash};
use serde::{Deserialize, Serialize};

use crate::errors::LedgerResult;

/// Confirmation of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Identifies a read query, for logging and fault reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadKind {
    TokenBalance,
    RefillCount,
    ClaimStatus,
    GlobalClaimStatus,
    Referrer,
    ReferralCount,
    PackageTerms,
}

impl ReadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadKind::TokenBalance => "token_balance",
            ReadKind::RefillCount => "refill_count",
            ReadKind::ClaimStatus => "claim_status",
            ReadKind::GlobalClaimStatus => "global_claim_status",
            ReadKind::Referrer => "referrer",
            ReadKind::ReferralCount => "referral_count",
            ReadKind::PackageTerms => "package_terms",
        }
    }
}

/// Read/write access to the presale contract
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Token balance in base units (18 decimals)
    async fn token_balance(&self, address: &Address) -> LedgerResult<Amount>;

    /// Remaining refills
    async fn refill_count(&self, address: &Address) -> LedgerResult<u64>;

    /// Per-address claimed flag; monotonic false -> true
    async fn claim_status(&self, address: &Address) -> LedgerResult<bool>;

    /// Global claim switch
    async fn global_claim_status(&self) -> LedgerResult<bool>;

    /// Referrer recorded at purchase time, if any
    async fn referrer_of(&self, address: &Address) -> LedgerResult<Option<Address>>;

    /// Number of buyers that named `address` as referrer
    async fn referral_count(&self, address: &Address) -> LedgerResult<u64>;

    /// On-chain terms of a package
    async fn package_terms(&self, package: PackageId) -> LedgerResult<Package>;

    // ------------------------------------------------------------------
    // Writes (block until confirmed)
    // ------------------------------------------------------------------

    /// Buy a package, paying `value` in native currency
    async fn buy_package(
        &self,
        caller: &Address,
        package: PackageId,
        value: Amount,
        referrer: Option<&Address>,
    ) -> LedgerResult<TxReceipt>;

    /// One-shot claim of the caller's tokens
    async fn claim(&self, caller: &Address) -> LedgerResult<TxReceipt>;

    /// Spend one refill on `package`
    async fn refill(&self, caller: &Address, package: PackageId) -> LedgerResult<TxReceipt>;

    /// Owner-only global claim switch
    async fn set_global_claim_status(&self, caller: &Address, status: bool) -> LedgerResult<TxReceipt>;
}
