//! Off-chain user records
//!
//! A `UserRecord` is a display projection of a wallet's presale state. It is
//! never a permission source; the ledger decides who may claim.

use chrono::{DateTime, Utc};
use lib_types::{Address, PackageId, TxHash};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Per-wallet off-chain record, keyed by address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub address: Address,
    pub referrer: Option<Address>,
    pub package: Option<PackageId>,
    pub token_balance: u64,
    pub referral_rewards: u64,
    pub referral_count: u64,
    pub refill_count: u64,
    pub refills_used: u64,
    pub claim_enabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refill_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refill_tx_hash: Option<TxHash>,
}

impl UserRecord {
    /// Fresh record for a first sighting
    pub fn new(address: Address, referrer: Option<Address>, created_at: DateTime<Utc>) -> Self {
        Self {
            address,
            referrer,
            package: None,
            token_balance: 0,
            referral_rewards: 0,
            referral_count: 0,
            refill_count: 0,
            refills_used: 0,
            claim_enabled: false,
            created_at,
            purchased_at: None,
            tx_hash: None,
            claimed_at: None,
            claim_tx_hash: None,
            last_refill_at: None,
            refill_tx_hash: None,
        }
    }

    /// Apply a partial update. Identity, referrer and referral counters are
    /// not reachable from `RecordUpdate`.
    pub fn apply(&mut self, update: &RecordUpdate) {
        if let Some(package) = update.package {
            self.package = Some(package);
        }
        if let Some(v) = update.token_balance {
            self.token_balance = v;
        }
        if let Some(v) = update.refill_count {
            self.refill_count = v;
        }
        if update.count_refill {
            self.refills_used = self.refills_used.saturating_add(1);
        }
        if let Some(v) = update.claim_enabled {
            self.claim_enabled = v;
        }
        if let Some(v) = update.purchased_at {
            self.purchased_at = Some(v);
        }
        if let Some(v) = update.tx_hash {
            self.tx_hash = Some(v);
        }
        if let Some(v) = update.claimed_at {
            self.claimed_at = Some(v);
        }
        if let Some(v) = update.claim_tx_hash {
            self.claim_tx_hash = Some(v);
        }
        if let Some(v) = update.last_refill_at {
            self.last_refill_at = Some(v);
        }
        if let Some(v) = update.refill_tx_hash {
            self.refill_tx_hash = Some(v);
        }
    }

    /// Compare two records on one display field
    pub fn cmp_by(&self, other: &Self, field: SortField) -> Ordering {
        match field {
            SortField::Address => Ordering::Equal,
            SortField::Package => self.package.cmp(&other.package),
            SortField::TokenBalance => self.token_balance.cmp(&other.token_balance),
            SortField::RefillCount => self.refill_count.cmp(&other.refill_count),
            SortField::ReferralRewards => self.referral_rewards.cmp(&other.referral_rewards),
            SortField::ReferralCount => self.referral_count.cmp(&other.referral_count),
            SortField::ClaimEnabled => self.claim_enabled.cmp(&other.claim_enabled),
            SortField::CreatedAt => self.created_at.cmp(&other.created_at),
        }
        .then_with(|| self.address.cmp(&other.address))
    }
}

/// Partial update over the mutable fields of a `UserRecord`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub package: Option<PackageId>,
    pub token_balance: Option<u64>,
    pub refill_count: Option<u64>,
    /// Bump `refills_used` by one against the value stored at write time
    pub count_refill: bool,
    pub claim_enabled: Option<bool>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub tx_hash: Option<TxHash>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claim_tx_hash: Option<TxHash>,
    pub last_refill_at: Option<DateTime<Utc>>,
    pub refill_tx_hash: Option<TxHash>,
}

impl RecordUpdate {
    /// Bookkeeping after a confirmed purchase
    pub fn purchase(package: PackageId, tx_hash: TxHash, at: DateTime<Utc>) -> Self {
        Self {
            package: Some(package),
            purchased_at: Some(at),
            tx_hash: Some(tx_hash),
            ..Self::default()
        }
    }

    /// Bookkeeping after a confirmed claim
    pub fn claim(tx_hash: TxHash, at: DateTime<Utc>) -> Self {
        Self {
            claimed_at: Some(at),
            claim_tx_hash: Some(tx_hash),
            ..Self::default()
        }
    }

    /// Bookkeeping after a confirmed refill
    pub fn refill(tx_hash: TxHash, at: DateTime<Utc>) -> Self {
        Self {
            last_refill_at: Some(at),
            refill_tx_hash: Some(tx_hash),
            count_refill: true,
            ..Self::default()
        }
    }

    /// Advisory claim flag override
    pub fn claim_enabled(enabled: bool) -> Self {
        Self {
            claim_enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Off-chain singleton mirroring the admin's claim switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalClaimConfig {
    pub claim_active: bool,
    /// `None` until the first admin write
    pub updated_at: Option<DateTime<Utc>>,
}

impl GlobalClaimConfig {
    /// True if `self` was written after `other`
    pub fn is_newer_than(&self, other: &GlobalClaimConfig) -> bool {
        self.updated_at > other.updated_at
    }
}

/// Sortable display fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Address,
    Package,
    TokenBalance,
    RefillCount,
    ReferralRewards,
    ReferralCount,
    ClaimEnabled,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Sort records in place; ties break on address
pub fn sort_records(records: &mut [UserRecord], field: SortField, direction: SortDirection) {
    records.sort_by(|a, b| {
        let ord = a.cmp_by(b, field);
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}
