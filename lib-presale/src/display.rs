//! Display projection
//!
//! What the dashboard renders for the active address. Built by the
//! reconciliation loop from ledger reads plus the off-chain record. It is
//! read-only and carries no path to an `AuthorizationState`; claims always
//! go back to the ledger through `ClaimGate::authorize`.

use chrono::{DateTime, Utc};
use lib_records::UserRecord;
use lib_types::{format_units, Address, Amount, TOKEN_DECIMALS};

use crate::claim::ClaimPhase;

/// Snapshot of one address as last reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub address: Address,
    pub token_balance: Amount,
    pub refill_count: u64,
    pub has_claimed: bool,
    pub global_claim_active: bool,
    /// `None` if the address has no off-chain record yet
    pub record: Option<UserRecord>,
    pub refreshed_at: DateTime<Utc>,
}

impl DisplayState {
    /// Phase as last observed; for rendering only
    pub fn phase(&self) -> ClaimPhase {
        ClaimPhase::from_flags(self.global_claim_active, self.has_claimed)
    }

    /// Balance in whole tokens, trailing zeros trimmed
    pub fn display_balance(&self) -> String {
        format_units(self.token_balance, TOKEN_DECIMALS)
    }

    pub fn referral_count(&self) -> u64 {
        self.record.as_ref().map(|r| r.referral_count).unwrap_or(0)
    }

    pub fn referral_rewards(&self) -> u64 {
        self.record.as_ref().map(|r| r.referral_rewards).unwrap_or(0)
    }

    pub fn referrer(&self) -> Option<Address> {
        self.record.as_ref().and_then(|r| r.referrer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(record: Option<UserRecord>) -> DisplayState {
        DisplayState {
            address: Address::new([1; 20]),
            token_balance: 1_500 * 10u128.pow(TOKEN_DECIMALS),
            refill_count: 2,
            has_claimed: false,
            global_claim_active: true,
            record,
            refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn test_projection_without_record() {
        let s = state(None);
        assert_eq!(s.display_balance(), format_units(1_500 * 10u128.pow(18), 18));
        assert_eq!(s.referral_count(), 0);
        assert_eq!(s.referrer(), None);
        assert_eq!(s.phase(), ClaimPhase::Eligible);
    }

    #[test]
    fn test_projection_with_record() {
        let mut record = UserRecord::new(Address::new([1; 20]), Some(Address::new([2; 20])), Utc::now());
        record.referral_count = 3;
        record.referral_rewards = 600;
        let s = state(Some(record));
        assert_eq!(s.referral_count(), 3);
        assert_eq!(s.referral_rewards(), 600);
        assert_eq!(s.referrer(), Some(Address::new([2; 20])));
    }
}
