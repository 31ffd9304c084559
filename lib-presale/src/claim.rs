//! Claim gate
//!
//! Decides whether a claim may be submitted. The decision is built only
//! from fresh ledger reads; off-chain advisory flags and cached display
//! snapshots have no way in. `AuthorizationState` has private fields and a
//! single constructor (`ClaimGate::authorize`), and `submit` consumes it.

use chrono::{DateTime, Utc};
use lib_ledger::{LedgerAdapter, TxReceipt};
use lib_types::Address;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{PresaleError, PresaleResult};

/// Where an address stands with respect to claiming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimPhase {
    /// Global claiming is off and the address has not claimed
    NotEligible,
    /// Global claiming is on and the address has not claimed
    Eligible,
    /// Terminal: the address has claimed
    Claimed,
}

impl ClaimPhase {
    pub fn from_flags(global_claim_active: bool, has_claimed: bool) -> Self {
        match (global_claim_active, has_claimed) {
            (_, true) => ClaimPhase::Claimed,
            (true, false) => ClaimPhase::Eligible,
            (false, false) => ClaimPhase::NotEligible,
        }
    }

    pub fn can_claim(&self) -> bool {
        matches!(self, ClaimPhase::Eligible)
    }
}

/// Ledger-sourced claim authorization for one address
#[derive(Debug, PartialEq, Eq)]
pub struct AuthorizationState {
    address: Address,
    global_claim_active: bool,
    has_claimed: bool,
    read_at: DateTime<Utc>,
}

impl AuthorizationState {
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn global_claim_active(&self) -> bool {
        self.global_claim_active
    }

    pub fn has_claimed(&self) -> bool {
        self.has_claimed
    }

    pub fn read_at(&self) -> DateTime<Utc> {
        self.read_at
    }

    pub fn phase(&self) -> ClaimPhase {
        ClaimPhase::from_flags(self.global_claim_active, self.has_claimed)
    }

    pub fn can_claim(&self) -> bool {
        self.phase().can_claim()
    }
}

/// Gate in front of the ledger's `claim`
pub struct ClaimGate {
    ledger: Arc<dyn LedgerAdapter>,
    /// Claims confirmed through this gate
    confirmed: Mutex<HashSet<Address>>,
}

impl ClaimGate {
    pub fn new(ledger: Arc<dyn LedgerAdapter>) -> Self {
        Self {
            ledger,
            confirmed: Mutex::new(HashSet::new()),
        }
    }

    /// Read the global switch and the per-address flag from the ledger
    pub async fn authorize(&self, address: &Address) -> PresaleResult<AuthorizationState> {
        let (global_claim_active, has_claimed) = tokio::try_join!(
            self.ledger.global_claim_status(),
            self.ledger.claim_status(address),
        )?;

        // a ledger read can lag a claim we just confirmed
        let has_claimed = has_claimed || self.confirmed.lock().contains(address);

        let state = AuthorizationState {
            address: *address,
            global_claim_active,
            has_claimed,
            read_at: Utc::now(),
        };
        debug!("Claim phase for {}: {:?}", address.short(), state.phase());
        Ok(state)
    }

    /// Convenience: fresh reads, then the phase check
    pub async fn can_claim(&self, address: &Address) -> PresaleResult<bool> {
        Ok(self.authorize(address).await?.can_claim())
    }

    /// Submit a claim for the authorized address
    ///
    /// Refuses locally unless the phase is `Eligible`. Ledger errors are
    /// returned unchanged and never retried.
    pub async fn submit(&self, authorization: AuthorizationState) -> PresaleResult<TxReceipt> {
        let address = authorization.address;
        match authorization.phase() {
            ClaimPhase::NotEligible => return Err(PresaleError::ClaimNotOpen),
            ClaimPhase::Claimed => return Err(PresaleError::AlreadyClaimed),
            ClaimPhase::Eligible => {}
        }
        if self.confirmed.lock().contains(&address) {
            return Err(PresaleError::AlreadyClaimed);
        }

        let receipt = self.ledger.claim(&address).await?;
        self.confirmed.lock().insert(address);
        info!("Claim confirmed for {} ({})", address.short(), receipt.tx_hash);
        Ok(receipt)
    }

    /// Whether a claim for `address` was confirmed through this gate
    pub fn has_confirmed(&self, address: &Address) -> bool {
        self.confirmed.lock().contains(address)
    }
}
