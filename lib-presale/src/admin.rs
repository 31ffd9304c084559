//! Admin override panel
//!
//! Operator-facing controls over the off-chain mirror. Callers must have
//! authenticated the operator already; `AdminSession` only carries who they
//! are and, for ledger-backed actions, which address signs.
//!
//! Per-user `claim_enabled` flags are advisory. They are shown to users
//! and operators but never consulted by the claim gate. The global switch
//! depends on `AdminAuthority`:
//! - `Advisory`: only the off-chain `GlobalClaimConfig` changes
//! - `Ledger`: the contract's switch is set first; the off-chain mirror is
//!   updated after the transaction confirms

use lib_ledger::LedgerAdapter;
use lib_records::{
    GlobalClaimConfig, RecordError, RecordStore, RecordUpdate, SortDirection, SortField, UserRecord,
};
use lib_types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{PresaleError, PresaleResult};

/// What the global claim switch controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminAuthority {
    /// Off-chain flag only; users still cannot claim until the contract opens
    Advisory,
    /// Drive the contract's global switch
    #[default]
    Ledger,
}

/// An authenticated operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    actor: String,
    signer: Option<Address>,
}

impl AdminSession {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            signer: None,
        }
    }

    /// Address that signs ledger transactions for this operator
    pub fn with_signer(mut self, signer: Address) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn signer(&self) -> Option<&Address> {
        self.signer.as_ref()
    }
}

/// Column sort for the user table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl SortState {
    /// Same field flips the direction; a new field starts descending
    pub fn select(&mut self, field: SortField) {
        if self.field == field {
            self.direction = self.direction.flipped();
        } else {
            self.field = field;
            self.direction = SortDirection::Desc;
        }
    }
}

/// Search and sort for `AdminPanel::list_users`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    /// Case-insensitive substring of the address or package; empty matches all
    pub search: String,
    pub sort: SortState,
}

impl UserQuery {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: term.into(),
            sort: SortState::default(),
        }
    }

    pub fn matches(&self, record: &UserRecord) -> bool {
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        record.address.to_string().contains(&needle)
            || record
                .package
                .map(|p| p.as_str().contains(&needle))
                .unwrap_or(false)
    }
}

/// Both views of the global switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalClaimView {
    pub advisory: GlobalClaimConfig,
    /// `None` if the ledger could not be read
    pub on_chain: Option<bool>,
}

impl GlobalClaimView {
    /// `Some(false)` when the mirror disagrees with the contract
    pub fn in_sync(&self) -> Option<bool> {
        self.on_chain.map(|on_chain| on_chain == self.advisory.claim_active)
    }
}

/// Admin controls over records and the global claim switch
pub struct AdminPanel {
    store: Arc<dyn RecordStore>,
    ledger: Arc<dyn LedgerAdapter>,
    authority: AdminAuthority,
}

impl AdminPanel {
    pub fn new(store: Arc<dyn RecordStore>, ledger: Arc<dyn LedgerAdapter>, authority: AdminAuthority) -> Self {
        Self {
            store,
            ledger,
            authority,
        }
    }

    pub fn authority(&self) -> AdminAuthority {
        self.authority
    }

    /// Off-chain config alongside the contract's switch
    pub async fn global_claim(&self) -> PresaleResult<GlobalClaimView> {
        let advisory = self.store.global_config().await?;
        let on_chain = match self.ledger.global_claim_status().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Could not read global claim status from ledger: {}", e);
                None
            }
        };
        Ok(GlobalClaimView { advisory, on_chain })
    }

    /// Set the global claim switch
    pub async fn set_global_claim(&self, session: &AdminSession, active: bool) -> PresaleResult<GlobalClaimConfig> {
        if self.authority == AdminAuthority::Ledger {
            let signer = session.signer().ok_or(PresaleError::AdminSignerMissing)?;
            let receipt = self.ledger.set_global_claim_status(signer, active).await?;
            info!(
                "{} set on-chain global claim to {} ({})",
                session.actor(),
                active,
                receipt.tx_hash
            );
        }

        let config = self.store.set_global_config(active).await?;
        info!(
            "{} set global claim to {} ({:?})",
            session.actor(),
            active,
            self.authority
        );
        Ok(config)
    }

    /// Flip the global claim switch
    ///
    /// In ledger mode the current value is read from the contract.
    pub async fn toggle_global_claim(&self, session: &AdminSession) -> PresaleResult<GlobalClaimConfig> {
        let current = match self.authority {
            AdminAuthority::Ledger => self.ledger.global_claim_status().await?,
            AdminAuthority::Advisory => self.store.global_config().await?.claim_active,
        };
        self.set_global_claim(session, !current).await
    }

    /// Set a user's advisory claim flag
    pub async fn set_user_claim(
        &self,
        session: &AdminSession,
        address: &Address,
        enabled: bool,
    ) -> PresaleResult<UserRecord> {
        let record = self
            .store
            .update_record(address, &RecordUpdate::claim_enabled(enabled))
            .await
            .map_err(|e| match e {
                RecordError::NotFound(address) => PresaleError::UserNotFound(address),
                other => other.into(),
            })?;
        info!(
            "{} set advisory claim flag for {} to {}",
            session.actor(),
            address.short(),
            enabled
        );
        Ok(record)
    }

    /// Flip a user's advisory claim flag
    pub async fn toggle_user_claim(&self, session: &AdminSession, address: &Address) -> PresaleResult<UserRecord> {
        let current = self
            .store
            .get_record(address)
            .await?
            .ok_or(PresaleError::UserNotFound(*address))?;
        self.set_user_claim(session, address, !current.claim_enabled).await
    }

    /// Records matching `query`, sorted server-side
    pub async fn list_users(&self, query: &UserQuery) -> PresaleResult<Vec<UserRecord>> {
        let mut records = self
            .store
            .list_records(query.sort.field, query.sort.direction)
            .await?;
        records.retain(|record| query.matches(record));
        Ok(records)
    }
}
