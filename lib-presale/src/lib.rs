//! Presale core
//!
//! Coordinates an off-chain record store with the presale contract:
//!
//! - **Referrals**: first-sighting registration credits the referrer exactly
//!   once, even under concurrent registrations
//! - **Claims**: eligibility comes only from fresh ledger reads; the one-shot
//!   claim is refused locally once observed or confirmed
//! - **Reconciliation**: a background loop mirrors ledger state into a
//!   display snapshot without ever writing back
//! - **Admin**: advisory per-user flags, the global claim switch, user search
//!
//! ## Example
//! ```rust,ignore
//! let config = PresaleConfig::load("presale.toml")?;
//! logging::init_tracing(&config.log_level)?;
//!
//! let store = open_record_store(&config.storage)?;
//! let session = PresaleSession::from_config(store.clone(), ledger.clone(), &config);
//! let sync = Arc::new(ReconciliationService::new(ledger, store, config.reconciliation));
//! sync.follow(session.active());
//!
//! session.connect(&wallet, referrer).await?;
//! ```

pub mod admin;
pub mod claim;
pub mod config;
pub mod display;
pub mod errors;
pub mod leaderboard;
pub mod logging;
pub mod reconciliation;
pub mod referral;
pub mod session;
pub mod wallet;

pub use admin::{AdminAuthority, AdminPanel, AdminSession, GlobalClaimView, SortState, UserQuery};
pub use claim::{AuthorizationState, ClaimGate, ClaimPhase};
pub use config::{
    open_record_store, AdminConfig, PresaleConfig, ReconciliationConfig, ReferralConfig, StorageConfig,
};
pub use display::DisplayState;
pub use errors::{ErrorClass, PresaleError, PresaleResult};
pub use leaderboard::{leaderboard, LeaderboardEntry, LeaderboardMetric, DEFAULT_LEADERBOARD_LIMIT};
pub use reconciliation::{ReconciliationService, SyncFailure, SyncField, SyncNotice};
pub use referral::{ReferralEngine, RegistrationOutcome};
pub use session::{Confirmation, PresaleSession};
pub use wallet::{ActiveAddress, StaticWallet, WalletError, WalletProvider};
