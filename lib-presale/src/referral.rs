//! Referral crediting
//!
//! Registers an address the first time it is seen and credits its referrer
//! exactly once. Two guarantees carry the whole thing:
//!
//! 1. Creation is conditional, so of N concurrent registrations for the same
//!    address exactly one observes `Created`.
//! 2. Only the call that created the record credits the referrer, and the
//!    credit is an atomic increment on the referrer's record.
//!
//! The referrer is read from the record at crediting time; it is never
//! mutated after creation.

use chrono::Utc;
use lib_records::{CreateOutcome, RecordStore, UserRecord};
use lib_types::{Address, REFERRAL_REWARD};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::PresaleResult;

/// Result of `ReferralEngine::register`
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    /// This call created the record
    Created {
        record: UserRecord,
        /// Whether the referrer's counters were incremented
        credited_referrer: bool,
    },
    /// A record already existed; nothing was written
    AlreadyRegistered(UserRecord),
}

impl RegistrationOutcome {
    pub fn record(&self) -> &UserRecord {
        match self {
            RegistrationOutcome::Created { record, .. } => record,
            RegistrationOutcome::AlreadyRegistered(record) => record,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, RegistrationOutcome::Created { .. })
    }
}

/// First-sighting registration with referral crediting
#[derive(Clone)]
pub struct ReferralEngine {
    store: Arc<dyn RecordStore>,
    reward: u64,
}

impl ReferralEngine {
    pub fn new(store: Arc<dyn RecordStore>, reward: u64) -> Self {
        Self { store, reward }
    }

    pub fn with_default_reward(store: Arc<dyn RecordStore>) -> Self {
        Self::new(store, REFERRAL_REWARD)
    }

    pub fn reward(&self) -> u64 {
        self.reward
    }

    /// Register `address`, optionally attributing it to `referrer`
    ///
    /// Idempotent: a second call for a registered address returns
    /// `AlreadyRegistered` and credits nobody.
    pub async fn register(
        &self,
        address: Address,
        referrer: Option<Address>,
    ) -> PresaleResult<RegistrationOutcome> {
        if let Some(existing) = self.store.get_record(&address).await? {
            debug!("{} already registered", address.short());
            return Ok(RegistrationOutcome::AlreadyRegistered(existing));
        }

        let referrer = self.resolve_referrer(&address, referrer).await?;
        let record = UserRecord::new(address, referrer, Utc::now());

        let record = match self.store.create_record(record).await? {
            CreateOutcome::Created(record) => record,
            CreateOutcome::AlreadyExists(existing) => {
                debug!("Lost registration race for {}", address.short());
                return Ok(RegistrationOutcome::AlreadyRegistered(existing));
            }
        };
        info!("Registered {}", address.short());

        let credited_referrer = match record.referrer {
            Some(referrer) => self.credit(&address, &referrer).await,
            None => false,
        };

        Ok(RegistrationOutcome::Created {
            record,
            credited_referrer,
        })
    }

    /// Keep `referrer` only if it is non-zero, not `address`, and registered
    ///
    /// A lookup failure aborts registration before anything is written, so a
    /// retry can still attribute the referral.
    async fn resolve_referrer(
        &self,
        address: &Address,
        referrer: Option<Address>,
    ) -> PresaleResult<Option<Address>> {
        let Some(referrer) = referrer else {
            return Ok(None);
        };

        if referrer.is_zero() {
            debug!("Ignoring zero referrer for {}", address.short());
            return Ok(None);
        }
        if referrer == *address {
            debug!("Ignoring self-referral by {}", address.short());
            return Ok(None);
        }
        if self.store.get_record(&referrer).await?.is_none() {
            debug!(
                "Ignoring unregistered referrer {} for {}",
                referrer.short(),
                address.short()
            );
            return Ok(None);
        }

        Ok(Some(referrer))
    }

    /// Credit after a successful create; failures are tolerated and logged
    async fn credit(&self, address: &Address, referrer: &Address) -> bool {
        match self.store.credit_referral(referrer, self.reward).await {
            Ok(Some(updated)) => {
                info!(
                    "Credited {} for referring {} (count: {}, rewards: {})",
                    referrer.short(),
                    address.short(),
                    updated.referral_count,
                    updated.referral_rewards
                );
                true
            }
            Ok(None) => {
                warn!(
                    "Referrer {} of {} vanished before crediting",
                    referrer.short(),
                    address.short()
                );
                false
            }
            Err(e) => {
                warn!(
                    "Registered {} but failed to credit referrer {}: {}",
                    address.short(),
                    referrer.short(),
                    e
                );
                false
            }
        }
    }
}
