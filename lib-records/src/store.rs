//! Typed record store over a byte backend
//!
//! Records are stored as JSON under `user:<address>`, the global claim
//! config under `config:claim_settings`. Every read-modify-write is a
//! compare-and-swap retry loop, which gives:
//!
//! - create-if-absent for first sightings (no double registration)
//! - atomic increments for referral counters (no lost or doubled credits)
//! - no lost updates between writers touching disjoint fields

use async_trait::async_trait;
use chrono::Utc;
use lib_types::Address;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{StorageBackend, StorageError};
use crate::errors::{RecordError, RecordResult};
use crate::record::{
    sort_records, GlobalClaimConfig, RecordUpdate, SortDirection, SortField, UserRecord,
};

const USER_PREFIX: &str = "user:";
const GLOBAL_CONFIG_KEY: &[u8] = b"config:claim_settings";

/// Upper bound on CAS retries. A writer only loses a round when another
/// writer wins one, so this bounds concurrency on a single key, not time.
pub const MAX_CAS_ATTEMPTS: usize = 128;

/// Result of a conditional create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This call created the record
    Created(UserRecord),
    /// A record already existed; it is returned unchanged
    AlreadyExists(UserRecord),
}

impl CreateOutcome {
    pub fn was_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn into_record(self) -> UserRecord {
        match self {
            CreateOutcome::Created(r) | CreateOutcome::AlreadyExists(r) => r,
        }
    }
}

/// Keyed user-record API
///
/// No cross-record atomicity is offered: callers touching two records
/// (registration plus referrer credit) must tolerate partial application.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record, `None` if the address was never registered
    async fn get_record(&self, address: &Address) -> RecordResult<Option<UserRecord>>;

    /// Create a record only if none exists for its address
    async fn create_record(&self, record: UserRecord) -> RecordResult<CreateOutcome>;

    /// Apply a partial update
    ///
    /// # Errors
    /// - `RecordError::NotFound` if the record does not exist
    async fn update_record(&self, address: &Address, update: &RecordUpdate) -> RecordResult<UserRecord>;

    /// Atomically add one referral and `reward` to a referrer's counters
    ///
    /// Returns `None` when the referrer has no record; nothing is written.
    async fn credit_referral(&self, referrer: &Address, reward: u64) -> RecordResult<Option<UserRecord>>;

    /// All records sorted by one field
    async fn list_records(&self, field: SortField, direction: SortDirection) -> RecordResult<Vec<UserRecord>>;

    /// Current global claim config; inactive if never written
    async fn global_config(&self) -> RecordResult<GlobalClaimConfig>;

    /// Overwrite the global claim config, stamping `updated_at`
    async fn set_global_config(&self, claim_active: bool) -> RecordResult<GlobalClaimConfig>;
}

/// `RecordStore` over any `StorageBackend`
#[derive(Clone, Debug)]
pub struct KvRecordStore<B: StorageBackend> {
    backend: Arc<B>,
}

impl<B: StorageBackend> KvRecordStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Borrow the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn user_key(address: &Address) -> Vec<u8> {
        format!("{}{}", USER_PREFIX, address).into_bytes()
    }

    /// CAS loop applying `mutate` to the stored record
    async fn modify<F>(&self, address: &Address, mut mutate: F) -> RecordResult<Option<UserRecord>>
    where
        F: FnMut(&mut UserRecord) + Send,
    {
        let key = Self::user_key(address);

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let Some(current) = self.backend.get(&key).await? else {
                return Ok(None);
            };

            let mut record: UserRecord = serde_json::from_slice(&current)?;
            mutate(&mut record);
            let next = serde_json::to_vec(&record)?;

            match self
                .backend
                .compare_and_swap(&key, Some(&current), Some(&next))
                .await
            {
                Ok(()) => return Ok(Some(record)),
                Err(StorageError::CasConflict) => {
                    debug!("CAS conflict on {} (attempt {})", address.short(), attempt);
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RecordError::Contention {
            key: String::from_utf8_lossy(&key).into_owned(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

#[async_trait]
impl<B: StorageBackend + 'static> RecordStore for KvRecordStore<B> {
    async fn get_record(&self, address: &Address) -> RecordResult<Option<UserRecord>> {
        match self.backend.get(&Self::user_key(address)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn create_record(&self, record: UserRecord) -> RecordResult<CreateOutcome> {
        let key = Self::user_key(&record.address);
        let bytes = serde_json::to_vec(&record)?;

        match self.backend.compare_and_swap(&key, None, Some(&bytes)).await {
            Ok(()) => {
                debug!("Created record for {}", record.address.short());
                Ok(CreateOutcome::Created(record))
            }
            Err(StorageError::CasConflict) => {
                let existing = self
                    .get_record(&record.address)
                    .await?
                    .ok_or(RecordError::NotFound(record.address))?;
                Ok(CreateOutcome::AlreadyExists(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_record(&self, address: &Address, update: &RecordUpdate) -> RecordResult<UserRecord> {
        self.modify(address, |record| record.apply(update))
            .await?
            .ok_or(RecordError::NotFound(*address))
    }

    async fn credit_referral(&self, referrer: &Address, reward: u64) -> RecordResult<Option<UserRecord>> {
        self.modify(referrer, |record| {
            record.referral_count = record.referral_count.saturating_add(1);
            record.referral_rewards = record.referral_rewards.saturating_add(reward);
        })
        .await
    }

    async fn list_records(&self, field: SortField, direction: SortDirection) -> RecordResult<Vec<UserRecord>> {
        let entries = self
            .backend
            .scan_prefix(USER_PREFIX.as_bytes())
            .await?;

        let mut records = entries
            .iter()
            .map(|(_, v)| serde_json::from_slice::<UserRecord>(v))
            .collect::<Result<Vec<_>, _>>()?;

        sort_records(&mut records, field, direction);
        Ok(records)
    }

    async fn global_config(&self) -> RecordResult<GlobalClaimConfig> {
        match self.backend.get(GLOBAL_CONFIG_KEY).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(GlobalClaimConfig::default()),
        }
    }

    async fn set_global_config(&self, claim_active: bool) -> RecordResult<GlobalClaimConfig> {
        let config = GlobalClaimConfig {
            claim_active,
            updated_at: Some(Utc::now()),
        };
        self.backend
            .put(GLOBAL_CONFIG_KEY, &serde_json::to_vec(&config)?)
            .await?;
        Ok(config)
    }
}
