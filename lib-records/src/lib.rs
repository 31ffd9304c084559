//! Off-chain record store for the presale core
//!
//! Holds the UI-facing `UserRecord` per wallet and the `GlobalClaimConfig`
//! singleton. Nothing here is authoritative for claims; see `lib-ledger`.
//!
//! ## Example
//! ```rust,ignore
//! use lib_records::{KvRecordStore, MemoryBackend, RecordStore, UserRecord};
//!
//! let store = KvRecordStore::new(MemoryBackend::new());
//! let outcome = store.create_record(UserRecord::new(address, None, chrono::Utc::now())).await?;
//! assert!(outcome.was_created());
//! ```

pub mod backend;
pub mod errors;
pub mod record;
pub mod store;

pub use backend::{MemoryBackend, SledBackend, StorageBackend, StorageError};
pub use errors::{RecordError, RecordResult};
pub use record::{
    sort_records, GlobalClaimConfig, RecordUpdate, SortDirection, SortField, UserRecord,
};
pub use store::{CreateOutcome, KvRecordStore, RecordStore, MAX_CAS_ATTEMPTS};
