//! Byte-level engines underneath `KvRecordStore`
//!
//! The record store only ever needs four things from an engine: point
//! reads, blind writes (global config), ordered prefix listing (admin
//! views) and compare-and-swap (everything that must not race). Typing,
//! JSON and retry policy live one layer up.
//!
//! - `MemoryBackend`: ordered map behind a lock, for tests and previews
//! - `SledBackend`: embedded sled tree, for anything that must survive a restart

pub mod memory;
pub mod sled_backend;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryBackend;
pub use sled_backend::SledBackend;

/// Longest accepted key. `user:` plus a checksummed address is 47 bytes.
pub const RECORD_KEY_LIMIT: usize = 128;

/// Largest accepted value. A serialized user record is well under 1 KB.
pub const RECORD_VALUE_LIMIT: usize = 16 * 1024;

/// Sled page cache used when the config does not name one
pub const DEFAULT_CACHE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot open record database at {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Storage engine failed during {op}: {reason}")]
    Engine { op: &'static str, reason: String },

    /// The stored value no longer matches what the caller read
    #[error("Stored value changed underneath the caller")]
    CasConflict,

    #[error("Key of {len} bytes rejected (empty or over {max})", max = RECORD_KEY_LIMIT)]
    KeyRejected { len: usize },

    #[error("Value of {len} bytes exceeds {max}", max = RECORD_VALUE_LIMIT)]
    ValueRejected { len: usize },

    #[error("Blocking storage task did not complete: {0}")]
    Join(String),
}

impl StorageError {
    pub fn engine(op: &'static str, reason: impl ToString) -> Self {
        StorageError::Engine {
            op,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Unconditional write
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Every entry whose key starts with `prefix`, in key order
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Replace `expected` with `new` in one step.
    ///
    /// `expected = None` requires the key to be absent, `new = None` removes
    /// it. Any mismatch yields `StorageError::CasConflict` and writes nothing.
    async fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> Result<()>;

    /// Make previous writes durable; a no-op for volatile engines
    async fn flush(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Size checks shared by both engines. `value` is `None` for reads and removals.
pub(crate) fn check_entry(key: &[u8], value: Option<&[u8]>) -> Result<()> {
    if key.is_empty() || key.len() > RECORD_KEY_LIMIT {
        return Err(StorageError::KeyRejected { len: key.len() });
    }
    match value {
        Some(v) if v.len() > RECORD_VALUE_LIMIT => Err(StorageError::ValueRejected { len: v.len() }),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behavior every engine must share, driven from each engine's tests

    use super::*;

    const ALICE: &[u8] = b"user:0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &[u8] = b"user:0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    pub async fn point_reads_and_writes<B: StorageBackend>(engine: &B) {
        assert!(engine.get(ALICE).await.unwrap().is_none());

        engine.put(ALICE, br#"{"rev":1}"#).await.unwrap();
        engine.put(ALICE, br#"{"rev":2}"#).await.unwrap();
        assert_eq!(engine.get(ALICE).await.unwrap().as_deref(), Some(&br#"{"rev":2}"#[..]));
        engine.flush().await.unwrap();
    }

    pub async fn prefix_listing_is_ordered<B: StorageBackend>(engine: &B) {
        engine.put(BOB, b"b").await.unwrap();
        engine.put(b"config:claim_settings", b"c").await.unwrap();
        engine.put(ALICE, b"a").await.unwrap();

        let users = engine.scan_prefix(b"user:").await.unwrap();
        let keys: Vec<&[u8]> = users.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![ALICE, BOB]);

        assert!(engine.scan_prefix(b"session:").await.unwrap().is_empty());
    }

    pub async fn swap_semantics<B: StorageBackend>(engine: &B) {
        // first writer wins the create
        engine.compare_and_swap(ALICE, None, Some(b"first")).await.unwrap();
        let late = engine.compare_and_swap(ALICE, None, Some(b"second")).await;
        assert!(matches!(late, Err(StorageError::CasConflict)));
        assert_eq!(engine.get(ALICE).await.unwrap().as_deref(), Some(&b"first"[..]));

        // a stale read loses
        engine.compare_and_swap(ALICE, Some(b"first"), Some(b"next")).await.unwrap();
        let stale = engine.compare_and_swap(ALICE, Some(b"first"), Some(b"lost")).await;
        assert!(matches!(stale, Err(StorageError::CasConflict)));

        // swapping to nothing removes the key
        engine.compare_and_swap(ALICE, Some(b"next"), None).await.unwrap();
        assert!(engine.get(ALICE).await.unwrap().is_none());
        let gone = engine.compare_and_swap(ALICE, Some(b"next"), None).await;
        assert!(matches!(gone, Err(StorageError::CasConflict)));
    }

    pub async fn rejects_bad_sizes<B: StorageBackend>(engine: &B) {
        assert!(matches!(
            engine.put(b"", b"x").await,
            Err(StorageError::KeyRejected { len: 0 })
        ));

        let long_key = [b'k'; RECORD_KEY_LIMIT + 1];
        assert!(matches!(
            engine.get(&long_key).await,
            Err(StorageError::KeyRejected { .. })
        ));

        let bloated = vec![b'{'; RECORD_VALUE_LIMIT + 1];
        assert!(matches!(
            engine.compare_and_swap(ALICE, None, Some(&bloated)).await,
            Err(StorageError::ValueRejected { .. })
        ));
        assert!(engine.get(ALICE).await.unwrap().is_none());
    }
}
