//! Persistent engine on sled
//!
//! sled calls block, so each one is shipped to the blocking pool. Session
//! flows and the reconciliation loop share one runtime and must not stall.

use super::{check_entry, Result, StorageBackend, StorageError, DEFAULT_CACHE_BYTES};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

#[derive(Clone, Debug)]
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_cache(path, DEFAULT_CACHE_BYTES)
    }

    /// Open (creating if needed) with an explicit page cache size
    pub fn open_with_cache<P: AsRef<Path>>(path: P, cache_bytes: u64) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(cache_bytes)
            .open()
            .map_err(|e| StorageError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        info!(
            "Record database ready at {} ({} entries, {}MB cache)",
            path.display(),
            db.len(),
            cache_bytes >> 20
        );
        Ok(Self { db })
    }

    /// Throwaway database, deleted on drop
    pub fn temporary() -> Result<Self> {
        sled::Config::new()
            .temporary(true)
            .open()
            .map(|db| Self { db })
            .map_err(|e| StorageError::Open {
                path: "<temporary>".into(),
                reason: e.to_string(),
            })
    }

    async fn blocking<T, F>(&self, op: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&sled::Db) -> sled::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || work(&db))
            .await
            .map_err(|e| StorageError::Join(e.to_string()))?
            .map_err(|e| StorageError::engine(op, e))
    }
}

#[async_trait]
impl StorageBackend for SledBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_entry(key, None)?;
        let key = key.to_vec();
        self.blocking("get", move |db| Ok(db.get(key)?.map(|v| v.to_vec())))
            .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        check_entry(key, Some(value))?;
        let (key, value) = (key.to_vec(), value.to_vec());
        self.blocking("put", move |db| db.insert(key, value).map(drop))
            .await
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let prefix = prefix.to_vec();
        self.blocking("scan", move |db| {
            db.scan_prefix(prefix)
                .map(|entry| entry.map(|(k, v)| (k.to_vec(), v.to_vec())))
                .collect()
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> Result<()> {
        check_entry(key, new)?;
        let key = key.to_vec();
        let expected = expected.map(<[u8]>::to_vec);
        let new = new.map(<[u8]>::to_vec);

        let swapped = self
            .blocking("compare_and_swap", move |db| {
                db.compare_and_swap(key, expected, new)
            })
            .await?;
        swapped.map_err(|_| StorageError::CasConflict)
    }

    async fn flush(&self) -> Result<()> {
        self.blocking("flush", |db| db.flush().map(drop)).await
    }

    fn name(&self) -> &'static str {
        "sled"
    }
}
