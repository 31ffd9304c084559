//! Volatile engine; contents vanish with the process

use super::{check_entry, Result, StorageBackend, StorageError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Ordered map behind a lock. Clones share the same map.
///
/// A `BTreeMap` gives prefix scans the same key order sled does, so the
/// admin listing behaves identically on either engine.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_entry(key, None)?;
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        check_entry(key, Some(value))?;
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> Result<()> {
        check_entry(key, new)?;

        // check and write under one guard
        let mut entries = self.entries.write();
        if entries.get(key).map(Vec::as_slice) != expected {
            return Err(StorageError::CasConflict);
        }
        if let Some(value) = new {
            entries.insert(key.to_vec(), value.to_vec());
        } else {
            entries.remove(key);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
