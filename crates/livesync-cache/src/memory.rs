//! In-memory ISettingsStore
//!
//! Records live in a map for the lifetime of the store. Reads and writes
//! can be made to fail on demand, which is how storage outages are
//! simulated in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use livesync_core::ports::ISettingsStore;

use crate::CacheError;

/// Map-backed settings store with failure injection
#[derive(Default)]
pub struct MemorySettingsStore {
    records: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record, e.g. a corrupt one
    pub fn with_record(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name.into(), value.into());
        self
    }

    /// Current value of a record, bypassing failure injection
    pub fn get(&self, name: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }
}

#[async_trait]
impl ISettingsStore for MemorySettingsStore {
    async fn read(&self, name: &str) -> anyhow::Result<Option<String>> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(CacheError::Unavailable(format!("read of {name} rejected")).into());
        }
        Ok(self.get(name))
    }

    async fn write(&self, name: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(CacheError::Unavailable(format!("write of {name} rejected")).into());
        }
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}
