//! Pluggable persistent key-value collaborator.
//!
//! The session core never assumes a concrete storage medium; hosts inject
//! whatever they have (browser storage, a keychain, a file) behind this
//! trait. [`MemoryStore`] is the deterministic in-memory implementation
//! used as the default and in tests.

use crate::error::StoreResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Keys used by the session core. Written and cleared together, never
/// partially.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER: &str = "user";
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// In-memory key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}
