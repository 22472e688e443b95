//! Storage abstraction for sync progress and filter caching.
//!
//! The engine persists two things between cycles: the sync cursor and the
//! registered filter. Concrete backends (disk, database) live outside this
//! crate; [`MemoryStorage`] serves tests and ephemeral clients.

use async_trait::async_trait;
use palaver_types::CachedFilter;
use std::sync::Mutex;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The backend failed to read or write.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence seam for sync progress and filter caching.
#[async_trait]
pub trait Storage: Send + Sync {
    /// The cached filter, if one was registered.
    async fn get_filter(&self) -> Result<Option<CachedFilter>, StorageError>;

    /// Cache a registered filter.
    async fn set_filter(&self, filter: CachedFilter) -> Result<(), StorageError>;

    /// The last persisted sync cursor. Absence means "start fresh".
    async fn get_sync_token(&self) -> Result<Option<String>, StorageError>;

    /// Persist the sync cursor. Must complete before the next sync request
    /// is issued.
    async fn set_sync_token(&self, token: String) -> Result<(), StorageError>;
}

/// In-memory storage for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryStorageInner>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    filter: Option<CachedFilter>,
    sync_token: Option<String>,
}

impl MemoryStorage {
    /// Create empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_filter(&self) -> Result<Option<CachedFilter>, StorageError> {
        Ok(self.inner.lock().unwrap().filter.clone())
    }

    async fn set_filter(&self, filter: CachedFilter) -> Result<(), StorageError> {
        self.inner.lock().unwrap().filter = Some(filter);
        Ok(())
    }

    async fn get_sync_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.inner.lock().unwrap().sync_token.clone())
    }

    async fn set_sync_token(&self, token: String) -> Result<(), StorageError> {
        self.inner.lock().unwrap().sync_token = Some(token);
        Ok(())
    }
}
