// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Object Store Infrastructure Module
//!
//! Concrete `ObjectStore` implementations for upload blobs.

pub mod local;
pub mod memory;
pub mod supabase;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use supabase::SupabaseStorage;

use std::sync::Arc;
use std::time::Duration;

use crate::domain::config::{ObjectStoreBackend, StorageConfig};
use crate::domain::storage::{ObjectStore, StorageError};

/// Factory function to create the object store selected by configuration
pub fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match config.backend {
        ObjectStoreBackend::Supabase => {
            let url = config
                .supabase_url
                .clone()
                .ok_or_else(|| StorageError::Unavailable("Supabase URL is not configured".to_string()))?;
            let key = config.service_role_key.clone().ok_or_else(|| {
                StorageError::Unavailable("Supabase service role key is not configured".to_string())
            })?;
            Ok(Arc::new(SupabaseStorage::new(
                url,
                key,
                Duration::from_secs(config.timeout_seconds),
            )?))
        }
        ObjectStoreBackend::Local => Ok(Arc::new(LocalObjectStore::new(&config.local_path)?)),
        ObjectStoreBackend::Memory => Ok(Arc::new(MemoryObjectStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supabase_backend_requires_credentials() {
        let config = StorageConfig {
            backend: ObjectStoreBackend::Supabase,
            ..StorageConfig::default()
        };
        assert!(matches!(create_object_store(&config), Err(StorageError::Unavailable(_))));
    }

    #[test]
    fn test_local_backend_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: ObjectStoreBackend::Local,
            local_path: dir.path().join("objects").display().to_string(),
            ..StorageConfig::default()
        };
        assert!(create_object_store(&config).is_ok());
        assert!(dir.path().join("objects").is_dir());
    }
}
