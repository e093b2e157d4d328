//! Local filesystem storage backend implementation.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{IoSnafu, LocationNotFoundSnafu, ObjectStoreSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

impl StorageProvider {
    pub(super) async fn construct_local(
        config: LocalConfig,
        create: bool,
    ) -> Result<Self, StorageError> {
        if create {
            tokio::fs::create_dir_all(&config.path)
                .await
                .context(IoSnafu)?;
        } else {
            let is_dir = tokio::fs::metadata(&config.path)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            ensure!(
                is_dir,
                LocationNotFoundSnafu {
                    path: config.path.clone()
                }
            );
        }

        // Overwrites delete whole tables; drop the directories they leave behind
        let object_store: Arc<dyn ObjectStore> = Arc::new(
            LocalFileSystem::new_with_prefix(&config.path)
                .context(ObjectStoreSnafu)?
                .with_automatic_cleanup(true),
        );

        let canonical_url = format!("file://{}", config.path);

        Ok(Self {
            config: BackendConfig::Local(config),
            object_store,
            canonical_url,
        })
    }
}
