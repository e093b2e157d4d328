//! Object storage abstraction.
//!
//! Provides a unified interface for S3-compatible stores and the local
//! filesystem, plus glob listing for source patterns and prefix deletion for
//! overwrite semantics.

mod local;
mod pattern;
mod s3;

pub use local::LocalConfig;
pub use pattern::PathPattern;
pub use s3::S3Config;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt, future::ready};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{InvalidUrlSnafu, IoSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for the supported backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aAnN]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

fn matchers() -> &'static [(Backend, Vec<Regex>)] {
    static MATCHERS: OnceLock<Vec<(Backend, Vec<Regex>)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("backend URL pattern is valid"))
                .collect()
        };
        vec![
            (
                Backend::S3,
                compile(&[S3_PATH, S3_VIRTUAL, S3_ENDPOINT_URL, S3_URL]),
            ),
            (Backend::Local, compile(&[FILE_URI, FILE_URL, FILE_PATH])),
        ]
    })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL or filesystem path into a backend configuration.
    ///
    /// Relative filesystem paths are resolved against the working directory.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let trimmed = url.trim_end_matches('/');
        let url = if trimmed.is_empty() { url } else { trimmed };

        if !url.contains(':') && !url.starts_with('/') && !url.is_empty() {
            let absolute = std::env::current_dir().context(IoSnafu)?.join(url);
            return Ok(BackendConfig::Local(LocalConfig {
                path: absolute.to_string_lossy().into_owned(),
            }));
        }

        for (backend, patterns) in matchers() {
            if let Some(matches) = patterns.iter().find_map(|r| r.captures(url)) {
                return match backend {
                    Backend::S3 => Ok(Self::parse_s3(&matches)),
                    Backend::Local => Ok(Self::parse_local(&matches)),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: &regex::Captures) -> Self {
        let bucket = matches["bucket"].to_string();
        let region = matches.name("region").map(|m| m.as_str().to_string());
        let endpoint = matches.name("endpoint").map(|endpoint| {
            let port = matches
                .name("port")
                .and_then(|p| p.as_str().parse::<u16>().ok())
                .unwrap_or(443);
            let protocol = matches
                .name("protocol")
                .map(|p| p.as_str())
                .unwrap_or("https");
            format!("{}://{}:{}", protocol, endpoint.as_str(), port)
        });
        let key = matches.name("key").map(|m| Path::from(m.as_str()));

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key,
        })
    }

    fn parse_local(matches: &regex::Captures) -> Self {
        let path = &matches["path"];
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        BackendConfig::Local(LocalConfig { path })
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            // Local stores are rooted at the path itself.
            BackendConfig::Local(_) => None,
        }
    }
}

impl StorageProvider {
    /// Create a storage provider for a writable location.
    ///
    /// Local directories are created when missing.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        Self::build(url, options, true).await
    }

    /// Create a storage provider for a location that must already exist.
    ///
    /// A missing local directory is reported as [`StorageError::LocationNotFound`]
    /// and nothing is created.
    pub async fn open_existing(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        Self::build(url, options, false).await
    }

    async fn build(
        url: &str,
        options: HashMap<String, String>,
        create: bool,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options),
            BackendConfig::Local(config) => Self::construct_local(config, create).await,
        }
    }

    /// Canonical URL of the storage root, for logging.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// List files in the storage location.
    /// Returns paths relative to the configured key prefix.
    pub fn list(
        &self,
        include_subdirectories: bool,
    ) -> impl Stream<Item = Result<Path, object_store::Error>> + '_ {
        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::Success,
        });

        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        self.object_store
            .list(self.config.key())
            .filter_map(move |meta| {
                let result = match meta {
                    Ok(metadata) => {
                        let path = metadata.location;
                        if !include_subdirectories && path.parts().count() != key_part_count + 1 {
                            None
                        } else {
                            // Strip the prefix so callers can pass the path back to get/put
                            let relative_path: Path = path.parts().skip(key_part_count).collect();
                            Some(Ok(relative_path))
                        }
                    }
                    Err(err) => Some(Err(err)),
                };
                ready(result)
            })
    }

    /// List every file whose relative path matches `pattern`, sorted by path.
    ///
    /// The listed paths are returned as-is so they can be fetched without
    /// being encoded again.
    pub async fn list_matching(&self, pattern: &PathPattern) -> Result<Vec<Path>, StorageError> {
        let mut files = Vec::new();
        let mut total_listed = 0;
        let mut stream = self.list(true);

        while let Some(result) = stream.next().await {
            let path = match result {
                Ok(path) => path,
                // A prefix with no objects under it lists as not found on some stores
                Err(object_store::Error::NotFound { .. }) => break,
                Err(source) => return Err(StorageError::ObjectStore { source }),
            };
            total_listed += 1;
            if pattern.matches(path.as_ref()) {
                files.push(path);
            }
        }

        debug!(
            "Listed {} files under {}, {} match {}",
            total_listed,
            self.canonical_url,
            files.len(),
            pattern
        );

        files.sort();
        Ok(files)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_result(&result),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Get,
            duration: start.elapsed(),
        });

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put(&path, payload).await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::from_result(&result),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Put,
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Put bytes to a path.
    pub async fn put(&self, path: impl Into<Path>, bytes: Bytes) -> Result<(), StorageError> {
        self.put_payload(&path.into(), PutPayload::from(bytes))
            .await
    }

    /// Delete every object under `prefix` (relative to the configured key).
    ///
    /// Returns the number of objects removed. A prefix with nothing under it
    /// is not an error.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let prefix = Path::from(prefix);
        let qualified = self.qualify_path(&prefix).into_owned();
        let start = Instant::now();

        let locations = self
            .object_store
            .list(Some(&qualified))
            .map_ok(|meta| meta.location)
            .boxed();

        let deleted: Vec<Path> = match self
            .object_store
            .delete_stream(locations)
            .try_collect()
            .await
        {
            Ok(deleted) => deleted,
            Err(object_store::Error::NotFound { .. }) => Vec::new(),
            Err(source) => {
                emit!(StorageRequest {
                    operation: StorageOperation::Delete,
                    status: RequestStatus::Error,
                });
                return Err(StorageError::ObjectStore { source });
            }
        };

        emit!(StorageRequest {
            operation: StorageOperation::Delete,
            status: RequestStatus::Success,
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Delete,
            duration: start.elapsed(),
        });
        debug!("Deleted {} objects under {}", deleted.len(), qualified);

        Ok(deleted.len())
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }
}
