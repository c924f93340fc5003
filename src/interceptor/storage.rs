//! Client cache storage, partitioned into named namespaces.
//!
//! One namespace holds the entries of one cache generation. The disk backend
//! lays this out as `<root>/<namespace>/<sha256(key)>.json`, and only treats
//! a directory as a namespace when it carries the marker file `put` writes.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tracing::debug;

use super::request::RequestKey;
use super::response::{InterceptedResponse, ResponseKind};
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "interceptor::storage";
const NAMESPACE_MARKER: &str = ".inboxdesk-namespace";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored entry at {path} is unreadable: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("invalid namespace name `{0}`")]
    InvalidNamespace(String),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn corrupt(path: &Path, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every namespace currently present.
    async fn namespaces(&self) -> Result<Vec<String>, StorageError>;

    /// Remove a namespace and all its entries. Returns whether it existed.
    async fn delete_namespace(&self, namespace: &str) -> Result<bool, StorageError>;

    async fn lookup(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> Result<Option<InterceptedResponse>, StorageError>;

    /// Store `response` under `key`, creating the namespace if needed.
    async fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &InterceptedResponse,
    ) -> Result<(), StorageError>;
}

/// In-process storage, used by tests and short-lived clients.
#[derive(Default)]
pub struct MemoryCacheStorage {
    namespaces: Mutex<BTreeMap<String, HashMap<RequestKey, InterceptedResponse>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self, namespace: &str) -> usize {
        mutex_lock(&self.namespaces, SOURCE, "entry_count")
            .get(namespace)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn namespaces(&self) -> Result<Vec<String>, StorageError> {
        Ok(mutex_lock(&self.namespaces, SOURCE, "namespaces")
            .keys()
            .cloned()
            .collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool, StorageError> {
        Ok(mutex_lock(&self.namespaces, SOURCE, "delete_namespace")
            .remove(namespace)
            .is_some())
    }

    async fn lookup(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> Result<Option<InterceptedResponse>, StorageError> {
        Ok(mutex_lock(&self.namespaces, SOURCE, "lookup")
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &InterceptedResponse,
    ) -> Result<(), StorageError> {
        mutex_lock(&self.namespaces, SOURCE, "put")
            .entry(namespace.to_string())
            .or_default()
            .insert(key.clone(), response.clone());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    key: RequestKey,
    status: u16,
    kind: ResponseKind,
    headers: Vec<(String, String)>,
    body: String,
    #[serde(with = "time::serde::rfc3339")]
    stored_at: OffsetDateTime,
}

impl DiskRecord {
    fn from_response(key: &RequestKey, response: &InterceptedResponse) -> Self {
        Self {
            key: key.clone(),
            status: response.status.as_u16(),
            kind: response.kind,
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            stored_at: OffsetDateTime::now_utc(),
        }
    }

    fn into_response(self, path: &Path) -> Result<InterceptedResponse, StorageError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|err| StorageError::corrupt(path, err.to_string()))?;
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(|err| StorageError::corrupt(path, err.to_string()))?;
        Ok(InterceptedResponse {
            status,
            headers: self.headers,
            body: body.into(),
            kind: self.kind,
        })
    }
}

/// Storage on the local filesystem, surviving process restarts.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, StorageError> {
        let valid = !namespace.is_empty()
            && namespace != "."
            && namespace != ".."
            && !namespace.contains(['/', '\\']);
        if !valid {
            return Err(StorageError::InvalidNamespace(namespace.to_string()));
        }
        Ok(self.root.join(namespace))
    }

    async fn is_owned(&self, dir: &Path) -> Result<bool, StorageError> {
        let marker = dir.join(NAMESPACE_MARKER);
        fs::try_exists(&marker)
            .await
            .map_err(|err| StorageError::io(&marker, err))
    }

    fn entry_path(&self, namespace: &str, key: &RequestKey) -> Result<PathBuf, StorageError> {
        let digest = Sha256::digest(key.as_str().as_bytes());
        Ok(self
            .namespace_dir(namespace)?
            .join(format!("{}.json", hex::encode(digest))))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn namespaces(&self) -> Result<Vec<String>, StorageError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io(&self.root, err)),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|err| StorageError::io(&self.root, err))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|err| StorageError::io(&entry.path(), err))?
                .is_dir();
            if !is_dir || !self.is_owned(&entry.path()).await? {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool, StorageError> {
        let dir = self.namespace_dir(namespace)?;
        if !self.is_owned(&dir).await? {
            debug!(namespace, "not a cache namespace; left in place");
            return Ok(false);
        }
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::io(&dir, err)),
        }
    }

    async fn lookup(
        &self,
        namespace: &str,
        key: &RequestKey,
    ) -> Result<Option<InterceptedResponse>, StorageError> {
        let path = self.entry_path(namespace, key)?;
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io(&path, err)),
        };

        let record: DiskRecord = serde_json::from_slice(&raw)
            .map_err(|err| StorageError::corrupt(&path, err.to_string()))?;
        if &record.key != key {
            return Err(StorageError::corrupt(&path, "key mismatch"));
        }
        record.into_response(&path).map(Some)
    }

    async fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &InterceptedResponse,
    ) -> Result<(), StorageError> {
        let dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| StorageError::io(&dir, err))?;
        if !self.is_owned(&dir).await? {
            let marker = dir.join(NAMESPACE_MARKER);
            fs::write(&marker, namespace)
                .await
                .map_err(|err| StorageError::io(&marker, err))?;
        }

        let path = self.entry_path(namespace, key)?;
        let record = DiskRecord::from_response(key, response);
        let payload = serde_json::to_vec(&record)
            .map_err(|err| StorageError::corrupt(&path, err.to_string()))?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, payload)
            .await
            .map_err(|err| StorageError::io(&staging, err))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|err| StorageError::io(&path, err))?;
        debug!(namespace, key = %key, "stored response on disk");
        Ok(())
    }
}
