//! LocalBlobStore — blob payloads on local disk.
//!
//! Payloads are sharded beneath `base_path/{shard}/{shard}/{key}` so no single
//! directory grows without bound. The content type lives next to the payload
//! in a `{name}.content-type` sidecar. Downloads go through presigned links
//! to this process's own blob route (see [`super::presign`]).

use super::{BlobStore, StoreError, StoreResult, ensure_key_safe, presign::UrlSigner};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    ffi::OsString,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const CONTENT_TYPE_SUFFIX: &str = ".content-type";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A blob opened for reading by the download route.
#[derive(Debug)]
pub struct BlobReader {
    pub file: File,
    pub size_bytes: u64,
    pub content_type: String,
}

#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,
    signer: UrlSigner,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            base_path: base_path.into(),
            signer,
        }
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Generate two-level shard identifiers for a key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase hex.
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Combines base_path/{shard}/{shard}/{key}. Parent directories may not
    /// exist yet.
    fn blob_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name: OsString = path.as_os_str().to_os_string();
        name.push(CONTENT_TYPE_SUFFIX);
        PathBuf::from(name)
    }

    /// Open a stored blob for streaming out.
    ///
    /// Returns `Ok(None)` when nothing is stored under `key`.
    pub async fn open(&self, key: &str) -> StoreResult<Option<BlobReader>> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err)),
        };
        let size_bytes = file.metadata().await?.len();
        let content_type = match fs::read_to_string(Self::sidecar_path(&path)).await {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            Ok(_) => DEFAULT_CONTENT_TYPE.to_string(),
            Err(err) if err.kind() == ErrorKind::NotFound => DEFAULT_CONTENT_TYPE.to_string(),
            Err(err) => return Err(StoreError::Io(err)),
        };
        Ok(Some(BlobReader {
            file,
            size_bytes,
            content_type,
        }))
    }

    async fn write_durably(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::other("blob path missing parent directory"))?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await
        }
        .await;
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    async fn remove_if_present(path: &Path) -> io::Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Remove empty directories from `start` up to (not including) the base.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.base_path.as_path();
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(()) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Self::write_durably(&path, &bytes).await?;
        if let Err(err) =
            Self::write_durably(&Self::sidecar_path(&path), content_type.as_bytes()).await
        {
            let _ = fs::remove_file(&path).await;
            return Err(err.into());
        }
        debug!(key, size = bytes.len(), "stored blob {}", path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        if Self::remove_if_present(&path).await? {
            debug!("removed blob {}", path.display());
        } else {
            debug!("blob {} already missing", path.display());
        }
        Self::remove_if_present(&Self::sidecar_path(&path)).await?;

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        ensure_key_safe(key)?;
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl_secs);
        Ok(self.signer.sign(key, expires_at))
    }

    /// Best-effort write/read/delete against `base_path`.
    async fn ping(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let probe = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let read_back = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if read_back? != b"readyz" {
            return Err(StoreError::Unavailable("probe file content mismatch".into()));
        }
        Ok(())
    }
}
