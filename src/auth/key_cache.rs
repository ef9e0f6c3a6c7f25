//! Verification keys for identity tokens.
//!
//! The load balancer publishes one PEM-encoded P-256 public key per key id at
//! a regional endpoint. Keys are fetched on first use and memoized in a
//! bounded cache; an evicted key is simply fetched again on the next miss.

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use moka::{future::Cache, policy::EvictionPolicy};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

/// Default endpoint template; `{region}` is substituted per lookup.
pub const DEFAULT_KEY_ENDPOINT: &str = "https://public-keys.auth.elb.{region}.amazonaws.com";

const MAX_KEY_ID_LEN: usize = 128;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key id `{0}` is not well formed")]
    MalformedKeyId(String),
    #[error("key fetch failed: {0}")]
    Fetch(String),
    #[error("key endpoint answered {status}")]
    Status { status: u16 },
    #[error("key material is not a P-256 public key: {0}")]
    Parse(String),
}

/// Key ids end up in a URL path, so only a conservative alphabet is allowed.
pub fn is_well_formed_key_id(key_id: &str) -> bool {
    !key_id.is_empty()
        && key_id.len() <= MAX_KEY_ID_LEN
        && key_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Source of raw key material.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Return the PEM-encoded public key for `key_id` in `region`.
    async fn fetch(&self, region: &str, key_id: &str) -> Result<String, KeyError>;
}

/// Fetches keys over HTTPS from the regional key endpoint.
#[derive(Clone, Debug)]
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    endpoint_template: String,
}

impl HttpKeyFetcher {
    pub fn new(endpoint_template: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint_template: endpoint_template.into(),
        })
    }

    /// `{endpoint for region}/{key_id}`.
    pub fn key_url(&self, region: &str, key_id: &str) -> String {
        let base = self.endpoint_template.replace("{region}", region);
        format!("{}/{}", base.trim_end_matches('/'), key_id)
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self, region: &str, key_id: &str) -> Result<String, KeyError> {
        let url = self.key_url(region, key_id);
        debug!(%url, "fetching verification key");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| KeyError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(KeyError::Status {
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| KeyError::Fetch(e.to_string()))
    }
}

/// Bounded, concurrency-safe cache of parsed verification keys.
///
/// Eviction is least-recently-used, so a freshly rotated key is always
/// admitted even when the cache is full of hot keys.
///
/// Constructed once at startup and shared by reference with the verifier.
/// Concurrent misses for the same key are coalesced into one fetch.
pub struct KeyCache {
    fetcher: Arc<dyn KeyFetcher>,
    cache: Cache<(String, String), Arc<DecodingKey>>,
    fetch_timeout: Duration,
}

impl KeyCache {
    pub fn new(fetcher: Arc<dyn KeyFetcher>, max_capacity: u64, fetch_timeout: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            fetcher,
            cache,
            fetch_timeout,
        }
    }

    /// Resolve the key for `key_id` in `region`, fetching it on a miss.
    ///
    /// Failed fetches are not cached.
    pub async fn get(&self, key_id: &str, region: &str) -> Result<Arc<DecodingKey>, KeyError> {
        if !is_well_formed_key_id(key_id) {
            return Err(KeyError::MalformedKeyId(key_id.to_string()));
        }
        let cache_key = (region.to_string(), key_id.to_string());
        if let Some(key) = self.cache.get(&cache_key).await {
            return Ok(key);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.fetch_timeout;
        self.cache
            .try_get_with(cache_key, async move {
                let pem = tokio::time::timeout(timeout, fetcher.fetch(region, key_id))
                    .await
                    .map_err(|_| KeyError::Fetch(format!("timed out after {timeout:?}")))??;
                let key = DecodingKey::from_ec_pem(pem.as_bytes())
                    .map_err(|e| KeyError::Parse(e.to_string()))?;
                debug!(key_id, region, "cached verification key");
                Ok::<_, KeyError>(Arc::new(key))
            })
            .await
            .map_err(|err: Arc<KeyError>| {
                warn!(key_id, region, error = %err, "verification key unavailable");
                (*err).clone()
            })
    }

    /// Number of cached keys (approximate until pending maintenance runs).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    #[cfg(test)]
    pub(crate) async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}
