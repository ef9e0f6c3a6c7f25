use crate::{
    auth::key_cache::DEFAULT_KEY_ENDPOINT, services::file_service::DEFAULT_MAX_UPLOAD_BYTES,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr, time::Duration};

/// Header the load balancer puts the signed identity assertion in.
pub const DEFAULT_TOKEN_HEADER: &str = "x-amzn-oidc-data";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Issuer scope used to locate verification keys.
    pub region: String,
    /// Key endpoint template; `{region}` is substituted.
    pub key_endpoint: String,
    /// Load balancer ARN tokens must be signed by, if set.
    pub expected_signer: Option<String>,
    pub token_header: String,
    pub max_upload_bytes: usize,
    /// Externally reachable base URL, used in download links.
    pub public_url: String,
    pub presign_secret: Option<String>,
    pub key_cache_capacity: u64,
    pub upstream_timeout_secs: u64,
    pub token_leeway_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Owner-scoped file and text gateway")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Region of the identity-issuing load balancer (overrides GATEWAY_REGION / AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Base URL used in issued download links (overrides GATEWAY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values from `lookup` over defaults.
    pub fn from_sources(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // --- Environment fallback ---
        let env_host = non_empty("GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&non_empty, "GATEWAY_PORT", 3000u16)?;
        let env_storage =
            non_empty("GATEWAY_STORAGE_DIR").unwrap_or_else(|| "./data/blobs".into());
        let env_db = non_empty("GATEWAY_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/gateway.db".into());
        let env_region = non_empty("GATEWAY_REGION")
            .or_else(|| non_empty("AWS_REGION"))
            .unwrap_or_else(|| "us-east-1".into());

        // --- Merge ---
        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_url = args
            .public_url
            .or_else(|| non_empty("GATEWAY_PUBLIC_URL"))
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let cfg = Self {
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            region: args.region.unwrap_or(env_region),
            key_endpoint: non_empty("GATEWAY_KEY_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_KEY_ENDPOINT.into()),
            expected_signer: non_empty("GATEWAY_EXPECTED_SIGNER"),
            token_header: non_empty("GATEWAY_TOKEN_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_TOKEN_HEADER.into()),
            max_upload_bytes: parse_var(
                &non_empty,
                "GATEWAY_MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            presign_secret: non_empty("GATEWAY_PRESIGN_SECRET"),
            key_cache_capacity: parse_var(&non_empty, "GATEWAY_KEY_CACHE_CAPACITY", 256u64)?,
            upstream_timeout_secs: parse_var(&non_empty, "GATEWAY_UPSTREAM_TIMEOUT_SECS", 5u64)?,
            token_leeway_secs: parse_var(&non_empty, "GATEWAY_TOKEN_LEEWAY_SECS", 0u64)?,
            host,
            port,
            public_url,
        };

        if cfg.upstream_timeout_secs == 0 {
            anyhow::bail!("GATEWAY_UPSTREAM_TIMEOUT_SECS must be greater than zero");
        }
        if cfg.key_cache_capacity == 0 {
            anyhow::bail!("GATEWAY_KEY_CACHE_CAPACITY must be greater than zero");
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("region", &self.region)
            .field("key_endpoint", &self.key_endpoint)
            .field("expected_signer", &self.expected_signer)
            .field("token_header", &self.token_header)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("public_url", &self.public_url)
            .field(
                "presign_secret",
                &self.presign_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("key_cache_capacity", &self.key_cache_capacity)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("token_leeway_secs", &self.token_leeway_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_env() {
        let cfg = AppConfig::from_sources(Args::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.token_header, "x-amzn-oidc-data");
        assert_eq!(cfg.max_upload_bytes, 40 * 1024 * 1024);
        assert_eq!(cfg.public_url, "http://0.0.0.0:3000");
        assert_eq!(cfg.upstream_timeout(), Duration::from_secs(5));
        assert!(cfg.presign_secret.is_none());
    }

    #[test]
    fn cli_overrides_env_and_region_falls_back_to_aws() {
        let args = Args {
            port: Some(8080),
            ..Args::default()
        };
        let cfg = AppConfig::from_sources(
            args,
            lookup(&[
                ("GATEWAY_PORT", "9000"),
                ("AWS_REGION", "eu-west-1"),
                ("GATEWAY_TOKEN_HEADER", "X-Identity"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.region, "eu-west-1");
        assert_eq!(cfg.token_header, "x-identity");
    }

    #[test]
    fn invalid_numbers_are_startup_errors() {
        let err = AppConfig::from_sources(Args::default(), lookup(&[("GATEWAY_PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("GATEWAY_PORT"));

        assert!(
            AppConfig::from_sources(
                Args::default(),
                lookup(&[("GATEWAY_UPSTREAM_TIMEOUT_SECS", "0")])
            )
            .is_err()
        );
    }

    #[test]
    fn debug_output_redacts_the_presign_secret() {
        let cfg = AppConfig::from_sources(
            Args::default(),
            lookup(&[("GATEWAY_PRESIGN_SECRET", "hunter2")]),
        )
        .unwrap();
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
