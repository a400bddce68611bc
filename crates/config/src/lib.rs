//! Configuration loading and validation.
//!
//! Configuration is layered with `figment`, later layers overriding earlier
//! ones:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. An optional configuration file (TOML, YAML or JSON, chosen by
//!    extension).
//! 3. Environment variables prefixed with `CARTAGE_`, with `__` separating
//!    nested keys (`CARTAGE_CACHE__MAXIMUM_SIZE=100MiB`).
//!
//! Sizes may be given as plain byte counts or human-readable strings.

pub mod error;
mod size;

use crate::error::{ErrorKind, Result};
use cartage_cache::{DEFAULT_COMPRESSION, DEFAULT_MAXIMUM_ENTRY_SIZE, DEFAULT_MAXIMUM_SIZE, IN_MEMORY};
use cartage_compress::Compression;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::size::parse_size;

const ENV_PREFIX: &str = "CARTAGE_";
const DEFAULT_CONCURRENCY: usize = 8;

/// How the resolver routes non-asset requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingMode {
    /// Cache, then network.
    #[default]
    Online,
    /// Offline database first, then cache and network on a miss.
    OfflineFirst,
}

/// What a download session does when a single resource fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Report the failure and keep downloading.
    #[default]
    Continue,
    /// Report the failure and stop scheduling further downloads.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Database file of the ambient cache, or `":memory:"`.
    pub path: PathBuf,
    #[serde(deserialize_with = "size::deserialize")]
    pub maximum_size: u64,
    #[serde(deserialize_with = "size::deserialize")]
    pub maximum_entry_size: u64,
    /// Codec for blobs written to the cache and the offline database:
    /// `"none"`, `"gzip"` or `"zstd"`.
    pub compression: Compression,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_path(|dirs| dirs.cache_dir().join("cache.db")),
            maximum_size: DEFAULT_MAXIMUM_SIZE,
            maximum_entry_size: DEFAULT_MAXIMUM_ENTRY_SIZE,
            compression: DEFAULT_COMPRESSION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory `asset://` URLs resolve against. Defaults to the working
    /// directory when unset.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Database file holding pinned resources, or `":memory:"`. May be the
    /// same file as the ambient cache.
    pub path: PathBuf,
    /// Per-entry limit for pinned resources; unlimited when unset.
    #[serde(deserialize_with = "size::deserialize_option")]
    pub maximum_entry_size: Option<u64>,
    /// Resources fetched in parallel by a download session.
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Selects `@2x` sprites when greater than 1.
    pub pixel_ratio: f32,
}
impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            path: default_path(|dirs| dirs.data_dir().join("offline.db")),
            maximum_entry_size: None,
            concurrency: DEFAULT_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
            pixel_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub mode: RoutingMode,
}

/// Everything needed to assemble a resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub assets: AssetsConfig,
    pub offline: OfflineConfig,
    pub routing: RoutingConfig,
    /// Initial access token handed to the network fetcher.
    pub access_token: Option<String>,
}

impl Config {
    /// Load and validate configuration from defaults, `file` (if any) and the
    /// environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(
            cache = %config.cache.path.display(),
            offline = %config.offline.path.display(),
            routing = ?config.routing.mode,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The layered figment, for callers that want to merge in providers of
    /// their own before extracting.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            if !file.is_file() {
                exn::bail!(ErrorKind::MissingFile(file.to_path_buf()));
            }
            let extension = file.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Reject values that load fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field, reason| exn::Exn::from(ErrorKind::Invalid { field, reason });
        if self.cache.maximum_size == 0 {
            return Err(invalid("cache.maximum_size", "must be greater than zero"));
        }
        if self.cache.maximum_entry_size == 0 {
            return Err(invalid("cache.maximum_entry_size", "must be greater than zero"));
        }
        if self.offline.maximum_entry_size == Some(0) {
            return Err(invalid("offline.maximum_entry_size", "must be greater than zero"));
        }
        if self.offline.concurrency == 0 {
            return Err(invalid("offline.concurrency", "must be greater than zero"));
        }
        if !self.offline.pixel_ratio.is_finite() || self.offline.pixel_ratio <= 0.0 {
            return Err(invalid("offline.pixel_ratio", "must be a positive number"));
        }
        if let Some(root) = &self.assets.root
            && !root.is_absolute()
        {
            return Err(invalid("assets.root", "must be an absolute path"));
        }
        Ok(())
    }
}

/// A path inside the platform's per-user directories, or in-memory storage
/// when the platform has no home directory to offer.
fn default_path(f: impl FnOnce(&ProjectDirs) -> PathBuf) -> PathBuf {
    match ProjectDirs::from("org", "cartage", "cartage") {
        Some(dirs) => f(&dirs),
        None => {
            tracing::warn!("No home directory found, falling back to in-memory storage");
            PathBuf::from(IN_MEMORY)
        },
    }
}
