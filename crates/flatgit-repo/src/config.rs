use std::path::Path;
use std::time::Duration;

use flatgit_kv::Location;
use flatgit_lock::{ClockPolicy, LockOptions};
use flatgit_pack::DEFAULT_COMPRESSION_LEVEL;
use flatgit_refs::validate_branch_name;
use flatgit_store::{DEFAULT_CACHE_CAPACITY, DEFAULT_PACK_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Everything needed to open a [`Repository`](crate::Repository).
///
/// Loaded from TOML; every field except `location` has a default.
///
/// ```toml
/// location = "file:///srv/git/app"
/// default_branch = "main"
///
/// [lock]
/// strategy = "timestamp"
/// timeout_ms = 30000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Connection string, `scheme://[id[:secret]@]bucket[:prefix]`.
    pub location: String,
    /// Overrides the prefix from the connection string.
    pub prefix: Option<String>,
    /// Branch `HEAD` points at in a fresh repository.
    pub default_branch: String,
    pub cache: CacheConfig,
    pub pack: PackConfig,
    pub lock: LockConfig,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            prefix: None,
            default_branch: "main".into(),
            cache: CacheConfig::default(),
            pack: PackConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

impl RepoConfig {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> RepoResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RepoError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string(self).map_err(|e| RepoError::Config(e.to_string()))
    }

    /// Parsed connection string.
    pub fn parsed_location(&self) -> RepoResult<Location> {
        if self.location.trim().is_empty() {
            return Err(RepoError::Config("no storage location configured".into()));
        }
        self.location
            .parse()
            .map_err(|e: flatgit_kv::KvError| RepoError::Config(e.to_string()))
    }

    /// Check the settings that can be checked without touching storage.
    pub fn validate(&self) -> RepoResult<()> {
        self.parsed_location()?;
        validate_branch_name(&self.default_branch)
            .map_err(|e| RepoError::Config(format!("default_branch: {e}")))?;
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(RepoError::Config("cache.capacity must be positive".into()));
        }
        if !(1..=22).contains(&self.pack.compression_level) {
            return Err(RepoError::Config(format!(
                "pack.compression_level {} outside 1..=22",
                self.pack.compression_level
            )));
        }
        if self.lock.poll_interval_ms == 0 {
            return Err(RepoError::Config("lock.poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Batches at least this large are written as one pack; 0 disables.
    pub threshold: usize,
    /// How long a pack listing is trusted before it is taken again.
    pub freshness_secs: u64,
    pub compression_level: i32,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PACK_THRESHOLD,
            freshness_secs: 300,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl PackConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }
}

/// Which lock strategy guards multi-ref updates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    /// Version ordering when the store keeps versions, timestamps otherwise.
    #[default]
    Auto,
    Version,
    Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub strategy: LockKind,
    pub poll_interval_ms: u64,
    pub timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    /// Refuse timestamp-lock markers stamped too far from local time.
    pub strict_clock: bool,
    pub max_skew_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            strategy: LockKind::Auto,
            poll_interval_ms: 1000,
            timeout_ms: None,
            max_attempts: None,
            strict_clock: false,
            max_skew_ms: 5000,
        }
    }
}

impl LockConfig {
    pub fn options(&self) -> LockOptions {
        LockOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: self.timeout_ms.map(Duration::from_millis),
            max_attempts: self.max_attempts,
        }
    }

    pub fn clock_policy(&self) -> ClockPolicy {
        if self.strict_clock {
            ClockPolicy::Strict {
                max_skew: Duration::from_millis(self.max_skew_ms),
            }
        } else {
            ClockPolicy::Trusting
        }
    }
}
