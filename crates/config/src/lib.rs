//! Runtime configuration.
//!
//! Tunables are layered: built-in defaults, then an optional TOML file in
//! the platform config directory, then `ZAPP_`-prefixed environment
//! variables. Later layers win per field, so a config file can set one
//! value without restating the rest.

pub mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ErrorKind, Result};

const ENV_PREFIX: &str = "ZAPP_";
const CONFIG_FILE: &str = "config.toml";

/// Tunables for the data-access layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Quiet period between a store change and the live-query re-run.
    pub debounce_ms: u64,
    /// Rows per window in paged listings.
    pub page_size: i64,
    /// Maximum rows returned by a search.
    pub search_cap: i64,
    /// Entries kept in the recently-viewed list.
    pub recent_limit: i64,
    /// Entries kept in the metadata response cache.
    pub cache_capacity: usize,
    /// Metadata cache entry lifetime; absent means entries never expire.
    pub cache_ttl_secs: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            page_size: 100,
            search_cap: 100,
            recent_limit: 30,
            cache_capacity: 512,
            cache_ttl_secs: Some(6 * 60 * 60),
        }
    }
}

impl RuntimeConfig {
    /// Load from the platform config directory and the environment.
    pub fn load() -> Result<Self> {
        let file = default_config_path();
        if let Some(path) = &file {
            debug!(path = %path.display(), "loading configuration");
        }
        Self::load_layered(file.as_deref())
    }

    /// Load with an explicit file path (absent file is fine; defaults and
    /// environment still apply).
    pub fn load_layered(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size < 1 {
            exn::bail!(ErrorKind::Invalid("page_size must be at least 1"));
        }
        if self.search_cap < 1 {
            exn::bail!(ErrorKind::Invalid("search_cap must be at least 1"));
        }
        if self.recent_limit < 1 {
            exn::bail!(ErrorKind::Invalid("recent_limit must be at least 1"));
        }
        if self.cache_capacity == 0 {
            exn::bail!(ErrorKind::Invalid("cache_capacity must be at least 1"));
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "zapp", "zapp").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
