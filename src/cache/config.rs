//! Configuration for the artifact cache.
//!
//! Resolves the cache directory and link mode from `ARTIFACT_CACHE_*`
//! environment variables with XDG-compliant fallback paths. The cache core
//! never reads the environment itself; callers resolve a configuration and
//! hand it to [`ArtifactCache::from_config`](super::ArtifactCache::from_config).

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

use super::content::LinkMode;
use crate::error::{CacheError, ConfigError, ConfigResult};

/// Subdirectory used beneath the user's cache home.
const CACHE_SUBDIR: &str = "artifact-cache";

/// Captures artifact cache settings supplied via environment variables.
///
/// # Examples
/// ```
/// use artifact_cache::CacheEnvCfg;
///
/// let cfg = CacheEnvCfg::default();
/// assert!(cfg.dir.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "ARTIFACT_CACHE")]
pub struct CacheEnvCfg {
    /// Cache root directory (`ARTIFACT_CACHE_DIR`).
    pub dir: Option<Utf8PathBuf>,
    /// How entries reference blobs (`ARTIFACT_CACHE_LINK_MODE`): `hardlink`
    /// or `copy`.
    pub link_mode: Option<String>,
}

impl CacheEnvCfg {
    /// Loads configuration from environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a variable is present but cannot be
    /// deserialised.
    pub fn load() -> ConfigResult<Self> {
        let args = [OsString::from("artifact-cache")];
        Self::load_from_iter(args).map_err(|err| ConfigError::from(eyre!(err)))
    }
}

/// Resolved configuration for an artifact cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCacheConfig {
    /// Root directory of the cache.
    pub cache_dir: Utf8PathBuf,
    /// How entry content references blobs.
    pub link_mode: LinkMode,
}

impl ArtifactCacheConfig {
    /// Creates a configuration using the fallback cache directory and hard links.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dir(resolve_cache_dir())
    }

    /// Creates a configuration with a custom directory and hard links.
    #[must_use]
    pub const fn with_dir(cache_dir: Utf8PathBuf) -> Self {
        Self {
            cache_dir,
            link_mode: LinkMode::HardLink,
        }
    }

    /// Loads the configuration from `ARTIFACT_CACHE_*` environment variables.
    ///
    /// A blank `ARTIFACT_CACHE_DIR` is ignored in favour of
    /// [`resolve_cache_dir`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the environment cannot be read or
    /// `ARTIFACT_CACHE_LINK_MODE` names an unknown mode.
    pub fn load() -> ConfigResult<Self> {
        let env = CacheEnvCfg::load()?;
        Self::from_env_cfg(env)
    }

    fn from_env_cfg(env: CacheEnvCfg) -> ConfigResult<Self> {
        let cache_dir = env
            .dir
            .filter(|dir| !dir.as_str().trim().is_empty())
            .unwrap_or_else(resolve_cache_dir);
        let link_mode = match env.link_mode.as_deref().map(str::trim) {
            None | Some("") => LinkMode::default(),
            Some(raw) => raw
                .parse()
                .map_err(|err: CacheError| ConfigError::from(err.into_report()))?,
        };
        Ok(Self {
            cache_dir,
            link_mode,
        })
    }
}

impl Default for ArtifactCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the fallback cache directory from XDG conventions.
///
/// The resolution order is:
///
/// 1. `$XDG_CACHE_HOME/artifact-cache` if `XDG_CACHE_HOME` is set
/// 2. `~/.cache/artifact-cache` as fallback
/// 3. `/tmp/artifact-cache` as last resort
///
/// # Examples
///
/// ```
/// use artifact_cache::resolve_cache_dir;
///
/// let cache_dir = resolve_cache_dir();
/// assert!(cache_dir.as_str().ends_with("artifact-cache"));
/// ```
#[must_use]
pub fn resolve_cache_dir() -> Utf8PathBuf {
    resolve_from_xdg_cache()
        .or_else(resolve_from_home)
        .unwrap_or_else(|| Utf8PathBuf::from("/tmp").join(CACHE_SUBDIR))
}

/// Attempts to resolve cache directory from `XDG_CACHE_HOME`.
fn resolve_from_xdg_cache() -> Option<Utf8PathBuf> {
    let raw = std::env::var("XDG_CACHE_HOME").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = Utf8PathBuf::from_path_buf(PathBuf::from(trimmed)).ok()?;
    Some(path.join(CACHE_SUBDIR))
}

/// Attempts to resolve cache directory from home directory.
fn resolve_from_home() -> Option<Utf8PathBuf> {
    let home = dirs::home_dir()?;
    let path = Utf8PathBuf::from_path_buf(home).ok()?;
    Some(path.join(".cache").join(CACHE_SUBDIR))
}
