//! Storage root resolution.
//!
//! Priority: `--storage-root` > `CHATMEND_STORAGE_ROOT` env > the platform
//! config dir for the selected variant.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chatmend_engine::{StorageConfig, Variant};

pub const STORAGE_ROOT_ENV: &str = "CHATMEND_STORAGE_ROOT";

/// Resolve from explicit inputs only; callers pass the environment in.
pub fn resolve_storage_root(
    explicit: Option<&Path>,
    env: Option<OsString>,
    variant: Variant,
    config_dir: Option<PathBuf>,
) -> anyhow::Result<StorageConfig> {
    if let Some(path) = explicit {
        return Ok(StorageConfig::new(path, variant));
    }
    if let Some(value) = env.filter(|v| !v.is_empty()) {
        return Ok(StorageConfig::new(PathBuf::from(value), variant));
    }
    let config_dir = config_dir.context("no platform config directory; pass --storage-root")?;
    Ok(StorageConfig::platform_default(&config_dir, variant))
}

/// [`resolve_storage_root`] against the real process environment.
pub fn storage_config(explicit: Option<&Path>, variant: Variant) -> anyhow::Result<StorageConfig> {
    resolve_storage_root(
        explicit,
        std::env::var_os(STORAGE_ROOT_ENV),
        variant,
        dirs::config_dir(),
    )
}
