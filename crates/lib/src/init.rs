//! Initialize the configuration directory: create ~/.reportbot, a default config file, and the
//! local share directory used by the `local` file-share backend.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with every section at its default if missing.
/// - Creates `share/<directory>/<inputs>` for the local file-share backend.
///
/// Existing files are left untouched. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config::config_dir(config_path);
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    let config = if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
        let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
        config
    } else {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).context("serializing default config")?;
        std::fs::write(config_path, json)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
        config
    };

    let inputs = config::resolve_local_share_root(&config, config_path)
        .join(config.file_share.inputs_path());
    if !inputs.exists() {
        std::fs::create_dir_all(&inputs)
            .with_context(|| format!("creating share directory {}", inputs.display()))?;
        log::info!("created local share directory at {}", inputs.display());
    }

    Ok(config_dir.to_path_buf())
}
