use std::path::Path;

use sm_core::Config;

use crate::error::{Result, StoreError};

/// Read `config.toml`. A missing file means defaults; a malformed one is
/// an error rather than a silent fallback.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&text)
        .map_err(|e| StoreError::InvalidData(format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}
