use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "EDGECAM_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "edgecam";
const APPLICATION: &str = "edgecam";
const CONFIG_FILE: &str = "edgecam.toml";

/// Location of the config file used when `--config` is not given.
///
/// `EDGECAM_CONFIG_DIR` overrides the platform config directory.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(ENV_CONFIG_DIR).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir).join(CONFIG_FILE));
    }
    let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .ok_or_else(|| anyhow!("failed to determine user directories"))?;
    Ok(project_dirs.config_dir().join(CONFIG_FILE))
}
