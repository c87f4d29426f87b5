pub mod config_cmd;
pub mod doctor;
pub mod generate;

use std::path::Path;

use banter_config::{AppConfig, ConfigError};

/// Load from an explicit path (which must exist) or the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) if !path.exists() => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: "file not found".into(),
        }),
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}
