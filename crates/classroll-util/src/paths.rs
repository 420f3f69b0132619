//! Default paths for classroll components
//!
//! - Config: `$CLASSROLL_CONFIG`, else `$XDG_CONFIG_HOME/classroll/config.toml`,
//!   else `~/.config/classroll/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the config path
pub const CLASSROLL_CONFIG_ENV: &str = "CLASSROLL_CONFIG";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "classroll";

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$CLASSROLL_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/classroll/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/classroll/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CLASSROLL_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking the CLASSROLL_CONFIG env var.
pub fn config_path_without_env() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    // Last resort
    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_contains_classroll() {
        let path = config_path_without_env();
        assert!(path.to_string_lossy().contains("classroll"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }
}
