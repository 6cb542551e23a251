//! Config file discovery and loading.

use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::NodeError;

/// Load configuration from the given path, or the default location, then
/// apply environment overrides.
pub fn load_config(path: Option<&str>) -> Result<Config, NodeError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    let mut config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| NodeError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        config
    } else if path.is_some() {
        return Err(NodeError::Config(format!(
            "config file not found: {}",
            config_path.display()
        )));
    } else {
        info!("no config file found, using defaults");
        Config::default()
    };

    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("rendezvous")
}

fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config(Some("/nonexistent/rendezvous.toml")).unwrap_err();
        assert!(matches!(err, NodeError::Config(msg) if msg.contains("not found")));
    }

    #[test]
    fn explicit_path_is_read() {
        let path = std::env::temp_dir().join(format!(
            "rendezvous-setup-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[transport]\ninproc_name = \"from-file\"\n").unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.transport.inproc_name, "from-file");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn config_dir_is_namespaced() {
        assert!(config_dir().ends_with("rendezvous"));
    }
}
