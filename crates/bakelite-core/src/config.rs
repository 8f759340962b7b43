use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

/// Daemon configuration, loaded from `~/.config/bakelite/config.toml`.
/// Created with defaults on first run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory for catalog/settings/cache files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Override for the player binary; when unset the daemon searches beside
    /// the executable and on PATH.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Directory holding the static/ambience sound (`static.wav|mp3|ogg`).
    #[serde(default = "default_sounds_dir")]
    pub sounds_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: None,
            sounds_dir: default_sounds_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    platform::data_dir()
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_sounds_dir() -> PathBuf {
    platform::data_dir().join("sounds")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8787);
        assert_eq!(config.http.bind_address, "0.0.0.0");
        assert!(config.player.binary.is_none());
        assert!(config.daemon.data_dir.ends_with("bakelite"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[http]\nport = 9000\n").unwrap();
        assert_eq!(config.http.port, 9000);
        assert!(config.http.enabled);
        assert!(config.player.sounds_dir.ends_with("sounds"));
    }
}
