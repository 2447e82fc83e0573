use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use xdg::BaseDirectories;

pub const APP_NAME: &str = "gerrit-dispatch";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ssh: SshConfig,
}

/// System-wide SSH settings. `private_key` and `username` form the default
/// credential used when no per-user one resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub port: u16,
    pub private_key: PathBuf,
    pub username: String,
    /// Passed through as `-o StrictHostKeyChecking=<value>`
    pub strict_host_key_checking: String,
    pub connect_timeout_secs: Option<u64>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: 22,
            private_key: PathBuf::new(),
            username: String::new(),
            strict_host_key_checking: "accept-new".to_owned(),
            connect_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid config TOML")
    }

    /// ~/.config/gerrit-dispatch/config.toml
    pub fn config_path() -> Option<PathBuf> {
        config_home().map(|dir| dir.join("config.toml"))
    }

    /// ~/.config/gerrit-dispatch/preferences.toml
    pub fn default_preferences_path() -> Option<PathBuf> {
        config_home().map(|dir| dir.join("preferences.toml"))
    }
}

pub fn config_home() -> Option<PathBuf> {
    BaseDirectories::with_prefix(APP_NAME)
        .ok()
        .map(|dirs| dirs.get_config_home())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ssh.port, 22);
        assert!(config.ssh.private_key.as_os_str().is_empty());
        assert!(config.ssh.username.is_empty());
        assert_eq!(config.ssh.strict_host_key_checking, "accept-new");
        assert_eq!(config.ssh.connect_timeout_secs, None);
    }

    #[test]
    fn test_parse_partial_keeps_defaults() {
        let config = Config::parse(
            r#"
[ssh]
port = 29418
username = "jenkins"
"#,
        )
        .unwrap();
        assert_eq!(config.ssh.port, 29418);
        assert_eq!(config.ssh.username, "jenkins");
        assert_eq!(config.ssh.strict_host_key_checking, "accept-new");
    }

    #[test]
    fn test_parse_full() {
        let config = Config::parse(
            r#"
[ssh]
port = 2222
private_key = "/etc/gerrit/id_ed25519"
username = "bot"
strict_host_key_checking = "yes"
connect_timeout_secs = 10
"#,
        )
        .unwrap();
        assert_eq!(config.ssh.private_key, PathBuf::from("/etc/gerrit/id_ed25519"));
        assert_eq!(config.ssh.strict_host_key_checking, "yes");
        assert_eq!(config.ssh.connect_timeout_secs, Some(10));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Config::parse("[ssh]\nport = \"not a port\"").is_err());
    }

    #[test]
    fn test_load_from_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    #[serial]
    fn test_load_reads_xdg_config_home() {
        let dir = tempfile::tempdir().unwrap();
        let orig = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", dir.path());

        let app_dir = dir.path().join(APP_NAME);
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(app_dir.join("config.toml"), "[ssh]\nport = 29418\n").unwrap();

        let config = Config::load().unwrap();
        assert_eq!(config.ssh.port, 29418);
        assert_eq!(
            Config::default_preferences_path().unwrap(),
            app_dir.join("preferences.toml")
        );

        match orig {
            Some(v) => env::set_var("XDG_CONFIG_HOME", v),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let orig = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", dir.path());

        let config = Config::load().unwrap();
        assert_eq!(config.ssh.port, 22);

        match orig {
            Some(v) => env::set_var("XDG_CONFIG_HOME", v),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}
