use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::Mode;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Telegram user id of the only account allowed to drive the bot.
    #[serde(default)]
    pub admin_id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForwardingConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Mode used when no state file exists yet (or it had to be reset).
    #[serde(default)]
    pub default_mode: Mode,
    /// Offer one confirmation button per target next to "Send to all".
    #[serde(default = "default_true")]
    pub per_target_buttons: bool,
    /// Only relay messages that were themselves forwarded to the bot.
    #[serde(default)]
    pub forwarded_only: bool,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeepAliveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_heartbeat_cron")]
    pub heartbeat_cron: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_backoff_initial_secs")]
    pub conflict_backoff_initial_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub conflict_backoff_max_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_state_path() -> PathBuf {
    PathBuf::from("forwarder_state.json")
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_heartbeat_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_backoff_initial_secs() -> u64 {
    5
}

fn default_backoff_max_secs() -> u64 {
    120
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            default_mode: Mode::default(),
            per_target_buttons: default_true(),
            forwarded_only: false,
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_host(),
            port: default_port(),
            heartbeat_cron: default_heartbeat_cron(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            conflict_backoff_initial_secs: default_backoff_initial_secs(),
            conflict_backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

impl ForwardingConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }
}

impl PollingConfig {
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.conflict_backoff_initial_secs.max(1))
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(
            self.conflict_backoff_max_secs
                .max(self.conflict_backoff_initial_secs)
                .max(1),
        )
    }
}

impl Config {
    /// Load the config file (if present), apply environment overrides and
    /// validate the result. A missing file is fine as long as the
    /// environment provides the credentials.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment values win over the file; hosting platforms usually only
    /// let you set env vars (and hand out the port in `PORT`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = token.trim().to_string();
        }
        if let Some(admin) = lookup("ADMIN_ID") {
            self.telegram.admin_id = admin
                .trim()
                .parse()
                .with_context(|| format!("ADMIN_ID is not a numeric user id: {admin:?}"))?;
        }
        if let Some(port) = lookup("PORT") {
            self.keep_alive.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {port:?}"))?;
        }
        if let Some(path) = lookup("STATE_PATH").filter(|p| !p.trim().is_empty()) {
            self.forwarding.state_path = PathBuf::from(path.trim());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!(
                "Missing bot token: set [telegram] bot_token in the config file or BOT_TOKEN in the environment"
            );
        }
        if self.telegram.admin_id == 0 {
            anyhow::bail!(
                "Missing admin id: set [telegram] admin_id in the config file or ADMIN_ID in the environment"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_full_config_parses() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "123:abc"
            admin_id = 42

            [forwarding]
            state_path = "data/state.json"
            default_mode = "manual"
            per_target_buttons = false
            forwarded_only = true
            send_timeout_secs = 10

            [keep_alive]
            enabled = false
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.admin_id, 42);
        assert_eq!(config.forwarding.default_mode, Mode::Manual);
        assert_eq!(config.forwarding.state_path, PathBuf::from("data/state.json"));
        assert!(!config.forwarding.per_target_buttons);
        assert!(config.forwarding.forwarded_only);
        assert_eq!(config.forwarding.send_timeout(), Duration::from_secs(10));
        assert!(!config.keep_alive.enabled);
        assert_eq!(config.keep_alive.port, 9000);
        assert_eq!(config.keep_alive.host, "0.0.0.0");
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::parse("[telegram]\nbot_token = \"t\"\nadmin_id = 1\n").unwrap();
        assert_eq!(config.forwarding.default_mode, Mode::Auto);
        assert_eq!(
            config.forwarding.state_path,
            PathBuf::from("forwarder_state.json")
        );
        assert!(config.forwarding.per_target_buttons);
        assert_eq!(config.keep_alive.port, 8080);
        assert_eq!(config.keep_alive.heartbeat_cron, "0 0 * * * *");
        assert_eq!(config.polling.backoff_initial(), Duration::from_secs(5));
        assert_eq!(config.polling.backoff_max(), Duration::from_secs(120));
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = Config::parse("[telegram]\nbot_token = \"file\"\nadmin_id = 1\n").unwrap();
        config
            .apply_overrides(env(&[
                ("BOT_TOKEN", "env-token"),
                ("ADMIN_ID", " 777 "),
                ("PORT", "10000"),
                ("STATE_PATH", "/data/state.json"),
            ]))
            .unwrap();
        assert_eq!(config.telegram.bot_token, "env-token");
        assert_eq!(config.telegram.admin_id, 777);
        assert_eq!(config.keep_alive.port, 10000);
        assert_eq!(
            config.forwarding.state_path,
            PathBuf::from("/data/state.json")
        );
    }

    #[test]
    fn test_bad_admin_id_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("ADMIN_ID", "not-a-number")]))
            .unwrap_err();
        assert!(err.to_string().contains("ADMIN_ID"));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = Config::default();
        assert!(config.validate().unwrap_err().to_string().contains("bot token"));

        config.telegram.bot_token = "123:abc".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("admin id"));

        config.telegram.admin_id = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_parses_to_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.telegram.admin_id, 0);
        assert!(config.telegram.bot_token.is_empty());
        assert!(config.keep_alive.enabled);
    }
}
