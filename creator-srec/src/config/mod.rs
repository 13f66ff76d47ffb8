//! Application configuration.
//!
//! Settings are read from a TOML file once at startup and handed to the
//! monitor and recorder as an immutable `Arc<AppConfig>` snapshot. Account
//! credentials may also come from the environment (or a `.env` file) so the
//! token does not have to live in the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::filename::DEFAULT_LIVESTREAM_TEMPLATE;
use crate::{Error, Result};

/// Environment variable overriding `account.token`.
pub const TOKEN_ENV: &str = "CREATOR_SREC_TOKEN";
/// Environment variable overriding `account.user_agent`.
pub const USER_AGENT_ENV: &str = "CREATOR_SREC_USER_AGENT";

const CONFIG_DIR_NAME: &str = "creator-srec";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub account: AccountConfig,
    pub paths: PathsConfig,
    pub api: ApiConfig,
    pub livestream: LivestreamConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Authorization token for the platform API and chat service.
    pub token: String,
    pub user_agent: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root folder for all downloaded media.
    pub save_location: PathBuf,
    /// Folder for the watch-list, recording locks, the media database and logs.
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            save_location: PathBuf::from("./downloads"),
            state_dir: PathBuf::from("./state"),
        }
    }
}

impl PathsConfig {
    pub fn watchlist_file(&self) -> PathBuf {
        self.state_dir.join("monitoring_state.json")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn database_url(&self) -> String {
        format!(
            "sqlite:{}?mode=rwc",
            self.state_dir.join("media.db").to_string_lossy()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub api_base_url: String,
    pub chat_ws_url: String,
    pub request_timeout_secs: u64,
    pub proxy_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://apiv3.fansly.com/api/v1".to_string(),
            chat_ws_url: "wss://chatws.fansly.com/?v=3".to_string(),
            request_timeout_secs: 30,
            proxy_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivestreamConfig {
    /// Delay between two liveness checks of the same creator.
    pub poll_interval_secs: u64,
    pub filename_template: String,
    pub record_chat: bool,
    pub convert_to_mp4: bool,
    pub generate_contact_sheet: bool,
    pub ffmpeg_path: String,
    /// Drop chat messages whose id is already on disk when saving.
    pub dedupe_chat_by_id: bool,
    pub chat: ChatTimings,
}

impl Default for LivestreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 120,
            filename_template: DEFAULT_LIVESTREAM_TEMPLATE.to_string(),
            record_chat: true,
            convert_to_mp4: true,
            generate_contact_sheet: true,
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            dedupe_chat_by_id: false,
            chat: ChatTimings::default(),
        }
    }
}

impl LivestreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Timers of a chat capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatTimings {
    pub ping_interval_ms: u64,
    pub save_interval_ms: u64,
    pub auth_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub stop_timeout_ms: u64,
    /// Pending messages that force an immediate flush.
    pub flush_threshold: usize,
}

impl Default for ChatTimings {
    fn default() -> Self {
        Self {
            ping_interval_ms: 20_000,
            save_interval_ms: 30_000,
            auth_timeout_ms: 10_000,
            read_timeout_ms: 60_000,
            reconnect_backoff_ms: 5_000,
            stop_timeout_ms: 5_000,
            flush_threshold: 100,
        }
    }
}

impl ChatTimings {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Generic webhook receiving live start/end events.
    pub webhook_url: Option<String>,
    pub webhook_headers: Vec<(String, String)>,
}

impl AppConfig {
    /// Default config file location (`<config dir>/creator-srec/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from `path`, or the default location.
    ///
    /// A missing file yields defaults; environment overrides are applied in
    /// both cases and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match resolved {
            Some(ref file) if file.exists() => {
                debug!(path = %file.display(), "Loading configuration");
                let raw = std::fs::read_to_string(file)
                    .map_err(|e| Error::io_path("reading config", file, e))?;
                Self::from_toml(&raw)?
            }
            Some(ref file) if path.is_some() => {
                return Err(Error::config(format!(
                    "config file not found: {}",
                    file.display()
                )));
            }
            _ => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config(format!("invalid config: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.trim().is_empty()
        {
            self.account.token = token.trim().to_string();
        }
        if let Ok(ua) = std::env::var(USER_AGENT_ENV)
            && !ua.trim().is_empty()
        {
            self.account.user_agent = ua.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.account.token.trim().is_empty() {
            return Err(Error::config(format!(
                "account.token is empty (set it in the config file or {})",
                TOKEN_ENV
            )));
        }
        if self.livestream.poll_interval_secs == 0 {
            return Err(Error::config("livestream.poll_interval_secs must be > 0"));
        }
        let chat = &self.livestream.chat;
        if chat.ping_interval_ms == 0 || chat.save_interval_ms == 0 {
            return Err(Error::config(
                "livestream.chat ping/save intervals must be > 0",
            ));
        }
        if chat.flush_threshold == 0 {
            return Err(Error::config("livestream.chat.flush_threshold must be > 0"));
        }
        if self.livestream.filename_template.trim().is_empty() {
            return Err(Error::config("livestream.filename_template is empty"));
        }
        Ok(())
    }

    /// Pretty TOML with the token redacted.
    pub fn show(&self) -> Result<String> {
        let mut redacted = self.clone();
        if !redacted.account.token.is_empty() {
            redacted.account.token = "<redacted>".to_string();
        }
        toml::to_string_pretty(&redacted)
            .map_err(|e| Error::config(format!("failed to render config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.livestream.poll_interval(), Duration::from_secs(120));
        assert_eq!(config.livestream.chat.flush_threshold, 100);
        assert_eq!(config.livestream.chat.stop_timeout(), Duration::from_secs(5));
        assert!(!config.livestream.dedupe_chat_by_id);
        assert!(config.api.chat_ws_url.starts_with("wss://"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
            [account]
            token = "abc"

            [livestream]
            convert_to_mp4 = false

            [livestream.chat]
            reconnect_backoff_ms = 250
        "#;
        let config = AppConfig::from_toml(raw).unwrap();
        assert_eq!(config.account.token, "abc");
        assert!(!config.livestream.convert_to_mp4);
        assert!(config.livestream.record_chat);
        assert_eq!(config.livestream.chat.reconnect_backoff_ms, 250);
        assert_eq!(config.livestream.chat.ping_interval_ms, 20_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_token_and_zero_interval() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = AppConfig::default();
        config.account.token = "t".into();
        config.livestream.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(AppConfig::from_toml("[account\ntoken=").is_err());
    }

    #[test]
    fn test_show_redacts_token() {
        let mut config = AppConfig::default();
        config.account.token = "super-secret".into();
        let shown = config.show().unwrap();
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_state_paths() {
        let paths = PathsConfig {
            save_location: PathBuf::from("/dl"),
            state_dir: PathBuf::from("/st"),
        };
        assert_eq!(paths.lock_dir(), PathBuf::from("/st/locks"));
        assert_eq!(paths.watchlist_file(), PathBuf::from("/st/monitoring_state.json"));
        assert_eq!(paths.database_url(), "sqlite:/st/media.db?mode=rwc");
    }

    #[test]
    fn test_load_missing_explicit_path_errors() {
        let err = AppConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
