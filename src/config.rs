//! Bridge configuration: environment-variable driven, validated on load, with
//! two hot-reloadable slices (router tables, chat permissions) that can
//! change without a process restart.

use crate::error::{ConfigError, Result};
use crate::router::RouteRule;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub chat_bot_token: String,
    pub chat_app_token: String,
    pub default_channel: String,
    pub daemon_http_addr: String,
    pub state_path: PathBuf,
    pub router: RouterConfig,
    pub dashboard_enabled: bool,
    pub dashboard_channel: Option<String>,
    pub dashboard_interval: Duration,
    pub vcs_token: Option<String>,
    pub vcs_repos: Vec<String>,
    pub bind_addr: String,
    pub log_dir: Option<PathBuf>,
    pub debug: bool,
}

/// The router's persisted tables as loaded from config — file-sourced rules,
/// hot-reloadable via `notify`. Runtime overrides added through chat commands
/// layer on top of (and outlive) whatever this last loaded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub channels: Vec<(String, String)>,
    #[serde(default)]
    pub overrides: Vec<(String, String)>,
}

impl RouterConfig {
    pub fn rules(&self) -> Vec<RouteRule> {
        self.channels
            .iter()
            .map(|(pattern, channel_id)| RouteRule {
                pattern: pattern.clone(),
                channel_id: channel_id.clone(),
            })
            .collect()
    }
}

/// Which users may invoke which slash commands, and which channels the bot is
/// willing to operate in at all. `None` for `allowed_channels` means no
/// restriction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatPermissions {
    #[serde(default)]
    pub allowed_channels: Option<Vec<String>>,
    #[serde(default)]
    pub command_users: HashMap<String, Vec<String>>,
}

impl ChatPermissions {
    pub fn channel_allowed(&self, channel_id: &str) -> bool {
        match &self.allowed_channels {
            None => true,
            Some(channels) => channels.iter().any(|c| c == channel_id),
        }
    }

    pub fn user_allowed(&self, command: &str, user_id: &str) -> bool {
        match self.command_users.get(command) {
            None => true,
            Some(users) => users.iter().any(|u| u == user_id),
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from the environment. Missing required keys fail
    /// with `ConfigError::Invalid` / `MissingKey`, halting startup
    /// (`fatal_config`) rather than panicking.
    pub fn load() -> Result<Self> {
        let chat_bot_token = require_env("BRIDGE_CHAT_BOT_TOKEN")?;
        let chat_app_token = require_env("BRIDGE_CHAT_APP_TOKEN")?;
        let default_channel = require_env("BRIDGE_DEFAULT_CHANNEL")?;
        let daemon_http_addr = require_env("BRIDGE_DAEMON_HTTP_ADDR")?;

        let state_path = std::env::var("BRIDGE_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_state_path());

        let router = std::env::var("BRIDGE_ROUTER_CONFIG_PATH")
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();

        let dashboard_enabled = env_bool("BRIDGE_DASHBOARD_ENABLED", true);
        let dashboard_channel = std::env::var("BRIDGE_DASHBOARD_CHANNEL").ok();
        let dashboard_interval = Duration::from_secs(
            std::env::var("BRIDGE_DASHBOARD_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
        );

        let vcs_token = std::env::var("BRIDGE_VCS_TOKEN").ok();
        let vcs_repos = std::env::var("BRIDGE_VCS_REPOS")
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        let bind_addr =
            std::env::var("BRIDGE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());
        let log_dir = std::env::var("BRIDGE_LOG_DIR").ok().map(PathBuf::from);
        let debug = env_bool("BRIDGE_DEBUG", false);

        Ok(Self {
            chat_bot_token,
            chat_app_token,
            default_channel,
            daemon_http_addr,
            state_path,
            router,
            dashboard_enabled,
            dashboard_channel,
            dashboard_interval,
            vcs_token,
            vcs_repos,
            bind_addr,
            log_dir,
            debug,
        })
    }

    pub fn state_path(&self) -> &std::path::Path {
        &self.state_path
    }
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("beadbridge")
        .join("state.json")
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ConfigError::MissingKey(key.to_string()).into())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_config_rules_preserve_order() {
        let cfg = RouterConfig {
            channels: vec![
                ("gasboat/crew/*".into(), "C-CREW".into()),
                ("gasboat/crew/ops".into(), "C-OPS".into()),
            ],
            overrides: vec![],
        };
        let rules = cfg.rules();
        assert_eq!(rules[0].pattern, "gasboat/crew/*");
        assert_eq!(rules[1].channel_id, "C-OPS");
    }

    #[test]
    fn chat_permissions_default_allows_everything() {
        let perms = ChatPermissions::default();
        assert!(perms.channel_allowed("C1"));
        assert!(perms.user_allowed("/decisions", "U1"));
    }

    #[test]
    fn chat_permissions_restricts_to_listed_users() {
        let mut perms = ChatPermissions::default();
        perms
            .command_users
            .insert("/roster".into(), vec!["U1".into()]);
        assert!(perms.user_allowed("/roster", "U1"));
        assert!(!perms.user_allowed("/roster", "U2"));
    }
}
