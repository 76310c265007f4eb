use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_EDITOR: &str = "markdown";
pub const DEFAULT_MAX_DEPTH: usize = 32;
pub const DEFAULT_MAX_NODES: usize = 10_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub hierarchy: HierarchySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub locale: Option<String>,
    pub editor: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HierarchySection {
    pub max_depth: Option<usize>,
    pub max_nodes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Login { username: String, password: String },
    Anonymous,
}

impl Credentials {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Login { .. } => "session",
            Self::Anonymous => "none",
        }
    }
}

/// Everything the GraphQL client needs, resolved from env and config.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_url: String,
    pub credentials: Credentials,
    pub locale: String,
    pub editor: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraversalLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

impl BridgeConfig {
    pub fn client_settings(&self) -> ClientSettings {
        self.client_settings_with_lookup(|key| env::var(key).ok())
    }

    pub fn client_settings_with_lookup<F>(&self, lookup_env: F) -> ClientSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| {
            lookup_env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_url = env_value("WIKIJS_API_URL")
            .or_else(|| self.wiki.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let credentials = match env_value("WIKIJS_TOKEN").or_else(|| env_value("WIKIJS_API_KEY")) {
            Some(token) => Credentials::Token(token),
            None => match (env_value("WIKIJS_USERNAME"), env_value("WIKIJS_PASSWORD")) {
                (Some(username), Some(password)) => Credentials::Login { username, password },
                _ => Credentials::Anonymous,
            },
        };
        let locale = env_value("WIKIJS_LOCALE")
            .or_else(|| self.wiki.locale.clone())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

        ClientSettings {
            api_url: api_url.trim_end_matches('/').to_string(),
            credentials,
            locale,
            editor: self
                .wiki
                .editor
                .clone()
                .unwrap_or_else(|| DEFAULT_EDITOR.to_string()),
            timeout_ms: env_value("WIKIJS_HTTP_TIMEOUT_MS")
                .and_then(|value| value.parse().ok())
                .or(self.wiki.timeout_ms)
                .unwrap_or(30_000),
            max_retries: env_value("WIKIJS_HTTP_RETRIES")
                .and_then(|value| value.parse().ok())
                .or(self.wiki.max_retries)
                .unwrap_or(2),
            retry_delay_ms: self.wiki.retry_delay_ms.unwrap_or(500),
        }
    }

    pub fn traversal_limits(&self) -> TraversalLimits {
        TraversalLimits {
            max_depth: self.hierarchy.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            max_nodes: self.hierarchy.max_nodes.unwrap_or(DEFAULT_MAX_NODES),
        }
    }

    /// Resolve log filter: env WIKIBRIDGE_LOG > config > DEFAULT_LOG_LEVEL.
    pub fn log_filter(&self) -> String {
        if let Ok(value) = env::var("WIKIBRIDGE_LOG") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.logging
            .level
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    /// Resolve log file: env WIKIBRIDGE_LOG_FILE > config > none.
    pub fn log_file(&self) -> Option<PathBuf> {
        if let Ok(value) = env::var("WIKIBRIDGE_LOG_FILE") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        self.logging.file.clone()
    }
}

/// Load and parse a BridgeConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BridgeConfig> {
    if !config_path.exists() {
        return Ok(BridgeConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BridgeConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
