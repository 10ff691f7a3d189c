use anyhow::{Context, Result};
use campus_core::{ProfileOverride, ResponderId, RoutingTables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampusConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    /// Keyed by responder key (`course_advisor`) or display name
    #[serde(default)]
    pub responders: BTreeMap<String, ProfileOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_base_url() -> String {
    campus_core::providers::openai::DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub llm_router: bool,
    #[serde(default)]
    pub tables: RoutingTables,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            file: None,
        }
    }
}

fn default_db_path() -> String {
    "~/.campus/sessions.db".to_string()
}

/// Mask a secret for display: first 3 and last 4 chars when longer than 7, else "***"
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".campus")
}

impl CampusConfig {
    /// Load the config file. Without `--config`, a missing default file yields
    /// the built-in defaults so offline commands work before `campus init`.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        if custom_path.is_none() && !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    warn!(
                        "Config file {:?} is readable by other users ({:o}); it may hold an API key. \
                         Consider: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    );
                }
            }
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `campus init` first.",
                path.display()
            )
        })?;

        let expanded = expand_env_vars(&content);
        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if config.provider.api_key.starts_with("sk-") {
            warn!(
                "API key is hardcoded in config file. Prefer api_key = \"${{OPENAI_API_KEY}}\""
            );
        }

        Ok(config)
    }

    /// Responder overrides with recognised keys; unknown keys are logged and skipped
    pub fn responder_overrides(&self) -> Vec<(ResponderId, &ProfileOverride)> {
        self.responders
            .iter()
            .filter_map(|(key, ov)| match key.parse::<ResponderId>() {
                Ok(id) => Some((id, ov)),
                Err(_) => {
                    warn!("Ignoring overrides for unknown responder '{}'", key);
                    None
                }
            })
            .collect()
    }

    /// Copy safe to print: secrets masked
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        cfg.provider.api_key = mask_secret(&cfg.provider.api_key);
        cfg
    }
}

/// Environment variables that may be expanded in config files
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "CAMPUS_API_KEY",
    "CAMPUS_BASE_URL",
    "CAMPUS_MODEL",
    "CAMPUS_BIND",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();
        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }
        let value = std::env::var(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}

/// Expand a leading `~/` and `${VAR}` references in a path
pub fn shellexpand(s: &str) -> PathBuf {
    PathBuf::from(shellexpand_str(s))
}

pub fn shellexpand_str(s: &str) -> String {
    let mut result = expand_env_vars(s);
    if let Some(rest) = result.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            result = home.join(rest).display().to_string();
        }
    }
    result
}
