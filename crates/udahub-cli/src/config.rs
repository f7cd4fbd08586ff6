//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use udahub_graph::{GraphConfig, StepLimits};

/// Configuration for udahub
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model to use
    pub model: Option<String>,
    /// Provider (openai, groq, openrouter, ollama, custom)
    pub provider: Option<String>,
    /// Chat Completions endpoint override
    pub base_url: Option<String>,
    /// API key (alternative to environment variables)
    pub api_key: Option<String>,
    /// Directory holding the data file, tickets and threads
    pub data_dir: Option<PathBuf>,
    pub step_limits: StepLimits,
    pub max_graph_steps: Option<usize>,
    pub learn_from_conversations: Option<bool>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("udahub")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("UDAHUB_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file; a missing or broken file yields the defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            model: Some(DEFAULT_MODEL.to_string()),
            provider: Some("openai".to_string()),
            ..Default::default()
        };
        default_config.save_to(&path)?;
        Ok(path)
    }

    /// API key from the config, falling back to the provider's environment variable
    pub fn get_api_key(&self, env_var: Option<&str>) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        env_var.and_then(|var| std::env::var(var).ok())
    }

    /// Data directory, defaulting to the platform's local data dir
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("udahub")
        })
    }

    /// Graph tunables with unset keys left at their defaults
    pub fn graph_config(&self) -> GraphConfig {
        let defaults = GraphConfig::default();
        GraphConfig {
            step_limits: self.step_limits,
            max_graph_steps: self.max_graph_steps.unwrap_or(defaults.max_graph_steps),
            learn_from_conversations: self
                .learn_from_conversations
                .unwrap_or(defaults.learn_from_conversations),
        }
    }
}

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# udahub configuration file
# Place at ~/.config/udahub/config.toml (Linux) or set UDAHUB_CONFIG_PATH

# Model to use
model = "gpt-4o-mini"

# Provider (openai, groq, openrouter, ollama, custom)
provider = "openai"

# Endpoint override for OpenAI compatible servers
# base_url = "http://localhost:11434/v1"

# API key (optional - OPENAI_API_KEY is used otherwise)
# api_key = "sk-..."

# Where accounts, tickets and conversation threads are stored
# data_dir = "~/.local/share/udahub"

# Ceiling on node transitions per chat run
max_graph_steps = 200

# Distill reusable answers into the knowledge base after each chat
learn_from_conversations = false

[step_limits]
validation = 15
classification = 5
worker = 10
confirmation = 3
summary = 5
learning = 10
"#
}
