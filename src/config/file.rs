//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-call/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CallConfigFile {
    /// Agent channel configuration
    #[serde(default)]
    pub agent: AgentFileConfig,

    /// Conversation timing
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// Cosmetic options for presentation shells
    #[serde(default)]
    pub presentation: PresentationFileConfig,
}

/// Remote agent configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// WebSocket endpoint (e.g. "wss://agents.example.com/api/v1/voice/call")
    pub url: Option<String>,

    /// Agent identifier announced in the metadata frame
    pub id: Option<String>,

    /// Language announced in the metadata frame
    pub language: Option<String>,
}

/// Conversation timing configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Silence timeout in milliseconds
    pub silence_timeout_ms: Option<u64>,
}

/// Presentation configuration
#[derive(Debug, Default, Deserialize)]
pub struct PresentationFileConfig {
    /// "bottom-right" or "top-right"
    pub button_position: Option<String>,

    #[serde(default)]
    pub theme: ThemeFileConfig,
}

/// Theme colour overrides
#[derive(Debug, Default, Deserialize)]
pub struct ThemeFileConfig {
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
}

/// Load the TOML config file from `path`, or from the standard path when `None`
///
/// Returns `CallConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> CallConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return CallConfigFile::default();
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file");
        return CallConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CallConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CallConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-call/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-call")
            .join("config.toml")
    })
}
