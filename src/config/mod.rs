//! Configuration management for Beacon call

pub mod file;

use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::{Error, Result};

/// Default agent endpoint (local development server)
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3000/api/v1/voice/call";

/// Default silence timeout before an idle conversation is ended
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Language announced to the agent
pub const DEFAULT_LANGUAGE: &str = "en";

/// Beacon call configuration
///
/// Immutable once handed to a conversation controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Agent WebSocket endpoint
    pub endpoint: Url,

    /// How long the conversation may stay silent while listening
    pub silence_timeout: Duration,

    /// Agent identifier sent in the metadata frame
    pub agent_id: String,

    /// Language sent in the metadata frame
    pub language: String,

    /// Cosmetic options, consumed only by presentation shells
    pub presentation: Presentation,
}

/// Cosmetic options for presentation shells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presentation {
    /// Where the floating button sits
    pub button_position: ButtonPosition,

    /// Colour theme
    pub theme: Theme,
}

/// Floating button placement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonPosition {
    #[default]
    BottomRight,
    TopRight,
}

impl ButtonPosition {
    /// Parse a placement name, falling back to bottom-right for anything unknown
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "top-right" => Self::TopRight,
            "bottom-right" => Self::BottomRight,
            other => {
                tracing::debug!(position = other, "unknown button position, using bottom-right");
                Self::BottomRight
            }
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BottomRight => "bottom-right",
            Self::TopRight => "top-right",
        }
    }
}

/// Colour theme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_color: "#2A59F1".to_string(),
            secondary_color: "#FFF".to_string(),
            background_color: "#EDF1FF".to_string(),
            text_color: "#1F2937".to_string(),
        }
    }
}

impl Theme {
    fn colors(&self) -> [(&'static str, &str); 4] {
        [
            ("primary_color", &self.primary_color),
            ("secondary_color", &self.secondary_color),
            ("background_color", &self.background_color),
            ("text_color", &self.text_color),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            agent_id: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            presentation: Presentation::default(),
        }
    }
}

impl Config {
    /// Create a configuration for `endpoint` with all other values defaulted
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a valid `ws`/`wss` URL
    pub fn new(endpoint: &str) -> Result<Self> {
        let config = Self {
            endpoint: Url::parse(endpoint)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults overlaid with the TOML file
    ///
    /// `path` overrides the standard config file location.
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(file::load_config_file(path))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values present in a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if the file's endpoint cannot be parsed
    pub fn apply_file(&mut self, fc: file::CallConfigFile) -> Result<()> {
        if let Some(url) = fc.agent.url {
            self.endpoint = Url::parse(&url)?;
        }
        if let Some(id) = fc.agent.id {
            self.agent_id = id;
        }
        if let Some(language) = fc.agent.language {
            self.language = language;
        }
        if let Some(ms) = fc.conversation.silence_timeout_ms {
            self.silence_timeout = Duration::from_millis(ms);
        }
        if let Some(position) = fc.presentation.button_position {
            self.presentation.button_position = ButtonPosition::parse_lenient(&position);
        }

        let theme = fc.presentation.theme;
        let current = &mut self.presentation.theme;
        for (slot, value) in [
            (&mut current.primary_color, theme.primary_color),
            (&mut current.secondary_color, theme.secondary_color),
            (&mut current.background_color, theme.background_color),
            (&mut current.text_color, theme.text_color),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }

        Ok(())
    }

    /// Check invariants the controller relies on
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.endpoint.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "endpoint must use ws:// or wss://, got {}",
                self.endpoint
            )));
        }

        if self.silence_timeout.is_zero() {
            return Err(Error::Config(
                "silence timeout must be greater than zero".to_string(),
            ));
        }

        if self.language.trim().is_empty() {
            return Err(Error::Config("language must not be empty".to_string()));
        }

        for (name, value) in self.presentation.theme.colors() {
            if !is_hex_color(value) {
                return Err(Error::Config(format!(
                    "theme.{name} must be #RGB or #RRGGBB, got {value:?}"
                )));
            }
        }

        Ok(())
    }
}

fn is_hex_color(value: &str) -> bool {
    value.strip_prefix('#').is_some_and(|hex| {
        matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
    })
}
