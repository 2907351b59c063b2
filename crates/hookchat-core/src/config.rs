//! Configuration management
//!
//! Configuration is resolved in the following priority order:
//! 1. Environment variables
//! 2. hookchat.toml configuration file
//! 3. Default values
//!
//! Inside the configuration file, `${VAR_NAME}` expands to the value of
//! the named environment variable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;

/// HTTP method used for webhook requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

/// Chat widget configuration
///
/// Immutable for the lifetime of a [`ChatManager`](crate::ChatManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Webhook endpoint URL (required)
    pub webhook_url: String,

    /// HTTP method for webhook requests
    #[serde(default)]
    pub method: HttpMethod,

    /// Extra headers attached verbatim to every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Form/query parameter name carrying the session id
    #[serde(default = "default_session_key")]
    pub session_key: String,

    /// Form/query parameter name carrying the chat input
    #[serde(default = "default_input_key")]
    pub input_key: String,

    /// Arbitrary metadata serialized into every request
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,

    /// Initial bot messages; the first becomes the welcome message
    #[serde(default)]
    pub initial_messages: Vec<String>,

    /// Whether to restore the previous session on startup
    #[serde(default = "default_load_previous_session")]
    pub load_previous_session: bool,

    /// Path to the SQLite file holding the persisted session id
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_session_key() -> String {
    "sessionId".to_string()
}

fn default_input_key() -> String {
    "chatInput".to_string()
}

fn default_load_previous_session() -> bool {
    true
}

fn default_db_path() -> String {
    "data/hookchat.db".to_string()
}

impl ChatConfig {
    /// Create a configuration with defaults for everything but the URL
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            method: HttpMethod::default(),
            headers: HashMap::new(),
            session_key: default_session_key(),
            input_key: default_input_key(),
            metadata: None,
            initial_messages: Vec::new(),
            load_previous_session: default_load_previous_session(),
            db_path: default_db_path(),
        }
    }

    /// Expand `${VAR_NAME}` references with environment variable values
    ///
    /// Unknown variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // consume '{'

                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(chars.next().unwrap());
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file
    ///
    /// `${VAR_NAME}` references in the file are expanded before parsing,
    /// and environment variables override the parsed values.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded_content = Self::expand_env_vars(&toml_content);

        let mut config: ChatConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from the default locations
    ///
    /// Tries `./hookchat.toml` first, falling back to environment
    /// variables only.
    pub fn load() -> crate::Result<Self> {
        if Path::new("hookchat.toml").exists() {
            return Self::from_toml_file("hookchat.toml");
        }

        Self::from_env()
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> crate::Result<Self> {
        let webhook_url = std::env::var("HOOKCHAT_WEBHOOK_URL")
            .map_err(|_| Error::Config("HOOKCHAT_WEBHOOK_URL not set".to_string()))?;

        let mut config = Self::new(webhook_url);
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Override settings from environment variables
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("HOOKCHAT_WEBHOOK_URL") {
            if !url.is_empty() {
                self.webhook_url = url;
            }
        }

        if let Ok(method) = std::env::var("HOOKCHAT_METHOD") {
            self.method = match method.to_uppercase().as_str() {
                "GET" => HttpMethod::Get,
                _ => HttpMethod::Post,
            };
        }

        if let Ok(key) = std::env::var("HOOKCHAT_SESSION_KEY") {
            if !key.is_empty() {
                self.session_key = key;
            }
        }

        if let Ok(key) = std::env::var("HOOKCHAT_INPUT_KEY") {
            if !key.is_empty() {
                self.input_key = key;
            }
        }

        if let Ok(load) = std::env::var("HOOKCHAT_LOAD_PREVIOUS_SESSION") {
            self.load_previous_session = load.to_lowercase() != "false";
        }

        if let Ok(path) = std::env::var("HOOKCHAT_DB_PATH") {
            if !path.is_empty() {
                self.db_path = path;
            }
        }
    }

    /// Check required settings
    fn validate(&self) -> crate::Result<()> {
        if self.webhook_url.is_empty() {
            return Err(Error::Config("webhook_url must not be empty".to_string()));
        }
        Ok(())
    }
}
