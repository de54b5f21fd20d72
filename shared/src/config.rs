//! Provider configuration handed over by the shell at start-up.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_VOICE_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE_NAME: &str = "Kore";
/// Colloquial "nearby" / "buy" in the assistant's locale.
pub const DEFAULT_PLACE_TRIGGERS: &[&str] = &["cerca", "comprar"];
pub const API_KEY_HEADER: &str = "x-goog-api-key";

pub const MAX_URL_LENGTH: usize = 2048;
const MAX_MODEL_NAME_LENGTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("API key is missing")]
    MissingApiKey,

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid model name '{0}'")]
    InvalidModel(String),

    #[error("invalid voice name '{0}'")]
    InvalidVoice(String),
}

/// Raw settings as the shell sends them.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    pub api_key: String,
    pub api_base_url: Option<String>,
    pub text_model: Option<String>,
    pub voice_model: Option<String>,
    pub voice_name: Option<String>,
    pub place_triggers: Option<Vec<String>>,
}

// Redact debug output because this carries the provider credential.
impl fmt::Debug for ShellConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellConfig")
            .field("api_key_present", &!self.api_key.is_empty())
            .field("api_base_url", &self.api_base_url)
            .field("text_model", &self.text_model)
            .field("voice_model", &self.voice_model)
            .field("voice_name", &self.voice_name)
            .field("place_triggers", &self.place_triggers)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    url: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: Self::truncate_url(&url),
            reason: reason.to_string(),
        };

        if url.trim().is_empty() {
            return Err(invalid("URL cannot be empty"));
        }
        if url.len() > MAX_URL_LENGTH {
            return Err(invalid("URL exceeds maximum length"));
        }

        let parsed = Url::parse(url.trim()).map_err(|e| invalid(&e.to_string()))?;

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(invalid("only 'http' and 'https' are allowed"));
        }
        if parsed.host_str().is_none() {
            return Err(invalid("URL must have a host"));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(invalid("credentials in URL are not allowed"));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(invalid("base URL must not carry a query or fragment"));
        }

        Ok(Self {
            url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    fn truncate_url(url: &str) -> String {
        match url.char_indices().nth(100) {
            Some((i, _)) => format!("{}...", &url[..i]),
            None => url.to_string(),
        }
    }
}

fn validate_model(name: Option<String>, default: &str) -> Result<String, ConfigError> {
    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default.to_string());
    let valid = name.len() <= MAX_MODEL_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(name)
    } else {
        Err(ConfigError::InvalidModel(name))
    }
}

/// Validated gateway settings.
#[derive(Debug)]
pub struct GatewayConfig {
    api_key: SecretString,
    base_url: ValidatedUrl,
    text_model: String,
    voice_model: String,
    voice_name: String,
    place_triggers: Vec<String>,
}

impl GatewayConfig {
    pub fn from_shell(shell: ShellConfig) -> Result<Self, ConfigError> {
        let ShellConfig {
            api_key,
            api_base_url,
            text_model,
            voice_model,
            voice_name,
            place_triggers,
        } = shell;

        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let base_url = ValidatedUrl::new(
            api_base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        )?;

        let voice_name = voice_name
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_VOICE_NAME.to_string());
        if !voice_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ConfigError::InvalidVoice(voice_name));
        }

        // An empty list would switch the place lookup off entirely.
        let place_triggers: Vec<String> = place_triggers
            .unwrap_or_default()
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let place_triggers = if place_triggers.is_empty() {
            DEFAULT_PLACE_TRIGGERS.iter().map(|t| (*t).to_string()).collect()
        } else {
            place_triggers
        };

        Ok(Self {
            api_key: SecretString::new(api_key),
            base_url,
            text_model: validate_model(text_model, DEFAULT_TEXT_MODEL)?,
            voice_model: validate_model(voice_model, DEFAULT_VOICE_MODEL)?,
            voice_name,
            place_triggers,
        })
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    #[must_use]
    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    #[must_use]
    pub fn voice_model(&self) -> &str {
        &self.voice_model
    }

    #[must_use]
    pub fn voice_name(&self) -> &str {
        &self.voice_name
    }

    /// Lower-cased substrings that enable the place-lookup tool.
    #[must_use]
    pub fn place_triggers(&self) -> &[String] {
        &self.place_triggers
    }

    #[must_use]
    pub fn generate_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url.as_str())
    }

    #[must_use]
    pub fn text_url(&self) -> String {
        self.generate_url(&self.text_model)
    }

    #[must_use]
    pub fn speech_url(&self) -> String {
        self.generate_url(&self.voice_model)
    }
}
