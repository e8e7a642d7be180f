//! Configuration management
//!
//! Settings are read in this order of precedence:
//! 1. environment variables
//! 2. the `relay.toml` config file
//! 3. defaults
//!
//! `${VAR_NAME}` inside the config file is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::phone::{DEFAULT_COUNTRY_CODE, PhoneNormalizer};
use crate::Error;

/// Default config file looked up by `Config::load`
pub const CONFIG_FILE: &str = "relay.toml";

/// Tall Bob provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallBobConfig {
    /// API base URL
    pub base_url: String,

    /// API username (basic auth user)
    #[serde(default)]
    pub api_username: String,

    /// API key (basic auth password)
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TallBobConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_username: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// HighLevel CRM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhlConfig {
    /// Private integration token
    #[serde(skip_serializing)]
    pub token: String,

    /// Value of the `Version` header
    #[serde(default = "default_ghl_api_version")]
    pub api_version: String,

    /// API base URL
    #[serde(default = "default_ghl_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Locations in routing preference order; the first one receives
    /// inbound messages when a request names no location
    #[serde(default)]
    pub location_ids: Vec<String>,
}

impl Default for GhlConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_version: default_ghl_api_version(),
            base_url: default_ghl_base_url(),
            timeout_secs: default_timeout_secs(),
            location_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Country code prepended to local-format numbers
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API key protecting the send and status endpoints
    #[serde(skip_serializing)]
    pub key: Option<String>,

    /// Port for the HTTP server
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins; permissive when unset
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: None,
            port: default_api_port(),
            allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Public URL the provider should call; registration is skipped when unset
    pub callback_url: Option<String>,

    /// Provider event types to subscribe to
    #[serde(default = "default_event_types")]
    pub event_types: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            event_types: default_event_types(),
        }
    }
}

/// Main configuration for the relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tallbob: TallBobConfig,

    #[serde(default)]
    pub ghl: GhlConfig,

    #[serde(default)]
    pub phone: PhoneConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ghl_api_version() -> String {
    "2021-07-28".to_string()
}

fn default_ghl_base_url() -> String {
    "https://services.leadconnectorhq.com".to_string()
}

fn default_country_code() -> String {
    DEFAULT_COUNTRY_CODE.to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_event_types() -> Vec<String> {
    vec!["message.received".to_string(), "message.delivered".to_string()]
}

/// Masked form of a credential for logs, keeping the last four characters
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Expand `${VAR_NAME}` references from the environment
    ///
    /// Unset variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
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

    /// Load from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// Parse TOML text (after `${VAR}` expansion) without env overrides
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(Self::from_toml_config(config))
    }

    /// Load `relay.toml` if present, otherwise the environment, and validate
    pub fn load() -> crate::Result<Self> {
        let cfg = if Path::new(CONFIG_FILE).exists() {
            Self::from_toml_file(CONFIG_FILE)?
        } else {
            Self::from_env()
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let tallbob = toml.tallbob.unwrap_or_default();
        let tallbob_config = TallBobConfig {
            base_url: tallbob.base_url.unwrap_or_default(),
            api_username: tallbob.api_username.unwrap_or_default(),
            api_key: tallbob.api_key.unwrap_or_default(),
            timeout_secs: tallbob.timeout_secs.unwrap_or_else(default_timeout_secs),
        };

        let ghl = toml.ghl.unwrap_or_default();
        let ghl_config = GhlConfig {
            token: ghl.token.unwrap_or_default(),
            api_version: ghl.api_version.unwrap_or_else(default_ghl_api_version),
            base_url: ghl.base_url.unwrap_or_else(default_ghl_base_url),
            timeout_secs: ghl.timeout_secs.unwrap_or_else(default_timeout_secs),
            location_ids: ghl.location_ids.unwrap_or_default(),
        };

        let phone = toml.phone.unwrap_or_default();
        let phone_config = PhoneConfig {
            default_country_code: phone.default_country_code.unwrap_or_else(default_country_code),
        };

        let api = toml.api.unwrap_or_default();
        let api_config = ApiConfig {
            key: api.key.filter(|k| !k.is_empty()),
            port: api.port.unwrap_or_else(default_api_port),
            allowed_origins: api.allowed_origins,
        };

        let webhook = toml.webhook.unwrap_or_default();
        let webhook_config = WebhookConfig {
            callback_url: webhook.callback_url.filter(|u| !u.is_empty()),
            event_types: webhook.event_types.unwrap_or_else(default_event_types),
        };

        Config {
            tallbob: tallbob_config,
            ghl: ghl_config,
            phone: phone_config,
            api: api_config,
            webhook: webhook_config,
        }
    }

    /// Override settings from environment variables
    fn apply_env_overrides(&mut self) {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(url) = non_empty("TALLBOB_API_URL") {
            self.tallbob.base_url = url;
        }
        if let Some(username) = non_empty("TALLBOB_API_USERNAME") {
            self.tallbob.api_username = username;
        }
        if let Some(key) = non_empty("TALLBOB_API_KEY") {
            self.tallbob.api_key = key;
        }
        if let Some(secs) = non_empty("TALLBOB_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.tallbob.timeout_secs = secs;
        }

        if let Some(token) = non_empty("GHL_PRIVATE_INTEGRATION_TOKEN") {
            self.ghl.token = token;
        }
        if let Some(version) = non_empty("GHL_API_VERSION") {
            self.ghl.api_version = version;
        }
        if let Some(url) = non_empty("GHL_BASE_URL") {
            self.ghl.base_url = url;
        }
        if let Some(secs) = non_empty("GHL_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.ghl.timeout_secs = secs;
        }
        if let Some(ids) = non_empty("GHL_LOCATION_IDS") {
            self.ghl.location_ids = split_list(&ids);
        }

        if let Some(code) = non_empty("DEFAULT_COUNTRY_CODE") {
            self.phone.default_country_code = code;
        }

        if let Some(key) = non_empty("API_KEY") {
            self.api.key = Some(key);
        }
        if let Some(port) = non_empty("PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
        if let Some(origins) = non_empty("API_ALLOWED_ORIGINS") {
            self.api.allowed_origins = Some(split_list(&origins));
        }

        if let Some(url) = non_empty("WEBHOOK_CALLBACK_URL") {
            self.webhook.callback_url = Some(url);
        }
        if let Some(events) = non_empty("WEBHOOK_EVENT_TYPES") {
            self.webhook.event_types = split_list(&events);
        }
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    /// Reject configurations the relay cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let required = [
            ("GHL_PRIVATE_INTEGRATION_TOKEN", &self.ghl.token),
            ("TALLBOB_API_KEY", &self.tallbob.api_key),
            ("TALLBOB_API_URL", &self.tallbob.base_url),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Missing required setting: {}",
                    name
                )));
            }
        }

        if self.tallbob.timeout_secs == 0 || self.ghl.timeout_secs == 0 {
            return Err(Error::Config(
                "Gateway timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Phone normalizer for the configured default country code
    pub fn normalizer(&self) -> PhoneNormalizer {
        PhoneNormalizer::new(&self.phone.default_country_code)
    }
}

// ============================================================================
// TOML file structure
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    tallbob: Option<TomlTallBobConfig>,
    ghl: Option<TomlGhlConfig>,
    phone: Option<TomlPhoneConfig>,
    api: Option<TomlApiConfig>,
    webhook: Option<TomlWebhookConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlTallBobConfig {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    api_username: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlGhlConfig {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    location_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlPhoneConfig {
    #[serde(default)]
    default_country_code: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlApiConfig {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlWebhookConfig {
    #[serde(default)]
    callback_url: Option<String>,
    #[serde(default)]
    event_types: Option<Vec<String>>,
}
