//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Document store tuning
    pub store: StoreSettings,

    /// Typing-presence tuning
    pub presence: PresenceSettings,

    /// Message limits
    pub message: MessageSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Document store tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Atomic batch limit assumed when chunking bulk operations
    pub max_batch_size: usize,
}

/// Typing-presence tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    /// Client-enforced expiry for a typing flag that is not refreshed,
    /// so a disconnected client never leaves a permanent indicator
    pub typing_ttl_ms: u64,

    /// Debounce window suppressing redundant typing refreshes
    pub typing_debounce_ms: u64,
}

/// Message limits.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSettings {
    /// Maximum content length in characters
    pub max_content_length: usize,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. built-in defaults
    /// 2. config/default.toml
    /// 3. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 4. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("store.max_batch_size", 500_i64)?
            .set_default("presence.typing_ttl_ms", 10_000_i64)?
            .set_default("presence.typing_debounce_ms", 200_i64)?
            .set_default("message.max_content_length", 4000_i64)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // CLASSCHAT__PRESENCE__TYPING_TTL_MS=5000 -> presence.typing_ttl_ms
            .add_source(
                Environment::default()
                    .prefix("CLASSCHAT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings { max_batch_size: 500 },
            presence: PresenceSettings { typing_ttl_ms: 10_000, typing_debounce_ms: 200 },
            message: MessageSettings { max_content_length: 4000 },
            environment: "development".into(),
        }
    }
}
