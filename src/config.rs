//! Configuration types for the overlay client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{NeuroError, Result};

/// Default backend endpoint.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8000/ws";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuroConfig {
    /// Backend connection settings.
    pub socket: SocketConfig,
    /// Utterance pacing.
    pub playback: PlaybackConfig,
    /// Avatar expression settings.
    pub expression: ExpressionConfig,
    /// Speaker output settings.
    pub audio: AudioConfig,
    /// Diagnostic logging.
    pub logging: LoggingConfig,
}

/// Backend connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// WebSocket endpoint, established once at session start.
    pub url: String,
    /// How long to wait for the initial handshake before giving up.
    pub connect_timeout_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl SocketConfig {
    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Pacing for utterances that have no audio.
///
/// Such utterances stay on screen for
/// `reading_base_ms + reading_per_char_ms * chars(text)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub reading_base_ms: u64,
    pub reading_per_char_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            reading_base_ms: 1_000,
            reading_per_char_ms: 100,
        }
    }
}

impl PlaybackConfig {
    /// Simulated reading time for a subtitle without audio.
    #[must_use]
    pub fn reading_delay(&self, text: &str) -> Duration {
        let chars = text.chars().count() as u64;
        Duration::from_millis(
            self.reading_base_ms
                .saturating_add(self.reading_per_char_ms.saturating_mul(chars)),
        )
    }
}

/// Avatar expression configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    /// Time after which a shown expression decays back to neutral.
    pub decay_ms: u64,
    /// Expression display name → model parameter id.
    ///
    /// An empty catalog accepts any name and uses it as the parameter id.
    pub catalog: BTreeMap<String, String>,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        let catalog = [
            ("吐舌", "key2"),
            ("黑脸", "key3"),
            ("眼泪", "key4"),
            ("脸红", "key5"),
            ("nn眼", "key6"),
            ("生气瘪嘴", "key7"),
            ("死鱼眼", "key8"),
            ("生气", "key9"),
            ("咪咪眼", "key10"),
            ("嘟嘴", "key11"),
            ("钱钱眼", "key12"),
            ("爱心", "key16"),
            ("泪眼", "key17"),
        ]
        .into_iter()
        .map(|(name, id)| (name.to_owned(), id.to_owned()))
        .collect();

        Self {
            decay_ms: 10_000,
            catalog,
        }
    }
}

impl ExpressionConfig {
    /// Decay delay as a [`Duration`].
    #[must_use]
    pub fn decay(&self) -> Duration {
        Duration::from_millis(self.decay_ms)
    }
}

/// Speaker output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Play utterance audio. When false every utterance uses the reading delay.
    pub enabled: bool,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_device: None,
        }
    }
}

/// Diagnostic logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file under the data directory.
    pub file: bool,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: false,
            filter: "neuro=info".to_owned(),
        }
    }
}

impl NeuroConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| NeuroError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NeuroError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::neuro_dirs::config_dir().join("config.toml")
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Config`] when the endpoint is not a `ws`/`wss`
    /// URL or the connect timeout is zero.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.socket.url)
            .map_err(|e| NeuroError::Config(format!("invalid socket url '{}': {e}", self.socket.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(NeuroError::Config(format!(
                "socket url must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }
        if self.socket.connect_timeout_ms == 0 {
            return Err(NeuroError::Config(
                "socket.connect_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
