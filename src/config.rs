use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub gemini: GeminiConfig,
    pub history: HistoryConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-assistant".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Model identifier sent with every request
    pub model: String,

    /// System instruction the remote session is created with
    pub system_instruction: String,

    /// API root, overridable for tests and proxies
    pub base_url: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: "You are a friendly and helpful AI assistant. \
                Keep your responses concise and informative."
                .to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "API_KEY".to_string(),
        }
    }
}

impl GeminiConfig {
    /// Read the API credential. A missing key is a startup error.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => anyhow::bail!("{} environment variable not set", self.api_key_env),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON file holding the persisted transcript
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gemini-chat-history.json"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// NATS server delivering speech-to-text results; no speech input when unset
    pub nats_url: Option<String>,

    /// Text-to-speech program and leading arguments, e.g. `["espeak", "-s", "170"]`
    pub synthesizer: Option<Vec<String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LOQA_ASSISTANT").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}
