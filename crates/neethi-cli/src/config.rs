//! Configuration file support

use neethi_api::{
    DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_PROVIDER, DEFAULT_TEMPERATURE,
    GenerationOptions,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for neethi
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend
    pub api_url: Option<String>,
    /// Default model to use
    pub model: Option<String>,
    /// Default provider tag
    pub provider: Option<String>,
    /// Default sampling temperature
    pub temperature: Option<f32>,
    /// Default response length limit
    pub max_tokens: Option<u32>,
    /// System prompt to request by id
    pub system_prompt_id: Option<String>,
    /// Where conversations are stored
    pub data_dir: Option<PathBuf>,
    /// Stream replies (true by default)
    pub stream: Option<bool>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("neethi")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        config_path_from(|key| std::env::var(key).ok())
    }

    /// Load config from the default path, then apply environment overrides
    pub fn load() -> Self {
        Self::load_from(&Self::config_path()).with_env(|key| std::env::var(key).ok())
    }

    /// Load config from `path`. A missing or unreadable file yields defaults.
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

    /// Overlay `NEETHI_*` environment variables read through `lookup`.
    ///
    /// Numbers that fail to parse are ignored with a warning.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("NEETHI_API_URL") {
            self.api_url = Some(url);
        }
        if let Some(model) = lookup("NEETHI_DEFAULT_MODEL") {
            self.model = Some(model);
        }
        if let Some(provider) = lookup("NEETHI_DEFAULT_PROVIDER") {
            self.provider = Some(provider);
        }
        if let Some(raw) = lookup("NEETHI_DEFAULT_TEMPERATURE") {
            match raw.trim().parse() {
                Ok(temperature) => self.temperature = Some(temperature),
                Err(_) => tracing::warn!("Ignoring NEETHI_DEFAULT_TEMPERATURE={:?}", raw),
            }
        }
        if let Some(raw) = lookup("NEETHI_DEFAULT_MAX_TOKENS") {
            match raw.trim().parse() {
                Ok(max_tokens) => self.max_tokens = Some(max_tokens),
                Err(_) => tracing::warn!("Ignoring NEETHI_DEFAULT_MAX_TOKENS={:?}", raw),
            }
        }
        self
    }

    /// Backend base URL
    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Default generation options for new requests
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            provider: self
                .provider
                .clone()
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system_prompt_id: self.system_prompt_id.clone(),
            ..Default::default()
        }
    }

    /// Directory holding the local conversation store
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("neethi")
        })
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
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
            api_url: Some(DEFAULT_BASE_URL.to_string()),
            model: Some(DEFAULT_MODEL.to_string()),
            provider: Some(DEFAULT_PROVIDER.to_string()),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            stream: Some(true),
            ..Default::default()
        };

        default_config.save(&path)?;
        Ok(path)
    }
}

/// Resolve the config file path, honoring `NEETHI_CONFIG_PATH`
fn config_path_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup("NEETHI_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    Config::config_dir().join("config.toml")
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# neethi configuration file
# Place at ~/.config/neethi/config.toml (Linux) or set NEETHI_CONFIG_PATH

# Backend base URL
api_url = "http://localhost:8000"

# Default model and provider tag
model = "qwen/qwen3-4b"
provider = "llamacpp"

# Sampling
temperature = 0.7
max_tokens = 2048

# System prompt id known to the backend (optional)
# system_prompt_id = "default"

# Where conversations are kept (optional)
# data_dir = "~/.local/share/neethi"

# Stream replies as they are generated (true by default)
stream = true
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builtin_defaults() {
        let config = Config::default();
        let options = config.generation_options();
        assert_eq!(config.api_url(), "http://localhost:8000");
        assert_eq!(options.model, "qwen/qwen3-4b");
        assert_eq!(options.provider, "llamacpp");
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.max_tokens, 2048);
        assert!(options.system_prompt_id.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config {
            model: Some("from-file".into()),
            temperature: Some(0.3),
            ..Default::default()
        }
        .with_env(env(&[
            ("NEETHI_API_URL", "http://gpu-box:9000"),
            ("NEETHI_DEFAULT_MODEL", "llama3"),
            ("NEETHI_DEFAULT_MAX_TOKENS", "512"),
        ]));

        assert_eq!(config.api_url(), "http://gpu-box:9000");
        assert_eq!(config.model.as_deref(), Some("llama3"));
        assert_eq!(config.temperature, Some(0.3));
        assert_eq!(config.max_tokens, Some(512));
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = Config::default().with_env(env(&[
            ("NEETHI_DEFAULT_TEMPERATURE", "warm"),
            ("NEETHI_DEFAULT_MAX_TOKENS", "-1"),
        ]));
        let options = config.generation_options();
        assert_eq!(options.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(options.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_config_path_override() {
        let path = config_path_from(env(&[("NEETHI_CONFIG_PATH", "/tmp/neethi.toml")]));
        assert_eq!(path, PathBuf::from("/tmp/neethi.toml"));

        let default = config_path_from(env(&[]));
        assert!(default.ends_with("neethi/config.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "api_url = \"http://127.0.0.1:8123\"\nprovider = \"ollama\"\nstream = false\n",
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.api_url(), "http://127.0.0.1:8123");
        assert_eq!(config.generation_options().provider, "ollama");
        assert_eq!(config.stream, Some(false));
    }

    #[test]
    fn test_bad_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "temperature = \"hot\"").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());

        assert_eq!(Config::load_from(&dir.path().join("missing.toml")), Config::default());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.generation_options(), GenerationOptions::default());
        assert_eq!(config.stream, Some(true));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            model: Some("llama3".into()),
            data_dir: Some(dir.path().join("data")),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
        assert_eq!(config.data_dir(), dir.path().join("data"));
    }
}
