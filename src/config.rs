use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable holding the service credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Main application configuration, stored at `~/.lexaid/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API key override; the environment variable wins when both are set.
    pub gemini_api_key: Option<String>,

    /// Model to request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Where `/save` writes exported document drafts. Defaults to the
    /// current directory.
    pub export_dir: Option<PathBuf>,

    /// Sampling parameters sent with every request.
    #[serde(default)]
    pub generation: GenerationParams,

    /// Lexaid home directory.
    #[serde(skip)]
    pub lexaid_home: PathBuf,
}

/// Sampling controls for the completion service. Temperature is kept low so
/// legal answers stay close to the retrieved material.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_k: 40,
            top_p: 0.95,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        Config {
            gemini_api_key: None,
            model: default_model(),
            generation: GenerationParams::default(),
            export_dir: None,
            lexaid_home: home.join(".lexaid"),
        }
    }
}

impl Config {
    /// Load configuration from file, creating the home directory if needed.
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let lexaid_home = home.join(".lexaid");
        fs::create_dir_all(&lexaid_home).context("Failed to create .lexaid directory")?;

        let config_path = lexaid_home.join("config.toml");
        let mut config = if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };
        config.lexaid_home = lexaid_home;
        if !config_path.exists() {
            config.save()?;
        }
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let config_path = self.lexaid_home.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get the API key from the environment or the config file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| self.gemini_api_key.clone())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Directory `/save` writes into.
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Path of the log file tracing writes to.
    pub fn log_path(&self) -> PathBuf {
        self.lexaid_home.join("lexaid.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str("gemini_api_key = \"abc\"").unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.generation.top_k, 40);
        assert!((config.generation.temperature - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.gemini_api_key = Some("key".to_string());
        config.model = "gemini-2.5-flash".to_string();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.model, "gemini-2.5-flash");
        assert_eq!(parsed.gemini_api_key.as_deref(), Some("key"));
    }
}
