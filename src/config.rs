//! Config load/save: API key, voice and persona for the voice session.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_voice() -> String {
    "Zephyr".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash-native-audio-preview-09-2025".to_string()
}

fn default_system_instruction() -> String {
    "You are a holographic desktop assistant. Keep spoken answers short, \
     friendly and conversational."
        .to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub api_key: String,
    /// Prebuilt voice name for audio responses.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// System persona text sent with the session setup.
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    /// Native-audio model driving the session.
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice: default_voice(),
            system_instruction: default_system_instruction(),
            model: default_model(),
        }
    }
}

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_default().join("halovoice");
    let _ = std::fs::create_dir_all(&config_dir);
    config_dir.join("config.json")
}

/// Load config from disk, falling back to defaults. The `GEMINI_API_KEY`
/// environment variable overrides the stored key.
pub fn load_config() -> Config {
    let path = get_config_path();

    let mut config = if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    } else {
        Config::default()
    };

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.trim().is_empty() {
            config.api_key = key;
        }
    }

    config
}

/// Save config to disk.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = get_config_path();
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.voice, "Zephyr");
        assert!(!config.model.is_empty());
        assert!(!config.system_instruction.is_empty());
    }
}
