use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloverConfig {
    // Generation API (Generative Language REST endpoint)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    // Remote logging / transcript archival webhook (optional)
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_auth_token: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,

    // Durable session storage
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_llm_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_llm_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.9
}

fn default_app_name() -> String {
    "Clover".to_string()
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("clover").join("clover_state.db"))
        .and_then(|path| path.to_str().map(str::to_string))
        .unwrap_or_else(|| "clover_state.db".to_string())
}

impl Default for CloverConfig {
    fn default() -> Self {
        Self {
            llm_api_url: default_llm_url(),
            llm_model: default_llm_model(),
            llm_api_key: None,
            temperature: default_temperature(),
            webhook_url: None,
            webhook_auth_token: String::new(),
            app_name: default_app_name(),
            database_path: default_database_path(),
        }
    }
}

impl CloverConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("clover_config.toml")
    }

    /// Load config from clover_config.toml (next to executable), falling
    /// back to defaults plus environment variables.
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<CloverConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::from_env()
    }

    /// Save config to file (next to executable)
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("GEMINI_API_URL") {
            config.llm_api_url = url;
        }

        if let Ok(model) = env::var("GEMINI_MODEL") {
            config.llm_model = model;
        }

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            config.llm_api_key = Some(key);
        }

        if let Ok(url) = env::var("CLOVER_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                config.webhook_url = Some(url);
            }
        }

        if let Ok(token) = env::var("CLOVER_WEBHOOK_TOKEN") {
            config.webhook_auth_token = token;
        }

        if let Ok(path) = env::var("CLOVER_DB_PATH") {
            if !path.trim().is_empty() {
                config.database_path = path;
            }
        }

        config
    }
}
