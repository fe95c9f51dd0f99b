use anyhow::Result;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: General,
    pub database: Database,
    pub ai: Ai,
    pub web: Option<Web>,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub path: String,
}

/// Model service settings. The API key is never read from the config file;
/// it is resolved from `SCALEWAY_API_KEY` once, in [`Config::load`].
#[derive(Debug, Clone, Deserialize)]
pub struct Ai {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub request_timeout_secs: u64,
    pub chunk_timeout_secs: u64,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Web {
    pub port: u16,
    pub host: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let content = std::fs::read_to_string("config/default.toml")?;
        let mut config = Self::from_toml_str(&content)?;
        if let Ok(key) = std::env::var("SCALEWAY_API_KEY") {
            config.ai.api_key = key;
        }
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
