use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
    #[serde(default)]
    pub pg_url: Option<String>,
    #[serde(default)]
    pub pg_schema: Option<String>,
    #[serde(default)]
    pub pg_pool_size: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/giglance.db".to_string(),
            pg_url: None,
            pg_schema: None,
            pg_pool_size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub api_base_url: String,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stripe.com".to_string(),
            secret_key: None,
            webhook_secret: None,
        }
    }
}

impl ProcessorConfig {
    // 环境变量优先；保留硬编码回退默认值（历史遗留，见 DESIGN.md）
    pub fn secret_key(&self) -> String {
        std::env::var("GL_PROCESSOR_SECRET_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.secret_key.clone())
            .unwrap_or_else(|| "sk_test_51placeholder".to_string())
    }

    pub fn webhook_secret(&self) -> String {
        std::env::var("GL_WEBHOOK_SECRET")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.webhook_secret.clone())
            .unwrap_or_else(|| "whsec_placeholder".to_string())
    }
}

impl Settings {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let Some(config_path) = Self::find_config_file() else {
            return Ok(Settings::default());
        };
        let config_content = std::fs::read_to_string(&config_path)?;
        let settings: Settings = toml::from_str(&config_content)?;
        Ok(settings)
    }

    fn find_config_file() -> Option<String> {
        let possible_names = ["custom-config.toml", "config.toml"];
        possible_names
            .iter()
            .find(|name| Path::new(name).exists())
            .map(|name| name.to_string())
    }
}
