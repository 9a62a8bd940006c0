use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Connection settings for the Regimen backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.regimen.app".to_string(),
            api_token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn config_path() -> PathBuf {
    // Prefer REGIMEN_CONFIG_PATH, fall back to the platform config dir.
    if let Ok(path) = std::env::var("REGIMEN_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".regimen"))
        .join("regimen")
        .join("api.json")
}

/// Load the API config from disk. Returns defaults if the file is missing or
/// cannot be parsed.
pub async fn load_api_config() -> ApiConfig {
    let path = config_path();
    let Ok(bytes) = tokio::fs::read(&path).await else {
        return ApiConfig::default();
    };
    match serde_json::from_slice::<ApiConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            warn!("unreadable api config at {}: {e}", path.display());
            ApiConfig::default()
        }
    }
}
