use std::path::Path;

use serde::{Deserialize, Serialize};

/// Connection settings for the planning collaborator (an OpenAI-compatible
/// chat endpoint). Loaded from a JSON file; a missing or unreadable file
/// falls back to defaults with a warning, never a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            request_timeout_secs: 60,
        }
    }
}

impl PlannerConfig {
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!(
                        "invalid planner config {}: {} (using defaults)",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!(
                    "could not read planner config {}: {} (using defaults)",
                    path.display(),
                    e
                );
                Self::default()
            }
        };

        // environment wins over the file so keys stay out of checked-in configs
        if let Ok(key) = std::env::var("DROID_PILOT_API_KEY") {
            config.api_key = key;
        }
        config
    }
}
