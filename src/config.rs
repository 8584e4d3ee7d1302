//! Service Configuration
//!
//! Tunables load from an optional `colosseum.toml` next to the binary;
//! secrets (API keys, storage credentials) come exclusively from the
//! environment and never touch the config file.

use crate::debate::PersonaMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "colosseum.toml";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ColosseumConfig {
    pub primary_model: String,
    pub fallback_model: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 1-100. Automatic ticks roll against this before acting; the arena
    /// posts on most ticks but not every one.
    #[serde(default = "default_post_probability")]
    pub post_probability: u32,
    #[serde(default)]
    pub persona_mode: PersonaMode,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    /// How many trailing turns are replayed to the model on continuation.
    #[serde(default = "default_continuation_window")]
    pub continuation_window: usize,
}

fn default_port() -> u16 {
    8900
}

fn default_post_probability() -> u32 {
    80
}

fn default_list_limit() -> usize {
    50
}

fn default_continuation_window() -> usize {
    6
}

impl Default for ColosseumConfig {
    fn default() -> Self {
        Self {
            primary_model: "gemini-2.5-flash".to_string(),
            fallback_model: "gemini-2.0-flash".to_string(),
            port: default_port(),
            post_probability: default_post_probability(),
            persona_mode: PersonaMode::Three,
            list_limit: default_list_limit(),
            continuation_window: default_continuation_window(),
        }
    }
}

impl ColosseumConfig {
    /// Load from `colosseum.toml` if present, defaults otherwise.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}
