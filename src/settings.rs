use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;

pub const PROMPT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub prompt_history: Vec<String>,
}

/// Persistent credential and prompt history, saved as JSON after every change.
pub struct SettingsStore {
    path: PathBuf,
    state: RwLock<Settings>,
}

impl SettingsStore {
    /// A missing file yields default settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Settings::default()
        };
        info!("⚙️ Loaded settings from {} ({} remembered prompts)", path.display(), settings.prompt_history.len());
        Ok(Self { path, state: RwLock::new(settings) })
    }

    pub fn save(&self) -> Result<(), AppError> {
        let raw = serde_json::to_string_pretty(&*self.state.read())?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn credential(&self) -> Option<String> {
        let key = self.state.read().api_key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }

    /// Stores a new credential; unchanged values are not rewritten.
    pub fn set_credential(&self, key: &str) -> Result<(), AppError> {
        {
            let mut state = self.state.write();
            if state.api_key == key {
                return Ok(());
            }
            state.api_key = key.to_string();
        }
        self.save()
    }

    /// Newest first, deduplicated, capped at [`PROMPT_HISTORY_LIMIT`].
    pub fn remember_prompt(&self, prompt: &str) -> Result<bool, AppError> {
        let prompt = prompt.trim();
        {
            let mut state = self.state.write();
            if prompt.is_empty() || state.prompt_history.iter().any(|p| p == prompt) {
                return Ok(false);
            }
            state.prompt_history.insert(0, prompt.to_string());
            state.prompt_history.truncate(PROMPT_HISTORY_LIMIT);
        }
        self.save()?;
        Ok(true)
    }

    pub fn prompt_history(&self) -> Vec<String> { self.state.read().prompt_history.clone() }
}
