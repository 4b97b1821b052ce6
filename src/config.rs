use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub upstream_base: String,
    pub image_model: String,
    pub chat_model: String,
    pub settings_path: PathBuf,
    /// Pause between queue groups.
    pub group_delay: Duration,
    /// Seeds the settings store when it has no credential yet.
    pub initial_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid PORT value {raw:?}"))?,
            None => 8080,
        };
        let group_delay = match lookup("GROUP_DELAY_MS") {
            Some(raw) => Duration::from_millis(raw.parse().with_context(|| format!("invalid GROUP_DELAY_MS value {raw:?}"))?),
            None => crate::queue::GROUP_DELAY,
        };
        Ok(Self {
            port,
            upstream_base: lookup("UPSTREAM_API_BASE").unwrap_or_else(|| "https://api.openai.com/v1".into()),
            image_model: lookup("IMAGE_MODEL").unwrap_or_else(|| "dall-e-3".into()),
            chat_model: lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".into()),
            settings_path: lookup("SETTINGS_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("settings.json")),
            group_delay,
            initial_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
        })
    }
}
