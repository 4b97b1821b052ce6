use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const DEFAULT_DIMENSION: u32 = 1024;
pub const DEFAULT_SEED: i64 = 7;
pub const DEFAULT_STYLE_WEIGHT: f64 = 0.6;

fn default_dimension() -> u32 { DEFAULT_DIMENSION }
fn default_count() -> u32 { 1 }
fn default_seed() -> i64 { DEFAULT_SEED }
fn default_style_weight() -> f64 { DEFAULT_STYLE_WEIGHT }

// --- Generation gateway ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateImagesRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_count")]
    pub n: u32,
    #[serde(default = "default_style_weight")]
    pub style_weight: f64,
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub references: Vec<String>, // base64, forwarded for completeness, unused upstream
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerateImagesResponse {
    pub images: Vec<String>,
    pub note: Option<String>,
    pub error: Option<String>,
}

// --- Text assist gateways ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationTarget {
    En,
    #[default]
    Zh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslateRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub target: TranslationTarget,
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    pub translated_text: String,
    pub original_text: Option<String>,
    pub target: Option<TranslationTarget>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResponse {
    pub optimized_prompt: String,
    pub original_prompt: Option<String>,
    pub error: Option<String>,
}

// --- Queue / batch ---

/// One queued generation. Immutable once enqueued.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: Uuid,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub seed: i64,
    pub style_weight: f64,
    #[serde(default)]
    pub reference_images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub completed_count: usize,
    pub total_count: usize,
    pub current_label: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub prompt_summary: String,
    pub width: u32,
    pub height: u32,
    pub count: usize,
    pub seed: i64,
    pub style_weight: f64,
    pub sample_images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub prompts: Vec<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_style_weight")]
    pub style_weight: f64,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub optimize: bool,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub images: Vec<String>,
    pub history: Option<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub running: bool,
    pub progress: ProgressState,
    pub images: Vec<String>,
}

// --- Image edit ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EditImageRequest {
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub original_prompt: Option<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_style_weight")]
    pub style_weight: f64,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EditImageResponse {
    #[serde(flatten)]
    pub result: GenerateImagesResponse,
    pub label: String,
}

// --- Settings / templates ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub has_api_key: bool,
    pub api_key_preview: Option<String>,
    pub prompt_history_len: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PromptTemplate {
    pub id: u32,
    pub name: String,
    pub prompt: String,
}
