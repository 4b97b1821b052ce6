use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, error};

use crate::error::UpstreamError;

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "b64_json" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

/// Short log-safe preview of an image location or other large string.
pub fn preview(data: &str) -> String {
    if data.len() > 50 {
        let cut = (0..=50).rev().find(|i| data.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...[{} chars total]", &data[..cut], data.len())
    } else {
        data.to_string()
    }
}

/// Masks a credential for logging.
pub fn mask_credential(credential: &str) -> String {
    let visible: String = credential.chars().take(6).collect();
    format!("{}***", visible)
}

/// Parameters for a single upstream image call.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCall {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCall {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Seam between the gateways and the provider.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Returns the image location, or `None` when the provider answered without one.
    async fn generate_image(&self, credential: &str, call: &ImageCall) -> Result<Option<String>, UpstreamError>;

    /// Returns the completion text, or `None` when the provider answered without one.
    async fn chat(&self, credential: &str, call: &ChatCall) -> Result<Option<String>, UpstreamError>;

    fn image_model(&self) -> &str;
}

/// OpenAI-compatible client.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    image_model: String,
    chat_model: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, image_model: impl Into<String>, chat_model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            image_model: image_model.into(),
            chat_model: chat_model.into(),
        }
    }

    async fn post_json(&self, path: &str, credential: &str, body: &serde_json::Value) -> Result<String, UpstreamError> {
        let url = format!("{}/{}", self.base_url, path);
        info!("🔗 Making request to: {} (key {})", url, mask_credential(credential));

        let response = self.client
            .post(&url)
            .bearer_auth(credential)
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(UpstreamError::Api { status: status.as_u16(), message: response_text });
        }

        // Truncate base64 image data for cleaner logging
        let truncated_response = if response_text.len() > 1000 {
            if let Ok(mut json_value) = serde_json::from_str::<serde_json::Value>(&response_text) {
                truncate_base64_in_json(&mut json_value);
                serde_json::to_string(&json_value).unwrap_or_else(|_| preview(&response_text))
            } else {
                preview(&response_text)
            }
        } else {
            response_text.clone()
        };
        info!("📥 Raw upstream response: {}", truncated_response);

        Ok(response_text)
    }
}

#[async_trait]
impl Upstream for OpenAiClient {
    async fn generate_image(&self, credential: &str, call: &ImageCall) -> Result<Option<String>, UpstreamError> {
        let request_body = json!({
            "model": self.image_model,
            "prompt": call.prompt,
            "n": 1,
            "size": format!("{}x{}", call.width, call.height),
            "quality": "hd",
            "style": "vivid",
        });

        let text = self.post_json("images/generations", credential, &request_body).await?;
        let parsed: ImagesResponse = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Decode(format!("parse error: {}", e)))?;

        let location = extract_first_image(&parsed);
        match &location {
            Some(loc) => info!("🖼️ Extracted image from API response: {}", preview(loc)),
            None => info!("⚠️ No image data found in API response"),
        }
        Ok(location)
    }

    async fn chat(&self, credential: &str, call: &ChatCall) -> Result<Option<String>, UpstreamError> {
        let payload = json!({
            "model": self.chat_model,
            "messages": [
                { "role": "system", "content": call.system },
                { "role": "user", "content": call.user },
            ],
            "max_tokens": call.max_tokens,
            "temperature": call.temperature,
        });

        let text = self.post_json("chat/completions", credential, &payload).await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Decode(format!("Failed to parse response: {}", e)))?;

        Ok(parsed.choices.into_iter()
            .filter_map(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .find(|content| !content.is_empty()))
    }

    fn image_model(&self) -> &str { &self.image_model }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChatMessage,
}

#[derive(Debug, Deserialize, Default)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_first_image(resp: &ImagesResponse) -> Option<String> {
    resp.data.first().and_then(|d| match (&d.url, &d.b64_json) {
        (Some(url), _) => Some(url.clone()),
        (None, Some(b64)) => Some(format!("data:image/png;base64,{}", b64)),
        (None, None) => None,
    })
}
