// Translation and prompt optimization pass-through gateways.

use std::sync::Arc;
use tracing::{info, error};

use crate::{
    error::{AppError, Outcome},
    generation::usable_credential,
    models::TranslationTarget,
    upstream::{ChatCall, Upstream},
};

const TRANSLATION_SYSTEM: &str =
    "You are a professional translation assistant specialising in image-generation prompts.";
const OPTIMIZATION_SYSTEM: &str =
    "You are an expert image-generation prompt engineer who turns simple descriptions into professional, detailed prompts.";

pub fn translation_call(text: &str, target: TranslationTarget) -> ChatCall {
    let user = match target {
        TranslationTarget::En => format!(
            "Translate the following Chinese text into English, keeping the style of a professional image-generation prompt: {text}"
        ),
        TranslationTarget::Zh => format!("Translate the following English text into Chinese: {text}"),
    };
    ChatCall { system: TRANSLATION_SYSTEM.into(), user, max_tokens: 500, temperature: 0.3 }
}

pub fn optimization_call(prompt: &str) -> ChatCall {
    let user = format!(
        "Optimize the following image-generation prompt so it is more professional and descriptive, adding suitable style vocabulary.\n\n\
        Original prompt: {prompt}\n\n\
        Requirements:\n\
        1. Keep the original meaning unchanged\n\
        2. Add professional photography terminology\n\
        3. Describe lighting, composition and style\n\
        4. Write the result in English\n\
        5. Keep it between 100 and 200 words"
    );
    ChatCall { system: OPTIMIZATION_SYSTEM.into(), user, max_tokens: 300, temperature: 0.7 }
}

pub struct TextAssistGateway {
    upstream: Arc<dyn Upstream>,
}

impl TextAssistGateway {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self { Self { upstream } }

    /// `Err` only for missing input; upstream failures degrade to the original text.
    pub async fn translate(&self, text: Option<&str>, target: TranslationTarget, credential: Option<&str>) -> Result<Outcome<String>, AppError> {
        let (Some(credential), Some(text)) = (usable_credential(credential), text.filter(|t| !t.is_empty())) else {
            return Err(AppError::InvalidRequest("Missing API key or text".into()));
        };
        info!("🌐 Translating {} chars to {:?}", text.chars().count(), target);
        Ok(self.transform("Translation", text, credential, translation_call(text, target)).await)
    }

    pub async fn optimize(&self, prompt: Option<&str>, credential: Option<&str>) -> Result<Outcome<String>, AppError> {
        let (Some(credential), Some(prompt)) = (usable_credential(credential), prompt.filter(|p| !p.is_empty())) else {
            return Err(AppError::InvalidRequest("Missing API key or prompt".into()));
        };
        info!("✨ Optimizing prompt ({} chars)", prompt.chars().count());
        Ok(self.transform("Optimization", prompt, credential, optimization_call(prompt)).await)
    }

    async fn transform(&self, task: &str, original: &str, credential: &str, call: ChatCall) -> Outcome<String> {
        match self.upstream.chat(credential, &call).await {
            Ok(Some(result)) => {
                info!("✅ {} succeeded ({} chars)", task, result.chars().count());
                Outcome::Success(result)
            }
            Ok(None) => {
                info!("⚠️ {} returned no content, echoing original", task);
                Outcome::Success(original.to_string())
            }
            Err(e) => {
                error!("❌ {} failed: {}", task, e);
                Outcome::Degraded { data: original.to_string(), reason: e.to_string() }
            }
        }
    }
}
