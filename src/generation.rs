use std::sync::Arc;
use tracing::{info, warn, error};

use crate::{
    error::{AppError, Outcome},
    models::{GenerateImagesRequest, GenerateImagesResponse},
    placeholder::{synthesize, PlaceholderKind},
    upstream::{preview, ImageCall, Upstream},
};

pub const MAX_IMAGES_PER_REQUEST: u32 = 10;

/// A validated generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub n: u32,
    pub seed: i64,
    pub style_weight: f64,
    pub references: Vec<String>,
}

impl GenerationParams {
    pub fn placeholders(&self, kind: PlaceholderKind) -> Vec<String> {
        (0..self.n)
            .map(|_| synthesize(kind, &self.prompt, self.width, self.height, self.seed, self.style_weight))
            .collect()
    }
}

impl TryFrom<GenerateImagesRequest> for GenerationParams {
    type Error = AppError;

    fn try_from(req: GenerateImagesRequest) -> Result<Self, AppError> {
        let prompt = req.prompt.filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::InvalidRequest("Missing prompt".into()))?;
        validate_shape(req.width, req.height, req.style_weight)?;
        if req.n == 0 || req.n > MAX_IMAGES_PER_REQUEST {
            return Err(AppError::InvalidRequest(format!("n must be between 1 and {}", MAX_IMAGES_PER_REQUEST)));
        }
        Ok(Self {
            prompt,
            width: req.width,
            height: req.height,
            n: req.n,
            seed: req.seed,
            style_weight: req.style_weight,
            references: req.references,
        })
    }
}

pub fn validate_shape(width: u32, height: u32, style_weight: f64) -> Result<(), AppError> {
    if width == 0 || height == 0 {
        return Err(AppError::InvalidRequest("width and height must be positive".into()));
    }
    if !(0.0..=1.0).contains(&style_weight) {
        return Err(AppError::InvalidRequest("style_weight must be within [0, 1]".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Placeholder,
    Upstream,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub images: Vec<String>,
    pub source: ImageSource,
}

/// Treats absent and blank credentials alike.
pub fn usable_credential(credential: Option<&str>) -> Option<&str> {
    credential.map(str::trim).filter(|c| !c.is_empty())
}

pub struct GenerationGateway {
    upstream: Arc<dyn Upstream>,
}

impl GenerationGateway {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self { Self { upstream } }

    /// Never fails: upstream errors degrade to placeholder images.
    pub async fn generate(&self, params: &GenerationParams, credential: Option<&str>) -> Outcome<Generated> {
        let Some(credential) = usable_credential(credential) else {
            info!("No API key provided, using placeholder images");
            return Outcome::Success(Generated {
                images: params.placeholders(PlaceholderKind::Mock),
                source: ImageSource::Placeholder,
            });
        };

        info!(
            "API key provided, generating {} image(s) with {} ({} reference image(s) ignored)",
            params.n, self.upstream.image_model(), params.references.len()
        );

        let call = ImageCall { prompt: params.prompt.clone(), width: params.width, height: params.height };
        let mut images = Vec::with_capacity(params.n as usize);
        for index in 0..params.n {
            match self.upstream.generate_image(credential, &call).await {
                Ok(Some(location)) => {
                    info!("✅ Upstream image {} generated: {}", index + 1, preview(&location));
                    images.push(location);
                }
                Ok(None) => warn!("⚠️ Upstream returned no image for call {}", index + 1),
                Err(e) => {
                    error!("❌ Failed to generate image: {}", e);
                    info!("🔄 Falling back to placeholder images");
                    return Outcome::Degraded {
                        data: Generated {
                            images: params.placeholders(PlaceholderKind::Fallback),
                            source: ImageSource::Placeholder,
                        },
                        reason: e.to_string(),
                    };
                }
            }
        }

        info!("{} generated {} image(s) successfully", self.upstream.image_model(), images.len());
        Outcome::Success(Generated { images, source: ImageSource::Upstream })
    }

    pub fn to_response(&self, outcome: Outcome<Generated>) -> GenerateImagesResponse {
        match outcome {
            Outcome::Success(Generated { images, source: ImageSource::Placeholder }) => {
                GenerateImagesResponse { images, note: None, error: None }
            }
            Outcome::Success(Generated { images, source: ImageSource::Upstream }) => {
                let note = format!("Generated {} real image(s) with {}", images.len(), self.upstream.image_model());
                GenerateImagesResponse { images, note: Some(note), error: None }
            }
            Outcome::Degraded { data, reason } => GenerateImagesResponse {
                images: data.images,
                note: Some("Fell back to placeholder images".into()),
                error: Some(format!("{} call failed: {}", self.upstream.image_model(), reason)),
            },
        }
    }
}
