use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{sse::{Event, KeepAlive, Sse}, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use rand::Rng;
use serde_json::json;
use std::{convert::Infallible, sync::Arc};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    assist::TextAssistGateway,
    error::{AppError, Outcome},
    generation::{usable_credential, validate_shape, GenerationGateway, GenerationParams},
    models::{
        BatchRequest, BatchResponse, EditImageRequest, EditImageResponse, GenerateImagesRequest,
        GenerateImagesResponse, HistoryEntry, OptimizeRequest, OptimizeResponse, ProgressResponse,
        PromptTemplate, SettingsView, TranslateRequest, TranslateResponse, UpdateSettingsRequest,
    },
    prompts::{build_jobs, expand_prompts, plan_edit, strip_preamble, templates},
    queue::QueueProcessor,
    settings::SettingsStore,
    upstream::{mask_credential, preview},
};

#[derive(Clone)]
pub struct AppState {
    pub generation: Arc<GenerationGateway>,
    pub assist: Arc<TextAssistGateway>,
    pub queue: Arc<QueueProcessor>,
    pub settings: Arc<SettingsStore>,
}

impl AppState {
    /// Request credential wins and is remembered; otherwise the stored one is used.
    fn resolve_credential(&self, requested: Option<&str>) -> Option<String> {
        match usable_credential(requested) {
            Some(key) => {
                if let Err(e) = self.settings.set_credential(key) {
                    tracing::warn!("⚠️ Could not persist API key: {}", e);
                }
                Some(key.to_string())
            }
            None => self.settings.credential(),
        }
    }

    fn remember_prompts(&self, prompts: &[String]) {
        for prompt in prompts {
            if let Err(e) = self.settings.remember_prompt(prompt) {
                tracing::warn!("⚠️ Could not persist prompt history: {}", e);
                return;
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/images/generate", post(generate_images))
        .route("/api/images/edit", post(edit_image))
        .route("/api/translate", post(translate))
        .route("/api/optimize-prompt", post(optimize_prompt))
        .route("/api/batch", post(run_batch))
        .route("/api/batch/progress", get(batch_progress))
        .route("/api/batch/events", get(batch_events))
        .route("/api/history", get(get_history).delete(clear_history))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/prompts/history", get(prompt_history))
        .route("/api/templates", get(list_templates))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn generate_images(
    State(state): State<AppState>,
    payload: Result<Json<GenerateImagesRequest>, JsonRejection>,
) -> Result<Json<GenerateImagesResponse>, AppError> {
    let Json(body) = payload?;
    let credential = body.api_key.clone();
    let params = GenerationParams::try_from(body)?;

    tracing::info!("🎨 Generating {} image(s) for prompt: {}", params.n, preview(&params.prompt));
    let outcome = state.generation.generate(&params, credential.as_deref()).await;
    Ok(Json(state.generation.to_response(outcome)))
}

pub async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload?;
    let outcome = state.assist.translate(body.text.as_deref(), body.target, body.api_key.as_deref()).await?;
    Ok(match outcome {
        Outcome::Success(translated_text) => Json(TranslateResponse {
            translated_text,
            original_text: body.text,
            target: Some(body.target),
            error: None,
        }).into_response(),
        Outcome::Degraded { data, reason } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TranslateResponse {
                translated_text: data,
                original_text: None,
                target: None,
                error: Some(format!("Translation failed: {}", reason)),
            }),
        ).into_response(),
    })
}

pub async fn optimize_prompt(
    State(state): State<AppState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload?;
    let outcome = state.assist.optimize(body.prompt.as_deref(), body.api_key.as_deref()).await?;
    Ok(match outcome {
        Outcome::Success(optimized_prompt) => Json(OptimizeResponse {
            optimized_prompt,
            original_prompt: body.prompt,
            error: None,
        }).into_response(),
        Outcome::Degraded { data, reason } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(OptimizeResponse {
                optimized_prompt: data,
                original_prompt: None,
                error: Some(format!("Optimization failed: {}", reason)),
            }),
        ).into_response(),
    })
}

#[axum::debug_handler]
pub async fn run_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let Json(body) = payload?;
    if state.queue.is_running() {
        return Err(AppError::Busy);
    }
    validate_shape(body.width, body.height, body.style_weight)?;

    let mut prompts = expand_prompts(&body.prompts);
    if prompts.is_empty() {
        return Err(AppError::InvalidRequest("Please enter at least one prompt".into()));
    }
    let credential = state.resolve_credential(body.api_key.as_deref());
    tracing::info!("🚀 Batch of {} prompt(s) received", prompts.len());

    if body.optimize {
        if let Some(key) = credential.as_deref() {
            for prompt in prompts.iter_mut() {
                if let Outcome::Success(optimized) = state.assist.optimize(Some(prompt.as_str()), Some(key)).await? {
                    let cleaned = strip_preamble(&optimized);
                    if !cleaned.is_empty() {
                        *prompt = cleaned;
                    }
                }
            }
        }
    }

    state.remember_prompts(&prompts);
    let jobs = build_jobs(&prompts, body.width, body.height, body.seed, body.style_weight, &body.references);
    let report = state.queue.run(jobs, credential).await?;
    Ok(Json(BatchResponse { images: report.images, history: report.history }))
}

pub async fn batch_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(state.queue.progress())
}

/// Server-sent stream of queue events, one JSON payload per event.
pub async fn batch_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::unfold(state.queue.subscribe(), |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .json_data(&event)
                        .unwrap_or_else(|e| Event::default().comment(format!("unserializable event: {e}")));
                    return Some((Ok(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!("⚠️ Event stream lagged, {} event(s) dropped", skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn get_history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.queue.history())
}

pub async fn clear_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.queue.clear_history();
    tracing::info!("🧹 Cleared {} history entries", cleared);
    Json(json!({ "cleared": cleared }))
}

fn settings_view(settings: &SettingsStore) -> SettingsView {
    let credential = settings.credential();
    SettingsView {
        has_api_key: credential.is_some(),
        api_key_preview: credential.as_deref().map(mask_credential),
        prompt_history_len: settings.prompt_history().len(),
    }
}

pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsView> {
    Json(settings_view(&state.settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    payload: Result<Json<UpdateSettingsRequest>, JsonRejection>,
) -> Result<Json<SettingsView>, AppError> {
    let Json(body) = payload?;
    state.settings.set_credential(body.api_key.trim())?;
    Ok(Json(settings_view(&state.settings)))
}

pub async fn prompt_history(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.settings.prompt_history())
}

pub async fn list_templates() -> Json<Vec<PromptTemplate>> {
    Json(templates())
}

pub async fn edit_image(
    State(state): State<AppState>,
    payload: Result<Json<EditImageRequest>, JsonRejection>,
) -> Result<Json<EditImageResponse>, AppError> {
    let Json(body) = payload?;
    let missing = || AppError::InvalidRequest("Missing API key or edit instructions".into());
    if body.instructions.trim().is_empty() {
        return Err(missing());
    }
    validate_shape(body.width, body.height, body.style_weight)?;
    let credential = state.resolve_credential(body.api_key.as_deref()).ok_or_else(missing)?;

    let plan = plan_edit(body.original_prompt.as_deref(), &body.instructions);
    let seed_offset: i64 = rand::thread_rng().gen_range(0..1000);
    tracing::info!("🖌️ {:?} requested: {}", plan.kind, plan.label);

    let params = GenerationParams {
        prompt: plan.prompt,
        width: body.width,
        height: body.height,
        n: 1,
        seed: body.seed.wrapping_add(seed_offset),
        style_weight: body.style_weight,
        references: Vec::new(),
    };
    let outcome = state.generation.generate(&params, Some(&credential)).await;
    Ok(Json(EditImageResponse { result: state.generation.to_response(outcome), label: plan.label }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::is_placeholder;
    use crate::queue::QueueConfig;
    use crate::testing::FakeUpstream;
    use axum::{body::Body, http::Request};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        upstream: Arc<FakeUpstream>,
        _dir: tempfile::TempDir,
    }

    fn harness(upstream: FakeUpstream) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let upstream = Arc::new(upstream);
        let generation = Arc::new(GenerationGateway::new(upstream.clone()));
        let state = AppState {
            generation: generation.clone(),
            assist: Arc::new(TextAssistGateway::new(upstream.clone())),
            queue: Arc::new(QueueProcessor::new(
                generation,
                QueueConfig::builder().with_group_delay(Duration::ZERO).build(),
            )),
            settings: Arc::new(SettingsStore::load(dir.path().join("settings.json")).unwrap()),
        };
        Harness { app: router(state), upstream, _dir: dir }
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn generate_without_key_returns_placeholders() {
        let h = harness(FakeUpstream::succeeding());
        let (status, body) = call(&h.app, "POST", "/api/images/generate", Some(json!({
            "prompt": "sunset", "width": 1024, "height": 1024, "seed": 7, "n": 2
        }))).await;

        assert_eq!(status, StatusCode::OK);
        let images = body["images"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|i| is_placeholder(i.as_str().unwrap())));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn generate_with_key_uses_upstream() {
        let h = harness(FakeUpstream::succeeding());
        let (status, body) = call(&h.app, "POST", "/api/images/generate", Some(json!({
            "prompt": "sunset", "width": 1024, "height": 1024, "seed": 7, "apiKey": "sk-test"
        }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"], json!(["https://images.test/1.png"]));
        assert!(body.get("note").is_some());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn generate_with_failing_upstream_falls_back() {
        let h = harness(FakeUpstream::failing());
        let (status, body) = call(&h.app, "POST", "/api/images/generate", Some(json!({
            "prompt": "sunset", "width": 1024, "height": 1024, "seed": 7, "n": 2, "apiKey": "sk-test"
        }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"].as_array().unwrap().len(), 2);
        assert!(body.get("error").is_some());
        assert!(body.get("note").is_some());
    }

    #[tokio::test]
    async fn generate_without_prompt_is_bad_request() {
        let h = harness(FakeUpstream::succeeding());
        let (status, body) = call(&h.app, "POST", "/api/images/generate", Some(json!({ "width": 512 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing prompt");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let h = harness(FakeUpstream::succeeding());
        let request = Request::builder()
            .method("POST")
            .uri("/api/translate")
            .header("content-type", "application/json")
            .body(Body::from("{\"text\": "))
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn translate_without_key_is_rejected() {
        let h = harness(FakeUpstream::succeeding());
        let (status, body) = call(&h.app, "POST", "/api/translate", Some(json!({ "text": "你好", "target": "en" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Missing API key or text" }));
    }

    #[tokio::test]
    async fn translate_success_echoes_original_and_target() {
        let h = harness(FakeUpstream::succeeding().with_chat_reply("hello"));
        let (status, body) = call(&h.app, "POST", "/api/translate", Some(json!({
            "text": "你好", "target": "en", "apiKey": "sk-test"
        }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "translatedText": "hello", "originalText": "你好", "target": "en" }));
    }

    #[tokio::test]
    async fn optimize_failure_returns_original_prompt() {
        let h = harness(FakeUpstream::failing());
        let (status, body) = call(&h.app, "POST", "/api/optimize-prompt", Some(json!({
            "prompt": "a quiet harbour at dawn", "apiKey": "sk-test"
        }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["optimizedPrompt"], "a quiet harbour at dawn");
        assert!(body["error"].as_str().unwrap().starts_with("Optimization failed"));
    }

    #[tokio::test]
    async fn batch_runs_expanded_prompts_and_records_history() {
        let h = harness(FakeUpstream::succeeding());
        let (status, body) = call(&h.app, "POST", "/api/batch", Some(json!({
            "prompts": ["a cat\na dog", "", "a bird", "a fish"],
            "width": 512, "height": 512
        }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"].as_array().unwrap().len(), 4);
        assert_eq!(body["history"]["promptSummary"], "a cat | a dog | a bird | a fish");
        assert_eq!(body["history"]["sampleImages"].as_array().unwrap().len(), 4);

        let (_, progress) = call(&h.app, "GET", "/api/batch/progress", None).await;
        assert_eq!(progress["running"], false);
        assert_eq!(progress["progress"]["totalCount"], 0);

        let (_, history) = call(&h.app, "GET", "/api/history", None).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        let (_, cleared) = call(&h.app, "DELETE", "/api/history", None).await;
        assert_eq!(cleared["cleared"], 1);

        let (_, remembered) = call(&h.app, "GET", "/api/prompts/history", None).await;
        assert_eq!(remembered, json!(["a fish", "a bird", "a dog", "a cat"]));
    }

    #[tokio::test]
    async fn batch_with_only_blank_prompts_is_rejected() {
        let h = harness(FakeUpstream::succeeding());
        let (status, _) = call(&h.app, "POST", "/api/batch", Some(json!({ "prompts": ["  ", "\n"] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn batch_optimizes_and_strips_preamble() {
        let h = harness(FakeUpstream::succeeding().with_chat_reply("Optimized prompt: a majestic cat"));
        let (status, body) = call(&h.app, "POST", "/api/batch", Some(json!({
            "prompts": ["cat"], "apiKey": "sk-test", "optimize": true
        }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"], json!(["https://images.test/1.png"]));
        assert_eq!(h.upstream.image_prompts(), vec!["a majestic cat".to_string()]);

        let (_, settings) = call(&h.app, "GET", "/api/settings", None).await;
        assert_eq!(settings["hasApiKey"], true);
        assert_eq!(settings["apiKeyPreview"], "sk-tes***");
    }

    #[tokio::test]
    async fn stored_credential_is_used_by_batch() {
        let h = harness(FakeUpstream::succeeding());
        let (status, _) = call(&h.app, "PUT", "/api/settings", Some(json!({ "apiKey": "sk-stored" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&h.app, "POST", "/api/batch", Some(json!({ "prompts": ["cat"] }))).await;
        assert_eq!(body["images"], json!(["https://images.test/1.png"]));
        assert_eq!(h.upstream.image_calls(), 1);
    }

    #[tokio::test]
    async fn edit_requires_key_and_instructions() {
        let h = harness(FakeUpstream::succeeding());
        let (status, body) = call(&h.app, "POST", "/api/images/edit", Some(json!({ "instructions": "add a hat" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing API key or edit instructions");

        let (status, _) = call(&h.app, "POST", "/api/images/edit", Some(json!({ "instructions": " ", "apiKey": "sk" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejected_edit_does_not_store_the_key() {
        let h = harness(FakeUpstream::succeeding());
        let (status, _) = call(&h.app, "POST", "/api/images/edit", Some(json!({
            "instructions": "   ", "apiKey": "sk-never-saved"
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, settings) = call(&h.app, "GET", "/api/settings", None).await;
        assert_eq!(settings["hasApiKey"], false);
        assert_eq!(h.upstream.image_calls(), 0);
    }

    #[tokio::test]
    async fn batch_events_stream_queue_progress() {
        let h = harness(FakeUpstream::succeeding());
        let request = Request::builder().method("GET").uri("/api/batch/events").body(Body::empty()).unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        let mut frames = response.into_body().into_data_stream();

        let (status, _) = call(&h.app, "POST", "/api/batch", Some(json!({ "prompts": ["a cat"] }))).await;
        assert_eq!(status, StatusCode::OK);

        let frame = frames.next().await.unwrap().unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.starts_with("data: "), "frame {text:?}");
        assert!(text.contains(r#""type":"runStarted""#), "frame {text:?}");
        assert!(text.contains(r#""total":1"#), "frame {text:?}");
    }

    #[tokio::test]
    async fn edit_generates_one_image_with_label() {
        let h = harness(FakeUpstream::succeeding());
        let (status, body) = call(&h.app, "POST", "/api/images/edit", Some(json!({
            "instructions": "watercolor style", "originalPrompt": "a lighthouse", "apiKey": "sk-test"
        }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"].as_array().unwrap().len(), 1);
        assert_eq!(body["label"], "Style Edit: watercolor style (based on: a lighthouse)");
        assert!(h.upstream.last_image_prompt().unwrap().contains("\"a lighthouse\""));
    }

    #[tokio::test]
    async fn templates_are_listed() {
        let h = harness(FakeUpstream::succeeding());
        let (status, body) = call(&h.app, "GET", "/api/templates", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 5);
    }
}
