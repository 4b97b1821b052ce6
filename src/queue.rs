// Rate-limited fan-out of generation jobs: groups of concurrent dispatches,
// run one after another with a pause in between. One run per processor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    generation::{GenerationGateway, GenerationParams},
    models::{GenerateImagesRequest, GenerationJob, HistoryEntry, ProgressResponse, ProgressState},
    placeholder::is_placeholder,
    upstream::preview,
};

pub const GROUP_WIDTH: usize = 3;
pub const GROUP_DELAY: Duration = Duration::from_secs(2);
const HISTORY_SAMPLES: usize = 4;
const LABEL_CHARS: usize = 50;
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Jobs dispatched concurrently per group.
    pub group_width: usize,
    /// Pause between consecutive groups.
    pub group_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { group_width: GROUP_WIDTH, group_delay: GROUP_DELAY }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder { QueueConfigBuilder::default() }
}

#[derive(Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn with_group_delay(mut self, delay: Duration) -> Self {
        self.config.group_delay = delay;
        self
    }

    pub fn build(self) -> QueueConfig { self.config }
}

/// Broadcast to subscribers while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    RunStarted { total: usize },
    GroupCompleted { group: usize, completed: usize, total: usize, images: Vec<String> },
    RunFinished { produced: usize, history_id: Option<Uuid> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
}

#[derive(Debug, Default)]
struct RunSnapshot {
    progress: ProgressState,
    images: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub images: Vec<String>,
    pub history: Option<HistoryEntry>,
}

pub struct QueueProcessor {
    gateway: Arc<GenerationGateway>,
    config: QueueConfig,
    state: Mutex<RunState>,
    snapshot: RwLock<RunSnapshot>,
    history: RwLock<Vec<HistoryEntry>>,
    events: broadcast::Sender<QueueEvent>,
}

/// Holds the processor in `Running`; dropping it returns to `Idle`.
struct RunGuard {
    processor: Arc<QueueProcessor>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *self.processor.snapshot.write() = RunSnapshot::default();
        *self.processor.state.lock() = RunState::Idle;
    }
}

impl QueueProcessor {
    pub fn new(gateway: Arc<GenerationGateway>, config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            gateway,
            config,
            state: Mutex::new(RunState::Idle),
            snapshot: RwLock::new(RunSnapshot::default()),
            history: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> { self.events.subscribe() }

    pub fn is_running(&self) -> bool { *self.state.lock() == RunState::Running }

    pub fn progress(&self) -> ProgressResponse {
        let snapshot = self.snapshot.read();
        ProgressResponse {
            running: self.is_running(),
            progress: snapshot.progress.clone(),
            images: snapshot.images.clone(),
        }
    }

    /// Newest first.
    pub fn history(&self) -> Vec<HistoryEntry> { self.history.read().clone() }

    pub fn clear_history(&self) -> usize {
        let mut history = self.history.write();
        let cleared = history.len();
        history.clear();
        cleared
    }

    fn try_begin(self: &Arc<Self>) -> Result<RunGuard, AppError> {
        let mut state = self.state.lock();
        if *state == RunState::Running {
            return Err(AppError::Busy);
        }
        *state = RunState::Running;
        Ok(RunGuard { processor: Arc::clone(self) })
    }

    /// Runs `jobs` on a spawned task; dropping the returned future does not stop the run.
    pub async fn run(self: &Arc<Self>, jobs: Vec<GenerationJob>, credential: Option<String>) -> Result<RunReport, AppError> {
        let guard = self.try_begin()?;
        if jobs.is_empty() {
            return Err(AppError::InvalidRequest("No prompts to process".into()));
        }

        let processor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            processor.drain(jobs, credential.as_deref()).await
        });
        handle.await.map_err(|e| AppError::Internal(format!("queue run aborted: {e}")))
    }

    /// Drains `jobs` group by group. A failing job contributes no images and never aborts the run.
    async fn drain(&self, jobs: Vec<GenerationJob>, credential: Option<&str>) -> RunReport {
        let total = jobs.len();
        let width = self.config.group_width.max(1);
        self.snapshot.write().progress = ProgressState { completed_count: 0, total_count: total, current_label: String::new() };
        let _ = self.events.send(QueueEvent::RunStarted { total });
        info!("🚀 Processing {} job(s) in groups of {}", total, width);

        let mut results: Vec<String> = Vec::new();
        for (group, chunk) in jobs.chunks(width).enumerate() {
            let offset = group * width;
            if let Some(last) = chunk.last() {
                self.snapshot.write().progress.current_label = label(&last.prompt);
            }

            let dispatches = chunk.iter().enumerate().map(|(index, job)| self.dispatch(job, offset, index, credential));
            let group_images: Vec<String> = join_all(dispatches).await.into_iter().flatten().collect();

            let completed = offset + chunk.len();
            {
                let mut snapshot = self.snapshot.write();
                snapshot.images.extend(group_images.iter().cloned());
                snapshot.progress.completed_count = completed;
            }
            info!("📦 Group {} done: {}/{} jobs, {} image(s)", group + 1, completed, total, group_images.len());
            results.extend(group_images.iter().cloned());
            let _ = self.events.send(QueueEvent::GroupCompleted { group, completed, total, images: group_images });

            if completed < total {
                tokio::time::sleep(self.config.group_delay).await;
            }
        }

        let history = (!results.is_empty()).then(|| self.record_history(&jobs, &results));
        let _ = self.events.send(QueueEvent::RunFinished {
            produced: results.len(),
            history_id: history.as_ref().map(|h| h.id),
        });
        info!("✅ Run finished with {} image(s)", results.len());

        RunReport { images: results, history }
    }

    async fn dispatch(&self, job: &GenerationJob, offset: usize, index: usize, credential: Option<&str>) -> Vec<String> {
        let seed = job.seed.wrapping_add(offset as i64).wrapping_add(index as i64);
        let request = GenerateImagesRequest {
            prompt: Some(job.prompt.clone()),
            width: job.width,
            height: job.height,
            n: 1,
            style_weight: job.style_weight,
            seed,
            references: job.reference_images.clone(),
            api_key: None,
        };
        let params = match GenerationParams::try_from(request) {
            Ok(params) => params,
            Err(e) => {
                warn!("⚠️ Job {} ({}) skipped: {}", offset + index, job.id, e);
                return Vec::new();
            }
        };
        let outcome = self.gateway.generate(&params, credential).await;
        if outcome.is_degraded() {
            warn!("⚠️ Job {} fell back to placeholder images", offset + index);
        }
        let images = outcome.into_data().images;
        if let Some(first) = images.first() {
            let kind = if is_placeholder(first) { "placeholder" } else { "upstream" };
            info!("🖼️ Job {} produced {} image: {}", offset + index, kind, preview(first));
        }
        images
    }

    fn record_history(&self, jobs: &[GenerationJob], results: &[String]) -> HistoryEntry {
        let first = &jobs[0];
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            prompt_summary: jobs.iter().map(|j| j.prompt.as_str()).collect::<Vec<_>>().join(" | "),
            width: first.width,
            height: first.height,
            count: results.len(),
            seed: first.seed,
            style_weight: first.style_weight,
            sample_images: results.iter().take(HISTORY_SAMPLES).cloned().collect(),
        };
        self.history.write().insert(0, entry.clone());
        entry
    }
}

fn label(prompt: &str) -> String {
    format!("{}...", prompt.chars().take(LABEL_CHARS).collect::<String>())
}
