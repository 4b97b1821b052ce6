// In-process upstream fakes shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::UpstreamError;
use crate::upstream::{ChatCall, ImageCall, Upstream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Succeed,
    Empty,
    Fail,
}

pub struct FakeUpstream {
    mode: Mode,
    chat_reply: String,
    latency: Duration,
    image_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    image_prompts: Mutex<Vec<String>>,
    chat_calls: Mutex<Vec<ChatCall>>,
}

impl FakeUpstream {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            chat_reply: "a refined prompt".into(),
            latency: Duration::ZERO,
            image_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            image_prompts: Mutex::new(Vec::new()),
            chat_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self { Self::with_mode(Mode::Succeed) }
    pub fn empty() -> Self { Self::with_mode(Mode::Empty) }
    pub fn failing() -> Self { Self::with_mode(Mode::Fail) }

    pub fn with_chat_reply(mut self, reply: &str) -> Self {
        self.chat_reply = reply.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn image_calls(&self) -> usize { self.image_calls.load(Ordering::SeqCst) }
    pub fn max_in_flight(&self) -> usize { self.max_in_flight.load(Ordering::SeqCst) }
    pub fn image_prompts(&self) -> Vec<String> { self.image_prompts.lock().clone() }
    pub fn last_image_prompt(&self) -> Option<String> { self.image_prompts.lock().last().cloned() }
    pub fn chat_calls(&self) -> Vec<ChatCall> { self.chat_calls.lock().clone() }

    fn failure() -> UpstreamError {
        UpstreamError::Api { status: 429, message: "quota exceeded".into() }
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn generate_image(&self, _credential: &str, call: &ImageCall) -> Result<Option<String>, UpstreamError> {
        let number = self.image_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.image_prompts.lock().push(call.prompt.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.mode {
            Mode::Succeed => Ok(Some(format!("https://images.test/{}.png", number))),
            Mode::Empty => Ok(None),
            Mode::Fail => Err(Self::failure()),
        }
    }

    async fn chat(&self, _credential: &str, call: &ChatCall) -> Result<Option<String>, UpstreamError> {
        self.chat_calls.lock().push(call.clone());
        match self.mode {
            Mode::Succeed => Ok(Some(self.chat_reply.clone())),
            Mode::Empty => Ok(None),
            Mode::Fail => Err(Self::failure()),
        }
    }

    fn image_model(&self) -> &str { "fake-image-model" }
}
