//! Scripted collaborators shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm_driver::LlmError;
use crate::model::{ModelClient, Prompt};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A [`ModelClient`] that replays canned answers and records every call.
///
/// Text replies are served in order; once the script runs out every call
/// returns `fallback`.  Every call sleeps for `delay` first.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    transcript: Result<String, String>,
    delay: Duration,
    prompts: Mutex<Vec<Prompt>>,
    transcriptions: Mutex<Vec<Vec<u8>>>,
    syntheses: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub(crate) fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: r#"{"thought":"nothing to do","actions":[]}"#.into(),
            transcript: Ok("hello there".into()),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            transcriptions: Mutex::new(Vec::new()),
            syntheses: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn reply(self, raw: &str) -> Self {
        lock(&self.replies).push_back(Ok(raw.into()));
        self
    }

    pub(crate) fn fail_next(self, message: &str) -> Self {
        lock(&self.replies).push_back(Err(message.into()));
        self
    }

    pub(crate) fn fallback(mut self, raw: &str) -> Self {
        self.fallback = raw.into();
        self
    }

    pub(crate) fn transcript(mut self, transcript: Result<&str, &str>) -> Self {
        self.transcript = transcript.map(str::to_string).map_err(str::to_string);
        self
    }

    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn prompts(&self) -> Vec<Prompt> {
        lock(&self.prompts).clone()
    }

    pub(crate) fn transcriptions(&self) -> Vec<Vec<u8>> {
        lock(&self.transcriptions).clone()
    }

    pub(crate) fn syntheses(&self) -> Vec<String> {
        lock(&self.syntheses).clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate_text(&self, prompt: &Prompt) -> Result<String, LlmError> {
        lock(&self.prompts).push(prompt.clone());
        self.pause().await;
        let next = lock(&self.replies).pop_front();
        match next {
            Some(Ok(raw)) => Ok(raw),
            Some(Err(message)) => Err(LlmError::BadResponse(message)),
            None => Ok(self.fallback.clone()),
        }
    }

    async fn transcribe_audio(&self, wav: Vec<u8>) -> Result<String, LlmError> {
        lock(&self.transcriptions).push(wav);
        self.pause().await;
        self.transcript
            .clone()
            .map_err(LlmError::BadResponse)
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, LlmError> {
        lock(&self.syntheses).push(text.to_string());
        Ok(format!("audio:{text}").into_bytes())
    }
}
