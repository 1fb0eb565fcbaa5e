//! The AI model seam and structured reply parsing.
//!
//! Every producer in the runtime (idle loop, chat, voice) talks to the model
//! through [`ModelClient`] and expects an [`AgentReply`] back.  Models wrap
//! JSON in prose or code fences often enough that [`parse_reply`] digs the
//! first JSON object out of whatever came back.

use async_trait::async_trait;
use embody_types::{AgentReply, EmbodyError};
use thiserror::Error;

use crate::llm_driver::LlmError;

/// A two-part prompt: standing instructions plus the situation at hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Text generation, transcription, and speech synthesis.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate the model's reply to `prompt`.
    async fn generate_text(&self, prompt: &Prompt) -> Result<String, LlmError>;

    /// Transcribe a WAV-encoded utterance.
    async fn transcribe_audio(&self, wav: Vec<u8>) -> Result<String, LlmError>;

    /// Synthesize `text` into encoded audio.
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, LlmError>;
}

/// Why a model response could not be turned into an [`AgentReply`].
#[derive(Error, Debug)]
pub enum ReplyParseError {
    #[error("no JSON object in model output")]
    NoJson,
    #[error("malformed reply JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<ReplyParseError> for EmbodyError {
    fn from(e: ReplyParseError) -> Self {
        EmbodyError::ModelFailed(e.to_string())
    }
}

/// Extract and parse the first JSON object in `raw`.
///
/// # Errors
///
/// [`ReplyParseError::NoJson`] when `raw` contains no `{…}` span, and
/// [`ReplyParseError::Malformed`] when the span is not a valid reply.
pub fn parse_reply(raw: &str) -> Result<AgentReply, ReplyParseError> {
    let start = raw.find('{').ok_or(ReplyParseError::NoJson)?;
    let end = raw.rfind('}').ok_or(ReplyParseError::NoJson)?;
    if end < start {
        return Err(ReplyParseError::NoJson);
    }
    Ok(serde_json::from_str(&raw[start..=end])?)
}
