//! [`LlmDriver`] – OpenAI-compatible model interface.
//!
//! Communicates with a model server that exposes the OpenAI-compatible
//! `/v1/chat/completions`, `/v1/audio/transcriptions` and `/v1/audio/speech`
//! endpoints, such as [Ollama](https://ollama.com) fronted by a speech
//! server, or any hosted OpenAI-compatible API.
//!
//! # Example
//!
//! ```rust,no_run
//! use embody_runtime::llm_driver::LlmDriver;
//! use embody_runtime::model::{ModelClient, Prompt};
//!
//! # async fn demo() -> Result<(), embody_runtime::LlmError> {
//! let driver = LlmDriver::new("http://localhost:11434", "llama3");
//! let prompt = Prompt::new("You are a friendly avatar.", "Someone waved at you.");
//!
//! // Requires a running model server – skipped in unit tests.
//! let reply = driver.generate_text(&prompt).await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use embody_types::{AgentReply, EmbodyError};
use reqwest::multipart::{Form, Part};
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{ModelClient, Prompt};

/// Per-request timeout for every model call.
pub const MODEL_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Persona guidelines
// ─────────────────────────────────────────────────────────────────────────────

/// Rules appended to every system prompt so the model stays in character and
/// answers in the structured reply format.
pub const PERSONA_GUIDELINES: &str = "\
## Reply Guidelines
- Answer with a single JSON object: thought, text, actions, emote.
- Keep `text` to one or two short spoken sentences.
- Leave `text` empty when you have nothing worth saying.
- Do not repeat a line you have said recently.
- Only use actions you were told about.";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from model driver operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

impl From<LlmError> for EmbodyError {
    fn from(e: LlmError) -> Self {
        EmbodyError::ModelFailed(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The message list sent for `prompt`: the system prompt with
/// [`PERSONA_GUIDELINES`] appended, then the user turn.
pub fn build_messages(prompt: &Prompt) -> Vec<ChatMessage> {
    let system = if prompt.system.trim().is_empty() {
        PERSONA_GUIDELINES.to_string()
    } else {
        format!("{}\n\n{}", prompt.system, PERSONA_GUIDELINES)
    };
    vec![
        ChatMessage {
            role: Role::System,
            content: system,
        },
        ChatMessage {
            role: Role::User,
            content: prompt.user.clone(),
        },
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

/// `response_format` field that enforces structured JSON Schema output.
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for an OpenAI-compatible model server.
///
/// Construct once and share (`Arc<dyn ModelClient>`) across pipelines.
pub struct LlmDriver {
    base_url: String,
    model: String,
    transcription_model: String,
    speech_model: String,
    voice: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmDriver {
    /// Create a new driver pointing at `base_url` (e.g. `"http://localhost:11434"`)
    /// and using `model` (e.g. `"llama3"`) for text generation.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(MODEL_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            transcription_model: "whisper-1".into(),
            speech_model: "tts-1".into(),
            voice: "alloy".into(),
            api_key: None,
            client,
        }
    }

    /// Bearer token sent with every request.  Blank keys are ignored.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    /// Models and voice used for the audio endpoints.
    pub fn with_audio_models(
        mut self,
        transcription_model: impl Into<String>,
        speech_model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        self.transcription_model = transcription_model.into();
        self.speech_model = speech_model.into();
        self.voice = voice.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl ModelClient for LlmDriver {
    /// Send `prompt` to `/v1/chat/completions` with the [`AgentReply`] schema
    /// as the response format, and return the assistant's reply text.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails, or
    /// [`LlmError::BadResponse`] if the response shape is unexpected.
    async fn generate_text(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let messages = build_messages(prompt);
        let schema =
            serde_json::to_value(schema_for!(AgentReply)).unwrap_or(serde_json::Value::Null);
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: schema,
            },
        };

        let response: ChatResponse = self
            .post("/v1/chat/completions")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }

    async fn transcribe_audio(&self, wav: Vec<u8>) -> Result<String, LlmError> {
        debug!(bytes = wav.len(), "transcribing utterance");
        let file = Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.transcription_model.clone());

        let response: TranscriptionResponse = self
            .post("/v1/audio/transcriptions")
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.text)
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, LlmError> {
        let body = SpeechRequest {
            model: &self.speech_model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
        };
        let bytes = self
            .post("/v1/audio/speech")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if bytes.is_empty() {
            return Err(LlmError::BadResponse("empty speech payload".into()));
        }
        Ok(bytes.to_vec())
    }
}
