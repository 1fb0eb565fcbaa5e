use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod geometry;

pub use geometry::{Quaternion, Vec3};

/// Named locomotion inputs the agent can hold down, mirroring the movement
/// keys of a human player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementSignal {
    Forward,
    Backward,
    Left,
    Right,
    Run,
}

impl MovementSignal {
    /// Every movement signal, in a stable order.
    pub const ALL: [MovementSignal; 5] = [
        MovementSignal::Forward,
        MovementSignal::Backward,
        MovementSignal::Left,
        MovementSignal::Right,
        MovementSignal::Run,
    ];

    /// Stable signal name used as the key on a signal board.
    pub fn name(self) -> &'static str {
        match self {
            MovementSignal::Forward => "forward",
            MovementSignal::Backward => "backward",
            MovementSignal::Left => "left",
            MovementSignal::Right => "right",
            MovementSignal::Run => "run",
        }
    }
}

impl std::fmt::Display for MovementSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured decision the language model is asked to return on every turn.
///
/// The JSON Schema of this type is sent with each completion request so the
/// model produces strictly shaped output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct AgentReply {
    /// The model's private reasoning. Logged, never spoken.
    #[serde(default)]
    pub thought: String,
    /// Text to say, if any.
    #[serde(default)]
    pub text: Option<String>,
    /// Action markers, e.g. `"ambient_speech"` or `"wander"`.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Emote to play, e.g. `"wave"`.
    #[serde(default)]
    pub emote: Option<String>,
}

impl AgentReply {
    /// `true` if `action` is among the reply's action markers.
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a.eq_ignore_ascii_case(action))
    }

    /// The reply text, trimmed, or `None` when absent or blank.
    pub fn spoken_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// The emote name, trimmed, or `None` when absent or blank.
    pub fn emote_name(&self) -> Option<&str> {
        self.emote
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// Unified event wrapper for the world event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "embody-cli::stdin"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh event stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Everything the virtual world can tell the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A chat line typed by someone in the world.
    ChatMessage { sender: String, text: String },
    /// One frame of 16-bit little-endian PCM from a single speaker.
    AudioFrame { speaker: String, pcm: Vec<u8> },
    /// Periodic world clock tick.
    Tick { sequence: u64 },
}

/// Global error type spanning actuator faults, output failures, model
/// failures, and audio encoding problems.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum EmbodyError {
    #[error("Invalid State on {component}: {details}")]
    InvalidState { component: String, details: String },

    #[error("Output Channel Error: {0}")]
    Output(String),

    #[error("Model Error: {0}")]
    ModelFailed(String),

    #[error("Audio Error: {0}")]
    Audio(String),

    #[error("Channel Error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_signal_names_are_unique() {
        let mut names: Vec<&str> = MovementSignal::ALL.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), MovementSignal::ALL.len());
    }

    #[test]
    fn agent_reply_parses_with_missing_fields() {
        let reply: AgentReply = serde_json::from_str(r#"{"thought":"idle"}"#).unwrap();
        assert_eq!(reply.thought, "idle");
        assert!(reply.actions.is_empty());
        assert!(reply.spoken_text().is_none());
    }

    #[test]
    fn agent_reply_helpers_trim_blank_values() {
        let reply = AgentReply {
            thought: String::new(),
            text: Some("   ".into()),
            actions: vec!["Ambient_Speech".into()],
            emote: Some(" wave ".into()),
        };
        assert!(reply.spoken_text().is_none());
        assert_eq!(reply.emote_name(), Some("wave"));
        assert!(reply.has_action("ambient_speech"));
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "embody-middleware::test",
            EventPayload::ChatMessage {
                sender: "alice".into(),
                text: "hi".into(),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
    }

    #[test]
    fn embody_error_display() {
        let err = EmbodyError::InvalidState {
            component: "navigation".to_string(),
            details: "position is NaN".to_string(),
        };
        assert!(err.to_string().contains("navigation"));
        assert!(EmbodyError::Output("closed".into()).to_string().contains("Output"));
    }
}
