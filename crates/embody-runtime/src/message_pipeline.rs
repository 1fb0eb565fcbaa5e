//! [`MessagePipeline`] – answers chat lines.
//!
//! Each chat event becomes one model round-trip held under the
//! [`ActivityLock`], so the idle loop stays quiet while the agent is in a
//! conversation.

use std::sync::Arc;

use embody_hal::OutputChannel;
use embody_kernel::ActivityLock;
use embody_types::EmbodyError;
use tracing::{debug, info, warn};

use crate::model::{ModelClient, Prompt, parse_reply};

/// What became of one chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The agent answered (with text, an emote, or both).
    Replied,
    /// Nothing to answer: empty text, the agent's own line, or an empty reply.
    Ignored,
    /// The model or output failed; carries the error text.
    Failed(String),
}

/// Chat-driven conversation turns.
pub struct MessagePipeline {
    agent_name: String,
    model: Arc<dyn ModelClient>,
    output: Arc<dyn OutputChannel>,
    lock: Arc<ActivityLock>,
}

impl MessagePipeline {
    pub fn new(
        agent_name: impl Into<String>,
        model: Arc<dyn ModelClient>,
        output: Arc<dyn OutputChannel>,
        lock: Arc<ActivityLock>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            model,
            output,
            lock,
        }
    }

    /// Answer `text` from `sender`.  Never fails: errors are logged and
    /// reported as [`ChatOutcome::Failed`].
    pub async fn handle_chat(&self, sender: &str, text: &str) -> ChatOutcome {
        let text = text.trim();
        if text.is_empty() || sender.eq_ignore_ascii_case(&self.agent_name) {
            debug!(sender = %sender, "chat line ignored");
            return ChatOutcome::Ignored;
        }
        info!(sender = %sender, text = %text, "chat received");

        let prompt = Prompt::new(
            format!(
                "You are {}, an avatar in a shared virtual world. Someone is typing \
                 to you in chat; answer in chat.",
                self.agent_name
            ),
            format!("{sender} wrote: \"{text}\""),
        );
        match self.lock.run(self.respond(&prompt)).await {
            Ok(true) => ChatOutcome::Replied,
            Ok(false) => ChatOutcome::Ignored,
            Err(e) => {
                warn!(sender = %sender, error = %e, "chat turn failed");
                ChatOutcome::Failed(e.to_string())
            }
        }
    }

    async fn respond(&self, prompt: &Prompt) -> Result<bool, EmbodyError> {
        let raw = self.model.generate_text(prompt).await?;
        let reply = parse_reply(&raw)?;
        debug!(thought = %reply.thought, "chat reply");

        let mut acted = false;
        if let Some(emote) = reply.emote_name() {
            self.output.play_emote(emote).await?;
            acted = true;
        }
        if let Some(line) = reply.spoken_text() {
            self.output.send_chat_message(line).await?;
            acted = true;
        }
        Ok(acted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use embody_hal::RecordingOutput;
    use std::time::Duration;

    fn pipeline(model: ScriptedModel, output: RecordingOutput) -> (MessagePipeline, Arc<ScriptedModel>, Arc<ActivityLock>) {
        let model = Arc::new(model);
        let lock = Arc::new(ActivityLock::new());
        let pipeline = MessagePipeline::new("Pixel", model.clone(), Arc::new(output), lock.clone());
        (pipeline, model, lock)
    }

    #[tokio::test]
    async fn replies_in_chat_with_emote() {
        let output = RecordingOutput::new();
        let (pipeline, model, lock) = pipeline(
            ScriptedModel::new().reply(r#"{"thought":"greet","text":"Hey Alice!","emote":"wave"}"#),
            output.clone(),
        );

        assert_eq!(pipeline.handle_chat("alice", "hi pixel").await, ChatOutcome::Replied);
        assert_eq!(output.chats(), vec!["Hey Alice!"]);
        assert_eq!(output.emotes(), vec!["wave"]);
        assert!(model.prompts()[0].user.contains("alice wrote: \"hi pixel\""));
        assert!(!lock.is_active());
    }

    #[tokio::test]
    async fn own_and_empty_lines_are_ignored() {
        let output = RecordingOutput::new();
        let (pipeline, model, _lock) = pipeline(ScriptedModel::new(), output.clone());

        assert_eq!(pipeline.handle_chat("pixel", "I said this").await, ChatOutcome::Ignored);
        assert_eq!(pipeline.handle_chat("alice", "   ").await, ChatOutcome::Ignored);
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn empty_reply_is_ignored() {
        let output = RecordingOutput::new();
        let (pipeline, _model, _lock) = pipeline(ScriptedModel::new(), output.clone());
        assert_eq!(pipeline.handle_chat("alice", "hello").await, ChatOutcome::Ignored);
        assert!(output.chats().is_empty());
    }

    #[tokio::test]
    async fn model_and_parse_failures_are_reported() {
        let output = RecordingOutput::new();
        let (pipeline, _model, lock) = pipeline(
            ScriptedModel::new().fail_next("timeout").reply("no json here"),
            output.clone(),
        );
        assert!(matches!(pipeline.handle_chat("alice", "one").await, ChatOutcome::Failed(_)));
        assert!(matches!(pipeline.handle_chat("alice", "two").await, ChatOutcome::Failed(_)));
        assert!(output.chats().is_empty());
        assert!(!lock.is_active());
    }

    #[tokio::test]
    async fn output_failure_is_reported() {
        let (pipeline, _model, lock) = pipeline(
            ScriptedModel::new().reply(r#"{"thought":"","text":"hi"}"#),
            RecordingOutput::failing(),
        );
        assert!(matches!(pipeline.handle_chat("alice", "hi").await, ChatOutcome::Failed(_)));
        assert!(!lock.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_turns_share_the_lock() {
        let model = Arc::new(ScriptedModel::new().delay(Duration::from_secs(2)));
        let lock = Arc::new(ActivityLock::new());
        let pipeline = Arc::new(MessagePipeline::new(
            "Pixel",
            model.clone(),
            Arc::new(RecordingOutput::new()),
            lock.clone(),
        ));

        let first = tokio::spawn({
            let p = pipeline.clone();
            async move { p.handle_chat("alice", "one").await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = tokio::spawn({
            let p = pipeline.clone();
            async move { p.handle_chat("bob", "two").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lock.holders(), 2);

        first.await.unwrap();
        // Bob's turn is still in flight.
        assert!(lock.is_active());
        second.await.unwrap();
        assert!(!lock.is_active());
    }
}
