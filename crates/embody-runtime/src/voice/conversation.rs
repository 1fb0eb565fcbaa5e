//! [`VoiceConversationPipeline`] – answers finished utterances out loud.
//!
//! One voice turn: transcribe, reject non-speech, resolve who spoke and where
//! the agent stands, then (holding the [`ActivityLock`]) ask the model, play
//! the emote, synthesize the reply, and play it.  Failures anywhere are
//! logged and end the turn quietly.

use std::sync::Arc;

use async_trait::async_trait;
use embody_hal::OutputChannel;
use embody_kernel::ActivityLock;
use embody_types::EmbodyError;
use tracing::{debug, info, warn};

use super::{UtteranceSink, Utterance, VoiceAggregator, VoiceConfig, VoiceProcessingFlag, is_meaningful_transcript};
use crate::model::{ModelClient, Prompt, parse_reply};
use crate::navigation::NavigationController;

/// Releases the processing flag taken for outside playback.
struct PlaybackGuard<'a>(&'a VoiceProcessingFlag);

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// Turns utterances into spoken replies.
pub struct VoiceConversationPipeline {
    agent_name: String,
    model: Arc<dyn ModelClient>,
    output: Arc<dyn OutputChannel>,
    lock: Arc<ActivityLock>,
    flag: VoiceProcessingFlag,
    navigation: Option<Arc<NavigationController>>,
}

impl VoiceConversationPipeline {
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
            flag: VoiceProcessingFlag::new(),
            navigation: None,
        }
    }

    /// Include the agent's position in the turn context.
    pub fn with_navigation(mut self, navigation: Arc<NavigationController>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    pub fn flag(&self) -> &VoiceProcessingFlag {
        &self.flag
    }

    /// Build the aggregator that feeds this pipeline.  Both share one
    /// processing flag.
    pub fn aggregator(self: &Arc<Self>, config: VoiceConfig) -> Arc<VoiceAggregator> {
        let sink: Arc<dyn UtteranceSink> = Arc::clone(self) as Arc<dyn UtteranceSink>;
        Arc::new(VoiceAggregator::new(config, sink, self.flag.clone()))
    }

    /// Synthesize and play `text` outside a voice turn.
    ///
    /// Returns `Ok(false)` without playing anything while a voice turn is in
    /// flight.
    ///
    /// # Errors
    ///
    /// Synthesis or output failures.
    pub async fn speak(&self, text: &str) -> Result<bool, EmbodyError> {
        let Some(_playback) = self.begin_playback() else {
            return Ok(false);
        };
        let audio = self.model.synthesize_speech(text).await?;
        self.output.play_audio(audio).await?;
        Ok(true)
    }

    /// Play pre-encoded `audio` outside a voice turn.
    ///
    /// Returns `Ok(false)` without playing anything while a voice turn is in
    /// flight.
    ///
    /// # Errors
    ///
    /// Output failures.
    pub async fn play(&self, audio: Vec<u8>) -> Result<bool, EmbodyError> {
        let Some(_playback) = self.begin_playback() else {
            return Ok(false);
        };
        self.output.play_audio(audio).await?;
        Ok(true)
    }

    fn begin_playback(&self) -> Option<PlaybackGuard<'_>> {
        if self.flag.try_begin() {
            Some(PlaybackGuard(&self.flag))
        } else {
            info!("voice busy; playback request dropped");
            None
        }
    }

    fn prompt_for(&self, speaker: &str, transcript: &str) -> Prompt {
        let system = format!(
            "You are {}, an avatar in a shared virtual world. People talk to you \
             out loud and you answer out loud.",
            self.agent_name
        );
        let mut user = format!("{speaker} said to you: \"{transcript}\"");
        if let Some(nav) = &self.navigation {
            let p = nav.position();
            user.push_str(&format!("\nYou are standing at ({:.1}, {:.1}).", p.x, p.z));
            if nav.is_navigating() {
                user.push_str(" You are currently walking.");
            }
        }
        Prompt::new(system, user)
    }

    async fn answer(&self, speaker: &str, transcript: &str) -> Result<(), EmbodyError> {
        let prompt = self.prompt_for(speaker, transcript);
        self.lock.run(self.respond(&prompt)).await
    }

    async fn respond(&self, prompt: &Prompt) -> Result<(), EmbodyError> {
        let raw = self.model.generate_text(prompt).await?;
        let reply = parse_reply(&raw)?;
        debug!(thought = %reply.thought, "voice reply");

        if let Some(emote) = reply.emote_name() {
            if let Err(e) = self.output.play_emote(emote).await {
                warn!(emote = %emote, error = %e, "emote failed");
            }
        }
        if let Some(text) = reply.spoken_text() {
            let audio = self.model.synthesize_speech(text).await?;
            self.output.play_audio(audio).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UtteranceSink for VoiceConversationPipeline {
    async fn handle_utterance(&self, utterance: Utterance) -> Option<String> {
        let speaker = utterance.speaker;
        let transcript = match self.model.transcribe_audio(utterance.wav).await {
            Ok(t) => t.trim().to_string(),
            Err(e) => {
                warn!(speaker = %speaker, error = %e, "transcription failed");
                return None;
            }
        };
        if !is_meaningful_transcript(&transcript) {
            debug!(speaker = %speaker, transcript = %transcript, "non-speech transcript ignored");
            return None;
        }
        info!(speaker = %speaker, transcript = %transcript, "heard");

        if let Err(e) = self.answer(&speaker, &transcript).await {
            warn!(speaker = %speaker, error = %e, "voice turn failed");
        }
        Some(transcript)
    }
}
