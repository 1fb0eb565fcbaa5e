//! Live voice: from raw per-speaker frames to a spoken answer.
//!
//! - [`VoiceAggregator`] gates frames by loudness, buffers them per speaker,
//!   and debounces on silence to decide when an utterance is finished.
//! - [`VoiceConversationPipeline`] transcribes the utterance and answers it
//!   out loud.
//!
//! Both share one [`VoiceProcessingFlag`]: while a turn is in flight new
//! utterances and outside playback requests are dropped, not queued.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use embody_types::EmbodyError;

pub mod aggregator;
pub mod conversation;

pub use aggregator::{FrameVerdict, VoiceAggregator};
pub use conversation::VoiceConversationPipeline;

/// Tuning knobs for voice capture.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Minimum mean absolute amplitude (16-bit samples) for a frame to count
    /// as speech.
    pub loudness_threshold: f32,
    /// Silence after the last loud frame that ends an utterance.
    pub silence_window: Duration,
    /// Sample rate of incoming PCM.
    pub sample_rate: u32,
    /// Channel count of incoming PCM.
    pub channels: u16,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            loudness_threshold: 500.0,
            silence_window: Duration::from_millis(1500),
            sample_rate: 48_000,
            channels: 1,
        }
    }
}

/// Shared "a voice turn is in flight" flag.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct VoiceProcessingFlag(Arc<AtomicBool>);

impl VoiceProcessingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag.  Returns `false` if it was already set.
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One finished utterance from a single speaker.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub speaker: String,
    /// Raw concatenated 16-bit little-endian PCM.
    pub pcm: Vec<u8>,
    /// The same audio wrapped in a WAV container.
    pub wav: Vec<u8>,
}

/// Receives finished utterances from a [`VoiceAggregator`].
#[async_trait]
pub trait UtteranceSink: Send + Sync {
    /// Handle one utterance.  Returns the accepted transcript, or `None` when
    /// transcription failed or produced nothing worth answering.
    async fn handle_utterance(&self, utterance: Utterance) -> Option<String>;
}

/// Mean absolute amplitude of 16-bit little-endian PCM.  A trailing odd byte
/// is ignored; an empty frame is silent.
pub fn mean_abs_amplitude(pcm: &[u8]) -> f32 {
    let samples = pcm.chunks_exact(2);
    let count = samples.len();
    if count == 0 {
        return 0.0;
    }
    let total: u64 = samples
        .map(|b| u64::from(i16::from_le_bytes([b[0], b[1]]).unsigned_abs()))
        .sum();
    (total as f64 / count as f64) as f32
}

/// Wrap 16-bit little-endian PCM in a WAV container.
///
/// # Errors
///
/// [`EmbodyError::Audio`] when the container cannot be written.
pub fn encode_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>, EmbodyError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let audio_err = |e: hound::Error| EmbodyError::Audio(e.to_string());

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(audio_err)?;
        for b in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([b[0], b[1]]))
                .map_err(audio_err)?;
        }
        writer.finalize().map_err(audio_err)?;
    }
    Ok(cursor.into_inner())
}

/// `false` for transcripts that carry no words: empty, whitespace, or only
/// non-speech markers such as `[BLANK_AUDIO]`, `(silence)` or `...`.
pub fn is_meaningful_transcript(transcript: &str) -> bool {
    let mut depth = 0usize;
    let mut in_stars = false;
    for c in transcript.chars() {
        match c {
            '[' | '(' | '<' => depth += 1,
            ']' | ')' | '>' => depth = depth.saturating_sub(1),
            '*' => in_stars = !in_stars,
            c if depth == 0 && !in_stars && c.is_alphanumeric() => return true,
            _ => {}
        }
    }
    false
}
