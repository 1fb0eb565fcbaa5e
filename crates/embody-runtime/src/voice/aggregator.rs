//! [`VoiceAggregator`] – per-speaker buffering with a silence debounce.
//!
//! There are no end-of-utterance markers in the audio stream, so an utterance
//! is "whatever arrived before 1.5 s of silence".  Every loud frame re-arms a
//! single shared debounce timer; when it finally fires, the buffers of the
//! speaker who armed it are concatenated, wrapped as WAV, and handed to the
//! [`UtteranceSink`].
//!
//! Only one timer is ever live: arming aborts the previous timer task before
//! spawning the next.  A firing timer claims the slot under the state mutex,
//! so a frame that arrives while the utterance is being answered arms a fresh
//! timer instead of aborting the turn in progress.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, trace, warn};

use super::{Utterance, UtteranceSink, VoiceConfig, VoiceProcessingFlag, encode_wav, mean_abs_amplitude};

/// What happened to a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    /// Below the loudness threshold; discarded.
    Quiet,
    /// Appended to the speaker's buffer; debounce re-armed.
    Buffered,
}

/// Audio accumulated for one speaker.
///
/// `total_len` always equals the summed length of `buffers`.
#[derive(Debug, Default)]
struct VoiceUserState {
    buffers: Vec<Vec<u8>>,
    total_len: usize,
    last_active_at: Option<Instant>,
    pending_transcript: String,
}

impl VoiceUserState {
    fn push(&mut self, frame: Vec<u8>) {
        self.total_len += frame.len();
        self.buffers.push(frame);
        self.last_active_at = Some(Instant::now());
    }

    /// Concatenate and clear the buffers.
    fn take(&mut self) -> Vec<u8> {
        let mut pcm = Vec::with_capacity(self.total_len);
        for frame in self.buffers.drain(..) {
            pcm.extend_from_slice(&frame);
        }
        self.total_len = 0;
        pcm
    }

    /// Drop the buffers; returns how many bytes were discarded.
    fn clear(&mut self) -> usize {
        let dropped = self.total_len;
        self.buffers.clear();
        self.total_len = 0;
        dropped
    }
}

struct PendingTimer {
    generation: u64,
    speaker: String,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct AggregatorState {
    users: HashMap<String, VoiceUserState>,
    pending: Option<PendingTimer>,
}

/// Clears the flag and every speaker's buffers when a turn ends, however it
/// ends.
struct TurnGuard<'a> {
    aggregator: &'a VoiceAggregator,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.aggregator.lock();
        for user in state.users.values_mut() {
            user.clear();
        }
        self.aggregator.flag.end();
    }
}

/// Loudness-gated, silence-debounced utterance detector.
pub struct VoiceAggregator {
    config: VoiceConfig,
    sink: Arc<dyn UtteranceSink>,
    flag: VoiceProcessingFlag,
    state: Mutex<AggregatorState>,
    next_generation: AtomicU64,
}

impl VoiceAggregator {
    pub fn new(config: VoiceConfig, sink: Arc<dyn UtteranceSink>, flag: VoiceProcessingFlag) -> Self {
        Self {
            config,
            sink,
            flag,
            state: Mutex::new(AggregatorState::default()),
            next_generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Offer one PCM frame from `speaker`.
    ///
    /// Must be called from within a tokio runtime: accepted frames spawn the
    /// debounce timer task.
    pub fn push_frame(self: &Arc<Self>, speaker: &str, pcm: Vec<u8>) -> FrameVerdict {
        let loudness = mean_abs_amplitude(&pcm);
        if loudness < self.config.loudness_threshold {
            trace!(speaker = %speaker, loudness, "quiet frame dropped");
            return FrameVerdict::Quiet;
        }

        let mut state = self.lock();
        state
            .users
            .entry(speaker.to_string())
            .or_default()
            .push(pcm);

        if let Some(previous) = state.pending.take() {
            previous.handle.abort();
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        let window = self.config.silence_window;
        let handle = tokio::spawn(async move {
            sleep(window).await;
            this.fire(generation).await;
        });
        state.pending = Some(PendingTimer {
            generation,
            speaker: speaker.to_string(),
            handle,
        });
        FrameVerdict::Buffered
    }

    async fn fire(self: Arc<Self>, generation: u64) {
        let (speaker, pcm) = {
            let mut state = self.lock();
            let is_current = state
                .pending
                .as_ref()
                .is_some_and(|p| p.generation == generation);
            if !is_current {
                return;
            }
            let Some(timer) = state.pending.take() else {
                return;
            };
            let speaker = timer.speaker;

            if !self.flag.try_begin() {
                let dropped = state
                    .users
                    .get_mut(&speaker)
                    .map(VoiceUserState::clear)
                    .unwrap_or(0);
                info!(speaker = %speaker, dropped_bytes = dropped, "voice turn in flight; utterance dropped");
                return;
            }
            let pcm = state
                .users
                .get_mut(&speaker)
                .map(VoiceUserState::take)
                .unwrap_or_default();
            (speaker, pcm)
        };
        let _turn = TurnGuard { aggregator: &self };

        if pcm.is_empty() {
            return;
        }
        let wav = match encode_wav(&pcm, self.config.sample_rate, self.config.channels) {
            Ok(wav) => wav,
            Err(e) => {
                warn!(speaker = %speaker, error = %e, "failed to encode utterance");
                return;
            }
        };
        debug!(speaker = %speaker, pcm_bytes = pcm.len(), "utterance complete");

        let utterance = Utterance {
            speaker: speaker.clone(),
            pcm,
            wav,
        };
        if let Some(transcript) = self.sink.handle_utterance(utterance).await {
            if let Some(user) = self.lock().users.get_mut(&speaker) {
                user.pending_transcript = transcript;
            }
        }
    }

    /// Bytes currently buffered for `speaker`.
    pub fn buffered_len(&self, speaker: &str) -> usize {
        self.lock().users.get(speaker).map_or(0, |u| u.total_len)
    }

    /// The last accepted transcript for `speaker`.
    pub fn pending_transcript(&self, speaker: &str) -> Option<String> {
        self.lock()
            .users
            .get(speaker)
            .map(|u| u.pending_transcript.clone())
            .filter(|t| !t.is_empty())
    }

    /// When `speaker` last sent a loud frame.
    pub fn last_active_at(&self, speaker: &str) -> Option<Instant> {
        self.lock().users.get(speaker).and_then(|u| u.last_active_at)
    }

    /// `true` while an utterance is being transcribed or answered.
    pub fn is_processing(&self) -> bool {
        self.flag.is_set()
    }

    /// `true` while a debounce timer is armed.
    pub fn has_pending_timer(&self) -> bool {
        self.lock().pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Records utterances and takes `delay` to "answer" each.
    struct RecordingSink {
        utterances: Mutex<Vec<Utterance>>,
        delay: Duration,
        transcript: Option<String>,
    }

    impl RecordingSink {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                utterances: Mutex::new(Vec::new()),
                delay,
                transcript: Some("hello there".into()),
            })
        }

        fn utterances(&self) -> Vec<Utterance> {
            self.utterances.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UtteranceSink for RecordingSink {
        async fn handle_utterance(&self, utterance: Utterance) -> Option<String> {
            self.utterances.lock().unwrap().push(utterance);
            sleep(self.delay).await;
            self.transcript.clone()
        }
    }

    fn loud(value: i16, samples: usize) -> Vec<u8> {
        std::iter::repeat_n(value, samples)
            .flat_map(i16::to_le_bytes)
            .collect()
    }

    fn aggregator(sink: Arc<RecordingSink>) -> Arc<VoiceAggregator> {
        Arc::new(VoiceAggregator::new(
            VoiceConfig::default(),
            sink,
            VoiceProcessingFlag::new(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_frames_never_reach_the_buffer() {
        let sink = RecordingSink::new(Duration::ZERO);
        let agg = aggregator(sink.clone());

        assert_eq!(agg.push_frame("alice", loud(499, 8)), FrameVerdict::Quiet);
        assert_eq!(agg.buffered_len("alice"), 0);
        assert!(!agg.has_pending_timer());
        assert!(agg.last_active_at("alice").is_none());

        assert_eq!(agg.push_frame("alice", loud(-500, 8)), FrameVerdict::Buffered);
        assert_eq!(agg.buffered_len("alice"), 16);
        assert!(agg.has_pending_timer());
        assert!(agg.last_active_at("alice").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_becomes_one_utterance_in_arrival_order() {
        let sink = RecordingSink::new(Duration::ZERO);
        let agg = aggregator(sink.clone());

        let frames: Vec<Vec<u8>> = (1..=5).map(|i| loud(1000 * i, 4)).collect();
        for frame in &frames {
            agg.push_frame("alice", frame.clone());
            sleep(Duration::from_millis(1000)).await;
        }
        assert!(sink.utterances().is_empty(), "debounce must not fire mid-burst");

        sleep(Duration::from_millis(600)).await;
        let utterances = sink.utterances();
        assert_eq!(utterances.len(), 1);
        assert_eq!(utterances[0].speaker, "alice");
        assert_eq!(utterances[0].pcm, frames.concat());

        let reader = hound::WavReader::new(std::io::Cursor::new(utterances[0].wav.clone())).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.len() as usize, frames.concat().len() / 2);

        assert_eq!(agg.buffered_len("alice"), 0);
        assert!(!agg.is_processing());
        assert_eq!(agg.pending_transcript("alice").as_deref(), Some("hello there"));
    }

    #[tokio::test(start_paused = true)]
    async fn utterance_during_a_turn_is_dropped_not_queued() {
        let sink = RecordingSink::new(Duration::from_secs(5));
        let agg = aggregator(sink.clone());

        agg.push_frame("alice", loud(2000, 4));
        sleep(Duration::from_millis(1600)).await;
        assert!(agg.is_processing());

        agg.push_frame("bob", loud(2000, 4));
        assert_eq!(agg.buffered_len("bob"), 8);
        sleep(Duration::from_millis(1600)).await;

        assert_eq!(agg.buffered_len("bob"), 0);
        assert_eq!(sink.utterances().len(), 1);
        assert!(agg.is_processing(), "alice's turn is still running");

        sleep(Duration::from_secs(5)).await;
        assert!(!agg.is_processing());
        assert_eq!(sink.utterances().len(), 1);
        assert!(agg.pending_transcript("bob").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_a_turn_clears_every_speaker() {
        let sink = RecordingSink::new(Duration::ZERO);
        let agg = aggregator(sink.clone());

        agg.push_frame("alice", loud(2000, 4));
        sleep(Duration::from_millis(100)).await;
        agg.push_frame("bob", loud(2000, 4));
        sleep(Duration::from_millis(1600)).await;

        let utterances = sink.utterances();
        assert_eq!(utterances.len(), 1);
        assert_eq!(utterances[0].speaker, "bob");
        assert_eq!(agg.buffered_len("alice"), 0);
        assert_eq!(agg.buffered_len("bob"), 0);
    }

    #[test]
    fn user_state_length_tracks_buffers() {
        let mut user = VoiceUserState::default();
        user.push(vec![1, 2]);
        user.push(vec![3]);
        assert_eq!(user.total_len, 3);
        assert_eq!(user.take(), vec![1, 2, 3]);
        assert_eq!(user.total_len, 0);
        user.push(vec![4, 5, 6]);
        assert_eq!(user.clear(), 3);
        assert!(user.buffers.is_empty());
    }
}
