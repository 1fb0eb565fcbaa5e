//! [`BehaviorLoop`] – what the agent does when nobody is talking to it.
//!
//! Every 15–30 s (uniformly random) the loop asks the model for an idle
//! action.  It always yields to live conversation: if the
//! [`ActivityLock`] is held the turn is skipped outright, with no model call
//! and no side effects.
//!
//! ```text
//!  ┌───────────┐   lock held    ┌─────────┐
//!  │   tick    │──────────────▶│ Skipped │
//!  └─────┬─────┘                └─────────┘
//!        │ lock free
//!        ▼
//!  snapshot → generate_text → parse AgentReply
//!        │
//!        ├─ emote              → play_emote
//!        ├─ text + ambient_speech → send_chat_message (unless a repeat)
//!        ├─ wander             → start a short random walk
//!        └─ stop               → stop the random walk
//! ```
//!
//! Model or parse failures make the turn a no-op; the loop keeps going.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use embody_hal::OutputChannel;
use embody_kernel::ActivityLock;
use embody_types::EmbodyError;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::model::{ModelClient, Prompt, parse_reply};
use crate::navigation::NavigationController;
use crate::repeat_guard::RepeatGuard;

/// Action marker that allows `text` to be said in chat.
pub const ACTION_AMBIENT_SPEECH: &str = "ambient_speech";
/// Action marker that starts a short random walk.
pub const ACTION_WANDER: &str = "wander";
/// Action marker that stops the random walk.
pub const ACTION_STOP: &str = "stop";

/// Parameters of the random walk started by the `wander` action.
#[derive(Debug, Clone)]
pub struct WanderConfig {
    pub interval: Duration,
    pub max_distance: f32,
    pub duration: Duration,
}

impl Default for WanderConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_distance: 5.0,
            duration: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    /// Shortest pause between turns.
    pub min_interval: Duration,
    /// Longest pause between turns.
    pub max_interval: Duration,
    /// How many recent ambient lines the repetition guard remembers.
    pub repeat_window: usize,
    pub wander: WanderConfig,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(15_000),
            max_interval: Duration::from_millis(30_000),
            repeat_window: 5,
            wander: WanderConfig::default(),
        }
    }
}

/// Result of one idle turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The activity lock was held; nothing was done.
    Skipped,
    /// The model chose to do nothing (or only repeated itself).
    Idle,
    /// At least one side effect happened.
    Acted,
    /// The model, parser, or output failed; carries the error text.
    Failed(String),
}

/// Timer-driven idle behavior.
pub struct BehaviorLoop {
    agent_name: String,
    config: BehaviorConfig,
    model: Arc<dyn ModelClient>,
    output: Arc<dyn OutputChannel>,
    lock: Arc<ActivityLock>,
    navigation: Arc<NavigationController>,
    running: AtomicBool,
    /// Bumped on every `start` so a loop left over from an earlier run exits.
    epoch: AtomicU64,
    turns: AtomicU64,
    guard: Mutex<RepeatGuard>,
}

impl BehaviorLoop {
    pub fn new(
        agent_name: impl Into<String>,
        config: BehaviorConfig,
        model: Arc<dyn ModelClient>,
        output: Arc<dyn OutputChannel>,
        lock: Arc<ActivityLock>,
        navigation: Arc<NavigationController>,
    ) -> Self {
        let guard = Mutex::new(RepeatGuard::new(config.repeat_window));
        Self {
            agent_name: agent_name.into(),
            config,
            model,
            output,
            lock,
            navigation,
            running: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            turns: AtomicU64::new(0),
            guard,
        }
    }

    fn repeat_guard(&self) -> MutexGuard<'_, RepeatGuard> {
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the loop on a background task.
    ///
    /// Returns `None` (and logs a warning) if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("behavior loop already running");
            return None;
        }
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        info!(epoch, "behavior loop started");
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run(epoch).await }))
    }

    /// Ask the loop to stop.  Takes effect at the next iteration boundary.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            warn!("behavior loop already stopped");
            return;
        }
        info!("behavior loop stopping");
    }

    fn is_live(&self, epoch: u64) -> bool {
        self.is_running() && self.epoch.load(Ordering::Acquire) == epoch
    }

    async fn run(self: Arc<Self>, epoch: u64) {
        while self.is_live(epoch) {
            let outcome = self.tick().await;
            debug!(?outcome, "behavior turn finished");
            sleep(self.next_delay()).await;
        }
        debug!(epoch, "behavior loop exited");
    }

    /// Uniformly random pause in `[min_interval, max_interval]`.
    pub fn next_delay(&self) -> Duration {
        let min = self.config.min_interval.as_millis() as u64;
        let max = self.config.max_interval.as_millis() as u64;
        if max <= min {
            return self.config.min_interval;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Run one idle turn.
    pub async fn tick(&self) -> TurnOutcome {
        if self.lock.is_active() {
            debug!("activity in progress; idle turn skipped");
            return TurnOutcome::Skipped;
        }
        let turn = self.turns.fetch_add(1, Ordering::Relaxed) + 1;
        let prompt = self.snapshot(turn);
        match self.act(&prompt).await {
            Ok(true) => TurnOutcome::Acted,
            Ok(false) => TurnOutcome::Idle,
            Err(e) => {
                warn!(turn, error = %e, "idle turn failed");
                TurnOutcome::Failed(e.to_string())
            }
        }
    }

    fn snapshot(&self, turn: u64) -> Prompt {
        let system = format!(
            "You are {}, an avatar idling in a shared virtual world. Decide what to \
             do next. Actions: \"{ACTION_AMBIENT_SPEECH}\" to say `text` out loud in \
             chat, \"{ACTION_WANDER}\" to stroll around, \"{ACTION_STOP}\" to stop \
             strolling. Doing nothing is fine.",
            self.agent_name
        );
        let position = self.navigation.position();
        let activity = if self.navigation.is_walking_randomly() {
            "strolling around"
        } else if self.navigation.is_navigating() {
            "walking somewhere"
        } else {
            "standing still"
        };
        let user = format!(
            "Idle turn {turn}. Time: {}. You are at ({:.1}, {:.1}), {activity}.",
            chrono::Utc::now().format("%H:%M UTC"),
            position.x,
            position.z,
        );
        Prompt::new(system, user)
    }

    async fn act(&self, prompt: &Prompt) -> Result<bool, EmbodyError> {
        let raw = self.model.generate_text(prompt).await?;
        let reply = parse_reply(&raw)?;
        debug!(thought = %reply.thought, actions = ?reply.actions, "idle reply");
        let mut acted = false;

        if let Some(emote) = reply.emote_name() {
            self.output.play_emote(emote).await?;
            acted = true;
        }

        if reply.has_action(ACTION_AMBIENT_SPEECH) {
            if let Some(line) = reply.spoken_text() {
                let repeat = self.repeat_guard().is_repeat(line);
                if repeat {
                    info!(line = %line, "ambient line suppressed as a repeat");
                } else {
                    self.output.send_chat_message(line).await?;
                    acted = true;
                }
            }
        }

        if reply.has_action(ACTION_STOP) {
            if self.navigation.is_walking_randomly() {
                self.navigation.stop_random_walk();
                acted = true;
            }
        } else if reply.has_action(ACTION_WANDER) && !self.navigation.is_navigating() {
            let wander = &self.config.wander;
            self.navigation
                .spawn_random_walk(wander.interval, wander.max_distance, wander.duration);
            acted = true;
        }
        Ok(acted)
    }
}
