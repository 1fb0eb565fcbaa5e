//! In-process simulation drivers for headless runs and CI without a world
//! server.
//!
//! [`SimActuator`] keeps a kinematic body that walks along its facing while
//! `forward` is held (call [`SimActuator::step`] from a clock), and records
//! every command so tests can assert on them.  [`RecordingOutput`] captures
//! chat, emote and audio output; [`LoggingOutput`] just logs it.
//!
//! # Example
//!
//! ```rust
//! use embody_hal::{Actuator, SimActuator};
//! use embody_types::{MovementSignal, Vec3};
//!
//! let sim = SimActuator::new("avatar");
//! let mut body: Box<dyn Actuator> = Box::new(sim.clone());
//!
//! body.set_facing(Vec3::new(1.0, 0.0, 0.0)).unwrap();
//! body.set_movement_signal(MovementSignal::Forward, true).unwrap();
//! sim.step(1.0);
//!
//! assert!(sim.position().x > 0.0);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use embody_types::{EmbodyError, MovementSignal, Quaternion, Vec3};
use tracing::info;

use crate::actuator::Actuator;
use crate::output::OutputChannel;
use crate::signals::SignalBoard;

/// Walking speed of the simulated body, in world units per second.
const SIM_WALK_SPEED: f32 = 2.0;

/// Multiplier applied while `run` is held.
const SIM_RUN_FACTOR: f32 = 2.0;

// ────────────────────────────────────────────────────────────────────────────
// Stub actuator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimBody {
    position: Vec3,
    orientation: Quaternion,
    facing: Vec3,
    signals: SignalBoard,
    /// Every `set_movement_signal(_, true)` call, in order.
    assertions: Vec<MovementSignal>,
    /// Every `set_movement_signal` call, asserted or released, in order.
    signal_log: Vec<(MovementSignal, bool)>,
    /// Every `set_facing` direction, in order.
    facings: Vec<Vec3>,
}

/// A simulated avatar body.  Clones share the same body, so a test can keep
/// one handle while the navigation controller owns another.
#[derive(Debug, Clone)]
pub struct SimActuator {
    id: String,
    body: Arc<Mutex<SimBody>>,
}

impl SimActuator {
    /// Create a body standing at the origin facing +Z.
    pub fn new(id: impl Into<String>) -> Self {
        let body = SimBody {
            facing: Vec3::new(0.0, 0.0, 1.0),
            ..SimBody::default()
        };
        Self {
            id: id.into(),
            body: Arc::new(Mutex::new(body)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimBody> {
        self.body.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Place the body at `position` instantly.
    pub fn teleport(&self, position: Vec3) {
        self.lock().position = position;
    }

    /// Overwrite the orientation without validation, e.g. to inject a
    /// corrupted quaternion.
    pub fn force_orientation(&self, orientation: Quaternion) {
        self.lock().orientation = orientation;
    }

    /// Advance the body by `dt_secs` of simulated time.
    pub fn step(&self, dt_secs: f32) {
        let mut body = self.lock();
        let mut dir = Vec3::zero();
        let f = body.facing;
        // Strafe axis: forward rotated a quarter turn on the ground plane.
        let left = Vec3::new(f.z, 0.0, -f.x);
        if body.signals.is_down(MovementSignal::Forward.name()) {
            dir = dir.add(f);
        }
        if body.signals.is_down(MovementSignal::Backward.name()) {
            dir = dir.sub(f);
        }
        if body.signals.is_down(MovementSignal::Left.name()) {
            dir = dir.add(left);
        }
        if body.signals.is_down(MovementSignal::Right.name()) {
            dir = dir.sub(left);
        }
        let mut speed = SIM_WALK_SPEED * dt_secs;
        if body.signals.is_down(MovementSignal::Run.name()) {
            speed *= SIM_RUN_FACTOR;
        }
        let delta = Vec3::new(dir.x * speed, 0.0, dir.z * speed);
        body.position = body.position.add(delta);
        body.signals.end_frame();
    }

    /// `true` if `signal` is currently held.
    pub fn is_down(&self, signal: MovementSignal) -> bool {
        self.lock().signals.is_down(signal.name())
    }

    /// `true` if any movement signal is currently held.
    pub fn any_signal_down(&self) -> bool {
        let body = self.lock();
        MovementSignal::ALL
            .iter()
            .any(|s| body.signals.is_down(s.name()))
    }

    /// Number of times `signal` was asserted since the last
    /// [`clear_history`][Self::clear_history].
    pub fn assertion_count(&self, signal: MovementSignal) -> usize {
        self.lock()
            .assertions
            .iter()
            .filter(|s| **s == signal)
            .count()
    }

    /// Total number of signal assertions recorded.
    pub fn total_assertions(&self) -> usize {
        self.lock().assertions.len()
    }

    /// Every facing direction commanded, in order.
    pub fn facings(&self) -> Vec<Vec3> {
        self.lock().facings.clone()
    }

    /// Every signal write since the last
    /// [`clear_history`][Self::clear_history], releases included.
    pub fn signal_log(&self) -> Vec<(MovementSignal, bool)> {
        self.lock().signal_log.clone()
    }

    /// Forget recorded assertions, signal writes, and facings.
    pub fn clear_history(&self) {
        let mut body = self.lock();
        body.assertions.clear();
        body.signal_log.clear();
        body.facings.clear();
    }
}

impl Actuator for SimActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_movement_signal(
        &mut self,
        signal: MovementSignal,
        asserted: bool,
    ) -> Result<(), EmbodyError> {
        let mut body = self.lock();
        body.signals.set(signal.name(), asserted);
        body.signal_log.push((signal, asserted));
        if asserted {
            body.assertions.push(signal);
        }
        Ok(())
    }

    fn position(&self) -> Vec3 {
        self.lock().position
    }

    fn orientation(&self) -> Quaternion {
        self.lock().orientation
    }

    fn set_orientation(&mut self, orientation: Quaternion) {
        self.lock().orientation = orientation;
    }

    fn set_facing(&mut self, direction: Vec3) -> Result<(), EmbodyError> {
        if !direction.is_finite() {
            return Err(EmbodyError::InvalidState {
                component: self.id.clone(),
                details: format!("non-finite facing {direction:?}"),
            });
        }
        let mut body = self.lock();
        body.facing = direction;
        body.orientation = Quaternion::facing(direction);
        body.facings.push(direction);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output stubs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Recorded {
    chats: Vec<String>,
    emotes: Vec<String>,
    audio: Vec<Vec<u8>>,
}

/// An [`OutputChannel`] that records everything it is asked to do.
///
/// Set [`failing`][Self::failing] to make every call return an error.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    recorded: Arc<Mutex<Recorded>>,
    fail: bool,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// An output whose every call fails with [`EmbodyError::Output`].
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), EmbodyError> {
        if self.fail {
            Err(EmbodyError::Output("recording output set to fail".into()))
        } else {
            Ok(())
        }
    }

    pub fn chats(&self) -> Vec<String> {
        self.lock().chats.clone()
    }

    pub fn emotes(&self) -> Vec<String> {
        self.lock().emotes.clone()
    }

    pub fn audio(&self) -> Vec<Vec<u8>> {
        self.lock().audio.clone()
    }
}

#[async_trait]
impl OutputChannel for RecordingOutput {
    async fn send_chat_message(&self, text: &str) -> Result<(), EmbodyError> {
        self.check()?;
        self.lock().chats.push(text.to_string());
        Ok(())
    }

    async fn play_emote(&self, name: &str) -> Result<(), EmbodyError> {
        self.check()?;
        self.lock().emotes.push(name.to_string());
        Ok(())
    }

    async fn play_audio(&self, audio: Vec<u8>) -> Result<(), EmbodyError> {
        self.check()?;
        self.lock().audio.push(audio);
        Ok(())
    }
}

/// An [`OutputChannel`] that only logs, for running without a world client.
#[derive(Debug, Clone, Default)]
pub struct LoggingOutput;

#[async_trait]
impl OutputChannel for LoggingOutput {
    async fn send_chat_message(&self, text: &str) -> Result<(), EmbodyError> {
        info!(text = %text, "chat");
        Ok(())
    }

    async fn play_emote(&self, name: &str) -> Result<(), EmbodyError> {
        info!(emote = %name, "emote");
        Ok(())
    }

    async fn play_audio(&self, audio: Vec<u8>) -> Result<(), EmbodyError> {
        info!(bytes = audio.len(), "audio");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_body() {
        let sim = SimActuator::new("avatar");
        let mut handle = sim.clone();
        handle
            .set_movement_signal(MovementSignal::Forward, true)
            .unwrap();
        assert!(sim.is_down(MovementSignal::Forward));
        assert_eq!(sim.assertion_count(MovementSignal::Forward), 1);
    }

    #[test]
    fn signal_log_keeps_releases_in_order() {
        let sim = SimActuator::new("avatar");
        let mut body = sim.clone();
        body.set_movement_signal(MovementSignal::Forward, true).unwrap();
        body.release_all().unwrap();
        let log = sim.signal_log();
        assert_eq!(log[0], (MovementSignal::Forward, true));
        assert_eq!(log.len(), 1 + MovementSignal::ALL.len());
        assert!(log[1..].iter().all(|(_, down)| !down));

        sim.clear_history();
        assert!(sim.signal_log().is_empty());
    }

    #[test]
    fn step_moves_only_while_forward_is_held() {
        let sim = SimActuator::new("avatar");
        let mut body = sim.clone();
        body.set_facing(Vec3::new(0.0, 0.0, 1.0)).unwrap();
        sim.step(1.0);
        assert_eq!(sim.position(), Vec3::zero());

        body.set_movement_signal(MovementSignal::Forward, true).unwrap();
        sim.step(0.5);
        assert!((sim.position().z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn run_doubles_speed() {
        let sim = SimActuator::new("avatar");
        let mut body = sim.clone();
        body.set_movement_signal(MovementSignal::Forward, true).unwrap();
        body.set_movement_signal(MovementSignal::Run, true).unwrap();
        sim.step(1.0);
        assert!((sim.position().z - SIM_WALK_SPEED * SIM_RUN_FACTOR).abs() < 1e-6);
    }

    #[test]
    fn set_facing_rejects_nan() {
        let mut sim = SimActuator::new("avatar");
        assert!(sim.set_facing(Vec3::new(f32::NAN, 0.0, 1.0)).is_err());
        assert!(sim.facings().is_empty());
    }

    #[test]
    fn release_all_drops_every_held_signal() {
        let sim = SimActuator::new("avatar");
        let mut body = sim.clone();
        for s in MovementSignal::ALL {
            body.set_movement_signal(s, true).unwrap();
        }
        body.release_all().unwrap();
        assert!(!sim.any_signal_down());
    }

    #[tokio::test]
    async fn recording_output_captures_calls() {
        let out = RecordingOutput::new();
        out.send_chat_message("hello").await.unwrap();
        out.play_emote("wave").await.unwrap();
        out.play_audio(vec![1, 2, 3]).await.unwrap();
        assert_eq!(out.chats(), vec!["hello"]);
        assert_eq!(out.emotes(), vec!["wave"]);
        assert_eq!(out.audio(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn failing_output_records_nothing() {
        let out = RecordingOutput::failing();
        assert!(out.send_chat_message("hello").await.is_err());
        assert!(out.chats().is_empty());
    }
}
