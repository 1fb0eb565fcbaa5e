//! [`NavigationController`] – walks the body to a point on the ground plane.
//!
//! The controller is the only writer of movement signals.  It turns a target
//! `(x, z)` into a fixed-rate tick loop that faces the target, holds
//! `forward`, and stops once inside the stop distance.  On top of that it runs
//! random walks: a sequence of short legs around the current position, bounded
//! by a duration and cancellable through a [`NavigationToken`].
//!
//! # Ownership of the body
//!
//! Only one navigation is live at a time.  Every new `goto` or walk leg first
//! stops the previous navigation, which cancels that loop's session and
//! releases every movement signal.  The old loop checks its session under the
//! same mutex that guards the actuator, so once a new target is issued the old
//! loop can never assert movement again.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use embody_hal::SimActuator;
//! use embody_runtime::navigation::{NavigationConfig, NavigationController, NavigationOutcome};
//!
//! # async fn demo() {
//! let body = SimActuator::new("avatar");
//! let nav = Arc::new(NavigationController::new(Box::new(body), NavigationConfig::default()));
//!
//! // Already standing there: arrives on the first tick.
//! assert_eq!(nav.goto(0.0, 0.5).await, NavigationOutcome::Arrived);
//! # }
//! ```

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use embody_hal::Actuator;
use embody_types::{MovementSignal, Vec3};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Stop reason used when a new navigation replaces the current one.
pub const REASON_SUPERSEDED: &str = "superseded";
/// Stop reason used when the target has been reached.
pub const REASON_FINISHED: &str = "finished";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning knobs for the navigation tick loop.
#[derive(Debug, Clone)]
pub struct NavigationConfig {
    /// Period of the navigation tick loop.
    pub tick_interval: Duration,
    /// Planar distance at which the target counts as reached.
    pub stop_distance: f32,
    /// Allowed deviation of the orientation's squared norm from 1 before it
    /// is renormalised.
    pub orientation_tolerance: f32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            stop_distance: 1.0,
            orientation_tolerance: 1e-3,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// A point on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavTarget {
    pub x: f32,
    pub z: f32,
}

impl NavTarget {
    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    fn as_vec3(self) -> Vec3 {
        Vec3::new(self.x, 0.0, self.z)
    }
}

/// How a navigation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The body came within the stop distance of the target.
    Arrived,
    /// Navigation was stopped before arrival; carries the stop reason.
    Stopped(String),
    /// The actuator reported unusable state; carries the details.
    Faulted(String),
}

/// Cancellation handle identifying one random-walk session.
///
/// Aborting is one-way.  A superseded token is simply dropped by the
/// controller, never reset.
#[derive(Debug, Clone)]
pub struct NavigationToken {
    id: u64,
    cancel: CancellationToken,
}

impl NavigationToken {
    fn new(id: u64) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the token has been aborted.
    pub async fn aborted(&self) {
        self.cancel.cancelled().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal state
// ─────────────────────────────────────────────────────────────────────────────

/// One navigation loop's cancellation plus the reason it was stopped.
#[derive(Debug, Default)]
struct Session {
    cancel: CancellationToken,
    reason: OnceLock<String>,
}

impl Session {
    fn finish(&self, reason: &str) {
        let _ = self.reason.set(reason.to_string());
        self.cancel.cancel();
    }

    fn stop_reason(&self) -> String {
        self.reason
            .get()
            .cloned()
            .unwrap_or_else(|| "cancelled".to_string())
    }
}

#[derive(Debug, Default)]
struct NavigationState {
    target: Option<NavTarget>,
    is_navigating: bool,
    is_random_walking: bool,
    current_token: Option<NavigationToken>,
    /// Session of the live navigation loop, if any.
    session: Option<Arc<Session>>,
}

struct Inner {
    state: NavigationState,
    actuator: Box<dyn Actuator>,
}

enum Step {
    Continue,
    Done(NavigationOutcome),
}

// ─────────────────────────────────────────────────────────────────────────────
// NavigationController
// ─────────────────────────────────────────────────────────────────────────────

/// Point-to-point navigation and random wandering over an [`Actuator`].
///
/// Share it as `Arc<NavigationController>`; every method takes `&self`.
pub struct NavigationController {
    inner: Mutex<Inner>,
    config: NavigationConfig,
    next_token_id: AtomicU64,
}

impl NavigationController {
    /// Take exclusive ownership of `actuator`.
    pub fn new(actuator: Box<dyn Actuator>, config: NavigationConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: NavigationState::default(),
                actuator,
            }),
            config,
            next_token_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn is_navigating(&self) -> bool {
        self.lock().state.is_navigating
    }

    pub fn is_walking_randomly(&self) -> bool {
        self.lock().state.is_random_walking
    }

    /// The live target, if navigating.
    pub fn target(&self) -> Option<NavTarget> {
        self.lock().state.target
    }

    /// The body's reported position.
    pub fn position(&self) -> Vec3 {
        self.lock().actuator.position()
    }

    // ── Point-to-point ──────────────────────────────────────────────────────

    /// Walk to `(x, z)`.
    ///
    /// Cancels any random walk and any in-flight navigation first.  Resolves
    /// when the target is reached, when navigation is stopped or superseded,
    /// or when the actuator reports unusable state.  A non-finite target is
    /// refused with [`NavigationOutcome::Faulted`] and leaves any current
    /// navigation untouched.
    pub async fn goto(&self, x: f32, z: f32) -> NavigationOutcome {
        if !x.is_finite() || !z.is_finite() {
            let details = format!("non-finite target ({x}, {z})");
            error!(details = %details, "navigation rejected");
            return NavigationOutcome::Faulted(details);
        }
        {
            let mut inner = self.lock();
            Self::stop_random_walk_locked(&mut inner, REASON_SUPERSEDED);
        }
        self.navigate(NavTarget::new(x, z), None).await
    }

    /// [`goto`][Self::goto] on a background task.
    pub fn spawn_goto(self: &Arc<Self>, x: f32, z: f32) -> JoinHandle<NavigationOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.goto(x, z).await })
    }

    /// Stop the live navigation, if any, and release every movement signal.
    ///
    /// Returns `false` when there was nothing to stop.
    pub fn stop_navigation(&self, reason: &str) -> bool {
        let mut inner = self.lock();
        Self::stop_locked(&mut inner, reason)
    }

    fn stop_locked(inner: &mut Inner, reason: &str) -> bool {
        if !inner.state.is_navigating {
            return false;
        }
        info!(reason = %reason, target = ?inner.state.target, "navigation stopped");
        if let Some(session) = inner.state.session.take() {
            session.finish(reason);
        }
        inner.state.target = None;
        inner.state.is_navigating = false;
        if let Err(e) = inner.actuator.release_all() {
            error!(error = %e, "failed to release movement signals");
        }
        true
    }

    /// The navigation primitive shared by `goto` and random-walk legs.
    async fn navigate(&self, target: NavTarget, walk: Option<&NavigationToken>) -> NavigationOutcome {
        let session = {
            let mut inner = self.lock();
            Self::stop_locked(&mut inner, REASON_SUPERSEDED);
            let session = Arc::new(Session::default());
            inner.state.target = Some(target);
            inner.state.is_navigating = true;
            inner.state.session = Some(Arc::clone(&session));
            session
        };
        debug!(x = target.x, z = target.z, "navigation started");

        loop {
            if let Step::Done(outcome) = self.step(&session, target, walk) {
                return outcome;
            }
            tokio::select! {
                _ = sleep(self.config.tick_interval) => {}
                _ = session.cancel.cancelled() => {}
            }
        }
    }

    /// One tick: validate, measure, steer.  Runs entirely under the lock.
    fn step(&self, session: &Session, target: NavTarget, walk: Option<&NavigationToken>) -> Step {
        let mut inner = self.lock();

        if session.cancel.is_cancelled() {
            return Step::Done(NavigationOutcome::Stopped(session.stop_reason()));
        }
        if walk.is_some_and(NavigationToken::is_aborted) {
            Self::stop_locked(&mut inner, "random walk aborted");
            return Step::Done(NavigationOutcome::Stopped(session.stop_reason()));
        }

        let position = inner.actuator.position();
        let orientation = inner.actuator.orientation();
        if !position.is_finite() || !orientation.is_finite() {
            let details = format!("non-finite actuator state: {position:?} {orientation:?}");
            return Self::fault(&mut inner, details);
        }
        if (orientation.norm_squared() - 1.0).abs() > self.config.orientation_tolerance {
            match orientation.normalized() {
                Some(unit) => {
                    warn!(?orientation, "orientation drifted off unit length; renormalising");
                    inner.actuator.set_orientation(unit);
                }
                None => {
                    let details = format!("degenerate orientation {orientation:?}");
                    return Self::fault(&mut inner, details);
                }
            }
        }

        let goal = target.as_vec3();
        if position.planar_distance(goal) <= self.config.stop_distance.max(0.0) {
            Self::stop_locked(&mut inner, REASON_FINISHED);
            return Step::Done(NavigationOutcome::Arrived);
        }
        let Some(direction) = position.planar_direction_to(goal) else {
            let details = format!("no heading from {position:?} to {target:?}");
            return Self::fault(&mut inner, details);
        };

        if let Err(e) = Self::steer(inner.actuator.as_mut(), direction) {
            return Self::fault(&mut inner, e.to_string());
        }
        Step::Continue
    }

    fn steer(actuator: &mut dyn Actuator, direction: Vec3) -> Result<(), embody_types::EmbodyError> {
        actuator.set_facing(direction)?;
        for signal in [
            MovementSignal::Backward,
            MovementSignal::Left,
            MovementSignal::Right,
            MovementSignal::Run,
        ] {
            actuator.set_movement_signal(signal, false)?;
        }
        actuator.set_movement_signal(MovementSignal::Forward, true)
    }

    fn fault(inner: &mut Inner, details: String) -> Step {
        error!(details = %details, "navigation aborted: invalid actuator state");
        Self::stop_locked(inner, "invalid actuator state");
        Step::Done(NavigationOutcome::Faulted(details))
    }

    // ── Random walk ─────────────────────────────────────────────────────────

    /// Wander around the current position until `duration` elapses or the
    /// walk is stopped.
    ///
    /// Each leg heads for a uniformly random point within `max_distance`;
    /// between legs the body idles for a random pause drawn from
    /// `[0, interval)` and then raised to at least one navigation tick.  The
    /// deadline cuts any in-flight leg or pause short.
    ///
    /// A negative or non-finite `max_distance` is refused: nothing starts and
    /// any current walk keeps going.
    pub async fn start_random_walk(&self, interval: Duration, max_distance: f32, duration: Duration) {
        if !max_distance.is_finite() || max_distance < 0.0 {
            warn!(max_distance, "random walk refused: radius must be finite and non-negative");
            return;
        }
        let token = {
            let mut inner = self.lock();
            Self::stop_random_walk_locked(&mut inner, REASON_SUPERSEDED);
            let token = NavigationToken::new(self.next_token_id.fetch_add(1, Ordering::Relaxed));
            inner.state.is_random_walking = true;
            inner.state.current_token = Some(token.clone());
            token
        };
        let _walk = WalkGuard {
            controller: self,
            token_id: token.id(),
        };
        let deadline = Instant::now() + duration;
        info!(
            token = token.id(),
            duration_ms = duration.as_millis() as u64,
            max_distance,
            "random walk started"
        );

        while !token.is_aborted() && Instant::now() < deadline && self.is_current_walk(&token) {
            let origin = self.position();
            let target = random_point_around(origin, max_distance);
            debug!(token = token.id(), x = target.x, z = target.z, "random walk leg");

            tokio::select! {
                outcome = self.navigate(target, Some(&token)) => {
                    if let NavigationOutcome::Faulted(details) = outcome {
                        warn!(token = token.id(), details = %details, "random walk leg faulted");
                        break;
                    }
                }
                _ = sleep_until(deadline) => break,
                _ = token.aborted() => break,
            }

            let pause = random_pause(interval).max(self.config.tick_interval);
            tokio::select! {
                _ = sleep(pause) => {}
                _ = sleep_until(deadline) => break,
                _ = token.aborted() => break,
            }
        }

        debug!(token = token.id(), "random walk ended");
    }

    /// [`start_random_walk`][Self::start_random_walk] on a background task.
    pub fn spawn_random_walk(
        self: &Arc<Self>,
        interval: Duration,
        max_distance: f32,
        duration: Duration,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.start_random_walk(interval, max_distance, duration)
                .await
        })
    }

    /// Disable walking, abort the current token, and stop navigation.
    pub fn stop_random_walk(&self) {
        let mut inner = self.lock();
        Self::stop_random_walk_locked(&mut inner, "random walk stopped");
    }

    fn stop_random_walk_locked(inner: &mut Inner, reason: &str) {
        if let Some(token) = inner.state.current_token.take() {
            token.abort();
        }
        inner.state.is_random_walking = false;
        Self::stop_locked(inner, reason);
    }

    fn is_current_walk(&self, token: &NavigationToken) -> bool {
        self.lock()
            .state
            .current_token
            .as_ref()
            .is_some_and(|t| t.id() == token.id())
    }
}

/// Ends a random walk however its future finishes (deadline, abort, drop, or
/// panic), unless a newer walk has already taken over.
struct WalkGuard<'a> {
    controller: &'a NavigationController,
    token_id: u64,
}

impl Drop for WalkGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.controller.lock();
        let still_current = inner
            .state
            .current_token
            .as_ref()
            .is_some_and(|t| t.id() == self.token_id);
        if still_current {
            NavigationController::stop_random_walk_locked(&mut inner, "random walk finished");
        }
    }
}

fn random_point_around(origin: Vec3, max_distance: f32) -> NavTarget {
    let mut rng = rand::thread_rng();
    let angle = rng.gen_range(0.0..TAU);
    let radius = if max_distance.is_finite() && max_distance > 0.0 {
        rng.gen_range(0.0..=max_distance)
    } else {
        0.0
    };
    NavTarget::new(origin.x + radius * angle.cos(), origin.z + radius * angle.sin())
}

fn random_pause(interval: Duration) -> Duration {
    let millis = interval.as_millis() as u64;
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..millis))
}
