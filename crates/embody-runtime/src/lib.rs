//! `embody-runtime` – The Coordination Core
//!
//! Everything that decides *when* the agent moves, speaks, or listens.
//!
//! # Modules
//!
//! - [`navigation`] – [`NavigationController`][navigation::NavigationController]:
//!   turns a target `(x, z)` into time-sliced movement signals on the
//!   [`Actuator`][embody_hal::Actuator], with point-to-point travel and random
//!   wandering, both cooperatively cancellable.
//! - [`voice`] – [`VoiceAggregator`][voice::VoiceAggregator] gates and
//!   debounces per-speaker audio frames into utterances;
//!   [`VoiceConversationPipeline`][voice::VoiceConversationPipeline] answers
//!   them out loud.
//! - [`behavior_loop`] – [`BehaviorLoop`][behavior_loop::BehaviorLoop]:
//!   the idle loop that asks the model what to do next whenever the
//!   [`ActivityLock`][embody_kernel::ActivityLock] is free.
//! - [`message_pipeline`] – [`MessagePipeline`][message_pipeline::MessagePipeline]:
//!   answers chat lines while holding the activity lock.
//! - [`router`] – [`EventRouter`][router::EventRouter]: feeds bus events to
//!   the pipelines.
//! - [`model`] – [`ModelClient`][model::ModelClient], the text / transcription
//!   / speech seam, plus structured reply parsing.
//! - [`llm_driver`] – [`LlmDriver`][llm_driver::LlmDriver]: an
//!   OpenAI-compatible HTTP implementation of `ModelClient`.
//! - [`repeat_guard`] – [`RepeatGuard`][repeat_guard::RepeatGuard]: keeps the
//!   idle loop from saying the same line over and over.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod behavior_loop;
pub mod llm_driver;
pub mod message_pipeline;
pub mod model;
pub mod navigation;
pub mod repeat_guard;
pub mod router;
pub mod telemetry;
pub mod voice;

#[cfg(test)]
mod testing;

pub use behavior_loop::{BehaviorConfig, BehaviorLoop, TurnOutcome, WanderConfig};
pub use llm_driver::{LlmDriver, LlmError};
pub use message_pipeline::{ChatOutcome, MessagePipeline};
pub use model::{ModelClient, Prompt, ReplyParseError, parse_reply};
pub use navigation::{NavTarget, NavigationConfig, NavigationController, NavigationOutcome, NavigationToken};
pub use repeat_guard::RepeatGuard;
pub use router::EventRouter;
pub use voice::{
    Utterance, UtteranceSink, VoiceAggregator, VoiceConfig, VoiceConversationPipeline,
    VoiceProcessingFlag,
};
