//! `embody-middleware` – The Nervous System
//!
//! Carries world events (chat lines, audio frames, clock ticks) from the world
//! client to the runtime pipelines without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
