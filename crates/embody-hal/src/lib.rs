//! `embody-hal` – Embodiment Abstraction Layer
//!
//! The seams between the coordination core and the virtual world client.
//! Nothing above this crate knows how a key press or a chat line actually
//! reaches the world server.
//!
//! # Modules
//!
//! - [`actuator`] – [`Actuator`][actuator::Actuator]: the agent's body
//!   (position, orientation, held movement signals, facing).
//! - [`signals`] – [`SignalBoard`][signals::SignalBoard]: generic
//!   name → [`SignalState`][signals::SignalState] map with edge tracking.
//! - [`output`] – [`OutputChannel`][output::OutputChannel]: chat, emote and
//!   audio output towards the world.
//! - [`sim`] – in-process drivers for headless runs and tests.

pub mod actuator;
pub mod output;
pub mod signals;
pub mod sim;

pub use actuator::Actuator;
pub use output::OutputChannel;
pub use signals::{SignalBoard, SignalState};
pub use sim::{LoggingOutput, RecordingOutput, SimActuator};
