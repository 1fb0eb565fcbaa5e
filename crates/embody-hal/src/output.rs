//! The outbound half of the world connection.
//!
//! [`OutputChannel`] is everything the agent can *say or show*: chat lines,
//! emotes, and synthesized audio.  World clients implement it; the runtime
//! pipelines only ever talk to the trait.

use async_trait::async_trait;
use embody_types::EmbodyError;

/// Chat, emote and audio output towards the virtual world.
///
/// # Contract
///
/// Each method delivers one item and returns once the world client has
/// accepted it.  Failures are reported as [`EmbodyError::Output`]; callers
/// treat them as transient.
#[async_trait]
pub trait OutputChannel: Send + Sync {
    /// Send a chat line as the agent.
    async fn send_chat_message(&self, text: &str) -> Result<(), EmbodyError>;

    /// Play a named emote animation (e.g. `"wave"`).
    async fn play_emote(&self, name: &str) -> Result<(), EmbodyError>;

    /// Play an encoded audio clip through the agent's voice.
    async fn play_audio(&self, audio: Vec<u8>) -> Result<(), EmbodyError>;
}
