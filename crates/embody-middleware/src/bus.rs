//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Chat`] | Chat lines typed by people in the world |
//! | [`Topic::Voice`] | High-frequency per-speaker audio frames |
//! | [`Topic::Clock`] | World clock ticks |

use embody_types::{EmbodyError, Event, EventPayload};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Chat lines.
    Chat,
    /// Audio frames from speakers near the agent.
    Voice,
    /// Periodic world clock ticks.
    Clock,
}

impl Topic {
    /// The lane a payload travels on.
    pub fn for_payload(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::ChatMessage { .. } => Topic::Chat,
            EventPayload::AudioFrame { .. } => Topic::Voice,
            EventPayload::Tick { .. } => Topic::Clock,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    chat: broadcast::Sender<Event>,
    voice: broadcast::Sender<Event>,
    clock: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (chat, _) = broadcast::channel(capacity);
        let (voice, _) = broadcast::channel(capacity);
        let (clock, _) = broadcast::channel(capacity);
        Self { chat, voice, clock }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of receivers that were handed the event.
    ///
    /// # Errors
    ///
    /// Returns [`EmbodyError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, EmbodyError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| EmbodyError::Channel(format!("no subscribers for topic {topic:?}")))
    }

    /// Publish `event` to the topic matching its payload.
    ///
    /// # Errors
    ///
    /// Same as [`publish_to`][Self::publish_to].
    pub fn publish(&self, event: Event) -> Result<usize, EmbodyError> {
        let topic = Topic::for_payload(&event.payload);
        self.publish_to(topic, event)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Chat => &self.chat,
            Topic::Voice => &self.voice,
            Topic::Clock => &self.clock,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, skipping over lag gaps.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(text: &str) -> Event {
        Event::new(
            "embody-middleware::test",
            EventPayload::ChatMessage {
                sender: "alice".into(),
                text: text.into(),
            },
        )
    }

    #[tokio::test]
    async fn publish_routes_by_payload() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut chat_rx = bus.subscribe_to(Topic::Chat);
        let mut voice_rx = bus.subscribe_to(Topic::Voice);

        let event = chat("hello");
        bus.publish(event.clone())?;
        bus.publish(Event::new(
            "test",
            EventPayload::AudioFrame {
                speaker: "bob".into(),
                pcm: vec![0, 1],
            },
        ))?;

        assert_eq!(chat_rx.recv().await?.id, event.id);
        assert!(matches!(
            voice_rx.recv().await?.payload,
            EventPayload::AudioFrame { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Topic::Chat);
        let mut rx2 = bus.subscribe_to(Topic::Chat);

        let event = chat("hi all");
        bus.publish_to(Topic::Chat, event.clone())?;

        assert_eq!(rx1.recv().await?.id, event.id);
        assert_eq!(rx2.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::Clock, chat("nobody listening"));
        assert!(matches!(result, Err(EmbodyError::Channel(_))));
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut clock_rx = bus.subscribe_to(Topic::Clock);
        let _chat_rx = bus.subscribe_to(Topic::Chat);

        bus.publish_to(Topic::Chat, chat("not a tick"))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), clock_rx.recv()).await;
        assert!(result.is_err(), "Clock subscriber must not receive a Chat event");
        Ok(())
    }

    #[tokio::test]
    async fn next_skips_lag_and_ends_on_close() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe_to(Topic::Chat);
        for i in 0..10 {
            let _ = bus.publish_to(Topic::Chat, chat(&format!("msg {i}")));
        }
        let first = rx.next().await.expect("event after lag");
        if let EventPayload::ChatMessage { text, .. } = first.payload {
            assert_eq!(text, "msg 6");
        } else {
            panic!("expected ChatMessage");
        }
        assert_eq!(rx.topic(), Topic::Chat);

        drop(bus);
        // Drain what is left, then observe the close.
        while rx.next().await.is_some() {}
    }
}
