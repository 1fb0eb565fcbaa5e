//! [`EventRouter`] – connects the world event bus to the pipelines.
//!
//! Chat lines go to the [`MessagePipeline`], each on its own task so a slow
//! model call never holds up the next line.  Audio frames go straight into
//! the [`VoiceAggregator`], in arrival order.  Clock ticks are handed to an
//! optional hook (the CLI steps its simulated body from it).

use std::sync::Arc;

use embody_middleware::{EventBus, Topic, TopicReceiver};
use embody_types::{Event, EventPayload};
use tokio::task::JoinHandle;
use tracing::{info, trace};

use crate::message_pipeline::MessagePipeline;
use crate::voice::VoiceAggregator;

type TickHook = Box<dyn Fn(u64) + Send + Sync>;

pub struct EventRouter {
    messages: Arc<MessagePipeline>,
    voice: Arc<VoiceAggregator>,
    on_tick: Option<TickHook>,
}

impl EventRouter {
    pub fn new(messages: Arc<MessagePipeline>, voice: Arc<VoiceAggregator>) -> Self {
        Self {
            messages,
            voice,
            on_tick: None,
        }
    }

    /// Call `hook` with the sequence number of every clock tick.
    pub fn on_tick(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_tick = Some(Box::new(hook));
        self
    }

    /// Subscribe to `bus` now and route on a background task until the bus
    /// closes.
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let chat = bus.subscribe_to(Topic::Chat);
        let voice = bus.subscribe_to(Topic::Voice);
        let clock = bus.subscribe_to(Topic::Clock);
        tokio::spawn(self.run(chat, voice, clock))
    }

    async fn run(self, mut chat: TopicReceiver, mut voice: TopicReceiver, mut clock: TopicReceiver) {
        loop {
            let event = tokio::select! {
                event = chat.next() => event,
                event = voice.next() => event,
                event = clock.next() => event,
            };
            match event {
                Some(event) => self.dispatch(event),
                None => break,
            }
        }
        info!("event bus closed; router stopped");
    }

    fn dispatch(&self, event: Event) {
        match event.payload {
            EventPayload::ChatMessage { sender, text } => {
                let messages = Arc::clone(&self.messages);
                tokio::spawn(async move {
                    messages.handle_chat(&sender, &text).await;
                });
            }
            EventPayload::AudioFrame { speaker, pcm } => {
                self.voice.push_frame(&speaker, pcm);
            }
            EventPayload::Tick { sequence } => {
                trace!(sequence, "tick");
                if let Some(hook) = &self.on_tick {
                    hook(sequence);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use crate::voice::{VoiceConfig, VoiceConversationPipeline};
    use embody_hal::RecordingOutput;
    use embody_kernel::ActivityLock;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    struct Fixture {
        bus: EventBus,
        model: Arc<ScriptedModel>,
        output: RecordingOutput,
        voice: Arc<VoiceAggregator>,
        ticks: Arc<AtomicU64>,
        router: JoinHandle<()>,
    }

    fn fixture() -> Fixture {
        let model = Arc::new(
            ScriptedModel::new().fallback(r#"{"thought":"","text":"hi!"}"#),
        );
        let output = RecordingOutput::new();
        let lock = Arc::new(ActivityLock::new());
        let messages = Arc::new(MessagePipeline::new(
            "Pixel",
            model.clone(),
            Arc::new(output.clone()),
            lock.clone(),
        ));
        let conversation = Arc::new(VoiceConversationPipeline::new(
            "Pixel",
            model.clone(),
            Arc::new(output.clone()),
            lock,
        ));
        let voice = conversation.aggregator(VoiceConfig::default());
        let ticks = Arc::new(AtomicU64::new(0));
        let bus = EventBus::default();
        let router = EventRouter::new(messages, voice.clone())
            .on_tick({
                let ticks = ticks.clone();
                move |seq| ticks.store(seq, Ordering::SeqCst)
            })
            .spawn(&bus);
        Fixture {
            bus,
            model,
            output,
            voice,
            ticks,
            router,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chat_reaches_the_message_pipeline() {
        let f = fixture();
        f.bus
            .publish(Event::new(
                "test",
                EventPayload::ChatMessage {
                    sender: "alice".into(),
                    text: "hello".into(),
                },
            ))
            .unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(f.output.chats(), vec!["hi!"]);
        assert_eq!(f.model.prompts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_and_ticks_are_routed() {
        let f = fixture();
        let pcm: Vec<u8> = std::iter::repeat_n(3000i16, 8).flat_map(i16::to_le_bytes).collect();
        f.bus
            .publish(Event::new(
                "test",
                EventPayload::AudioFrame {
                    speaker: "bob".into(),
                    pcm,
                },
            ))
            .unwrap();
        f.bus
            .publish(Event::new("test", EventPayload::Tick { sequence: 42 }))
            .unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(f.voice.buffered_len("bob"), 16);
        assert_eq!(f.ticks.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn router_stops_when_the_bus_closes() {
        let f = fixture();
        drop(f.bus);
        tokio::time::timeout(Duration::from_secs(1), f.router)
            .await
            .expect("router exits")
            .unwrap();
    }
}
