//! Session lifecycle and event relay for the realtime voice subsystem.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::base::{RealtimeError, RealtimeEvent, RealtimeResult, ToolHandler};
use super::client::RealtimeClient;
use crate::core::events::{CharivoEvent, EventBus};

/// Name of the built-in tool the model uses to drive character emotion.
pub const SET_EMOTION_TOOL: &str = "set_emotion";

/// Wraps a [`RealtimeClient`] with session state and bus relay.
///
/// The manager enforces one active session at a time and translates the
/// client's typed event stream into bus events, so the render/UI layer sees
/// the same `TtsLipsyncUpdate` path regardless of whether audio came from
/// turn-based TTS or a live session.
pub struct RealtimeManager {
    bus: Arc<EventBus>,
    client: RealtimeClient,
    session_active: Arc<AtomicBool>,
    relay_task: Option<JoinHandle<()>>,
}

impl RealtimeManager {
    pub fn new(bus: Arc<EventBus>, mut client: RealtimeClient) -> Self {
        client.set_tool_handler(Self::default_tool_handler());
        Self {
            bus,
            client,
            session_active: Arc::new(AtomicBool::new(false)),
            relay_task: None,
        }
    }

    /// Build a manager whose tool calls are answered by `handler`. The
    /// built-in `set_emotion` tool is still acknowledged without reaching the
    /// host handler.
    pub fn with_tool_handler(bus: Arc<EventBus>, mut client: RealtimeClient, handler: ToolHandler) -> Self {
        let wrapped: ToolHandler = Arc::new(move |request| {
            if request.name == SET_EMOTION_TOOL {
                Box::pin(async move { json!({"success": true}) })
            } else {
                handler(request)
            }
        });
        client.set_tool_handler(wrapped);
        Self {
            bus,
            client,
            session_active: Arc::new(AtomicBool::new(false)),
            relay_task: None,
        }
    }

    fn default_tool_handler() -> ToolHandler {
        Arc::new(|request| {
            debug!(name = %request.name, "acknowledging tool call with default handler");
            Box::pin(async move { json!({"success": true}) })
        })
    }

    /// Start a live session. Rejects when one is already active; a second
    /// session must not cannibalize the first one's audio resources.
    pub async fn start_session(&mut self) -> RealtimeResult<()> {
        if self.session_active.load(Ordering::SeqCst) {
            return Err(RealtimeError::SessionActive);
        }

        let mut events = self.client.connect().await?;
        self.session_active.store(true, Ordering::SeqCst);
        info!("realtime session started");

        let bus = Arc::clone(&self.bus);
        let session_active = Arc::clone(&self.session_active);
        self.relay_task = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let ended = matches!(event, RealtimeEvent::Disconnected);
                relay_event(&bus, event);
                if ended {
                    session_active.store(false, Ordering::SeqCst);
                    break;
                }
            }
            session_active.store(false, Ordering::SeqCst);
        }));
        Ok(())
    }

    /// Send a user text turn into the live session. Fails fast when no
    /// session is active.
    pub async fn send_message(&self, text: &str) -> RealtimeResult<()> {
        if !self.session_active.load(Ordering::SeqCst) {
            return Err(RealtimeError::NotConnected);
        }
        self.client.send_text(text).await
    }

    /// End the session. Idempotent.
    pub async fn end_session(&mut self) -> RealtimeResult<()> {
        self.client.disconnect().await?;
        self.session_active.store(false, Ordering::SeqCst);
        if let Some(task) = self.relay_task.take() {
            // The relay drains the Disconnected event and exits on its own;
            // give it that chance before reaping.
            let _ = task.await;
        }
        info!("realtime session ended");
        Ok(())
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    pub fn is_response_in_progress(&self) -> bool {
        self.client.is_response_in_progress()
    }
}

/// Map one client event onto the bus contract.
fn relay_event(bus: &Arc<EventBus>, event: RealtimeEvent) {
    match event {
        RealtimeEvent::Connected => bus.emit(CharivoEvent::RealtimeConnected),
        RealtimeEvent::Disconnected => bus.emit(CharivoEvent::RealtimeDisconnected),
        RealtimeEvent::TextDelta(text) => bus.emit(CharivoEvent::RealtimeTextDelta { text }),
        RealtimeEvent::UserTranscript(text) => {
            bus.emit(CharivoEvent::RealtimeUserTranscript { text })
        }
        RealtimeEvent::Rms(rms) => bus.emit(CharivoEvent::TtsLipsyncUpdate { rms }),
        RealtimeEvent::ResponseDone => {}
        RealtimeEvent::ToolCall { name, arguments } => {
            if name == SET_EMOTION_TOOL
                && let Some(emotion) = emotion_argument(&arguments)
            {
                bus.emit(CharivoEvent::RealtimeEmotion { emotion });
            }
            bus.emit(CharivoEvent::RealtimeToolCall { name, arguments });
        }
        RealtimeEvent::Error(error) => bus.emit(CharivoEvent::RealtimeError { error }),
    }
}

fn emotion_argument(arguments: &Value) -> Option<String> {
    arguments
        .get("emotion")
        .and_then(Value::as_str)
        .map(str::to_string)
}
