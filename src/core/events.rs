//! Typed publish/subscribe event hub.
//!
//! The bus is the leaf dependency of every manager: producers emit
//! [`CharivoEvent`] values, consumers subscribe per [`EventKind`]. Delivery is
//! synchronous and in registration order; there is no buffering, an event
//! emitted with no listeners is dropped silently.
//!
//! The documented event names and payload shapes are a stability contract for
//! the render/UI layer: renaming or reshaping a variant is a breaking change.
//!
//! # Example
//!
//! ```rust
//! use charivo::core::events::{CharivoEvent, EventBus, EventKind};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let id = bus.on(EventKind::TtsLipsyncUpdate, Arc::new(|event| {
//!     if let CharivoEvent::TtsLipsyncUpdate { rms } = event {
//!         println!("mouth openness: {rms}");
//!     }
//! }));
//! bus.emit(CharivoEvent::TtsLipsyncUpdate { rms: 0.4 });
//! bus.off(id);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::core::audio::AudioHandle;
use crate::core::types::{Character, Message};

// =============================================================================
// Events
// =============================================================================

/// Every event that can travel over the bus, with its payload shape.
#[derive(Debug, Clone)]
pub enum CharivoEvent {
    /// A user message entered the session.
    MessageSent { message: Message },
    /// A character response message was produced.
    MessageReceived { message: Message },
    /// A character is about to speak the given text.
    CharacterSpeak { character: Character, message: String },

    /// Speech output started; carries the audio handle driving it.
    TtsAudioStart { audio: AudioHandle },
    /// One lip-sync intensity sample in `[0, 1]`.
    TtsLipsyncUpdate { rms: f32 },
    /// Speech output finished.
    TtsAudioEnd,

    /// Microphone transcription started.
    SttRecordingStarted,
    /// Microphone transcription stopped.
    SttRecordingStopped,
    /// A finished transcription result.
    SttTranscription { text: String },

    /// The realtime voice session is connected and usable.
    RealtimeConnected,
    /// The realtime voice session ended.
    RealtimeDisconnected,
    /// Incremental assistant text from the realtime session.
    RealtimeTextDelta { text: String },
    /// A completed transcription of the user's speech.
    RealtimeUserTranscript { text: String },
    /// The remote model requested an emotion change.
    RealtimeEmotion { emotion: String },
    /// The remote model invoked a tool.
    RealtimeToolCall { name: String, arguments: Value },
    /// A realtime session error surfaced outside any single call site.
    RealtimeError { error: String },
}

impl CharivoEvent {
    /// The field-less discriminant used as the subscription key.
    pub fn kind(&self) -> EventKind {
        match self {
            CharivoEvent::MessageSent { .. } => EventKind::MessageSent,
            CharivoEvent::MessageReceived { .. } => EventKind::MessageReceived,
            CharivoEvent::CharacterSpeak { .. } => EventKind::CharacterSpeak,
            CharivoEvent::TtsAudioStart { .. } => EventKind::TtsAudioStart,
            CharivoEvent::TtsLipsyncUpdate { .. } => EventKind::TtsLipsyncUpdate,
            CharivoEvent::TtsAudioEnd => EventKind::TtsAudioEnd,
            CharivoEvent::SttRecordingStarted => EventKind::SttRecordingStarted,
            CharivoEvent::SttRecordingStopped => EventKind::SttRecordingStopped,
            CharivoEvent::SttTranscription { .. } => EventKind::SttTranscription,
            CharivoEvent::RealtimeConnected => EventKind::RealtimeConnected,
            CharivoEvent::RealtimeDisconnected => EventKind::RealtimeDisconnected,
            CharivoEvent::RealtimeTextDelta { .. } => EventKind::RealtimeTextDelta,
            CharivoEvent::RealtimeUserTranscript { .. } => EventKind::RealtimeUserTranscript,
            CharivoEvent::RealtimeEmotion { .. } => EventKind::RealtimeEmotion,
            CharivoEvent::RealtimeToolCall { .. } => EventKind::RealtimeToolCall,
            CharivoEvent::RealtimeError { .. } => EventKind::RealtimeError,
        }
    }
}

/// Subscription key for [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageSent,
    MessageReceived,
    CharacterSpeak,
    TtsAudioStart,
    TtsLipsyncUpdate,
    TtsAudioEnd,
    SttRecordingStarted,
    SttRecordingStopped,
    SttTranscription,
    RealtimeConnected,
    RealtimeDisconnected,
    RealtimeTextDelta,
    RealtimeUserTranscript,
    RealtimeEmotion,
    RealtimeToolCall,
    RealtimeError,
}

// =============================================================================
// Bus
// =============================================================================

/// A registered listener. Invoked synchronously on the emitter's call stack.
pub type Listener = Arc<dyn Fn(&CharivoEvent) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to remove that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Process-local typed pub/sub hub.
///
/// Listener panics are deliberately NOT caught: they propagate to the
/// emitter's call site so a broken consumer is visible instead of silently
/// swallowed inside an awaited chain.
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<(SubscriptionId, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    /// Register a listener for one event kind.
    ///
    /// Duplicates are allowed; each registration is invoked once per emit, in
    /// registration order.
    pub fn on(&self, kind: EventKind, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one registration. Unknown ids are a no-op.
    pub fn off(&self, id: SubscriptionId) {
        let mut listeners = self.listeners.lock();
        for entries in listeners.values_mut() {
            if let Some(pos) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
                entries.remove(pos);
                return;
            }
        }
    }

    /// Synchronously invoke all current listeners for the event's kind.
    ///
    /// The listener list is snapshotted before invocation, so a listener may
    /// re-entrantly subscribe, unsubscribe or emit without deadlocking; such
    /// changes take effect from the next emit.
    pub fn emit(&self, event: CharivoEvent) {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock();
            match listeners.get(&event.kind()) {
                Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };
        for listener in snapshot {
            listener(&event);
        }
    }

    /// Remove all listeners for all event kinds.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Number of registrations for one kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        }
    }
}
