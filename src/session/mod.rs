//! The `Charivo` session controller.
//!
//! Owns the event bus and at most one attached instance of each manager
//! type. Attachment is explicit ownership: `attach_*` replaces any previous
//! instance ("last attach wins"), `detach_*` clears and returns it; there
//! are no ambient singletons.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::core::events::{CharivoEvent, EventBus};
use crate::core::llm::{LlmError, LlmManager};
use crate::core::realtime::{RealtimeError, RealtimeManager};
use crate::core::render::{RenderError, RenderManager};
use crate::core::stt::{SttError, SttManager, SttOptions};
use crate::core::tts::{SpeechOptions, TtsError, TtsManager};
use crate::core::types::{Character, Message};

/// Errors surfaced by the session controller, wrapping each subsystem's own
/// taxonomy.
#[derive(Debug, Error)]
pub enum CharivoError {
    /// The operation needs a manager that is not attached.
    #[error("no {0} manager attached")]
    NotAttached(&'static str),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Tts(#[from] TtsError),
    #[error(transparent)]
    Stt(#[from] SttError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
}

/// Result type for session controller operations.
pub type CharivoResult<T> = Result<T, CharivoError>;

/// Session controller wiring the pluggable subsystems together.
pub struct Charivo {
    bus: Arc<EventBus>,
    character: Option<Character>,
    render: Option<RenderManager>,
    llm: Option<LlmManager>,
    tts: Option<TtsManager>,
    stt: Option<SttManager>,
    realtime: Option<RealtimeManager>,
}

impl Charivo {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(),
            character: None,
            render: None,
            llm: None,
            tts: None,
            stt: None,
            realtime: None,
        }
    }

    /// The bus managers are constructed against.
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Set the active character and forward it to the managers that keep
    /// per-character state.
    pub fn set_character(&mut self, character: Character) {
        if let Some(llm) = self.llm.as_mut() {
            llm.set_character(character.clone());
        }
        if let Some(render) = self.render.as_ref() {
            render.set_character(character.clone());
        }
        self.character = Some(character);
    }

    pub fn character(&self) -> Option<&Character> {
        self.character.as_ref()
    }

    // -------------------------------------------------------------------------
    // Manager attachment ("last attach wins")
    // -------------------------------------------------------------------------

    pub fn attach_render(&mut self, manager: RenderManager) {
        if let Some(character) = &self.character {
            manager.set_character(character.clone());
        }
        if self.render.replace(manager).is_some() {
            debug!("replaced previously attached render manager");
        }
    }

    pub fn detach_render(&mut self) -> Option<RenderManager> {
        self.render.take()
    }

    pub fn attach_llm(&mut self, mut manager: LlmManager) {
        if let Some(character) = &self.character {
            manager.set_character(character.clone());
        }
        if self.llm.replace(manager).is_some() {
            debug!("replaced previously attached llm manager");
        }
    }

    pub fn detach_llm(&mut self) -> Option<LlmManager> {
        self.llm.take()
    }

    pub fn attach_tts(&mut self, manager: TtsManager) {
        if self.tts.replace(manager).is_some() {
            debug!("replaced previously attached tts manager");
        }
    }

    pub fn detach_tts(&mut self) -> Option<TtsManager> {
        self.tts.take()
    }

    pub fn attach_stt(&mut self, manager: SttManager) {
        if self.stt.replace(manager).is_some() {
            debug!("replaced previously attached stt manager");
        }
    }

    pub fn detach_stt(&mut self) -> Option<SttManager> {
        self.stt.take()
    }

    pub fn attach_realtime(&mut self, manager: RealtimeManager) {
        if self.realtime.replace(manager).is_some() {
            debug!("replaced previously attached realtime manager");
        }
    }

    pub fn detach_realtime(&mut self) -> Option<RealtimeManager> {
        self.realtime.take()
    }

    // -------------------------------------------------------------------------
    // Conversation flow
    // -------------------------------------------------------------------------

    /// Run one user turn through every attached subsystem.
    ///
    /// Each absent manager degrades gracefully: with nothing attached the
    /// call still succeeds, having emitted exactly one `MessageSent`.
    pub async fn user_say(&mut self, content: &str) -> CharivoResult<()> {
        let message = Message::user(content);
        self.bus.emit(CharivoEvent::MessageSent {
            message: message.clone(),
        });

        if let Some(render) = self.render.as_ref() {
            render.render(&message, self.character.as_ref()).await?;
        }

        let Some(llm) = self.llm.as_mut() else {
            return Ok(());
        };
        let Some(character) = self.character.clone() else {
            return Ok(());
        };

        let text = llm.generate_response(&message).await?;
        let reply = Message::character(text.clone(), character.id.clone());
        self.bus.emit(CharivoEvent::MessageReceived {
            message: reply.clone(),
        });
        self.bus.emit(CharivoEvent::CharacterSpeak {
            character: character.clone(),
            message: text.clone(),
        });

        if let Some(render) = self.render.as_ref() {
            render.render(&reply, Some(&character)).await?;
        }

        if let Some(tts) = self.tts.as_mut() {
            let options = character
                .voice
                .as_ref()
                .map(SpeechOptions::from_voice)
                .unwrap_or_default();
            tts.speak(&text, &options).await?;
        }
        Ok(())
    }

    /// Stop any in-flight speech.
    pub async fn stop_speaking(&mut self) -> CharivoResult<()> {
        if let Some(tts) = self.tts.as_mut() {
            tts.stop().await?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Voice input
    // -------------------------------------------------------------------------

    /// Begin microphone transcription on the attached STT manager.
    pub async fn start_listening(&mut self, options: &SttOptions) -> CharivoResult<()> {
        let stt = self.stt.as_mut().ok_or(CharivoError::NotAttached("stt"))?;
        stt.start_recording(options).await?;
        Ok(())
    }

    /// Finish transcription and feed the transcript through `user_say`.
    pub async fn stop_listening(&mut self) -> CharivoResult<String> {
        let stt = self.stt.as_mut().ok_or(CharivoError::NotAttached("stt"))?;
        let text = stt.stop_recording().await?;
        if !text.trim().is_empty() {
            self.user_say(&text).await?;
        }
        Ok(text)
    }

    // -------------------------------------------------------------------------
    // Realtime session
    // -------------------------------------------------------------------------

    pub async fn start_realtime_session(&mut self) -> CharivoResult<()> {
        let realtime = self
            .realtime
            .as_mut()
            .ok_or(CharivoError::NotAttached("realtime"))?;
        realtime.start_session().await?;
        Ok(())
    }

    pub async fn send_realtime_message(&self, text: &str) -> CharivoResult<()> {
        let realtime = self
            .realtime
            .as_ref()
            .ok_or(CharivoError::NotAttached("realtime"))?;
        realtime.send_message(text).await?;
        Ok(())
    }

    pub async fn end_realtime_session(&mut self) -> CharivoResult<()> {
        if let Some(realtime) = self.realtime.as_mut() {
            realtime.end_session().await?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    /// Conversation history of the attached LLM manager; empty without one.
    pub fn history(&self) -> &[Message] {
        self.llm.as_ref().map(LlmManager::history).unwrap_or(&[])
    }

    pub fn clear_history(&mut self) {
        if let Some(llm) = self.llm.as_mut() {
            llm.clear_history();
        }
    }
}

impl Default for Charivo {
    fn default() -> Self {
        Self::new()
    }
}
