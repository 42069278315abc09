//! Session state and failure handling around a stateless LLM adapter.

use tracing::{debug, warn};

use super::base::{BaseLlm, ChatMessage, LlmError, LlmResult};
use crate::core::types::{Character, Message, MessageRole};

/// Wraps an [`BaseLlm`] adapter with per-character conversation history.
///
/// History is append-only and scoped to one character; it is cleared when the
/// character id changes or on request. `generate_response` is atomic with
/// respect to history: a failed provider call leaves the history exactly as
/// it was before the call.
pub struct LlmManager {
    client: Box<dyn BaseLlm>,
    character: Option<Character>,
    history: Vec<Message>,
}

impl LlmManager {
    pub fn new(client: Box<dyn BaseLlm>) -> Self {
        Self {
            client,
            character: None,
            history: Vec::new(),
        }
    }

    /// Set the active character.
    ///
    /// Re-setting the same character id preserves the running conversation;
    /// only an actual id change resets history.
    pub fn set_character(&mut self, character: Character) {
        if self
            .character
            .as_ref()
            .is_some_and(|previous| previous.id != character.id)
        {
            debug!(
                character_id = %character.id,
                "character changed, clearing conversation history"
            );
            self.history.clear();
        }
        self.character = Some(character);
    }

    pub fn character(&self) -> Option<&Character> {
        self.character.as_ref()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Generate a character response for one user message.
    ///
    /// Appends the user message to history, calls the provider over the full
    /// transcript, appends the resulting character message and returns the
    /// raw response text. On provider failure the just-appended user message
    /// is removed before the error propagates, so callers never observe a
    /// half-updated history.
    pub async fn generate_response(&mut self, message: &Message) -> LlmResult<String> {
        let character = self.character.as_ref().ok_or(LlmError::CharacterNotSet)?;
        if message.content.trim().is_empty() {
            return Err(LlmError::EmptyMessage);
        }

        self.history.push(message.clone());
        let transcript = build_transcript(character, &self.history);

        match self.client.chat(&transcript).await {
            Ok(text) => {
                self.history
                    .push(Message::character(text.clone(), character.id.clone()));
                Ok(text)
            }
            Err(error) => {
                // Roll back to the pre-call state.
                self.history.pop();
                warn!(character_id = %character.id, %error, "generation failed, history rolled back");
                Err(error)
            }
        }
    }
}

/// System prompt plus the full history as role/content pairs.
fn build_transcript(character: &Character, history: &[Message]) -> Vec<ChatMessage> {
    let mut transcript = Vec::with_capacity(history.len() + 1);
    transcript.push(ChatMessage::system(system_prompt(character)));
    for message in history {
        transcript.push(match message.role {
            MessageRole::User => ChatMessage::user(message.content.clone()),
            MessageRole::Character => ChatMessage::assistant(message.content.clone()),
            MessageRole::System => ChatMessage::system(message.content.clone()),
        });
    }
    transcript
}

fn system_prompt(character: &Character) -> String {
    let mut prompt = format!("You are {}.", character.name);
    if let Some(description) = &character.description {
        prompt.push(' ');
        prompt.push_str(description);
    }
    if let Some(personality) = &character.personality {
        prompt.push_str(" Personality: ");
        prompt.push_str(personality);
    }
    prompt
}
