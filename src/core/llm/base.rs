//! Base trait and types for language-model provider adapters.
//!
//! Adapters are stateless: they turn a role/content transcript into one
//! completion string. Session semantics (history, validation, rollback) live
//! in [`super::LlmManager`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during language-model operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No character has been set on the manager.
    #[error("no character set")]
    CharacterNotSet,

    /// The message content is empty or whitespace-only.
    #[error("message content must be a non-empty string")]
    EmptyMessage,

    /// The underlying provider call failed.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for language-model operations.
pub type LlmResult<T> = Result<T, LlmError>;

// =============================================================================
// Chat Transcript
// =============================================================================

/// Role of one transcript entry, in provider wire terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role/content pair sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for language-model provider adapters.
///
/// # Example
///
/// ```rust,ignore
/// struct EchoLlm;
///
/// #[async_trait]
/// impl BaseLlm for EchoLlm {
///     async fn chat(&self, messages: &[ChatMessage]) -> LlmResult<String> {
///         Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
///     }
/// }
/// ```
#[async_trait]
pub trait BaseLlm: Send + Sync {
    /// Produce one completion for the given transcript.
    async fn chat(&self, messages: &[ChatMessage]) -> LlmResult<String>;
}

/// Boxed trait object for language-model adapters.
pub type BoxedLlm = Box<dyn BaseLlm>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(LlmError::CharacterNotSet.to_string(), "no character set");
        assert!(
            LlmError::ProviderError("rate limited".to_string())
                .to_string()
                .contains("rate limited")
        );
    }

    #[test]
    fn test_chat_message_serde() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert!(json.contains("\"assistant\""));
        let parsed: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.role, ChatRole::Assistant);
    }
}
