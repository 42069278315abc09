//! Core data model: messages and characters.
//!
//! Characters are owned by the host application and read-only to the engine;
//! messages are immutable once created and only ever removed by a full
//! history clear or a rollback of the most recent entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Messages
// =============================================================================

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Typed or spoken by the end user.
    User,
    /// Produced by the animated character.
    Character,
    /// Injected by the host application.
    System,
}

/// One conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: Uuid,
    /// Plain-text content.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Message origin.
    pub role: MessageRole,
    /// Id of the speaking character, for `Character` messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    /// Emotion tag attached by the language model, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            timestamp: Utc::now(),
            role,
            character_id: None,
            emotion: None,
        }
    }

    /// Build a user message with a fresh id and the current timestamp.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Build a character message attributed to `character_id`.
    pub fn character(content: impl Into<String>, character_id: impl Into<String>) -> Self {
        let mut message = Self::new(MessageRole::Character, content);
        message.character_id = Some(character_id.into());
        message
    }

    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Attach an emotion tag.
    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }
}

// =============================================================================
// Characters
// =============================================================================

/// Voice tuning carried by a character definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Speech rate multiplier (1.0 = normal).
    pub rate: f32,
    /// Pitch multiplier (1.0 = normal).
    pub pitch: f32,
    /// Output volume in `[0, 1]`.
    pub volume: f32,
    /// Provider-specific voice id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice_id: None,
        }
    }
}

/// Reference to a motion inside a renderer-side motion group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionRef {
    pub group: String,
    pub index: u32,
}

/// Maps an emotion tag onto renderer expressions and motions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionMapping {
    /// Emotion tag as produced by the model (e.g. "happy").
    pub emotion: String,
    /// Expression id to apply, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Motion to play, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionRef>,
}

/// An animated character definition, owned by the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceSettings>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emotion_mappings: Vec<EmotionMapping>,
}

impl Character {
    /// Minimal character with just an id and a display name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            personality: None,
            voice: None,
            emotion_mappings: Vec::new(),
        }
    }

    /// Look up the mapping for an emotion tag. No mapping means the renderer
    /// plays nothing; the engine never guesses.
    pub fn emotion_mapping(&self, emotion: &str) -> Option<&EmotionMapping> {
        self.emotion_mappings
            .iter()
            .find(|mapping| mapping.emotion == emotion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("hello");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.content, "hello");
        assert!(user.character_id.is_none());

        let reply = Message::character("hi there", "c1").with_emotion("happy");
        assert_eq!(reply.role, MessageRole::Character);
        assert_eq!(reply.character_id.as_deref(), Some("c1"));
        assert_eq!(reply.emotion.as_deref(), Some("happy"));
        assert_ne!(user.id, reply.id);
    }

    #[test]
    fn test_emotion_mapping_lookup() {
        let mut character = Character::new("c1", "Hiyori");
        character.emotion_mappings.push(EmotionMapping {
            emotion: "happy".to_string(),
            expression: Some("smile".to_string()),
            motion: Some(MotionRef {
                group: "TapBody".to_string(),
                index: 2,
            }),
        });

        let mapping = character.emotion_mapping("happy").unwrap();
        assert_eq!(mapping.expression.as_deref(), Some("smile"));
        assert!(character.emotion_mapping("angry").is_none());
    }

    #[test]
    fn test_voice_settings_default() {
        let voice = VoiceSettings::default();
        assert_eq!(voice.rate, 1.0);
        assert_eq!(voice.pitch, 1.0);
        assert_eq!(voice.volume, 1.0);
        assert!(voice.voice_id.is_none());
    }

    #[test]
    fn test_character_serde_round_trip() {
        let character = Character {
            id: "c1".to_string(),
            name: "Hiyori".to_string(),
            description: Some("A cheerful guide".to_string()),
            personality: None,
            voice: Some(VoiceSettings::default()),
            emotion_mappings: vec![EmotionMapping {
                emotion: "sad".to_string(),
                expression: None,
                motion: None,
            }],
        };

        let json = serde_json::to_string(&character).unwrap();
        let parsed: Character = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, "c1");
        assert_eq!(parsed.emotion_mappings.len(), 1);
    }
}
