//! Data-channel wire protocol for the realtime voice session.
//!
//! Every message is a JSON object carrying a `type` tag.
//!
//! Client events (sent over the data channel):
//! - session.update - Update session configuration
//! - conversation.item.create - Add an item to the conversation
//! - response.create - Request a model response
//!
//! Server events (received over the data channel):
//! - session.created - Session established
//! - response.audio.delta - Base64 PCM16 audio chunk
//! - response.audio.done - Audio generation complete
//! - response.audio_transcript.delta - Assistant transcript chunk
//! - conversation.item.input_audio_transcription.completed - User transcript
//! - response.output_item.added - Output item added (function-call tracking)
//! - response.function_call_arguments.done - Function call ready to run
//! - response.done - Response complete
//! - error - Provider error

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration pushed after the channel opens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Output audio format for data-channel deltas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Input audio transcription configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    /// Tool definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g. "whisper-1").
    pub model: String,
}

/// Tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function").
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name.
    pub name: String,
    /// Function description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDef {
    pub fn function(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tool_type: "function".to_string(),
            name: name.into(),
            description: Some(description.into()),
            parameters: None,
        }
    }
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item carried by `conversation.item.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Item type (message, function_call_output).
    #[serde(rename = "type")]
    pub item_type: String,
    /// Role for message items (user, assistant, system).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts for message items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,
    /// Call id for function-call output items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Serialized function result for function-call output items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    /// A user text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            item_type: "message".to_string(),
            role: Some("user".to_string()),
            content: Some(vec![ContentPart {
                content_type: "input_text".to_string(),
                text: Some(text.into()),
                transcript: None,
            }]),
            call_id: None,
            output: None,
        }
    }

    /// A function-call result answering `call_id`.
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            item_type: "function_call_output".to_string(),
            role: None,
            content: None,
            call_id: Some(call_id.into()),
            output: Some(output.into()),
        }
    }
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    /// Content type (input_text, text, audio).
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Transcript of audio content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

// =============================================================================
// Client Events (sent over the data channel)
// =============================================================================

/// Client events sent over the data channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration.
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration.
        session: SessionConfig,
    },

    /// Add an item to the conversation.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// The item to add.
        item: ConversationItem,
    },

    /// Request a model response over the current conversation.
    #[serde(rename = "response.create")]
    ResponseCreate {},
}

impl ClientEvent {
    /// Serialize to the wire string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server Events (received over the data channel)
// =============================================================================

/// Session details from `session.created`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: String,
}

/// Provider error payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Response summary from `response.done`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Output item from `response.output_item.added`.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Server events received over the data channel.
///
/// Unrecognized `type` tags fall through to [`ServerEvent::Unknown`] so new
/// provider events never break the dispatch loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session established.
    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },

    /// Base64 PCM16 audio chunk. Exists to drive analysis and playback; the
    /// negotiated media track is the transport-level audio path.
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        delta: String,
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Audio generation for the response finished.
    #[serde(rename = "response.audio.done")]
    AudioDone,

    /// Assistant transcript chunk.
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },

    /// Completed transcription of the user's speech.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        transcript: String,
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Output item added; carries the function name before the arguments
    /// finish streaming.
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },

    /// Function call arguments complete; the call is ready to run.
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        arguments: String,
    },

    /// The response finished.
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseInfo>,
    },

    /// Provider error.
    #[serde(rename = "error")]
    Error { error: ErrorInfo },

    /// Any event this client does not dispatch on.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_type_tags() {
        let json = ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text("hello"),
        }
        .to_json()
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "conversation.item.create");
        assert_eq!(value["item"]["type"], "message");
        assert_eq!(value["item"]["role"], "user");
        assert_eq!(value["item"]["content"][0]["type"], "input_text");
        assert_eq!(value["item"]["content"][0]["text"], "hello");

        let json = ClientEvent::ResponseCreate {}.to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "response.create");

        let json = ClientEvent::SessionUpdate {
            session: SessionConfig::default(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains("\"session.update\""));
    }

    #[test]
    fn test_function_output_item() {
        let json = ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_output("call_1", "{\"ok\":true}"),
        }
        .to_json()
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["item"]["type"], "function_call_output");
        assert_eq!(value["item"]["call_id"], "call_1");
        // Message-only fields are omitted entirely.
        assert!(value["item"].get("role").is_none());
    }

    #[test]
    fn test_server_event_parsing() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"session.created","session":{"id":"sess_1","model":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ServerEvent::SessionCreated { session } if session.id == "sess_1"
        ));

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.audio.delta","delta":"AAAA","item_id":"item_1"}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::AudioDelta { delta, .. } if delta == "AAAA"));

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.function_call_arguments.done","call_id":"c1","name":"set_emotion","arguments":"{\"emotion\":\"happy\"}"}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ServerEvent::FunctionCallArgumentsDone { call_id: Some(c), .. } if c == "c1"
        ));

        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"error","error":{"message":"boom"}}"#).unwrap();
        assert!(matches!(event, ServerEvent::Error { error } if error.message == "boom"));
    }

    #[test]
    fn test_unknown_server_event_tolerated() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn test_response_done_without_body() {
        let event: ServerEvent = serde_json::from_str(r#"{"type":"response.done"}"#).unwrap();
        assert!(matches!(event, ServerEvent::ResponseDone { response: None }));

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.done","response":{"id":"resp_1","status":"completed"}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ServerEvent::ResponseDone { response: Some(info) } if info.id.as_deref() == Some("resp_1")
        ));
    }
}
