use crate::audio::{Base64EncodedAudioBytes, decode_pcm16};

/// `audio` event: a chunk of the assistant's spoken reply
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioDeltaEvent {
    /// PCM16 little-endian mono at `PLAYBACK_SAMPLE_RATE`
    data: Base64EncodedAudioBytes,
}

impl AudioDeltaEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self { data: audio }
    }

    pub fn pcm16(&self) -> Result<Vec<i16>, base64::DecodeError> {
        decode_pcm16(&self.data)
    }
}

/// `text` event: a fragment of the assistant's reply transcript
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextDeltaEvent {
    data: String,
}

impl TextDeltaEvent {
    pub fn new(text: &str) -> Self {
        Self {
            data: text.to_string(),
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

/// `error` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl ErrorEvent {
    pub fn new(message: &str) -> Self {
        Self {
            data: Some(serde_json::Value::String(message.to_string())),
        }
    }

    pub fn message(&self) -> String {
        match &self.data {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(serde_json::Value::Null) | None => "unknown error".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// `interrupted` event: the agent stopped its reply
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InterruptedEvent {
    #[serde(default)]
    data: Option<String>,
}

impl InterruptedEvent {
    pub fn new() -> Self {
        Self { data: None }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.data = Some(reason.to_string());
        self
    }

    pub fn reason(&self) -> Option<&str> {
        self.data.as_deref()
    }
}

/// `session_id` event: a handle the agent can resume the conversation from
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionIdEvent {
    data: String,
}

impl SessionIdEvent {
    pub fn new(handle: &str) -> Self {
        Self {
            data: handle.to_string(),
        }
    }

    pub fn handle(&self) -> &str {
        &self.data
    }
}

/// `summary_saved` event: reply to an `end` request
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SummarySavedEvent {
    #[serde(default)]
    data: String,
}

impl SummarySavedEvent {
    pub fn new(result: &str) -> Self {
        Self {
            data: result.to_string(),
        }
    }

    pub fn result(&self) -> &str {
        &self.data
    }

    pub fn is_error(&self) -> bool {
        self.data.starts_with("error")
    }
}
