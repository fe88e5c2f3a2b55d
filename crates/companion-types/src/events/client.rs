use crate::InputMode;
use crate::audio::{Base64EncodedAudioBytes, encode_pcm16};

/// `user_id` event, the first frame after connecting
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdentifyEvent {
    data: String,
}

impl IdentifyEvent {
    pub fn new(user_id: &str) -> Self {
        Self {
            data: user_id.to_string(),
        }
    }
}

/// `audio` event carrying a chunk of microphone audio
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioAppendEvent {
    /// PCM16 little-endian mono at `CAPTURE_SAMPLE_RATE`
    data: Base64EncodedAudioBytes,
}

impl AudioAppendEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self { data: audio }
    }

    pub fn from_pcm16(samples: &[i16]) -> Self {
        Self::new(encode_pcm16(samples))
    }
}

/// `text` event carrying a typed message
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextMessageEvent {
    data: String,
}

impl TextMessageEvent {
    pub fn new(text: &str) -> Self {
        Self {
            data: text.to_string(),
        }
    }
}

/// `mode_change` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModeChangeEvent {
    data: InputMode,
}

impl ModeChangeEvent {
    pub fn new(mode: InputMode) -> Self {
        Self { data: mode }
    }
}
