pub mod client;
pub mod server;

use client::*;
use server::*;

/// Frames the client sends to the agent.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "user_id")]
    Identify(IdentifyEvent),
    #[serde(rename = "audio")]
    Audio(AudioAppendEvent),
    #[serde(rename = "text")]
    TextMessage(TextMessageEvent),
    #[serde(rename = "interrupt")]
    Interrupt,
    #[serde(rename = "mode_change")]
    ModeChange(ModeChangeEvent),
    #[serde(rename = "end")]
    End,
}

impl ClientEvent {
    pub fn identify(user_id: &str) -> Self {
        ClientEvent::Identify(IdentifyEvent::new(user_id))
    }

    pub fn audio(pcm16: &[i16]) -> Self {
        ClientEvent::Audio(AudioAppendEvent::from_pcm16(pcm16))
    }

    pub fn text(text: &str) -> Self {
        ClientEvent::TextMessage(TextMessageEvent::new(text))
    }

    pub fn mode_change(mode: crate::InputMode) -> Self {
        ClientEvent::ModeChange(ModeChangeEvent::new(mode))
    }

    /// The wire name of the frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Identify(_) => "user_id",
            ClientEvent::Audio(_) => "audio",
            ClientEvent::TextMessage(_) => "text",
            ClientEvent::Interrupt => "interrupt",
            ClientEvent::ModeChange(_) => "mode_change",
            ClientEvent::End => "end",
        }
    }
}

/// Frames the agent sends to the client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Produced locally when the socket closes; never sent by the agent.
    #[serde(rename = "close")]
    Close {
        reason: Option<String>,
    },
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "audio")]
    AudioDelta(AudioDeltaEvent),
    #[serde(rename = "text")]
    TextDelta(TextDeltaEvent),
    #[serde(rename = "turn_complete")]
    TurnComplete,
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "interrupted")]
    Interrupted(InterruptedEvent),
    #[serde(rename = "session_id")]
    SessionId(SessionIdEvent),
    #[serde(rename = "summary_saved")]
    SummarySaved(SummarySavedEvent),
}

impl ServerEvent {
    /// The wire name of the frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Close { .. } => "close",
            ServerEvent::Ready => "ready",
            ServerEvent::AudioDelta(_) => "audio",
            ServerEvent::TextDelta(_) => "text",
            ServerEvent::TurnComplete => "turn_complete",
            ServerEvent::Error(_) => "error",
            ServerEvent::Interrupted(_) => "interrupted",
            ServerEvent::SessionId(_) => "session_id",
            ServerEvent::SummarySaved(_) => "summary_saved",
        }
    }
}
