use crate::message::Message;
use crate::turn::TurnState;
use companion_types::InputMode;

/// Everything a UI can observe about a session, published as it happens.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The agent is ready and the transcript holds the greeting.
    Ready,
    MessageAppended { index: usize, message: Message },
    /// A streaming reply grew; the message at `index` was replaced.
    MessageUpdated { index: usize, message: Message },
    MessageRemoved { index: usize },
    /// A text fragment of the assistant's reply, as received.
    TextReceived(String),
    /// A chunk of the assistant's voice was queued for playback.
    AudioReceived,
    TurnComplete,
    Interrupted,
    /// The agent reported an error or the connection failed.
    Error(String),
    RecordingChanged(bool),
    AudioPlayingChanged(bool),
    InputModeChanged(InputMode),
    /// Seconds elapsed since the session became ready.
    Elapsed(u64),
    ResumptionHandle(String),
    SummarySaved(String),
    /// The connection to the agent closed.
    Closed(Option<String>),
    /// The session was ended and its state released.
    Ended,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub transcript: Vec<Message>,
    pub ready: bool,
    pub recording: bool,
    pub audio_playing: bool,
    pub seconds: u64,
    pub turn: TurnState,
    pub input_mode: InputMode,
    pub resumption_handle: Option<String>,
}
