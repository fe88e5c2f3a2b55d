//! Turn-taking state machine.
//!
//! Keeps at most one turn open at a time:
//! - Idle -> UserTurn (recording started, or a text message sent)
//! - UserTurn -> Idle (recording stopped, or right after a text message is queued)
//! - Idle -> AssistantTurn (first audio or text chunk of a reply)
//! - AssistantTurn -> Idle (turn_complete)
//! - AssistantTurn -> Interrupting -> Idle (barge-in, or the agent's `interrupted`)
//! - any -> Idle (agent error, connection closed)
//!
//! The machine performs no I/O. Every side effect is queued as a [`Command`]
//! for the session to carry out, in order.

use std::fmt;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::message::{Message, Sender, Transcript};
use companion_types::events::server::AudioDeltaEvent;
use companion_types::{ClientEvent, InputMode, ServerEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TurnState {
    #[default]
    Idle,
    /// The user is recording or has a typed message in flight.
    UserTurn,
    /// The assistant's reply is streaming in.
    AssistantTurn,
    /// The assistant's reply is being torn down.
    Interrupting,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "Idle"),
            TurnState::UserTurn => write!(f, "UserTurn"),
            TurnState::AssistantTurn => write!(f, "AssistantTurn"),
            TurnState::Interrupting => write!(f, "Interrupting"),
        }
    }
}

/// Side effects the state machine asks the session to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a frame to the agent.
    Send(ClientEvent),
    /// Queue PCM16 samples on the speaker.
    Play(Vec<i16>),
    /// Silence the speaker and drop anything queued.
    StopPlayback,
    /// Close the microphone.
    StopCapture,
    /// Publish an event to observers.
    Emit(SessionEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Initiator {
    User,
    Agent,
}

/// The assistant message currently growing in the transcript.
#[derive(Debug)]
struct Reply {
    index: usize,
    text: String,
}

pub struct TurnMachine {
    config: SessionConfig,
    state: TurnState,
    transcript: Transcript,
    input_mode: InputMode,
    pending_mode: Option<InputMode>,
    recording: bool,
    audio_playing: bool,
    reply: Option<Reply>,
    placeholder: Option<usize>,
    // Set after the user cuts a reply short; chunks still in flight for that
    // reply are dropped until the agent closes it with `interrupted` or
    // `turn_complete`.
    discard_until_boundary: bool,
    resumption_handle: Option<String>,
    commands: Vec<Command>,
}

impl TurnMachine {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: TurnState::Idle,
            transcript: Transcript::new(),
            input_mode: InputMode::default(),
            pending_mode: None,
            recording: false,
            audio_playing: false,
            reply: None,
            placeholder: None,
            discard_until_boundary: false,
            resumption_handle: None,
            commands: Vec::new(),
        }
    }

    /// Starts in `mode` instead of the default; announced to the agent on ready.
    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_audio_playing(&self) -> bool {
        self.audio_playing
    }

    pub fn resumption_handle(&self) -> Option<&str> {
        self.resumption_handle.as_deref()
    }

    /// Drains the side effects queued so far, oldest first.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Opens a user turn for a microphone that has just been acquired.
    pub fn begin_recording(&mut self) {
        if self.recording {
            return;
        }
        if self.state == TurnState::AssistantTurn {
            tracing::debug!("User started talking over the assistant");
            self.interrupt_reply(Initiator::User);
        }
        self.transition(TurnState::UserTurn);
        self.set_recording(true);
        let placeholder = Message::user(&self.config.listening_placeholder);
        self.placeholder = Some(self.append(placeholder));
    }

    /// Closes the user's recording turn.
    pub fn end_recording(&mut self) {
        if !self.recording {
            return;
        }
        self.close_recording();
        if self.state == TurnState::UserTurn {
            self.transition(TurnState::Idle);
        }
    }

    /// Records and sends a typed message. Returns false if there was nothing to send.
    pub fn send_text(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            tracing::debug!("Ignoring empty text message");
            return false;
        }
        if self.state == TurnState::AssistantTurn {
            tracing::debug!("User typed over the assistant");
            self.interrupt_reply(Initiator::User);
        }
        self.transition(TurnState::UserTurn);
        self.append(Message::user(text));
        self.send(ClientEvent::text(text));
        // A typed message is queued, not held open, unless the microphone is.
        if !self.recording {
            self.transition(TurnState::Idle);
        }
        true
    }

    /// User-initiated interruption.
    pub fn interrupt(&mut self) {
        if self.state == TurnState::AssistantTurn {
            self.interrupt_reply(Initiator::User);
        } else {
            tracing::debug!("Interrupt with no open assistant turn; silencing playback");
            self.commands.push(Command::StopPlayback);
            self.set_audio_playing(false);
        }
    }

    /// Switches between audio and text input once no turn is open.
    pub fn set_input_mode(&mut self, mode: InputMode) {
        if self.state == TurnState::Idle {
            self.pending_mode = None;
            self.apply_mode(mode);
        } else {
            tracing::debug!("Turn open ({}); input mode {} queued", self.state, mode);
            self.pending_mode = Some(mode);
        }
    }

    /// Forwards a captured microphone frame while the user is recording.
    pub fn on_captured(&mut self, pcm16: Vec<i16>) {
        if !self.recording || pcm16.is_empty() {
            return;
        }
        self.send(ClientEvent::audio(&pcm16));
    }

    pub fn on_connection_failed(&mut self, error: &SessionError) {
        let fallback = Message::assistant(&self.config.connection_fallback);
        self.append(fallback);
        self.emit(SessionEvent::Error(error.to_string()));
    }

    pub fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Ready => self.on_ready(),
            ServerEvent::AudioDelta(delta) => self.on_audio(&delta),
            ServerEvent::TextDelta(delta) => self.on_text(delta.data()),
            ServerEvent::TurnComplete => self.on_turn_complete(),
            ServerEvent::Error(error) => self.on_error(&error.message()),
            ServerEvent::Interrupted(interrupted) => self.on_interrupted(interrupted.reason()),
            ServerEvent::SessionId(session) => {
                tracing::info!("Resumable session handle: {}", session.handle());
                self.resumption_handle = Some(session.handle().to_string());
                self.emit(SessionEvent::ResumptionHandle(session.handle().to_string()));
            }
            ServerEvent::SummarySaved(saved) => {
                if saved.is_error() {
                    tracing::warn!("Agent failed to save the session summary: {}", saved.result());
                } else {
                    tracing::info!("Session summary saved: {}", saved.result());
                }
                self.emit(SessionEvent::SummarySaved(saved.result().to_string()));
            }
            ServerEvent::Close { reason } => self.on_closed(reason),
        }
    }

    /// Returns to a blank idle state, keeping only the input mode preference.
    pub fn reset(&mut self) {
        if let Some(mode) = self.pending_mode.take() {
            self.input_mode = mode;
        }
        self.state = TurnState::Idle;
        self.transcript.clear();
        self.recording = false;
        self.audio_playing = false;
        self.reply = None;
        self.placeholder = None;
        self.discard_until_boundary = false;
        self.resumption_handle = None;
        self.commands.clear();
    }

    fn on_ready(&mut self) {
        while let Some(index) = self.transcript.len().checked_sub(1) {
            self.transcript.remove(index);
            self.emit(SessionEvent::MessageRemoved { index });
        }
        let greeting = Message::assistant(&self.config.greeting);
        self.append(greeting);
        if self.input_mode != InputMode::default() {
            self.send(ClientEvent::mode_change(self.input_mode));
        }
        self.emit(SessionEvent::Ready);
    }

    fn on_audio(&mut self, delta: &AudioDeltaEvent) {
        if self.discard_until_boundary {
            tracing::trace!("Dropping audio from an interrupted reply");
            return;
        }
        let pcm16 = match delta.pcm16() {
            Ok(pcm16) => pcm16,
            Err(e) => {
                let violation =
                    SessionError::ProtocolViolation(format!("undecodable audio: {}", e));
                tracing::warn!("{}", violation);
                return;
            }
        };
        self.open_reply();
        self.set_audio_playing(true);
        self.commands.push(Command::Play(pcm16));
        self.emit(SessionEvent::AudioReceived);
    }

    fn on_text(&mut self, fragment: &str) {
        if fragment.trim().is_empty() {
            return;
        }
        if self.discard_until_boundary {
            tracing::debug!("Dropping text from an interrupted reply: {:?}", fragment);
            return;
        }
        self.open_reply();
        // The first chunk is kept as received; later ones are trimmed and space-joined.
        if let Some(reply) = self.reply.as_mut() {
            reply.text.push(' ');
            reply.text.push_str(fragment.trim());
            let index = reply.index;
            let message = Message::assistant(&reply.text);
            if self.transcript.replace(index, message.clone()) {
                self.emit(SessionEvent::MessageUpdated { index, message });
            } else {
                tracing::warn!("Streaming reply lost its transcript slot {}", index);
            }
        } else {
            let index = self.append(Message::assistant(fragment));
            self.reply = Some(Reply {
                index,
                text: fragment.to_string(),
            });
        }
        self.emit(SessionEvent::TextReceived(fragment.to_string()));
    }

    fn on_turn_complete(&mut self) {
        if self.discard_until_boundary {
            tracing::debug!("Interrupted reply closed by turn_complete");
            self.discard_until_boundary = false;
            return;
        }
        if self.state != TurnState::AssistantTurn {
            let violation =
                SessionError::ProtocolViolation("turn_complete with no open assistant turn".into());
            tracing::warn!("{}", violation);
            return;
        }
        self.reply = None;
        self.set_audio_playing(false);
        self.emit(SessionEvent::TurnComplete);
        self.transition(TurnState::Idle);
    }

    fn on_interrupted(&mut self, reason: Option<&str>) {
        if self.discard_until_boundary {
            tracing::debug!("Agent acknowledged the interruption");
            self.discard_until_boundary = false;
            return;
        }
        tracing::info!("Agent interrupted its reply: {}", reason.unwrap_or("no reason"));
        if self.state == TurnState::AssistantTurn {
            self.interrupt_reply(Initiator::Agent);
        } else {
            // Audio from a finished reply may still be draining.
            self.commands.push(Command::StopPlayback);
            self.set_audio_playing(false);
            self.emit(SessionEvent::Interrupted);
        }
    }

    fn on_error(&mut self, message: &str) {
        tracing::error!("{}", SessionError::Remote(message.to_string()));
        if self.state == TurnState::AssistantTurn {
            self.commands.push(Command::StopPlayback);
        }
        if self.recording {
            self.close_recording();
        }
        // An interrupted reply stays muted until the agent closes it.
        self.reply = None;
        self.set_audio_playing(false);
        let fallback = Message::assistant(&self.config.error_fallback);
        self.append(fallback);
        self.emit(SessionEvent::Error(message.to_string()));
        self.transition(TurnState::Idle);
    }

    fn on_closed(&mut self, reason: Option<String>) {
        tracing::info!("Connection closed: {:?}", reason);
        if self.recording {
            self.close_recording();
        }
        self.commands.push(Command::StopPlayback);
        self.reply = None;
        self.discard_until_boundary = false;
        self.set_audio_playing(false);
        self.transition(TurnState::Idle);
        self.emit(SessionEvent::Closed(reason));
    }

    /// Makes sure an assistant turn is open before a reply chunk is applied.
    fn open_reply(&mut self) {
        match self.state {
            TurnState::AssistantTurn => {}
            TurnState::UserTurn => {
                tracing::debug!("Agent took the turn; closing the user's turn");
                if self.recording {
                    self.close_recording();
                }
                self.transition(TurnState::Idle);
                self.transition(TurnState::AssistantTurn);
            }
            TurnState::Idle | TurnState::Interrupting => {
                self.transition(TurnState::AssistantTurn);
            }
        }
    }

    fn interrupt_reply(&mut self, initiator: Initiator) {
        self.transition(TurnState::Interrupting);
        self.commands.push(Command::StopPlayback);
        self.reply = None;
        self.set_audio_playing(false);
        if initiator == Initiator::User {
            self.send(ClientEvent::Interrupt);
            self.discard_until_boundary = true;
        }
        self.emit(SessionEvent::Interrupted);
        self.transition(TurnState::Idle);
    }

    fn close_recording(&mut self) {
        self.set_recording(false);
        self.commands.push(Command::StopCapture);
        if let Some(index) = self.placeholder.take() {
            let is_placeholder = self.transcript.get(index).is_some_and(|m| {
                m.sender == Sender::User && m.text == self.config.listening_placeholder
            });
            if is_placeholder {
                self.transcript.remove(index);
                self.emit(SessionEvent::MessageRemoved { index });
            }
        }
    }

    fn transition(&mut self, next: TurnState) {
        if self.state != next {
            tracing::debug!("Turn state: {} -> {}", self.state, next);
            self.state = next;
        }
        if next == TurnState::Idle {
            if let Some(mode) = self.pending_mode.take() {
                self.apply_mode(mode);
            }
        }
    }

    fn apply_mode(&mut self, mode: InputMode) {
        if mode == self.input_mode {
            return;
        }
        tracing::info!("Input mode: {} -> {}", self.input_mode, mode);
        self.input_mode = mode;
        self.send(ClientEvent::mode_change(mode));
        self.emit(SessionEvent::InputModeChanged(mode));
    }

    fn append(&mut self, message: Message) -> usize {
        let index = self.transcript.push(message.clone());
        self.emit(SessionEvent::MessageAppended { index, message });
        index
    }

    fn set_recording(&mut self, recording: bool) {
        if self.recording != recording {
            self.recording = recording;
            self.emit(SessionEvent::RecordingChanged(recording));
        }
    }

    fn set_audio_playing(&mut self, playing: bool) {
        if self.audio_playing != playing {
            self.audio_playing = playing;
            self.emit(SessionEvent::AudioPlayingChanged(playing));
        }
    }

    fn send(&mut self, event: ClientEvent) {
        self.commands.push(Command::Send(event));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.commands.push(Command::Emit(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_types::audio::encode_pcm16;
    use companion_types::events::server::{
        ErrorEvent, InterruptedEvent, SessionIdEvent, TextDeltaEvent,
    };

    fn text(fragment: &str) -> ServerEvent {
        ServerEvent::TextDelta(TextDeltaEvent::new(fragment))
    }

    fn audio(samples: &[i16]) -> ServerEvent {
        ServerEvent::AudioDelta(AudioDeltaEvent::new(encode_pcm16(samples)))
    }

    fn interrupted() -> ServerEvent {
        ServerEvent::Interrupted(
            InterruptedEvent::new().with_reason("Response interrupted by user input"),
        )
    }

    fn ready_machine() -> TurnMachine {
        let mut machine = TurnMachine::new(SessionConfig::default());
        machine.on_server_event(ServerEvent::Ready);
        machine.take_commands();
        machine
    }

    fn sent(commands: &[Command]) -> Vec<ClientEvent> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Send(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    fn texts(machine: &TurnMachine) -> Vec<String> {
        machine
            .transcript()
            .messages()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    #[test]
    fn test_ready_seeds_greeting() {
        let mut machine = TurnMachine::new(SessionConfig::default());
        machine.on_server_event(ServerEvent::Ready);

        assert_eq!(machine.transcript().len(), 1);
        assert_eq!(
            machine.transcript().last(),
            Some(&Message::assistant(&SessionConfig::default().greeting))
        );
        let commands = machine.take_commands();
        assert_eq!(commands.last(), Some(&Command::Emit(SessionEvent::Ready)));
    }

    #[test]
    fn test_streamed_text_is_one_message_per_turn() {
        let cases: [&[&str]; 3] = [
            &["Hello"],
            &["Hello", "there"],
            &["I", "hear", "that", "you", "feel", "anxious."],
        ];
        for chunks in cases {
            let mut machine = ready_machine();
            for chunk in chunks {
                machine.on_server_event(text(chunk));
            }
            machine.on_server_event(ServerEvent::TurnComplete);

            assert_eq!(machine.transcript().len(), 2, "chunks {:?}", chunks);
            assert_eq!(
                machine.transcript().last(),
                Some(&Message::assistant(&chunks.join(" ")))
            );
            assert_eq!(machine.state(), TurnState::Idle);
        }
    }

    #[test]
    fn test_later_chunks_replace_the_last_message() {
        let mut machine = ready_machine();
        machine.on_server_event(text("Hello"));
        machine.on_server_event(text(" there "));

        let commands = machine.take_commands();
        let appended = commands
            .iter()
            .filter(|c| matches!(c, Command::Emit(SessionEvent::MessageAppended { .. })))
            .count();
        assert_eq!(appended, 1);
        assert!(commands.contains(&Command::Emit(SessionEvent::MessageUpdated {
            index: 1,
            message: Message::assistant("Hello there"),
        })));
    }

    #[test]
    fn test_turn_complete_freezes_the_reply() {
        let mut machine = ready_machine();
        machine.on_server_event(text("First"));
        machine.on_server_event(ServerEvent::TurnComplete);
        machine.on_server_event(text("Second"));

        assert_eq!(texts(&machine)[1..], ["First", "Second"]);
        assert_eq!(machine.state(), TurnState::AssistantTurn);
    }

    #[test]
    fn test_audio_opens_turn_and_plays() {
        let mut machine = ready_machine();
        machine.on_server_event(audio(&[10, -10]));

        assert_eq!(machine.state(), TurnState::AssistantTurn);
        assert!(machine.is_audio_playing());
        let commands = machine.take_commands();
        assert!(commands.contains(&Command::Play(vec![10, -10])));
        assert!(commands.contains(&Command::Emit(SessionEvent::AudioPlayingChanged(true))));

        machine.on_server_event(ServerEvent::TurnComplete);
        assert!(!machine.is_audio_playing());
        assert_eq!(machine.state(), TurnState::Idle);
    }

    #[test]
    fn test_barge_in_drops_the_interrupted_reply() {
        let mut machine = ready_machine();
        machine.on_server_event(audio(&[1, 2, 3]));
        machine.on_server_event(text("Once upon"));
        machine.take_commands();

        machine.begin_recording();
        let commands = machine.take_commands();
        let stop = commands.iter().position(|c| *c == Command::StopPlayback);
        let recording = commands
            .iter()
            .position(|c| *c == Command::Emit(SessionEvent::RecordingChanged(true)));
        assert!(stop.is_some() && stop < recording, "playback stops before the new turn opens");
        assert_eq!(sent(&commands), vec![ClientEvent::Interrupt]);
        assert_eq!(machine.state(), TurnState::UserTurn);

        // Frames of the old reply that were already queued.
        machine.on_server_event(text("a time"));
        machine.on_server_event(audio(&[4, 5]));
        assert!(!machine.is_audio_playing());
        assert!(!machine.take_commands().iter().any(|c| matches!(c, Command::Play(_))));

        machine.on_server_event(interrupted());
        machine.end_recording();
        machine.on_server_event(text("Fresh"));
        machine.on_server_event(text("start"));
        machine.on_server_event(ServerEvent::TurnComplete);

        assert_eq!(machine.transcript().last(), Some(&Message::assistant("Fresh start")));
        assert!(texts(&machine).iter().all(|t| !t.contains("a time")));
    }

    #[test]
    fn test_stale_audio_after_stop_recording_does_not_resume_playback() {
        let mut machine = ready_machine();
        machine.on_server_event(audio(&[1, 2]));
        machine.begin_recording();
        machine.end_recording();

        machine.on_server_event(audio(&[3, 4]));
        assert!(!machine.is_audio_playing());
        assert_eq!(machine.state(), TurnState::Idle);
    }

    #[test]
    fn test_text_sent_during_reply_interrupts_it_first() {
        let mut machine = ready_machine();
        machine.on_server_event(text("Let me tell"));
        machine.take_commands();

        assert!(machine.send_text("Actually, wait"));
        let commands = machine.take_commands();
        assert_eq!(
            sent(&commands),
            vec![ClientEvent::Interrupt, ClientEvent::text("Actually, wait")]
        );
        assert_eq!(machine.state(), TurnState::Idle);

        machine.on_server_event(text("you a story"));
        machine.on_server_event(interrupted());
        machine.on_server_event(text("Sure"));
        assert_eq!(texts(&machine)[1..], ["Let me tell", "Actually, wait", "Sure"]);
    }

    #[test]
    fn test_agent_interruption_resets_accumulation() {
        let mut machine = ready_machine();
        machine.on_server_event(audio(&[7]));
        machine.on_server_event(text("I was saying"));
        machine.take_commands();

        machine.on_server_event(interrupted());
        let commands = machine.take_commands();
        assert!(commands.contains(&Command::StopPlayback));
        assert!(commands.contains(&Command::Emit(SessionEvent::Interrupted)));
        assert!(sent(&commands).is_empty(), "agent-side interruption is not echoed");
        assert_eq!(machine.state(), TurnState::Idle);
        assert!(!machine.is_audio_playing());

        machine.on_server_event(text("New thought"));
        assert_eq!(machine.transcript().last(), Some(&Message::assistant("New thought")));
    }

    #[test]
    fn test_error_appends_fallback_and_returns_to_idle() {
        let mut machine = ready_machine();
        machine.on_server_event(text("Half a"));
        machine.on_server_event(ServerEvent::Error(ErrorEvent::new("model overloaded")));

        assert_eq!(machine.state(), TurnState::Idle);
        assert_eq!(
            machine.transcript().last(),
            Some(&Message::assistant(&SessionConfig::default().error_fallback))
        );
        let commands = machine.take_commands();
        assert!(commands.contains(&Command::Emit(SessionEvent::Error(
            "model overloaded".to_string()
        ))));

        // The session is still usable.
        machine.on_server_event(text("Recovered"));
        assert_eq!(machine.transcript().last(), Some(&Message::assistant("Recovered")));
    }

    #[test]
    fn test_first_chunk_is_kept_as_received() {
        let mut machine = ready_machine();
        machine.on_server_event(text(" Hello"));
        machine.on_server_event(text("   "));
        machine.on_server_event(text("there "));

        assert_eq!(machine.transcript().last(), Some(&Message::assistant(" Hello there")));
    }

    #[test]
    fn test_error_keeps_interrupted_reply_muted() {
        let mut machine = ready_machine();
        machine.on_server_event(text("Once upon"));
        machine.interrupt();
        machine.on_server_event(ServerEvent::Error(ErrorEvent::new("boom")));

        // Still queued from the reply the user cut off.
        machine.on_server_event(text("a time"));
        machine.on_server_event(audio(&[9, 9]));
        assert!(texts(&machine).iter().all(|t| !t.contains("a time")));
        assert!(!machine.is_audio_playing());
        assert_eq!(
            machine.transcript().last(),
            Some(&Message::assistant(&SessionConfig::default().error_fallback))
        );

        machine.on_server_event(interrupted());
        machine.on_server_event(text("Fresh"));
        assert_eq!(machine.transcript().last(), Some(&Message::assistant("Fresh")));
    }

    #[test]
    fn test_error_while_recording_closes_microphone() {
        let mut machine = ready_machine();
        machine.begin_recording();
        machine.take_commands();

        machine.on_server_event(ServerEvent::Error(ErrorEvent::new("stream reset")));

        let commands = machine.take_commands();
        assert!(commands.contains(&Command::StopCapture));
        assert!(commands.contains(&Command::Emit(SessionEvent::MessageRemoved { index: 1 })));
        assert!(!machine.is_recording());
        assert_eq!(machine.state(), TurnState::Idle);
        assert_eq!(texts(&machine)[1..], [SessionConfig::default().error_fallback]);
    }

    #[test]
    fn test_mode_change_queued_while_recording_applies_on_stop() {
        let mut machine = ready_machine();
        machine.begin_recording();
        machine.take_commands();

        machine.set_input_mode(InputMode::Text);
        assert_eq!(machine.input_mode(), InputMode::Audio);
        assert!(sent(&machine.take_commands()).is_empty());

        machine.end_recording();
        assert_eq!(machine.input_mode(), InputMode::Text);
        assert_eq!(
            sent(&machine.take_commands()),
            vec![ClientEvent::mode_change(InputMode::Text)]
        );
    }

    #[test]
    fn test_turn_complete_without_open_turn_is_ignored() {
        let mut machine = ready_machine();
        machine.on_server_event(ServerEvent::TurnComplete);

        assert_eq!(machine.state(), TurnState::Idle);
        assert_eq!(machine.transcript().len(), 1);
        assert!(machine.take_commands().is_empty());
    }

    #[test]
    fn test_recording_placeholder_comes_and_goes() {
        let mut machine = ready_machine();
        machine.begin_recording();
        assert_eq!(machine.transcript().last(), Some(&Message::user("Listening...")));
        assert!(machine.is_recording());

        machine.end_recording();
        assert_eq!(machine.transcript().len(), 1);
        assert!(!machine.is_recording());
        let commands = machine.take_commands();
        assert!(commands.contains(&Command::StopCapture));
        assert!(commands.contains(&Command::Emit(SessionEvent::MessageRemoved { index: 1 })));
    }

    #[test]
    fn test_captured_audio_only_sent_while_recording() {
        let mut machine = ready_machine();
        machine.on_captured(vec![1, 2, 3]);
        assert!(machine.take_commands().is_empty());

        machine.begin_recording();
        machine.take_commands();
        machine.on_captured(vec![1, 2, 3]);
        assert_eq!(sent(&machine.take_commands()), vec![ClientEvent::audio(&[1, 2, 3])]);

        machine.end_recording();
        machine.take_commands();
        machine.on_captured(vec![4, 5]);
        assert!(machine.take_commands().is_empty());
    }

    #[test]
    fn test_reply_while_recording_closes_user_turn() {
        let mut machine = ready_machine();
        machine.begin_recording();
        machine.take_commands();

        machine.on_server_event(text("I'm here"));
        let commands = machine.take_commands();
        assert!(commands.contains(&Command::StopCapture));
        assert!(!machine.is_recording());
        assert_eq!(machine.state(), TurnState::AssistantTurn);
        assert_eq!(texts(&machine)[1..], ["I'm here"]);
    }

    #[test]
    fn test_mode_change_waits_for_idle() {
        let mut machine = ready_machine();
        machine.on_server_event(text("Streaming"));
        machine.take_commands();

        machine.set_input_mode(InputMode::Text);
        assert_eq!(machine.input_mode(), InputMode::Audio);
        assert!(sent(&machine.take_commands()).is_empty());

        machine.on_server_event(ServerEvent::TurnComplete);
        assert_eq!(machine.input_mode(), InputMode::Text);
        assert_eq!(
            sent(&machine.take_commands()),
            vec![ClientEvent::mode_change(InputMode::Text)]
        );
    }

    #[test]
    fn test_mode_change_applies_immediately_when_idle() {
        let mut machine = ready_machine();
        machine.set_input_mode(InputMode::Text);
        assert_eq!(machine.input_mode(), InputMode::Text);
        let commands = machine.take_commands();
        assert!(commands.contains(&Command::Emit(SessionEvent::InputModeChanged(InputMode::Text))));

        machine.set_input_mode(InputMode::Text);
        assert!(machine.take_commands().is_empty());
    }

    #[test]
    fn test_preferred_mode_is_announced_on_ready() {
        let mut machine =
            TurnMachine::new(SessionConfig::default()).with_input_mode(InputMode::Text);
        machine.on_server_event(ServerEvent::Ready);
        assert_eq!(
            sent(&machine.take_commands()),
            vec![ClientEvent::mode_change(InputMode::Text)]
        );
    }

    #[test]
    fn test_close_stops_everything() {
        let mut machine = ready_machine();
        machine.begin_recording();
        machine.take_commands();

        machine.on_server_event(ServerEvent::Close { reason: Some("bye".into()) });
        let commands = machine.take_commands();
        assert!(commands.contains(&Command::StopCapture));
        assert!(commands.contains(&Command::StopPlayback));
        assert_eq!(
            commands.last(),
            Some(&Command::Emit(SessionEvent::Closed(Some("bye".into()))))
        );
        assert_eq!(machine.state(), TurnState::Idle);
    }

    #[test]
    fn test_resumption_handle_is_kept() {
        let mut machine = ready_machine();
        machine.on_server_event(ServerEvent::SessionId(SessionIdEvent::new("handle-1")));
        assert_eq!(machine.resumption_handle(), Some("handle-1"));

        machine.reset();
        assert_eq!(machine.resumption_handle(), None);
        assert!(machine.transcript().is_empty());
    }
}
