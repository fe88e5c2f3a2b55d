use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::audio::{AudioCapture, AudioPlayback};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{SessionEvent, SessionSnapshot};
use crate::message::Transcript;
use crate::transport::{ServerRx, Transport};
use crate::turn::{Command, TurnMachine};
use companion_types::{ClientEvent, InputMode, ServerEvent};

const CAPTURED_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;
const ELAPSED_TICK: Duration = Duration::from_secs(1);

/// Something the session has to react to.
#[derive(Debug)]
pub enum Input {
    /// A frame from the agent; `None` once the inbound stream has ended.
    Server(Option<ServerEvent>),
    /// A frame from the microphone.
    Captured(Vec<i16>),
    /// One second of session time passed.
    Tick,
}

/// The conversational session: owns the transport, the audio devices and the
/// turn state machine, and is the only place any of them is touched.
///
/// All methods are meant to be called from a single task; see
/// [`SessionDriver`](crate::runtime::SessionDriver) for the loop that does so.
pub struct Companion<T, C, P> {
    transport: T,
    capture: C,
    playback: P,
    machine: TurnMachine,
    inbound: Option<ServerRx>,
    captured_tx: mpsc::Sender<Vec<i16>>,
    captured_rx: mpsc::Receiver<Vec<i16>>,
    ticker: Option<Interval>,
    user_id: Option<String>,
    ready: bool,
    seconds: u64,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl<T, C, P> Companion<T, C, P>
where
    T: Transport,
    C: AudioCapture,
    P: AudioPlayback,
{
    pub fn new(transport: T, capture: C, playback: P, config: SessionConfig) -> Self {
        let (captured_tx, captured_rx) = mpsc::channel(CAPTURED_CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self {
            transport,
            capture,
            playback,
            machine: TurnMachine::new(config),
            inbound: None,
            captured_tx,
            captured_rx,
            ticker: None,
            user_id: None,
            ready: false,
            seconds: 0,
            events,
            snapshot,
        }
    }

    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.machine = self.machine.with_input_mode(mode);
        self.publish();
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn transcript(&self) -> &Transcript {
        self.machine.transcript()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_recording(&self) -> bool {
        self.machine.is_recording()
    }

    pub fn is_audio_playing(&self) -> bool {
        self.machine.is_audio_playing()
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn input_mode(&self) -> InputMode {
        self.machine.input_mode()
    }

    /// A session holds its resources from `initialize` until `end`, ready or not.
    pub fn is_live(&self) -> bool {
        self.user_id.is_some()
    }

    /// Connects to the agent and identifies the user.
    ///
    /// The session becomes ready once the agent answers with `ready`. If the
    /// connection cannot be established a fallback message is appended and
    /// the session stays unusable until [`end`](Self::end).
    pub async fn initialize(&mut self, user_id: &str) -> Result<(), SessionError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            tracing::warn!("Refusing to start a session without a user id");
            return Err(SessionError::NotAuthenticated);
        }
        if self.is_live() {
            return Err(SessionError::SessionActive);
        }
        self.user_id = Some(user_id.to_string());
        tracing::info!("Starting session for user {}", user_id);

        let connected = match self.transport.connect().await {
            Ok(()) => self.transport.server_events(),
            Err(e) => Err(e),
        };
        match connected {
            Ok(inbound) => {
                self.inbound = Some(inbound);
                self.transport.send(ClientEvent::identify(user_id));
                self.publish();
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to connect to the agent: {}", e);
                self.machine.on_connection_failed(&e);
                self.apply();
                Err(e)
            }
        }
    }

    /// Opens the microphone. Returns false if the session is not ready or no
    /// input device could be acquired.
    pub fn start_recording(&mut self) -> bool {
        if !self.ready {
            tracing::debug!("start_recording ignored: session not ready");
            return false;
        }
        if self.machine.is_recording() {
            return true;
        }
        if let Err(e) = self.capture.start(self.captured_tx.clone()) {
            tracing::warn!("Could not start recording: {}", e);
            return false;
        }
        self.machine.begin_recording();
        self.apply();
        true
    }

    pub fn stop_recording(&mut self) {
        if !self.ready {
            tracing::debug!("stop_recording ignored: session not ready");
            return;
        }
        self.machine.end_recording();
        self.apply();
    }

    /// Appends a user message and sends it. Returns false if nothing was sent.
    pub fn send_text_message(&mut self, text: &str) -> bool {
        if !self.ready {
            tracing::debug!("send_text_message ignored: session not ready");
            return false;
        }
        let sent = self.machine.send_text(text);
        self.apply();
        sent
    }

    pub fn interrupt(&mut self) {
        if !self.ready {
            return;
        }
        self.machine.interrupt();
        self.apply();
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        if !self.ready {
            tracing::debug!("set_input_mode ignored: session not ready");
            return;
        }
        self.machine.set_input_mode(mode);
        self.apply();
    }

    /// Asks the agent to summarize and store the conversation so far.
    pub fn request_summary(&mut self) {
        if !self.ready {
            tracing::debug!("request_summary ignored: session not ready");
            return;
        }
        tracing::info!("Requesting a session summary");
        self.transport.send(ClientEvent::End);
    }

    /// Releases every resource and clears the session state.
    ///
    /// Idempotent, and safe before `initialize` or after it failed.
    pub fn end(&mut self) {
        let live = self.is_live() || self.ready;
        self.capture.stop();
        self.playback.stop();
        self.transport.close();
        self.inbound = None;
        self.ticker = None;
        while self.captured_rx.try_recv().is_ok() {}
        self.user_id = None;
        self.ready = false;
        self.seconds = 0;
        self.machine.reset();
        if live {
            tracing::info!("Session ended");
            self.emit(SessionEvent::Ended);
        }
        self.publish();
    }

    /// Waits for the next thing the session has to handle.
    ///
    /// Cancel safe: nothing is lost if the returned future is dropped.
    pub async fn next_input(&mut self) -> Input {
        tokio::select! {
            event = recv_inbound(&mut self.inbound) => Input::Server(event),
            Some(pcm16) = self.captured_rx.recv() => Input::Captured(pcm16),
            _ = tick(&mut self.ticker) => Input::Tick,
        }
    }

    pub fn handle_input(&mut self, input: Input) {
        match input {
            Input::Server(Some(event)) => self.handle_server_event(event),
            Input::Server(None) => {
                tracing::warn!("Inbound stream ended without a close frame");
                self.handle_server_event(ServerEvent::Close { reason: None });
            }
            Input::Captured(pcm16) => {
                self.machine.on_captured(pcm16);
                self.apply();
            }
            Input::Tick => self.tick(),
        }
    }

    pub fn handle_server_event(&mut self, event: ServerEvent) {
        tracing::debug!("Received {} frame", event.kind());
        match &event {
            ServerEvent::Ready => {
                if self.ready {
                    let violation = SessionError::ProtocolViolation("duplicate ready".into());
                    tracing::warn!("{}", violation);
                    return;
                }
                tracing::info!("Session ready");
                self.ready = true;
                self.seconds = 0;
                let mut ticker =
                    tokio::time::interval_at(Instant::now() + ELAPSED_TICK, ELAPSED_TICK);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(ticker);
            }
            ServerEvent::Close { .. } => {
                self.ready = false;
                self.inbound = None;
                self.ticker = None;
                self.transport.close();
            }
            _ => {}
        }
        self.machine.on_server_event(event);
        self.apply();
    }

    fn tick(&mut self) {
        if !self.ready {
            return;
        }
        self.seconds += 1;
        self.emit(SessionEvent::Elapsed(self.seconds));
        self.publish();
    }

    /// Carries out what the state machine decided, in order.
    fn apply(&mut self) {
        for command in self.machine.take_commands() {
            match command {
                Command::Send(event) => self.transport.send(event),
                Command::Play(pcm16) => self.playback.play(pcm16),
                Command::StopPlayback => self.playback.stop(),
                Command::StopCapture => self.capture.stop(),
                Command::Emit(event) => self.emit(event),
            }
        }
        self.publish();
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            transcript: self.machine.transcript().messages().to_vec(),
            ready: self.ready,
            recording: self.machine.is_recording(),
            audio_playing: self.machine.is_audio_playing(),
            seconds: self.seconds,
            turn: self.machine.state(),
            input_mode: self.machine.input_mode(),
            resumption_handle: self.machine.resumption_handle().map(str::to_string),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn recv_inbound(inbound: &mut Option<ServerRx>) -> Option<ServerEvent> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
