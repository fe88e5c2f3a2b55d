//! Recording fakes for the session collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{AudioCapture, AudioPlayback, CaptureSink};
use crate::error::SessionError;
use crate::transport::{ServerRx, Transport};
use companion_types::{ClientEvent, ServerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    Hang,
}

#[derive(Debug, Default)]
pub struct TransportLog {
    pub connects: usize,
    pub closes: usize,
    pub sent: Vec<ClientEvent>,
}

pub struct FakeTransport {
    behavior: ConnectBehavior,
    log: Arc<Mutex<TransportLog>>,
    server_tx: mpsc::Sender<ServerEvent>,
    server_rx: Option<ServerRx>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_behavior(ConnectBehavior::Succeed)
    }

    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        let (server_tx, server_rx) = mpsc::channel(64);
        Self {
            behavior,
            log: Arc::default(),
            server_tx,
            server_rx: Some(server_rx),
        }
    }

    pub fn log(&self) -> Arc<Mutex<TransportLog>> {
        self.log.clone()
    }

    /// Feeds frames as if the agent had sent them.
    pub fn agent(&self) -> mpsc::Sender<ServerEvent> {
        self.server_tx.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<(), SessionError> {
        self.log.lock().unwrap().connects += 1;
        match self.behavior {
            ConnectBehavior::Succeed => Ok(()),
            ConnectBehavior::Fail => Err(SessionError::Connection("connection refused".into())),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    fn server_events(&mut self) -> Result<ServerRx, SessionError> {
        self.server_rx
            .take()
            .ok_or_else(|| SessionError::Connection("receiver already taken".into()))
    }

    fn send(&mut self, event: ClientEvent) {
        self.log.lock().unwrap().sent.push(event);
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
    }
}

#[derive(Debug, Default)]
pub struct CaptureLog {
    pub starts: usize,
    pub stops: usize,
    pub sink: Option<CaptureSink>,
}

#[derive(Default)]
pub struct FakeCapture {
    log: Arc<Mutex<CaptureLog>>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<Mutex<CaptureLog>> {
        self.log.clone()
    }
}

impl AudioCapture for FakeCapture {
    fn start(&mut self, sink: CaptureSink) -> Result<(), SessionError> {
        let mut log = self.log.lock().unwrap();
        log.starts += 1;
        log.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.stops += 1;
        log.sink = None;
    }
}

#[derive(Debug, Default)]
pub struct PlaybackLog {
    pub played: Vec<Vec<i16>>,
    pub stops: usize,
}

#[derive(Default)]
pub struct FakePlayback {
    log: Arc<Mutex<PlaybackLog>>,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<Mutex<PlaybackLog>> {
        self.log.clone()
    }
}

impl AudioPlayback for FakePlayback {
    fn play(&mut self, pcm16: Vec<i16>) {
        self.log.lock().unwrap().played.push(pcm16);
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().stops += 1;
    }
}
