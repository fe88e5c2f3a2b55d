//! The session event loop and the handle the UI talks to it through.

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::audio::{AudioCapture, AudioPlayback};
use crate::error::SessionError;
use crate::events::{SessionEvent, SessionSnapshot};
use crate::session::{Companion, Input};
use crate::transport::Transport;
use companion_types::InputMode;

const REQUEST_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug)]
pub enum Request {
    Initialize {
        user_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StartRecording {
        reply: oneshot::Sender<bool>,
    },
    StopRecording,
    SendText {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    Interrupt,
    SetInputMode(InputMode),
    RequestSummary,
    End {
        reply: oneshot::Sender<()>,
    },
}

/// Cheap, cloneable access to a running [`SessionDriver`].
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub async fn initialize(&self, user_id: &str) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Initialize {
            user_id: user_id.to_string(),
            reply,
        })
        .await;
        rx.await.unwrap_or(Err(SessionError::Cancelled))
    }

    pub async fn start_recording(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        self.request(Request::StartRecording { reply }).await;
        rx.await.unwrap_or(false)
    }

    pub async fn stop_recording(&self) {
        self.request(Request::StopRecording).await;
    }

    pub async fn send_text_message(&self, text: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        self.request(Request::SendText {
            text: text.to_string(),
            reply,
        })
        .await;
        rx.await.unwrap_or(false)
    }

    pub async fn interrupt(&self) {
        self.request(Request::Interrupt).await;
    }

    pub async fn set_input_mode(&self, mode: InputMode) {
        self.request(Request::SetInputMode(mode)).await;
    }

    pub async fn request_summary(&self) {
        self.request(Request::RequestSummary).await;
    }

    /// Ends the session, cancelling a start that is still connecting.
    pub async fn end(&self) {
        let (reply, rx) = oneshot::channel();
        self.request(Request::End { reply }).await;
        let _ = rx.await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    async fn request(&self, request: Request) {
        if self.requests.send(request).await.is_err() {
            tracing::warn!("Session loop is gone; request dropped");
        }
    }
}

/// Owns a [`Companion`] and serializes every request, agent frame, captured
/// audio frame and clock tick through one loop.
pub struct SessionDriver<T, C, P> {
    companion: Companion<T, C, P>,
    requests: mpsc::Receiver<Request>,
}

enum Wake {
    Request(Option<Request>),
    Input(Input),
}

enum Connecting {
    Finished(Result<(), SessionError>),
    Cancelled(Option<oneshot::Sender<()>>),
}

impl<T, C, P> SessionDriver<T, C, P>
where
    T: Transport,
    C: AudioCapture,
    P: AudioPlayback,
{
    pub fn new(companion: Companion<T, C, P>) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let handle = SessionHandle {
            requests: tx,
            snapshot: companion.watch(),
            events: companion.event_sender(),
        };
        let driver = Self {
            companion,
            requests: rx,
        };
        (driver, handle)
    }

    /// Runs until every [`SessionHandle`] is dropped, then ends the session.
    pub async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                request = self.requests.recv() => Wake::Request(request),
                input = self.companion.next_input() => Wake::Input(input),
            };
            match wake {
                Wake::Request(Some(request)) => self.handle_request(request).await,
                Wake::Request(None) => {
                    tracing::debug!("All session handles dropped");
                    break;
                }
                Wake::Input(input) => self.companion.handle_input(input),
            }
        }
        self.companion.end();
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Initialize { user_id, reply } => {
                let result = self.initialize(&user_id).await;
                let _ = reply.send(result);
            }
            Request::StartRecording { reply } => {
                let _ = reply.send(self.companion.start_recording());
            }
            Request::StopRecording => self.companion.stop_recording(),
            Request::SendText { text, reply } => {
                let _ = reply.send(self.companion.send_text_message(&text));
            }
            Request::Interrupt => self.companion.interrupt(),
            Request::SetInputMode(mode) => self.companion.set_input_mode(mode),
            Request::RequestSummary => self.companion.request_summary(),
            Request::End { reply } => {
                self.companion.end();
                let _ = reply.send(());
            }
        }
    }

    /// Runs `initialize` while still answering requests, so that an `End`
    /// arriving mid-connect drops the connect attempt.
    async fn initialize(&mut self, user_id: &str) -> Result<(), SessionError> {
        let outcome = {
            let connect = self.companion.initialize(user_id);
            tokio::pin!(connect);
            loop {
                let request = tokio::select! {
                    result = &mut connect => break Connecting::Finished(result),
                    request = self.requests.recv() => request,
                };
                match request {
                    Some(Request::End { reply }) => break Connecting::Cancelled(Some(reply)),
                    Some(request) => reject_while_connecting(request),
                    None => break Connecting::Cancelled(None),
                }
            }
        };
        match outcome {
            Connecting::Finished(result) => result,
            Connecting::Cancelled(reply) => {
                tracing::info!("Session start cancelled");
                self.companion.end();
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                Err(SessionError::Cancelled)
            }
        }
    }
}

fn reject_while_connecting(request: Request) {
    tracing::debug!("Session still connecting; rejecting {:?}", request);
    match request {
        Request::Initialize { reply, .. } => {
            let _ = reply.send(Err(SessionError::SessionActive));
        }
        Request::StartRecording { reply } => {
            let _ = reply.send(false);
        }
        Request::SendText { reply, .. } => {
            let _ = reply.send(false);
        }
        Request::StopRecording
        | Request::Interrupt
        | Request::SetInputMode(_)
        | Request::RequestSummary
        | Request::End { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::message::Message;
    use crate::test_support::{ConnectBehavior, FakeCapture, FakePlayback, FakeTransport};
    use companion_types::ServerEvent;
    use companion_types::events::server::TextDeltaEvent;

    fn driver(
        transport: FakeTransport,
    ) -> (
        SessionDriver<FakeTransport, FakeCapture, FakePlayback>,
        SessionHandle,
    ) {
        SessionDriver::new(Companion::new(
            transport,
            FakeCapture::new(),
            FakePlayback::new(),
            SessionConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_end_cancels_pending_connect() {
        // --- Arrange ---
        let transport = FakeTransport::with_behavior(ConnectBehavior::Hang);
        let log = transport.log();
        let (driver, handle) = driver(transport);
        let starter = handle.clone();
        let ender = handle.clone();
        let snapshots = handle.watch();
        drop(handle);

        // --- Act ---
        let ((), started, ()) = tokio::join!(
            driver.run(),
            async move { starter.initialize("user-1").await },
            async move {
                ender.start_recording().await;
                ender.end().await;
            },
        );

        // --- Assert ---
        assert_eq!(started, Err(SessionError::Cancelled));
        let log = log.lock().unwrap();
        assert_eq!(log.connects, 1);
        assert!(log.closes >= 1);
        assert!(log.sent.is_empty(), "nothing is sent on a cancelled connect");
        assert_eq!(*snapshots.borrow(), SessionSnapshot::default());
    }

    #[tokio::test]
    async fn test_handle_drives_a_conversation() {
        // --- Arrange ---
        let transport = FakeTransport::new();
        let agent = transport.agent();
        let log = transport.log();
        let (driver, handle) = driver(transport);
        let mut snapshots = handle.watch();

        // --- Act ---
        let ((), sent) = tokio::join!(driver.run(), async move {
            handle.initialize("user-1").await.unwrap();
            agent.send(ServerEvent::Ready).await.unwrap();
            snapshots.wait_for(|s| s.ready).await.unwrap();
            agent
                .send(ServerEvent::TextDelta(TextDeltaEvent::new("Welcome")))
                .await
                .unwrap();
            agent.send(ServerEvent::TurnComplete).await.unwrap();
            snapshots
                .wait_for(|s| s.transcript.last() == Some(&Message::assistant("Welcome")))
                .await
                .unwrap();
            let sent = handle.send_text_message("I feel anxious").await;
            handle.end().await;
            sent
        });

        // --- Assert ---
        assert!(sent);
        let log = log.lock().unwrap();
        assert_eq!(log.sent.first(), Some(&companion_types::ClientEvent::identify("user-1")));
        assert_eq!(
            log.sent.last(),
            Some(&companion_types::ClientEvent::text("I feel anxious"))
        );
    }
}
