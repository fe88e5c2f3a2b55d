use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use companion_core::SessionError;
use companion_core::transport::{ServerRx, Transport};
use companion_types::{ClientEvent, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::client::stats::Stats;

pub(crate) mod config;
mod consts;
pub(crate) mod stats;
mod utils;

pub type ClientTx = mpsc::Sender<ClientEvent>;

/// WebSocket connection to the companion agent.
///
/// Outbound frames go through a bounded queue drained by a writer task;
/// inbound frames are parsed by a reader task and delivered, in order, on a
/// single receiver that ends with a synthetic `ServerEvent::Close`.
pub struct Client {
    config: config::Config,
    c_tx: Option<ClientTx>,
    s_rx: Option<ServerRx>,
    recv_handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    pub fn new(config: config::Config) -> Self {
        Self {
            config,
            c_tx: None,
            s_rx: None,
            recv_handle: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        if self.c_tx.is_some() {
            return Err(anyhow::anyhow!("already connected"));
        }

        let request = utils::build_request(&self.config)?;
        tracing::info!("connecting to {}", self.config.url());

        let (ws_stream, _) = tokio::time::timeout(
            self.config.connect_timeout(),
            tokio_tungstenite::connect_async(request),
        )
        .await
        .with_context(|| format!("timed out connecting to {}", self.config.url()))?
        .with_context(|| format!("failed to connect to {}", self.config.url()))?;

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = mpsc::channel::<ClientEvent>(self.config.capacity());
        let (s_tx, s_rx) = mpsc::channel::<ServerEvent>(self.config.capacity());
        self.c_tx = Some(c_tx);
        self.s_rx = Some(s_rx);

        // Writer: runs until every sender is gone, then closes the socket.
        let stats = self.stats.clone();
        tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to serialize {} frame: {}", event.kind(), e);
                        continue;
                    }
                };
                match write.send(Message::Text(text)).await {
                    Ok(()) => {
                        tracing::trace!("sent {} frame", event.kind());
                        if let Ok(mut stats) = stats.lock() {
                            stats.record_sent();
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to send {} frame: {}", event.kind(), e);
                        if let Ok(mut stats) = stats.lock() {
                            stats.record_dropped();
                        }
                        break;
                    }
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close websocket: {}", e);
            }
        });

        // Reader: every parsed frame is delivered; the stream always ends with Close.
        let stats = self.stats.clone();
        let recv_handle = tokio::spawn(async move {
            let mut reason = None;
            while let Some(message) = read.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        reason = Some(e.to_string());
                        break;
                    }
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            tracing::debug!("received message: {}", event.kind());
                            if let Ok(mut stats) = stats.lock() {
                                stats.record_received();
                            }
                            if s_tx.send(event).await.is_err() {
                                tracing::debug!("server event receiver dropped");
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("skipping undecodable frame: {}, text=> {:?}", e, text);
                            if let Ok(mut stats) = stats.lock() {
                                stats.record_dropped();
                            }
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        reason = frame
                            .map(|frame| frame.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        break;
                    }
                    _ => {}
                }
            }
            if s_tx.send(ServerEvent::Close { reason }).await.is_err() {
                tracing::debug!("server event receiver dropped before close");
            }
        });
        self.recv_handle = Some(recv_handle);

        Ok(())
    }

    /// Takes the receiver for server events. There is one per connection.
    pub fn server_events(&mut self) -> Result<ServerRx> {
        if self.c_tx.is_none() {
            return Err(anyhow::anyhow!("not connected yet"));
        }
        self.s_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("server events already taken"))
    }

    pub fn stats(&self) -> Result<Stats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            Err(anyhow::anyhow!("failed to get stats"))
        }
    }

    /// Queues a frame without waiting; fails if the queue is full or closed.
    pub fn send_client_event(&mut self, event: ClientEvent) -> Result<()> {
        let tx = self
            .c_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("not connected yet"))?;
        tx.try_send(event).map_err(|e| {
            if let Ok(mut stats) = self.stats.lock() {
                stats.record_dropped();
            }
            match e {
                TrySendError::Full(event) => {
                    anyhow::anyhow!("send queue full, {} frame dropped", event.kind())
                }
                TrySendError::Closed(event) => {
                    anyhow::anyhow!("connection closed, {} frame dropped", event.kind())
                }
            }
        })
    }

    pub fn is_connected(&self) -> bool {
        self.c_tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Closes the socket and stops delivering frames. A later `connect` opens
    /// a fresh connection.
    pub fn close(&mut self) {
        if self.c_tx.take().is_some() {
            tracing::info!("closing connection to {}", self.config.url());
        }
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
        self.s_rx = None;
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl Transport for Client {
    async fn connect(&mut self) -> Result<(), SessionError> {
        Client::connect(self)
            .await
            .map_err(|e| SessionError::Connection(format!("{:#}", e)))
    }

    fn server_events(&mut self) -> Result<ServerRx, SessionError> {
        Client::server_events(self).map_err(|e| SessionError::Connection(e.to_string()))
    }

    fn send(&mut self, event: ClientEvent) {
        if let Err(e) = self.send_client_event(event) {
            tracing::warn!("{}", e);
        }
    }

    fn close(&mut self) {
        Client::close(self)
    }
}
