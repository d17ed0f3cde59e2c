// Relaymux Relay Session — one supervised outbound websocket connection to
// a single upstream relay. State machine: Disconnected -> Connecting ->
// Connected -> (Closing | Error) -> Disconnected. Restart policy lives in
// crate::manager; a session only knows how to make one connection attempt
// and report how it went.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::atoms::error::{RelayError, RelayResult};
use crate::pool::MessagePool;
use crate::tls::build_connector;
use crate::wire::Frame;

/// Command/notice lists are prepended and truncated, never allowed to
/// grow unbounded (original source: `relay.py::_append_error_message`).
const LIST_CAP: usize = 20;
/// Above this many accumulated errors the relay is considered unhealthy
/// enough that the manager's restart sweep takes over (`relay.py::
/// Relay.error_threshold`).
pub const ERROR_THRESHOLD: u32 = 100;
const OUTBOUND_QUEUE_CAPACITY: usize = 1024;
/// No frame (including a keepalive pong) for this long and we proactively
/// ping the relay; no response at all means the read loop returns `Err`
/// on the next timeout and the manager schedules a reconnect.
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Error,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RelayStatus {
    pub num_sent_events: u64,
    pub num_received_events: u64,
    pub error_counter: u32,
    pub error_list: VecDeque<String>,
    pub notice_list: VecDeque<String>,
    #[serde(skip)]
    pub last_error_at: Option<Instant>,
    #[serde(skip)]
    last_ping: Option<Instant>,
    #[serde(skip)]
    last_pong: Option<Instant>,
}

impl RelayStatus {
    fn push_error(&mut self, message: impl Into<String>) {
        self.error_list.push_front(message.into());
        self.error_list.truncate(LIST_CAP);
        self.error_counter += 1;
        self.last_error_at = Some(Instant::now());
    }

    fn push_notice(&mut self, message: impl Into<String>) {
        self.notice_list.push_front(message.into());
        self.notice_list.truncate(LIST_CAP);
    }

    /// Round-trip time in milliseconds, clamped to 0 when no ping/pong
    /// pair is on record yet or the pair is out of order.
    pub fn ping_ms(&self) -> i64 {
        match (self.last_ping, self.last_pong) {
            (Some(ping), Some(pong)) if pong >= ping => (pong - ping).as_millis() as i64,
            _ => 0,
        }
    }
}

/// A single outbound relay connection. Held behind an `Arc` since both the
/// manager and a Router's inbound pump publish frames to it concurrently.
pub struct RelaySession {
    pub url: String,
    state: Mutex<SessionState>,
    status: Mutex<RelayStatus>,
    outbound_tx: Mutex<Option<mpsc::Sender<String>>>,
    verify_tls: bool,
    closing: AtomicBool,
}

impl RelaySession {
    pub fn new(url: impl Into<String>, verify_tls: bool) -> Arc<Self> {
        Arc::new(RelaySession {
            url: url.into(),
            state: Mutex::new(SessionState::Disconnected),
            status: Mutex::new(RelayStatus::default()),
            outbound_tx: Mutex::new(None),
            verify_tls,
            closing: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn status(&self) -> RelayStatus {
        self.status.lock().clone()
    }

    pub fn error_counter(&self) -> u32 {
        self.status.lock().error_counter
    }

    pub fn last_error_at(&self) -> Option<Instant> {
        self.status.lock().last_error_at
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Enqueue a wire frame for transmission. Non-blocking: a full queue
    /// is treated as a transport error (`Full` -> increment error_counter,
    /// log and drop) rather than stalling the caller, since a stuck relay
    /// must never backpressure the whole multiplexer.
    pub fn publish(&self, frame: String) {
        let tx = self.outbound_tx.lock().clone();
        match tx {
            Some(tx) => match tx.try_send(frame) {
                Ok(()) => {
                    self.status.lock().num_sent_events += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("[session {}] outbound queue full, dropping frame", self.url);
                    self.status.lock().push_error("outbound queue full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("[session {}] outbound channel closed, dropping frame", self.url);
                }
            },
            None => debug!("[session {}] not connected, dropping frame", self.url),
        }
    }

    /// Request the session stop reconnecting; the current connection (if
    /// any) is closed by signaling its send loop to shut down.
    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        *self.outbound_tx.lock() = None;
    }

    pub fn should_reconnect(&self) -> bool {
        !self.closing.load(Ordering::SeqCst)
    }

    /// Make one connection attempt and serve it until the relay closes the
    /// socket, an unrecoverable transport error occurs, or `close()` is
    /// called. Returns once the connection has fully torn down; the
    /// caller (crate::manager) decides whether and when to retry.
    pub async fn connect_and_serve(self: Arc<Self>, pool: Arc<MessagePool>) -> RelayResult<()> {
        *self.state.lock() = SessionState::Connecting;

        let connector = build_connector(self.verify_tls);
        let (ws_stream, _response) = tokio_tungstenite::connect_async_tls_with_config(
            &self.url,
            None,
            false,
            Some(connector),
        )
        .await
        .map_err(|e| RelayError::transport(&self.url, e.to_string()))?;

        info!("[session {}] connected", self.url);
        *self.state.lock() = SessionState::Connected;

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
        *self.outbound_tx.lock() = Some(tx);

        let result = loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(frame) => {
                            if let Err(e) = write.send(WsMessage::Text(frame)).await {
                                break Err(RelayError::transport(&self.url, e.to_string()));
                            }
                        }
                        None => {
                            // sender dropped via close(); shut the socket down.
                            let _ = write.send(WsMessage::Close(None)).await;
                            break Ok(());
                        }
                    }
                }
                incoming = tokio::time::timeout(READ_IDLE_TIMEOUT, read.next()) => {
                    match incoming {
                        Ok(Some(Ok(WsMessage::Text(text)))) => {
                            self.status.lock().num_received_events += 1;
                            // NOTICE frames go to the pool like anything else, but are
                            // also kept locally so admin status reflects this relay's
                            // own chatter (spec: Session.notice_list).
                            if let Ok(Frame::Notice { text: content }) = Frame::decode(&text) {
                                self.status.lock().push_notice(content);
                            }
                            pool.submit(&text, &self.url, true);
                        }
                        Ok(Some(Ok(WsMessage::Ping(payload)))) => {
                            let _ = write.send(WsMessage::Pong(payload)).await;
                        }
                        Ok(Some(Ok(WsMessage::Pong(_)))) => {
                            self.status.lock().last_pong = Some(Instant::now());
                        }
                        Ok(Some(Ok(WsMessage::Close(frame)))) => {
                            debug!("[session {}] relay closed: {frame:?}", self.url);
                            break Ok(());
                        }
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => break Err(RelayError::transport(&self.url, e.to_string())),
                        Ok(None) => break Ok(()),
                        Err(_elapsed) => {
                            self.status.lock().last_ping = Some(Instant::now());
                            if let Err(e) = write.send(WsMessage::Ping(Vec::new())).await {
                                break Err(RelayError::transport(&self.url, e.to_string()));
                            }
                        }
                    }
                }
            }

            if self.closing.load(Ordering::SeqCst) {
                let _ = write.send(WsMessage::Close(None)).await;
                break Ok(());
            }
        };

        *self.outbound_tx.lock() = None;
        match &result {
            Ok(()) => *self.state.lock() = SessionState::Disconnected,
            Err(e) => {
                self.status.lock().push_error(e.to_string());
                *self.state.lock() = SessionState::Error;
            }
        }
        result
    }
}
