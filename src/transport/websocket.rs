//! WebSocket transport speaking the event bus bridge protocol.
//!
//! Each session spawns a tokio task that handles:
//!
//! - Connecting to the bridge
//! - Incoming frames (deliveries, replies, failures)
//! - Outgoing frames from the session API
//! - Periodic keep-alive pings
//! - Reply correlation by generated reply address
//!
//! # Connection URL
//!
//! `http(s)://host/path` becomes `ws(s)://host/path/websocket`, the raw
//! WebSocket endpoint of a SockJS bridge. `ws(s)` URLs are used as given.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::{InboundFrame, OutboundFrame, ReadyState};

use super::session::{
    CancelReply, Handler, ReplyHandler, SessionHooks, TransportFactory, TransportSession,
};

// ============================================================================
// Constants
// ============================================================================

/// Address of the bridge's basic auth manager.
pub const LOGIN_ADDRESS: &str = "vertx.basicauthmanager.login";

/// Default keep-alive period.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(5000);

/// Path suffix of the raw WebSocket endpoint.
const WEBSOCKET_SUFFIX: &str = "/websocket";

/// Transport option holding the ping period in milliseconds.
const PING_INTERVAL_OPTION: &str = "pingInterval";

// ============================================================================
// Types
// ============================================================================

/// Map of reply addresses to reply handlers.
type ReplyMap = FxHashMap<String, ReplyHandler>;

/// Map of addresses to their local handlers.
type HandlerMap = FxHashMap<String, Vec<Handler>>;

/// Client WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the client stream.
type WsWrite = SplitSink<WsStream, WsMessage>;

/// Internal commands for the event loop.
#[derive(Debug)]
enum SessionCommand {
    /// Write a frame.
    Frame(OutboundFrame),
    /// Close the socket and end the loop.
    Close,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Default [`TransportFactory`]: one WebSocket per session.
///
/// Recognized transport options:
///
/// | Key | Type | Default |
/// |-----|------|---------|
/// | `pingInterval` | milliseconds | `5000` |
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport factory.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TransportFactory for WebSocketTransport {
    fn connect(
        &self,
        url: &Url,
        options: &Value,
        hooks: SessionHooks,
    ) -> Result<Arc<dyn TransportSession>> {
        let ws_url = websocket_url(url)?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("WebSocket transport requires a Tokio runtime"))?;

        let session: Arc<dyn TransportSession> =
            WebSocketSession::spawn(&runtime, ws_url, ping_interval(options), hooks);
        Ok(session)
    }
}

/// Converts a bridge URL into its WebSocket endpoint.
///
/// # Errors
///
/// Returns [`Error::Config`] for schemes other than `http`, `https`, `ws`
/// and `wss`.
pub fn websocket_url(url: &Url) -> Result<Url> {
    let mut ws_url = url.clone();
    let converted = match url.scheme() {
        "ws" | "wss" => return Ok(ws_url),
        "http" => ws_url.set_scheme("ws"),
        "https" => ws_url.set_scheme("wss"),
        other => {
            return Err(Error::config(format!(
                "unsupported transport scheme '{other}'"
            )));
        }
    };
    converted
        .map_err(|()| Error::config(format!("cannot derive a WebSocket URL from '{url}'")))?;

    let path = format!("{}{WEBSOCKET_SUFFIX}", ws_url.path().trim_end_matches('/'));
    ws_url.set_path(&path);
    Ok(ws_url)
}

/// Reads the ping period from the transport options.
fn ping_interval(options: &Value) -> Duration {
    options
        .get(PING_INTERVAL_OPTION)
        .and_then(Value::as_u64)
        .filter(|ms| *ms > 0)
        .map_or(DEFAULT_PING_INTERVAL, Duration::from_millis)
}

// ============================================================================
// SessionShared
// ============================================================================

/// State shared between the session handle and its event loop.
struct SessionShared {
    state: Mutex<ReadyState>,
    replies: Mutex<ReplyMap>,
    handlers: Mutex<HandlerMap>,
    hooks: Mutex<Option<SessionHooks>>,
}

impl SessionShared {
    fn new(hooks: SessionHooks) -> Self {
        Self {
            state: Mutex::new(ReadyState::Connecting),
            replies: Mutex::new(ReplyMap::default()),
            handlers: Mutex::new(HandlerMap::default()),
            hooks: Mutex::new(Some(hooks)),
        }
    }

    fn set_state(&self, state: ReadyState) {
        *self.state.lock() = state;
    }

    fn fire_open(&self) {
        let hooks = self.hooks.lock().clone();
        if let Some(hooks) = hooks {
            hooks.open();
        }
    }

    fn fire_close(&self) {
        let hooks = self.hooks.lock().clone();
        if let Some(hooks) = hooks {
            hooks.close();
        }
    }

    /// Marks the session closed, fails pending replies, fires the close hook.
    fn finish(&self) {
        self.set_state(ReadyState::Closed);
        self.fail_pending_replies();
        self.fire_close();
    }

    /// Fails all pending replies with `ConnectionClosed`.
    fn fail_pending_replies(&self) {
        let pending: Vec<_> = self.replies.lock().drain().collect();
        let count = pending.len();

        for (_, reply) in pending {
            reply(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending replies on close");
        }
    }

    /// Handles an incoming text frame from the bridge.
    fn handle_incoming(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, text = %text, "Failed to parse incoming frame");
                return;
            }
        };

        match frame {
            InboundFrame::Message { .. } => {
                let Some(message) = frame.into_message() else {
                    return;
                };

                let reply = self.replies.lock().remove(&message.address);
                if let Some(reply) = reply {
                    reply(Ok(message));
                    return;
                }

                let handlers = self
                    .handlers
                    .lock()
                    .get(&message.address)
                    .cloned()
                    .unwrap_or_default();

                if handlers.is_empty() {
                    trace!(address = %message.address, "Message for address without handlers");
                }
                for handler in &handlers {
                    handler.call(&message);
                }
            }

            InboundFrame::Err { ref address, .. } => {
                let reply = address
                    .as_ref()
                    .and_then(|address| self.replies.lock().remove(address));

                match (reply, frame.into_error()) {
                    (Some(reply), Some(err)) => reply(Err(err)),
                    (_, err) => {
                        warn!(error = ?err, "Bridge reported a failure");
                    }
                }
            }

            InboundFrame::Pong => trace!("Pong received"),

            InboundFrame::Unknown => debug!(text = %text, "Ignoring unknown frame type"),
        }
    }
}

// ============================================================================
// WebSocketSession
// ============================================================================

/// One WebSocket connection to the bridge.
///
/// # Thread Safety
///
/// `WebSocketSession` is `Send + Sync`; every operation is non-blocking and
/// only queues a command for the event loop.
pub struct WebSocketSession {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    /// State shared with the event loop.
    shared: Arc<SessionShared>,
}

impl WebSocketSession {
    /// Creates a session and spawns its event loop.
    fn spawn(
        runtime: &Handle,
        url: Url,
        ping_interval: Duration,
        hooks: SessionHooks,
    ) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared::new(hooks));

        runtime.spawn(Self::run_event_loop(
            url,
            ping_interval,
            command_rx,
            Arc::clone(&shared),
        ));

        Arc::new(Self { command_tx, shared })
    }

    /// Queues a frame for the event loop.
    ///
    /// Returns `false` if the loop has ended.
    fn enqueue(&self, frame: OutboundFrame) -> bool {
        self.command_tx.send(SessionCommand::Frame(frame)).is_ok()
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        url: Url,
        ping_interval: Duration,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        shared: Arc<SessionShared>,
    ) {
        let ws_stream = match Self::open_stream(&url).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                warn!(error = %e, url = %url, "WebSocket connect failed");
                shared.finish();
                return;
            }
        };

        info!(url = %url, "WebSocket session open");
        shared.set_state(ReadyState::Open);
        shared.fire_open();

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let mut ping = interval(ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await;

        loop {
            tokio::select! {
                // Incoming frames from the bridge
                message = ws_read.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            shared.handle_incoming(&text);
                        }

                        Some(Ok(WsMessage::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the session API
                command = command_rx.recv() => {
                    match command {
                        Some(SessionCommand::Frame(frame)) => {
                            match Self::write_frame(&mut ws_write, &frame).await {
                                Ok(()) => {}
                                Err(e @ Error::Json(_)) => {
                                    warn!(error = %e, "Failed to serialize frame");
                                }
                                Err(e) => {
                                    warn!(error = %e, "Failed to write frame");
                                    break;
                                }
                            }
                        }

                        Some(SessionCommand::Close) => {
                            debug!("Close command received");
                            shared.set_state(ReadyState::Closing);
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }

                // Keep-alive
                _ = ping.tick() => {
                    if let Err(e) = Self::write_frame(&mut ws_write, &OutboundFrame::Ping).await {
                        warn!(error = %e, "Failed to send ping");
                        break;
                    }
                }
            }
        }

        shared.finish();
        debug!("Event loop terminated");
    }

    async fn open_stream(url: &Url) -> Result<WsStream> {
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        Ok(ws_stream)
    }

    async fn write_frame(ws_write: &mut WsWrite, frame: &OutboundFrame) -> Result<()> {
        let json = frame.to_json()?;
        ws_write.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }
}

impl TransportSession for WebSocketSession {
    fn ready_state(&self) -> ReadyState {
        *self.shared.state.lock()
    }

    fn close(&self) {
        if self.command_tx.send(SessionCommand::Close).is_err() {
            trace!("Close requested on a finished session");
        }
    }

    fn detach(&self) {
        self.shared.hooks.lock().take();
    }

    fn login(&self, username: &str, password: &str, reply: ReplyHandler) -> CancelReply {
        self.send(
            LOGIN_ADDRESS,
            json!({ "username": username, "password": password }),
            reply,
        )
    }

    fn send(&self, address: &str, body: Value, reply: ReplyHandler) -> CancelReply {
        let reply_address = Uuid::new_v4().to_string();
        self.shared
            .replies
            .lock()
            .insert(reply_address.clone(), reply);

        let queued = self.enqueue(OutboundFrame::Send {
            address: address.to_string(),
            body,
            reply_address: Some(reply_address.clone()),
        });

        if !queued {
            let reply = self.shared.replies.lock().remove(&reply_address);
            if let Some(reply) = reply {
                reply(Err(Error::ConnectionClosed));
            }
        }

        let shared: Weak<SessionShared> = Arc::downgrade(&self.shared);
        Box::new(move || {
            if let Some(shared) = shared.upgrade()
                && shared.replies.lock().remove(&reply_address).is_some()
            {
                trace!(reply_address = %reply_address, "Pending reply cancelled");
            }
        })
    }

    fn publish(&self, address: &str, body: Value) {
        if !self.enqueue(OutboundFrame::Publish {
            address: address.to_string(),
            body,
        }) {
            debug!(address = %address, "Publish on a finished session dropped");
        }
    }

    fn register_handler(&self, address: &str, handler: Handler) {
        let first = {
            let mut handlers = self.shared.handlers.lock();
            let list = handlers.entry(address.to_string()).or_default();
            list.push(handler);
            list.len() == 1
        };

        if first {
            self.enqueue(OutboundFrame::Register {
                address: address.to_string(),
            });
        }
    }

    fn unregister_handler(&self, address: &str, handler: &Handler) {
        let last = {
            let mut handlers = self.shared.handlers.lock();
            let Some(list) = handlers.get_mut(address) else {
                return;
            };
            let Some(position) = list.iter().position(|h| h == handler) else {
                return;
            };
            list.remove(position);
            if list.is_empty() {
                handlers.remove(address);
                true
            } else {
                false
            }
        };

        if last {
            self.enqueue(OutboundFrame::Unregister {
                address: address.to_string(),
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
