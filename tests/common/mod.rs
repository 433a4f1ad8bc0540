//! Shared test utilities: a scripted in-memory transport.
//!
//! `MockTransport` records every session it creates. Tests drive each
//! session's lifecycle (`open`, `drop_connection`), answer pending replies
//! and deliver inbound messages by hand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use url::Url;

use vertx_eventbus::transport::LOGIN_ADDRESS;
use vertx_eventbus::{
    CancelReply, EventBus, EventBusOptions, Handler, Message, ReadyState, ReplyHandler, Result,
    SessionHooks, TransportFactory, TransportSession,
};

// ============================================================================
// Setup
// ============================================================================

/// Installs a tracing subscriber honoring `RUST_LOG`. Safe to call twice.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Options with short intervals suited to paused-clock tests.
pub fn options() -> EventBusOptions {
    EventBusOptions::new()
        .with_reconnect_interval(Duration::from_millis(100))
        .with_state_check_interval(Duration::from_secs(1))
}

/// Builds a bus over the mock transport.
pub fn bus(options: EventBusOptions, transport: &Arc<MockTransport>) -> EventBus {
    init_tracing();
    EventBus::builder()
        .options(options)
        .transport_arc(Arc::clone(transport) as Arc<dyn TransportFactory>)
        .build()
        .expect("bus builds")
}

/// Lets spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Call
// ============================================================================

/// A call made on a mock session.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send { address: String, body: Value },
    Publish { address: String, body: Value },
    Login { username: String, password: String },
    Register { address: String },
    Unregister { address: String },
}

// ============================================================================
// MockTransport
// ============================================================================

/// Transport factory creating [`MockSession`]s.
#[derive(Default)]
pub struct MockTransport {
    sessions: Mutex<Vec<Arc<MockSession>>>,
    urls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The most recent session.
    pub fn session(&self) -> Arc<MockSession> {
        Arc::clone(self.sessions.lock().last().expect("a session was created"))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl TransportFactory for MockTransport {
    fn connect(
        &self,
        url: &Url,
        _options: &Value,
        hooks: SessionHooks,
    ) -> Result<Arc<dyn TransportSession>> {
        self.urls.lock().push(url.to_string());
        let session = Arc::new(MockSession {
            hooks: Mutex::new(Some(hooks)),
            state: Mutex::new(ReadyState::Connecting),
            calls: Mutex::new(Vec::new()),
            replies: Arc::new(Mutex::new(Vec::new())),
            next_reply: AtomicU64::new(0),
            handlers: Mutex::new(Vec::new()),
        });
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }
}

// ============================================================================
// MockSession
// ============================================================================

/// A reply the session is still waiting to answer.
struct PendingReply {
    id: u64,
    address: String,
    reply: ReplyHandler,
}

type Replies = Mutex<Vec<PendingReply>>;

/// A session whose lifecycle is driven by the test.
pub struct MockSession {
    hooks: Mutex<Option<SessionHooks>>,
    state: Mutex<ReadyState>,
    calls: Mutex<Vec<Call>>,
    replies: Arc<Replies>,
    next_reply: AtomicU64,
    handlers: Mutex<Vec<(String, Handler)>>,
}

impl MockSession {
    /// Marks the session open and fires the open hook.
    pub fn open(&self) {
        *self.state.lock() = ReadyState::Open;
        let hooks = self.hooks.lock().clone();
        if let Some(hooks) = hooks {
            hooks.open();
        }
    }

    /// Simulates the remote end going away.
    pub fn drop_connection(&self) {
        *self.state.lock() = ReadyState::Closed;
        let hooks = self.hooks.lock().clone();
        if let Some(hooks) = hooks {
            hooks.close();
        }
    }

    /// Changes the ready state without firing hooks.
    pub fn force_state(&self, state: ReadyState) {
        *self.state.lock() = state;
    }

    pub fn is_detached(&self) -> bool {
        self.hooks.lock().is_none()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Addresses of `publish` calls, in order.
    pub fn published(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Publish { address, .. } => Some(address.clone()),
                _ => None,
            })
            .collect()
    }

    /// Addresses of `send` calls, in order.
    pub fn sent(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Send { address, .. } => Some(address.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `register` calls for `address`.
    pub fn register_count(&self, address: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::Register { address: a } if a == address))
            .count()
    }

    /// Handlers currently attached to `address`.
    pub fn handler_count(&self, address: &str) -> usize {
        self.handlers
            .lock()
            .iter()
            .filter(|(a, _)| a == address)
            .count()
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.lock().len()
    }

    /// Answers the oldest pending reply for `address`.
    ///
    /// Returns `false` if nothing was pending.
    pub fn reply(&self, address: &str, outcome: Result<Message>) -> bool {
        let reply = {
            let mut replies = self.replies.lock();
            replies
                .iter()
                .position(|pending| pending.address == address)
                .map(|position| replies.remove(position).reply)
        };
        match reply {
            Some(reply) => {
                reply(outcome);
                true
            }
            None => false,
        }
    }

    /// Answers the pending login with `body`.
    pub fn reply_login(&self, body: Value) -> bool {
        self.reply(LOGIN_ADDRESS, Ok(Message::new("reply", body)))
    }

    fn expect_reply(&self, address: &str, reply: ReplyHandler) -> CancelReply {
        let id = self.next_reply.fetch_add(1, Ordering::Relaxed);
        self.replies.lock().push(PendingReply {
            id,
            address: address.to_string(),
            reply,
        });

        let replies: Weak<Replies> = Arc::downgrade(&self.replies);
        Box::new(move || {
            if let Some(replies) = replies.upgrade() {
                replies.lock().retain(|pending| pending.id != id);
            }
        })
    }

    /// Delivers an inbound message to every handler of `address`.
    pub fn deliver(&self, address: &str, body: Value) -> usize {
        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, handler)| handler.clone())
            .collect();
        let message = Message::new(address, body);
        for handler in &handlers {
            handler.call(&message);
        }
        handlers.len()
    }
}

impl TransportSession for MockSession {
    fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }

    fn close(&self) {
        self.drop_connection();
    }

    fn detach(&self) {
        self.hooks.lock().take();
    }

    fn login(&self, username: &str, password: &str, reply: ReplyHandler) -> CancelReply {
        self.calls.lock().push(Call::Login {
            username: username.to_string(),
            password: password.to_string(),
        });
        self.expect_reply(LOGIN_ADDRESS, reply)
    }

    fn send(&self, address: &str, body: Value, reply: ReplyHandler) -> CancelReply {
        self.calls.lock().push(Call::Send {
            address: address.to_string(),
            body,
        });
        self.expect_reply(address, reply)
    }

    fn publish(&self, address: &str, body: Value) {
        self.calls.lock().push(Call::Publish {
            address: address.to_string(),
            body,
        });
    }

    fn register_handler(&self, address: &str, handler: Handler) {
        self.calls.lock().push(Call::Register {
            address: address.to_string(),
        });
        self.handlers.lock().push((address.to_string(), handler));
    }

    fn unregister_handler(&self, address: &str, handler: &Handler) {
        self.calls.lock().push(Call::Unregister {
            address: address.to_string(),
        });
        let mut handlers = self.handlers.lock();
        if let Some(position) = handlers
            .iter()
            .position(|(a, h)| a == address && h == handler)
        {
            handlers.remove(position);
        }
    }
}
