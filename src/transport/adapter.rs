//! Transport session adapter.
//!
//! Owns at most one live [`TransportSession`] and cycles it:
//!
//! ```text
//! NO_SESSION ──connect()──► CONNECTING ──open──► OPEN
//!     ▲                                            │
//!     └──── close hook (detach, discard, ◄─────────┘
//!           schedule reconnect)
//! ```
//!
//! Every session gets a fresh generation number. Hook events carry the
//! generation they were created with, so events from a replaced session
//! are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::EventBusOptions;
use crate::protocol::ReadyState;

use super::session::{
    CancelReply, Handler, Hook, ReplyHandler, SessionHooks, TransportFactory, TransportSession,
};

// ============================================================================
// TransportAdapter
// ============================================================================

/// Session adapter, chosen once at construction.
///
/// `Absent` is used when the bus is disabled: every operation is a no-op and
/// the ready state is always [`ReadyState::Closed`].
#[derive(Clone)]
pub enum TransportAdapter {
    /// Backed by a transport factory.
    Live(Arc<LiveAdapter>),
    /// No transport.
    Absent,
}

impl TransportAdapter {
    /// Creates a live adapter. It does not connect until [`connect`](Self::connect).
    #[must_use]
    pub fn live(
        factory: Arc<dyn TransportFactory>,
        options: Arc<EventBusOptions>,
        runtime: Handle,
    ) -> Self {
        Self::Live(Arc::new(LiveAdapter::new(factory, options, runtime)))
    }

    /// Returns `true` for the `Live` variant.
    #[inline]
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// Starts a new session.
    pub fn connect(&self) {
        if let Self::Live(live) = self {
            live.connect();
        }
    }

    /// Closes the live session; reconnection follows if enabled.
    pub fn close(&self) {
        if let Self::Live(live) = self {
            live.close();
        }
    }

    /// Forces a reconnect by closing the live session.
    pub fn reconnect(&self) {
        if let Self::Live(live) = self {
            live.reconnect();
        }
    }

    /// Stops reconnecting and closes the live session for good.
    pub fn shutdown(&self) {
        if let Self::Live(live) = self {
            live.shutdown();
        }
    }

    /// Installs the hook called when a session opens.
    pub fn set_on_open(&self, hook: Option<Hook>) {
        if let Self::Live(live) = self {
            *live.on_open.lock() = hook;
        }
    }

    /// Installs the hook called when a session closes.
    pub fn set_on_close(&self, hook: Option<Hook>) {
        if let Self::Live(live) = self {
            *live.on_close.lock() = hook;
        }
    }

    /// Ready state of the live session, `Closed` without one.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        match self {
            Self::Live(live) => live.ready_state(),
            Self::Absent => ReadyState::Closed,
        }
    }

    /// Generation of the live session, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        match self {
            Self::Live(live) => live.current().map(|(id, _)| id),
            Self::Absent => None,
        }
    }

    /// Sends through the live session; without one `reply` is dropped.
    ///
    /// Returns the session's cancel handle for the pending reply.
    pub fn send(&self, address: &str, body: Value, reply: ReplyHandler) -> Option<CancelReply> {
        self.session()
            .map(|session| session.send(address, body, reply))
    }

    /// Publishes through the live session.
    pub fn publish(&self, address: &str, body: Value) {
        if let Some(session) = self.session() {
            session.publish(address, body);
        }
    }

    /// Logs in through the live session; without one `reply` is dropped.
    ///
    /// Returns the session's cancel handle for the pending reply.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        reply: ReplyHandler,
    ) -> Option<CancelReply> {
        self.session()
            .map(|session| session.login(username, password, reply))
    }

    /// Registers a handler on the live session.
    ///
    /// Returns `true` if a session received it.
    pub fn register_handler(&self, address: &str, handler: Handler) -> bool {
        match self.session() {
            Some(session) => {
                session.register_handler(address, handler);
                true
            }
            None => false,
        }
    }

    /// Unregisters a handler from the live session.
    pub fn unregister_handler(&self, address: &str, handler: &Handler) {
        if let Some(session) = self.session() {
            session.unregister_handler(address, handler);
        }
    }

    fn session(&self) -> Option<Arc<dyn TransportSession>> {
        match self {
            Self::Live(live) => live.current().map(|(_, session)| session),
            Self::Absent => None,
        }
    }
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live(live) => f
                .debug_struct("Live")
                .field("session_id", &live.current().map(|(id, _)| id))
                .field("ready_state", &live.ready_state())
                .finish(),
            Self::Absent => f.write_str("Absent"),
        }
    }
}

// ============================================================================
// LiveAdapter
// ============================================================================

/// Slot holding the live session.
///
/// `id` is reserved before the factory is called; `session` is filled when
/// it returns. An open event arriving in between is remembered in
/// `open_pending` and dispatched once the session is stored.
#[derive(Default)]
struct SessionSlot {
    id: u64,
    session: Option<Arc<dyn TransportSession>>,
    open_pending: bool,
}

/// Adapter over a transport factory.
pub struct LiveAdapter {
    factory: Arc<dyn TransportFactory>,
    options: Arc<EventBusOptions>,
    runtime: Handle,
    slot: Mutex<SessionSlot>,
    next_id: AtomicU64,
    on_open: Mutex<Option<Hook>>,
    on_close: Mutex<Option<Hook>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl LiveAdapter {
    fn new(factory: Arc<dyn TransportFactory>, options: Arc<EventBusOptions>, runtime: Handle) -> Self {
        Self {
            factory,
            options,
            runtime,
            slot: Mutex::new(SessionSlot::default()),
            next_id: AtomicU64::new(1),
            on_open: Mutex::new(None),
            on_close: Mutex::new(None),
            reconnect_task: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        }
    }

    fn current(&self) -> Option<(u64, Arc<dyn TransportSession>)> {
        let slot = self.slot.lock();
        slot.session.as_ref().map(|session| (slot.id, Arc::clone(session)))
    }

    fn ready_state(&self) -> ReadyState {
        self.current()
            .map_or(ReadyState::Closed, |(_, session)| session.ready_state())
    }

    /// Replaces the live session with a new one.
    fn connect(self: &Arc<Self>) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }

        let url = match self.options.connection_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot build transport URL");
                self.schedule_reconnect();
                return;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = {
            let mut slot = self.slot.lock();
            slot.id = id;
            slot.open_pending = false;
            slot.session.take()
        };
        if let Some(previous) = previous {
            previous.detach();
            previous.close();
        }

        let on_open = Arc::downgrade(self);
        let on_close = Arc::downgrade(self);
        let hooks = SessionHooks::new(
            move || {
                if let Some(adapter) = on_open.upgrade() {
                    adapter.handle_open(id);
                }
            },
            move || {
                if let Some(adapter) = on_close.upgrade() {
                    adapter.handle_close(id);
                }
            },
        );

        if self.options.debug_enabled {
            debug!(url = %url, session = id, "Connecting transport session");
        }

        match self
            .factory
            .connect(&url, &self.options.transport_options, hooks)
        {
            Ok(session) => {
                let fire_open = {
                    let mut slot = self.slot.lock();
                    if slot.id == id {
                        slot.session = Some(Arc::clone(&session));
                        std::mem::take(&mut slot.open_pending)
                    } else {
                        drop(slot);
                        session.detach();
                        session.close();
                        return;
                    }
                };
                if fire_open {
                    self.dispatch_open();
                }
            }
            Err(e) => {
                let mut slot = self.slot.lock();
                if slot.id == id {
                    slot.id = 0;
                }
                drop(slot);

                if e.is_recoverable() {
                    warn!(error = %e, url = %url, "Transport connect failed");
                    self.schedule_reconnect();
                } else {
                    error!(error = %e, url = %url, "Transport cannot connect; not retrying");
                }
            }
        }
    }

    fn handle_open(&self, id: u64) {
        {
            let mut slot = self.slot.lock();
            if slot.id != id {
                return;
            }
            if slot.session.is_none() {
                slot.open_pending = true;
                return;
            }
        }
        self.dispatch_open();
    }

    fn dispatch_open(&self) {
        info!("Transport session open");
        let hook = self.on_open.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn handle_close(self: &Arc<Self>, id: u64) {
        let session = {
            let mut slot = self.slot.lock();
            if slot.id != id {
                return;
            }
            slot.id = 0;
            slot.open_pending = false;
            slot.session.take()
        };

        info!("Transport session closed");
        let hook = self.on_close.lock().clone();
        if let Some(hook) = hook {
            hook();
        }

        if let Some(session) = session {
            session.detach();
        }

        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.options.reconnect_enabled || self.shutdown.load(Ordering::Acquire) {
            return;
        }

        let delay = self.options.reconnect_interval;
        debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        let adapter: Weak<Self> = Arc::downgrade(self);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(adapter) = adapter.upgrade() {
                adapter.connect();
            }
        });

        if let Some(previous) = self.reconnect_task.lock().replace(task) {
            previous.abort();
        }
    }

    fn close(&self) {
        if let Some((_, session)) = self.current() {
            session.close();
        }
    }

    fn reconnect(&self) {
        if self.options.debug_enabled {
            debug!("Reconnect requested");
        }
        self.close();
    }

    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.reconnect_task.lock().take() {
            task.abort();
        }

        let session = {
            let mut slot = self.slot.lock();
            slot.id = 0;
            slot.open_pending = false;
            slot.session.take()
        };
        if let Some(session) = session {
            session.detach();
            session.close();
        }
        debug!("Transport adapter shut down");
    }
}

impl Drop for LiveAdapter {
    fn drop(&mut self) {
        if let Some(task) = self.reconnect_task.get_mut().take() {
            task.abort();
        }
        if let Some(session) = self.slot.get_mut().session.take() {
            session.detach();
            session.close();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
