//! Connection service: connection state, gating, login and handler wrapping.
//!
//! The service sits between the [`EventBus`](crate::EventBus) façade and the
//! [`TransportAdapter`]. It tracks whether the bus is connected and whether
//! a login session is valid, and decides for every outbound action whether
//! it runs now, waits in the buffer, or is refused.
//!
//! # Gate
//!
//! ```text
//! action ──► [login guard] ──► open and buffer empty? ── yes ──► run now
//!                                 │
//!                                 no ──► buffering? ── yes ──► enqueue
//!                                             │
//!                                             no ──► refused
//! ```
//!
//! The login guard only exists when `login_required` is set. It checks the
//! session flag when the action finally runs, not when it is gated.
//!
//! An action only runs immediately when the buffer is empty and no flush is
//! in progress. Otherwise it joins the back of the buffer, so buffered
//! actions always run before anything gated after them.
//!
//! # Notifications
//!
//! Notifications travel on a bounded broadcast channel. Every delivered
//! message emits a `StateChanged`, so a receiver that falls behind by more
//! than the channel capacity gets `RecvError::Lagged` and loses the oldest
//! notifications, lifecycle ones included.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info};

use crate::bus::EventBusOptions;
use crate::collections::{AssociationStore, BoundedQueue};
use crate::error::{Error, Result};
use crate::protocol::{Message, Notification, NotificationKind, ReadyState};
use crate::transport::{CancelReply, Handler, TransportAdapter};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the notification broadcast channel.
const NOTIFICATION_CAPACITY: usize = 256;

// ============================================================================
// Types
// ============================================================================

/// A deferred outbound action.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Receives a callback every time the transport (re)opens.
pub trait ConnectionObserver: Send + Sync {
    /// Called after the connection state was refreshed on open, before the
    /// buffer is drained.
    fn after_connected(&self);
}

/// Wrapper generated for a registered callback.
struct Attachment {
    wrapper: Handler,
    /// Session the wrapper was attached to.
    session: Option<u64>,
}

/// Buffered actions and the flush in progress, guarded together.
struct Outbox {
    pending: BoundedQueue<Action>,
    flushing: bool,
}

#[derive(Debug, Default)]
struct ConnectionState {
    ready_state: ReadyState,
    connected: bool,
    valid_session: bool,
}

// ============================================================================
// Settlement
// ============================================================================

/// One-shot outcome shared by a reply handler and its timeout timer.
///
/// Whichever settles first wins; later attempts are ignored. When the timer
/// wins, the pending reply is dropped on the transport too.
struct Settlement {
    tx: Mutex<Option<oneshot::Sender<Result<Message>>>>,
    cancel: Mutex<Option<CancelReply>>,
}

impl Settlement {
    fn new() -> (Arc<Self>, oneshot::Receiver<Result<Message>>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
                cancel: Mutex::new(None),
            }),
            rx,
        )
    }

    fn settle(&self, outcome: Result<Message>) -> bool {
        let tx = self.tx.lock().take();
        match tx {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Stores the transport's cancel handle, or runs it at once if the
    /// settlement is already decided.
    fn set_cancel(&self, cancel: CancelReply) {
        let mut slot = self.cancel.lock();
        if self.tx.lock().is_some() {
            *slot = Some(cancel);
            return;
        }
        drop(slot);
        cancel();
    }

    /// Settles with `error` and drops the pending reply on the transport.
    fn expire(&self, error: Error) {
        if self.settle(Err(error)) {
            let cancel = self.cancel.lock().take();
            if let Some(cancel) = cancel {
                cancel();
            }
        }
    }

    /// Spawns a timer that expires the settlement after `timeout`.
    fn arm_timeout(
        self: &Arc<Self>,
        runtime: &Handle,
        timeout: Duration,
        error: Error,
    ) -> JoinHandle<()> {
        let settlement = Arc::clone(self);
        runtime.spawn(async move {
            sleep(timeout).await;
            settlement.expire(error);
        })
    }
}

/// Awaits a settlement; a dropped sender means the action never ran.
async fn outcome(rx: oneshot::Receiver<Result<Message>>) -> Result<Message> {
    rx.await.unwrap_or(Err(Error::MessageDropped))
}

// ============================================================================
// ConnectionService
// ============================================================================

/// Connection state machine and outbound gate.
pub struct ConnectionService {
    options: Arc<EventBusOptions>,
    adapter: TransportAdapter,
    runtime: Handle,
    state: Mutex<ConnectionState>,
    outbox: Mutex<Outbox>,
    callbacks: Mutex<AssociationStore<(String, Handler), Attachment>>,
    observers: Mutex<Vec<Weak<dyn ConnectionObserver>>>,
    notifications: broadcast::Sender<Notification>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl ConnectionService {
    /// Creates the service, installs the adapter hooks and starts the
    /// readiness poll.
    ///
    /// The adapter is not connected here; the caller connects it once the
    /// service is wired.
    #[must_use]
    pub fn new(options: Arc<EventBusOptions>, adapter: TransportAdapter, runtime: Handle) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let service = Arc::new(Self {
            outbox: Mutex::new(Outbox {
                pending: BoundedQueue::new(options.buffer_capacity),
                flushing: false,
            }),
            options,
            adapter,
            runtime,
            state: Mutex::new(ConnectionState::default()),
            callbacks: Mutex::new(AssociationStore::new()),
            observers: Mutex::new(Vec::new()),
            notifications,
            poll_task: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });
        service.initialize();
        service
    }

    fn initialize(self: &Arc<Self>) {
        let on_open = Arc::downgrade(self);
        self.adapter.set_on_open(Some(Arc::new(move || {
            if let Some(service) = on_open.upgrade() {
                service.on_transport_open();
            }
        })));

        let on_close = Arc::downgrade(self);
        self.adapter.set_on_close(Some(Arc::new(move || {
            if let Some(service) = on_close.upgrade() {
                service.on_transport_close();
            }
        })));

        let service = Arc::downgrade(self);
        let period = self.options.state_check_interval.max(Duration::from_millis(1));
        let task = self.runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                if service.refresh_state() {
                    service.emit(NotificationKind::StateChanged, None);
                }
            }
        });
        *self.poll_task.lock() = Some(task);
    }

    /// The options the service runs with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &EventBusOptions {
        &self.options
    }

    /// Registers an observer called on every (re)open.
    ///
    /// Observers are held weakly and pruned once dropped.
    pub fn observe(&self, observer: Weak<dyn ConnectionObserver>) {
        self.observers.lock().push(observer);
    }

    /// Subscribes to lifecycle notifications.
    ///
    /// A receiver that falls more than the channel capacity behind gets
    /// `RecvError::Lagged` once and then resumes with the oldest retained
    /// notification. `StateChanged` is emitted per delivery and is safe to
    /// coalesce; call `resubscribe` to skip the backlog.
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    fn emit(&self, kind: NotificationKind, payload: Option<Value>) {
        let notification = Notification::new(&self.options.event_name_prefix, kind, payload);
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

// ============================================================================
// Connection State
// ============================================================================

impl ConnectionService {
    /// Returns the ready state.
    ///
    /// With `immediate` the transport is queried and the cached value
    /// refreshed; otherwise the cached value is returned. A disabled bus is
    /// always [`ReadyState::Closed`].
    pub fn connection_state(&self, immediate: bool) -> ReadyState {
        if !self.options.enabled {
            return ReadyState::Closed;
        }
        if immediate {
            self.refresh_state();
        }
        self.state.lock().ready_state
    }

    /// Re-reads the transport state. Returns `true` if it changed.
    fn refresh_state(&self) -> bool {
        if !self.options.enabled {
            return false;
        }
        let fresh = self.adapter.ready_state();
        let mut state = self.state.lock();
        let changed = state.ready_state != fresh;
        state.ready_state = fresh;
        changed
    }

    /// Returns `true` if the cached state is [`ReadyState::Open`].
    #[inline]
    #[must_use]
    pub fn is_connection_open(&self) -> bool {
        self.connection_state(false).is_open()
    }

    /// Returns `true` between an open and the following close.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Returns `true` after a successful login, until a failed one.
    #[inline]
    #[must_use]
    pub fn is_valid_session(&self) -> bool {
        self.state.lock().valid_session
    }

    /// Number of buffered actions.
    #[inline]
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.outbox.lock().pending.len()
    }

    /// Number of tracked callback attachments.
    #[inline]
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.callbacks.lock().len()
    }

    fn on_transport_open(&self) {
        self.refresh_state();

        let newly_connected = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.connected, true)
        };
        if newly_connected {
            info!("Event bus connected");
            self.emit(NotificationKind::Connected, None);
        }

        let observers: Vec<_> = {
            let mut observers = self.observers.lock();
            observers.retain(|observer| observer.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            observer.after_connected();
        }

        self.emit(NotificationKind::StateChanged, None);

        let flushed = self.flush();
        if flushed > 0 {
            debug!(count = flushed, "Flushed buffered actions");
            self.emit(NotificationKind::StateChanged, None);
        }
    }

    /// Runs buffered actions oldest first while the connection is open.
    ///
    /// Actions gated during the flush join the buffer and run in the same
    /// pass. Returns the number of actions run.
    fn flush(&self) -> usize {
        {
            let mut outbox = self.outbox.lock();
            if outbox.flushing || outbox.pending.is_empty() {
                return 0;
            }
            outbox.flushing = true;
        }

        let mut flushed = 0;
        loop {
            let next = {
                let mut outbox = self.outbox.lock();
                let next = if self.is_connection_open() {
                    outbox.pending.take_oldest()
                } else {
                    None
                };
                if next.is_none() {
                    outbox.flushing = false;
                }
                next
            };
            let Some(action) = next else {
                break;
            };
            action();
            flushed += 1;
        }
        flushed
    }

    fn on_transport_close(&self) {
        self.refresh_state();

        let was_connected = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.connected, false)
        };
        if was_connected {
            info!("Event bus disconnected");
            self.emit(NotificationKind::Disconnected, None);
        }

        self.callbacks.lock().compact();
        self.emit(NotificationKind::StateChanged, None);
    }
}

// ============================================================================
// Gate
// ============================================================================

impl ConnectionService {
    /// Runs, buffers or refuses an action.
    ///
    /// Returns `false` if the action was refused (not open with buffering
    /// disabled, or shut down); the action is dropped in that case.
    pub fn ensure_usable(self: &Arc<Self>, action: Action) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            if self.options.debug_enabled {
                debug!("Action refused: event bus shut down");
            }
            return false;
        }
        let action = if self.options.login_required {
            self.guard_session(action)
        } else {
            action
        };
        self.ensure_open(action)
    }

    /// Wraps an action so it only runs with a valid login session.
    fn guard_session(self: &Arc<Self>, action: Action) -> Action {
        let service = Arc::downgrade(self);
        Box::new(move || {
            let Some(service) = service.upgrade() else {
                return;
            };
            if service.is_valid_session() {
                action();
            } else if service.options.debug_enabled {
                debug!("Message was not sent: login required");
            }
        })
    }

    fn ensure_open(&self, action: Action) -> bool {
        let mut outbox = self.outbox.lock();
        if self.is_connection_open() && !outbox.flushing && outbox.pending.is_empty() {
            drop(outbox);
            action();
            return true;
        }

        if self.options.is_buffering_enabled() {
            let evicted = outbox.pending.push(action);
            let buffered = outbox.pending.len();
            drop(outbox);
            if self.options.debug_enabled {
                debug!(buffered, evicted, "Action buffered until the connection opens");
            }
            return true;
        }
        drop(outbox);

        if self.options.debug_enabled {
            debug!("Action refused: connection not open");
        }
        false
    }
}

// ============================================================================
// Messaging
// ============================================================================

impl ConnectionService {
    /// Sends a message and waits for the reply.
    ///
    /// Gating happens when this is called, not when the future is polled.
    ///
    /// # Errors
    ///
    /// The future resolves to:
    /// - [`Error::NotConnected`] if the gate refused the action
    /// - [`Error::RequestTimeout`] if no reply arrived within `timeout`
    /// - [`Error::MessageDropped`] if the buffered action was evicted or
    ///   dropped by the login guard
    /// - any failure the transport reported for the reply
    pub fn send(
        self: &Arc<Self>,
        address: &str,
        body: Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Message>> + Send + 'static {
        let (settlement, rx) = Settlement::new();

        if self.options.debug_enabled {
            debug!(address = %address, "Sending message");
        }

        let action: Action = {
            let adapter = self.adapter.clone();
            let runtime = self.runtime.clone();
            let address = address.to_string();
            let settlement = Arc::clone(&settlement);
            Box::new(move || {
                let timer = settlement.arm_timeout(
                    &runtime,
                    timeout,
                    Error::request_timeout(address.clone(), duration_ms(timeout)),
                );
                let pending = Arc::clone(&settlement);
                let cancel = adapter.send(
                    &address,
                    body,
                    Box::new(move |reply| {
                        timer.abort();
                        pending.settle(reply);
                    }),
                );
                if let Some(cancel) = cancel {
                    settlement.set_cancel(cancel);
                }
            })
        };

        if !self.ensure_usable(action) {
            settlement.settle(Err(Error::NotConnected));
        }

        outcome(rx)
    }

    /// Publishes a message to every handler of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the gate refused the action.
    pub fn publish(self: &Arc<Self>, address: &str, body: Value) -> Result<()> {
        if self.options.debug_enabled {
            debug!(address = %address, "Publishing message");
        }

        let adapter = self.adapter.clone();
        let target = address.to_string();
        let action: Action = Box::new(move || adapter.publish(&target, body));

        if self.ensure_usable(action) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Logs in with the bridge's auth manager.
    ///
    /// Not gated: the credentials go straight to the live session. A reply
    /// with `status: "ok"` validates the session; any other reply
    /// invalidates it.
    ///
    /// # Errors
    ///
    /// The future resolves to:
    /// - [`Error::LoginRejected`] if the reply status is not `"ok"`
    /// - [`Error::LoginTimeout`] if no reply arrived within `timeout`
    /// - [`Error::NotConnected`] after [`shutdown`](Self::shutdown)
    /// - any failure the transport reported for the reply
    pub fn login(
        self: &Arc<Self>,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Message>> + Send + 'static {
        let (settlement, rx) = Settlement::new();

        if self.options.debug_enabled {
            debug!(username = %username, "Logging in");
        }

        if self.shut_down.load(Ordering::Acquire) {
            settlement.settle(Err(Error::NotConnected));
            return outcome(rx);
        }

        let timer = settlement.arm_timeout(
            &self.runtime,
            timeout,
            Error::LoginTimeout {
                timeout_ms: duration_ms(timeout),
            },
        );

        let service = Arc::downgrade(self);
        let pending = Arc::clone(&settlement);
        let cancel = self.adapter.login(
            username,
            password,
            Box::new(move |reply| {
                timer.abort();
                if let Some(service) = service.upgrade() {
                    service.complete_login(reply, &pending);
                } else {
                    pending.settle(Err(Error::ConnectionClosed));
                }
            }),
        );
        if let Some(cancel) = cancel {
            settlement.set_cancel(cancel);
        }

        outcome(rx)
    }

    fn complete_login(&self, reply: Result<Message>, settlement: &Settlement) {
        match reply {
            Ok(message) if message.status() == Some("ok") => {
                self.state.lock().valid_session = true;
                info!("Login succeeded");
                settlement.settle(Ok(message));
                self.emit(
                    NotificationKind::LoginSucceeded,
                    Some(json!({ "status": "ok" })),
                );
            }
            Ok(message) => {
                self.state.lock().valid_session = false;
                let status = message.body.get("status").cloned().unwrap_or(Value::Null);
                info!(status = %status, "Login rejected");
                settlement.settle(Err(Error::login_rejected(message.body)));
                self.emit(
                    NotificationKind::LoginFailed,
                    Some(json!({ "status": status })),
                );
            }
            Err(e) => {
                self.state.lock().valid_session = false;
                info!(error = %e, "Login failed");
                settlement.settle(Err(e));
                self.emit(
                    NotificationKind::LoginFailed,
                    Some(json!({ "status": Value::Null })),
                );
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

impl ConnectionService {
    /// Attaches `callback` to `address` on the live session.
    ///
    /// The transport receives a wrapper that calls `callback` and then
    /// emits a state-changed notification. A pair already attached to the
    /// live session is not attached twice.
    ///
    /// Returns `true` if the pair is attached to a live session.
    pub fn register_handler(&self, address: &str, callback: Handler) -> bool {
        let session = self.adapter.session_id();
        let key = (address.to_string(), callback.clone());

        let wrapper = {
            let mut callbacks = self.callbacks.lock();
            let attached = callbacks
                .get(&key)
                .is_some_and(|attachment| attachment.session.is_some() && attachment.session == session);
            if attached {
                return true;
            }

            let wrapper = self.wrap(callback);
            callbacks.put(
                key,
                Attachment {
                    wrapper: wrapper.clone(),
                    session,
                },
            );
            wrapper
        };

        if self.options.debug_enabled {
            debug!(address = %address, "Registering handler");
        }
        self.adapter.register_handler(address, wrapper)
    }

    /// Forgets the association of `callback` with `address` and detaches
    /// its wrapper from the live session it was attached to.
    ///
    /// Works while disconnected; only the transport call is skipped then.
    /// Unknown pairs are ignored.
    pub fn unregister_handler(&self, address: &str, callback: &Handler) {
        let key = (address.to_string(), callback.clone());
        let attachment = self.callbacks.lock().remove(&key);
        let Some(attachment) = attachment else {
            return;
        };

        if attachment.session.is_some() && attachment.session == self.adapter.session_id() {
            if self.options.debug_enabled {
                debug!(address = %address, "Unregistering handler");
            }
            self.adapter.unregister_handler(address, &attachment.wrapper);
        }
    }

    fn wrap(&self, callback: Handler) -> Handler {
        let notifications = self.notifications.clone();
        let prefix = self.options.event_name_prefix.clone();
        Handler::new(move |message| {
            callback.call(message);
            let _ = notifications.send(Notification::new(
                &prefix,
                NotificationKind::StateChanged,
                None,
            ));
        })
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

impl ConnectionService {
    /// Closes the live session; the adapter reconnects if enabled.
    pub fn close(&self) {
        self.adapter.close();
    }

    /// Forces a reconnect.
    pub fn reconnect(&self) {
        self.adapter.reconnect();
    }

    /// Stops polling and reconnecting, closes the session and drops
    /// buffered actions.
    ///
    /// The service reports closed and disconnected afterwards and refuses
    /// every further action with [`Error::NotConnected`].
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
        self.adapter.shutdown();

        let was_connected = {
            let mut state = self.state.lock();
            state.ready_state = ReadyState::Closed;
            std::mem::replace(&mut state.connected, false)
        };
        if was_connected {
            info!("Event bus disconnected");
            self.emit(NotificationKind::Disconnected, None);
        }
        self.callbacks.lock().compact();
        self.emit(NotificationKind::StateChanged, None);

        let dropped = self.outbox.lock().pending.drain();
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "Dropped buffered actions on shutdown");
        }
    }
}

impl Drop for ConnectionService {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.get_mut().take() {
            task.abort();
        }
        self.adapter.shutdown();
    }
}

#[inline]
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn absent(options: EventBusOptions) -> Arc<ConnectionService> {
        ConnectionService::new(Arc::new(options), TransportAdapter::Absent, Handle::current())
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state() {
        let service = absent(EventBusOptions::new());
        assert!(!service.is_connected());
        assert!(!service.is_valid_session());
        assert!(!service.is_connection_open());
        assert_eq!(service.connection_state(true), ReadyState::Closed);
        assert_eq!(service.buffered_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_without_buffer() {
        let service = absent(EventBusOptions::new());
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        let handled = service.ensure_usable(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!handled);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(matches!(
            service.publish("a", Value::Null),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            service.send("a", Value::Null, Duration::from_secs(1)).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffers_when_enabled() {
        let service = absent(EventBusOptions::new().with_buffer_capacity(2));

        assert!(service.publish("a", Value::Null).is_ok());
        assert!(service.publish("b", Value::Null).is_ok());
        assert!(service.publish("c", Value::Null).is_ok());
        assert_eq!(service.buffered_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_send_is_dropped() {
        let service = absent(EventBusOptions::new().with_buffer_capacity(1));

        let first = service.send("a", Value::Null, Duration::from_secs(1));
        let _second = service.send("b", Value::Null, Duration::from_secs(1));

        assert!(matches!(first.await, Err(Error::MessageDropped)));
        assert_eq!(service.buffered_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_times_out_without_session() {
        let service = absent(EventBusOptions::new());
        let result = service
            .login("user", "pass", Duration::from_millis(500))
            .await;
        assert!(matches!(result, Err(Error::LoginTimeout { timeout_ms: 500 })));
        assert!(!service.is_valid_session());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_reports_closed() {
        let service = absent(EventBusOptions::new().with_enabled(false));
        assert_eq!(service.connection_state(true), ReadyState::Closed);
        assert_eq!(service.connection_state(false), ReadyState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrapper_emits_state_changed() {
        let service = absent(EventBusOptions::new());
        let mut notifications = service.notifications();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let wrapper = service.wrap(Handler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        wrapper.call(&Message::new("news", Value::Null));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        let notification = notifications.try_recv().expect("notification");
        assert_eq!(notification.kind, NotificationKind::StateChanged);
        assert_eq!(notification.name, "vertx-eventbus.system.state.changed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_unknown_is_noop() {
        let service = absent(EventBusOptions::new());
        service.unregister_handler("nowhere", &Handler::new(|_| {}));
        assert!(!service.register_handler("news", Handler::new(|_| {})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_settlement_cancels_reply() {
        let cancelled = Arc::new(AtomicUsize::new(0));

        let (expired, rx) = Settlement::new();
        let counter = Arc::clone(&cancelled);
        expired.set_cancel(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        expired.expire(Error::MessageDropped);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome(rx).await, Err(Error::MessageDropped)));

        let (answered, rx) = Settlement::new();
        let counter = Arc::clone(&cancelled);
        answered.set_cancel(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        answered.settle(Ok(Message::new("reply", Value::Null)));
        answered.expire(Error::MessageDropped);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert!(outcome(rx).await.is_ok());

        // Late handle on a decided settlement runs at once.
        let counter = Arc::clone(&cancelled);
        answered.set_cancel(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(cancelled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_while_disconnected_forgets_association() {
        let service = absent(EventBusOptions::new());
        let handlers: Vec<Handler> = (0..10).map(|_| Handler::new(|_| {})).collect();

        for handler in &handlers {
            service.register_handler("news", handler.clone());
        }
        assert_eq!(service.attachment_count(), 10);

        for handler in &handlers {
            service.unregister_handler("news", handler);
        }
        assert_eq!(service.attachment_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_receiver_resumes() {
        let service = absent(EventBusOptions::new());
        let mut notifications = service.notifications();
        let wrapper = service.wrap(Handler::new(|_| {}));
        let message = Message::new("news", Value::Null);

        for _ in 0..NOTIFICATION_CAPACITY + 8 {
            wrapper.call(&message);
        }

        assert!(matches!(
            notifications.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(8))
        ));
        let next = notifications.try_recv().expect("notification after lag");
        assert_eq!(next.kind, NotificationKind::StateChanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_further_actions() {
        let service = absent(EventBusOptions::new().with_buffer_capacity(4));
        service.shutdown();

        assert!(matches!(
            service.publish("a", Value::Null),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            service.send("a", Value::Null, Duration::from_secs(1)).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            service.login("user", "pass", Duration::from_secs(1)).await,
            Err(Error::NotConnected)
        ));
        assert_eq!(service.buffered_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_buffer() {
        let service = absent(EventBusOptions::new().with_buffer_capacity(4));
        let pending = service.send("a", Value::Null, Duration::from_secs(1));
        assert_eq!(service.buffered_len(), 1);

        service.shutdown();
        assert_eq!(service.buffered_len(), 0);
        assert!(matches!(pending.await, Err(Error::MessageDropped)));
    }
}
