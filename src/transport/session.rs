//! Transport session contract.
//!
//! A transport session is one live connection to the bus. It is created by
//! a [`TransportFactory`], reports lifecycle through [`SessionHooks`], and is
//! replaced wholesale on every reconnect.
//!
//! Implementations must not invoke hooks or reply handlers from inside
//! [`TransportFactory::connect`]; they fire later, from the session's own
//! task or event source.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::protocol::{Message, ReadyState};

// ============================================================================
// Types
// ============================================================================

/// Reply callback for `send` and `login`.
///
/// Called at most once, with the reply or the failure.
pub type ReplyHandler = Box<dyn FnOnce(Result<Message>) + Send + 'static>;

/// Lifecycle hook callback.
pub type Hook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Drops a pending reply on the session that issued it.
///
/// Returned by `send` and `login`. Calling it after the reply arrived, or
/// after the session ended, does nothing.
pub type CancelReply = Box<dyn FnOnce() + Send + 'static>;

// ============================================================================
// Handler
// ============================================================================

/// A message handler registered on an address.
///
/// Cloning is cheap. Equality is identity: clones of one handler compare
/// equal, separately created handlers never do, even with identical code.
///
/// # Example
///
/// ```
/// use vertx_eventbus::Handler;
///
/// let handler = Handler::new(|message| println!("{}", message.body));
/// let same = handler.clone();
/// let other = Handler::new(|message| println!("{}", message.body));
///
/// assert_eq!(handler, same);
/// assert_ne!(handler, other);
/// ```
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(&Message) + Send + Sync + 'static>);

impl Handler {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the handler.
    #[inline]
    pub fn call(&self, message: &Message) {
        (self.0)(message);
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

// ============================================================================
// SessionHooks
// ============================================================================

/// Open/close callbacks handed to a session at construction.
#[derive(Clone)]
pub struct SessionHooks {
    on_open: Hook,
    on_close: Hook,
}

impl SessionHooks {
    /// Creates hooks from two closures.
    pub fn new(
        on_open: impl Fn() + Send + Sync + 'static,
        on_close: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_open: Arc::new(on_open),
            on_close: Arc::new(on_close),
        }
    }

    /// Signals that the session opened.
    #[inline]
    pub fn open(&self) {
        (self.on_open)();
    }

    /// Signals that the session closed.
    #[inline]
    pub fn close(&self) {
        (self.on_close)();
    }
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHooks").finish_non_exhaustive()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Creates transport sessions.
pub trait TransportFactory: Send + Sync + 'static {
    /// Starts connecting a new session to `url`.
    ///
    /// Returns immediately with a session in [`ReadyState::Connecting`];
    /// `hooks` fire when it opens and when it closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot even be started (bad URL,
    /// no runtime). Asynchronous connection failures are reported through
    /// the close hook instead.
    fn connect(
        &self,
        url: &Url,
        options: &Value,
        hooks: SessionHooks,
    ) -> Result<Arc<dyn TransportSession>>;
}

/// One live connection to the bus.
pub trait TransportSession: Send + Sync + 'static {
    /// Current readiness.
    fn ready_state(&self) -> ReadyState;

    /// Closes the session. The close hook fires once it is closed.
    fn close(&self);

    /// Drops the hooks; no lifecycle callbacks fire afterwards.
    fn detach(&self);

    /// Sends credentials; `reply` receives the login reply.
    ///
    /// The returned handle drops `reply` if the caller stops waiting.
    fn login(&self, username: &str, password: &str, reply: ReplyHandler) -> CancelReply;

    /// Sends a point-to-point message; `reply` receives the answer.
    ///
    /// The returned handle drops `reply` if the caller stops waiting.
    fn send(&self, address: &str, body: Value, reply: ReplyHandler) -> CancelReply;

    /// Publishes a message to every handler of `address`.
    fn publish(&self, address: &str, body: Value);

    /// Attaches a handler to `address`.
    fn register_handler(&self, address: &str, handler: Handler);

    /// Detaches a handler from `address`.
    fn unregister_handler(&self, address: &str, handler: &Handler);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    #[test]
    fn test_handler_identity() {
        let a = Handler::new(|_| {});
        let b = Handler::new(|_| {});

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_handler_call() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handler = Handler::new(move |message| {
            assert_eq!(message.body, json!("ping"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handler.call(&Message::new("a", json!("ping")));
        handler.clone().call(&Message::new("a", json!("ping")));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_hooks_fire() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let (o, c) = (Arc::clone(&opened), Arc::clone(&closed));
        let hooks = SessionHooks::new(
            move || {
                o.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        hooks.open();
        hooks.clone().close();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
