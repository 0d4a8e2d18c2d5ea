//! Observer registry for conversation notifications
//!
//! Each controller owns its own listener list. Delivery follows registration
//! order and a panicking listener is isolated from the others.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use super::ConversationState;
use crate::{Error, Fault};

/// Notification names listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Transcript,
    Response,
    Error,
    State,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcript => "transcript",
            Self::Response => "response",
            Self::Error => "error",
            Self::State => "state",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcript" => Ok(Self::Transcript),
            "response" => Ok(Self::Response),
            "error" => Ok(Self::Error),
            "state" => Ok(Self::State),
            other => Err(Error::Config(format!("unknown notification: {other}"))),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification emitted by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// An utterance was forwarded to the agent
    Transcript { text: String },
    /// The agent replied with text
    Response { text: String },
    /// The session ended on a fault
    Error { reason: Fault },
    /// The conversation state changed
    StateChanged {
        from: ConversationState,
        to: ConversationState,
    },
}

impl Notification {
    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::Transcript { .. } => NotificationKind::Transcript,
            Self::Response { .. } => NotificationKind::Response,
            Self::Error { .. } => NotificationKind::Error,
            Self::StateChanged { .. } => NotificationKind::State,
        }
    }
}

/// Handle returned by registration, used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-unique id
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Listener callback
pub type Handler = Box<dyn Fn(&Notification) + Send + 'static>;

struct Entry {
    id: ListenerId,
    kind: NotificationKind,
    handler: Handler,
}

/// Registered listeners, in registration order
#[derive(Default)]
pub struct Listeners {
    entries: Vec<Entry>,
}

impl Listeners {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`
    pub fn on<F>(&mut self, kind: NotificationKind, handler: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + 'static,
    {
        let id = ListenerId::next();
        self.insert(id, kind, Box::new(handler));
        id
    }

    /// Register a handler under an id allocated by the caller
    pub fn insert(&mut self, id: ListenerId, kind: NotificationKind, handler: Handler) {
        self.entries.push(Entry { id, kind, handler });
    }

    /// Remove a listener; returns false if it was not registered
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver to every listener of the notification's kind
    ///
    /// Returns how many listeners returned normally.
    pub fn emit(&self, notification: &Notification) -> usize {
        let kind = notification.kind();
        let mut delivered = 0;

        for entry in self.entries.iter().filter(|entry| entry.kind == kind) {
            match catch_unwind(AssertUnwindSafe(|| (entry.handler)(notification))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(
                        listener = entry.id.0,
                        notification = %kind,
                        "listener panicked"
                    );
                }
            }
        }

        delivered
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.entries.len())
            .finish()
    }
}
