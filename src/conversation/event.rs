//! Events posted to the conversation controller
//!
//! Subsystems never touch controller state. They post an [`Event`] through an
//! [`EventSink`] and the controller applies it on its own turn.

use tokio::sync::mpsc;

use crate::channel::ChannelEvent;
use crate::voice::{PlaybackOutcome, RecognitionEvent};

/// Identifies one `connect()`..teardown span
pub type SessionId = u64;

/// An event from an owned subsystem, tagged with the session that produced it
#[derive(Debug)]
pub struct Event {
    pub session: SessionId,
    pub kind: EventKind,
}

#[derive(Debug)]
pub enum EventKind {
    /// Channel adapter lifecycle or inbound frame
    Channel(ChannelEvent),
    /// Speech recognizer output for capture run `run`
    Recognition { run: u64, event: RecognitionEvent },
    /// A playback render resolved
    PlaybackFinished {
        playback: u64,
        outcome: PlaybackOutcome,
    },
    /// The silence watchdog deadline passed
    WatchdogFired { generation: u64 },
}

/// Session-scoped handle for posting events
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    #[must_use]
    pub const fn new(session: SessionId, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { session, tx }
    }

    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Post an event; returns false once the controller is gone
    pub fn post(&self, kind: EventKind) -> bool {
        let delivered = self
            .tx
            .send(Event {
                session: self.session,
                kind,
            })
            .is_ok();

        if !delivered {
            tracing::trace!(session = self.session, "controller gone, event dropped");
        }
        delivered
    }

    /// Post a channel event
    pub fn channel(&self, event: ChannelEvent) -> bool {
        self.post(EventKind::Channel(event))
    }
}
