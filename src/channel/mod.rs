//! Agent channel adapter
//!
//! A channel is one duplex, message-oriented connection to the remote agent.
//! Adapters translate inbound frames into [`ChannelEvent`]s posted to the
//! controller and accept [`OutboundFrame`]s once the connection is ready.

mod websocket;

pub use websocket::{CONNECT_TIMEOUT, WsChannel, WsConnector};

use url::Url;

use crate::Fault;
use crate::conversation::EventSink;
use crate::protocol::{InboundFrame, OutboundFrame};

/// Lifecycle and inbound traffic of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connection established; outbound frames are accepted from now on
    Ready,
    /// A classified inbound frame
    Frame(InboundFrame),
    /// The remote side closed the connection
    Closed,
    /// The connection failed (timeout while opening, or transport error)
    Failed(Fault),
}

/// Opens channels to the agent
pub trait ChannelConnector: Send {
    /// Begin opening a channel to `endpoint`
    ///
    /// Returns immediately. Readiness or failure arrives later through `events`.
    fn open(&mut self, endpoint: &Url, events: EventSink) -> Box<dyn AgentChannel>;
}

/// An open or opening channel, exclusively owned by the controller
pub trait AgentChannel: Send {
    /// Queue a frame; returns false when the channel is not ready and the frame was dropped
    fn send(&mut self, frame: OutboundFrame) -> bool;

    /// Whether the connection is open and ready
    fn is_open(&self) -> bool;

    /// Close the channel; safe to call repeatedly or while still opening
    fn close(&mut self);
}
