//! WebSocket channel to the agent

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{AgentChannel, ChannelConnector, ChannelEvent};
use crate::Fault;
use crate::conversation::EventSink;
use crate::protocol::{self, InboundFrame, OutboundFrame};

/// How long a channel may take to become ready
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens [`WsChannel`]s
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Use a different connect timeout (tests, slow links)
    #[must_use]
    pub const fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl ChannelConnector for WsConnector {
    fn open(&mut self, endpoint: &Url, events: EventSink) -> Box<dyn AgentChannel> {
        Box::new(WsChannel::open(endpoint, self.connect_timeout, events))
    }
}

/// A WebSocket connection driven by a background IO task
pub struct WsChannel {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    open: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WsChannel {
    /// Start connecting to `endpoint`
    ///
    /// Posts `Ready` once the handshake completes, or `Failed` on timeout or error.
    #[must_use]
    pub fn open(endpoint: &Url, connect_timeout: Duration, events: EventSink) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        tracing::debug!(
            session = events.session(),
            url = %endpoint,
            timeout_ms = connect_timeout.as_millis(),
            "opening channel"
        );

        let task = tokio::spawn(run_socket(
            endpoint.to_string(),
            connect_timeout,
            outbound_rx,
            Arc::clone(&open),
            events,
        ));

        Self {
            outbound: Some(outbound_tx),
            open,
            task,
        }
    }
}

impl AgentChannel for WsChannel {
    fn send(&mut self, frame: OutboundFrame) -> bool {
        if !self.is_open() {
            tracing::debug!("channel not ready, frame dropped");
            return false;
        }
        let Some(outbound) = &self.outbound else {
            return false;
        };

        match frame.to_text() {
            Ok(text) => outbound.send(Message::Text(text)).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound frame");
                false
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        if self.outbound.take().is_none() {
            return;
        }

        if was_open {
            // IO task sends a close frame once the outbound queue is dropped
            tracing::debug!("closing channel");
        } else {
            self.task.abort();
            tracing::debug!("channel open cancelled");
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connect, then pump frames in both directions until either side closes
async fn run_socket(
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    open: Arc<AtomicBool>,
    events: EventSink,
) {
    let stream = match tokio::time::timeout(connect_timeout, connect_async(url.as_str())).await
    {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            tracing::warn!(url, error = %e, "channel connect failed");
            events.channel(ChannelEvent::Failed(Fault::Transport(e.to_string())));
            return;
        }
        Err(_) => {
            tracing::warn!(
                url,
                timeout_ms = connect_timeout.as_millis(),
                "channel connect timed out"
            );
            events.channel(ChannelEvent::Failed(Fault::ConnectTimeout(connect_timeout)));
            return;
        }
    };

    open.store(true, Ordering::Release);
    tracing::debug!(url, "channel ready");
    events.channel(ChannelEvent::Ready);

    let (mut write, mut read) = stream.split();

    let ended = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    tracing::trace!(bytes = data.len(), "audio frame received");
                    events.channel(ChannelEvent::Frame(InboundFrame::Audio(data)));
                }
                Some(Ok(Message::Text(text))) => {
                    if let Some(frame) = protocol::classify_text(&text) {
                        events.channel(ChannelEvent::Frame(frame));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "agent closed channel");
                    break Some(ChannelEvent::Closed);
                }
                None => break Some(ChannelEvent::Closed),
                Some(Ok(_)) => {} // Ping/Pong handled by tungstenite
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "channel read failed");
                    break Some(ChannelEvent::Failed(Fault::Transport(e.to_string())));
                }
            },
            frame = outbound.recv() => match frame {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        tracing::warn!(error = %e, "channel write failed");
                        break Some(ChannelEvent::Failed(Fault::Transport(e.to_string())));
                    }
                }
                None => {
                    let _ = write.close().await;
                    tracing::debug!(url, "channel closed locally");
                    break None;
                }
            },
        }
    };

    open.store(false, Ordering::Release);
    if let Some(event) = ended {
        events.channel(event);
    }
}
