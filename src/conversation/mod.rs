//! Conversation controller
//!
//! A synchronous state machine that owns the channel, capture loop, playback
//! sink and silence watchdog. Subsystems post events; the controller applies
//! them one at a time and is the only place conversation state changes.

mod event;
mod notify;
mod state;

pub use event::{Event, EventKind, EventSink, SessionId};
pub use notify::{Handler, ListenerId, Listeners, Notification, NotificationKind};
pub use state::ConversationState;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::Fault;
use crate::channel::{AgentChannel, ChannelConnector, ChannelEvent};
use crate::config::Config;
use crate::protocol::{AgentMessage, CallState, InboundFrame, OutboundFrame};
use crate::voice::{
    AudioSink, CaptureLoop, CaptureOutput, PlaybackOutcome, PlaybackSink, RecognitionEvent,
    SpeechRecognizer,
};
use crate::watchdog::Watchdog;

/// The external capabilities a controller drives
pub struct Subsystems {
    pub connector: Box<dyn ChannelConnector>,
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub sink: Arc<dyn AudioSink>,
}

/// Conversation state machine
pub struct Controller {
    config: Config,
    state: ConversationState,
    session: SessionId,
    events: mpsc::UnboundedSender<Event>,
    connector: Box<dyn ChannelConnector>,
    channel: Option<Box<dyn AgentChannel>>,
    capture: CaptureLoop,
    playback: PlaybackSink,
    watchdog: Watchdog,
    listeners: Listeners,
    state_tx: watch::Sender<ConversationState>,
}

impl Controller {
    /// Create an idle controller
    ///
    /// Returns the receiving end of the event queue; every event read from it
    /// must be passed back to [`Controller::handle`].
    #[must_use]
    pub fn new(config: Config, subsystems: Subsystems) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConversationState::Idle);

        let controller = Self {
            config,
            state: ConversationState::Idle,
            session: 0,
            events,
            connector: subsystems.connector,
            channel: None,
            capture: CaptureLoop::new(subsystems.recognizer),
            playback: PlaybackSink::new(subsystems.sink),
            watchdog: Watchdog::new(),
            listeners: Listeners::new(),
            state_tx,
        };

        (controller, rx)
    }

    /// Begin a session; no-op unless idle
    pub fn connect(&mut self) {
        if self.state != ConversationState::Idle {
            tracing::debug!(state = %self.state, "connect ignored, session active");
            return;
        }

        self.session += 1;
        tracing::debug!(session = self.session, endpoint = %self.config.endpoint, "connecting");

        self.set_state(ConversationState::Connecting);
        let events = self.sink();
        self.channel = Some(self.connector.open(&self.config.endpoint, events));
    }

    /// Release everything and return to idle; always safe
    pub fn disconnect(&mut self) {
        tracing::debug!(session = self.session, state = %self.state, "disconnect requested");
        self.release();
        self.set_state(ConversationState::Idle);
    }

    /// Connect from idle, disconnect otherwise
    pub fn toggle(&mut self) {
        if self.state == ConversationState::Idle {
            self.connect();
        } else {
            self.disconnect();
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConversationState {
        self.state
    }

    /// Whether a channel exists and is ready
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|channel| channel.is_open())
    }

    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Register a notification listener
    pub fn on<F>(&mut self, kind: NotificationKind, handler: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + 'static,
    {
        self.listeners.on(kind, handler)
    }

    /// Register a listener under a caller-allocated id
    pub fn insert_listener(&mut self, id: ListenerId, kind: NotificationKind, handler: Handler) {
        self.listeners.insert(id, kind, handler);
    }

    /// Remove a listener; returns false if it was not registered
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    /// Observe state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConversationState> {
        self.state_tx.subscribe()
    }

    /// Whether the capture loop is running
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.capture.is_active()
    }

    /// Whether a playback render is in flight
    #[must_use]
    pub const fn is_playing(&self) -> bool {
        self.playback.is_active()
    }

    /// Whether the silence deadline is pending
    #[must_use]
    pub const fn watchdog_armed(&self) -> bool {
        self.watchdog.is_armed()
    }

    /// Whether a channel handle exists, ready or not
    #[must_use]
    pub const fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Apply one event from an owned subsystem
    pub fn handle(&mut self, event: Event) {
        if event.session != self.session || self.state == ConversationState::Idle {
            tracing::trace!(
                event_session = event.session,
                session = self.session,
                "stale event dropped"
            );
            return;
        }

        match event.kind {
            EventKind::Channel(event) => self.on_channel(event),
            EventKind::Recognition { run, event } => self.on_recognition(run, event),
            EventKind::PlaybackFinished { playback, outcome } => {
                self.on_playback_finished(playback, outcome);
            }
            EventKind::WatchdogFired { generation } => self.on_watchdog(generation),
        }
    }

    fn on_channel(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Ready => self.on_ready(),
            ChannelEvent::Frame(InboundFrame::Audio(payload)) => self.on_audio(payload),
            ChannelEvent::Frame(InboundFrame::Message(message)) => self.on_message(message),
            ChannelEvent::Closed => {
                tracing::info!(session = self.session, "agent closed the channel");
                self.release();
                self.set_state(ConversationState::Idle);
            }
            ChannelEvent::Failed(fault) => self.fail(fault),
        }
    }

    fn on_ready(&mut self) {
        if self.state != ConversationState::Connecting {
            tracing::debug!(state = %self.state, "duplicate ready ignored");
            return;
        }

        let metadata = OutboundFrame::Metadata {
            agent_id: self.config.agent_id.clone(),
            language: self.config.language.clone(),
        };
        let sent = self
            .channel
            .as_mut()
            .is_some_and(|channel| channel.send(metadata));
        if !sent {
            tracing::warn!("metadata frame not sent");
        }

        let events = self.sink();
        if let Err(e) = self.capture.start(&events) {
            self.fail(Fault::CaptureUnavailable(e.to_string()));
            return;
        }

        self.set_state(ConversationState::Listening);
        self.watchdog.arm(self.config.silence_timeout, &events);
    }

    fn on_audio(&mut self, payload: Vec<u8>) {
        if !self.is_connected() {
            tracing::debug!(bytes = payload.len(), "audio before ready dropped");
            return;
        }

        self.set_state(ConversationState::Speaking);
        self.capture.stop();

        let events = self.sink();
        self.playback.play(payload, &events);
    }

    fn on_message(&mut self, message: AgentMessage) {
        match message {
            AgentMessage::State { call_state } => {
                let Some(announced) = CallState::from_wire(&call_state) else {
                    tracing::debug!(call_state, "unrecognized call state ignored");
                    return;
                };
                self.on_announcement(announced.conversation_state());
            }
            AgentMessage::Response { content } => {
                self.emit(&Notification::Response { text: content });
            }
            AgentMessage::Unknown => {}
        }
    }

    fn on_announcement(&mut self, target: ConversationState) {
        self.set_state(target);

        if target != ConversationState::Listening {
            return;
        }

        let events = self.sink();
        if !self.capture.is_active() && !self.playback.is_active() {
            self.resume_capture(&events);
        }
        if !self.watchdog.is_armed() {
            self.watchdog.arm(self.config.silence_timeout, &events);
        }
    }

    /// Best-effort capture start after the agent hands the turn back
    fn resume_capture(&mut self, events: &EventSink) {
        if let Err(e) = self.capture.start(events) {
            tracing::warn!(error = %e, "capture resume failed");
        }
    }

    fn on_recognition(&mut self, run: u64, event: RecognitionEvent) {
        let keep_listening = self.state == ConversationState::Listening;

        match self.capture.on_event(run, event, keep_listening) {
            None => {}
            Some(CaptureOutput::Utterance(text)) => self.on_utterance(text),
            Some(CaptureOutput::Fatal(code)) => self.fail(Fault::Capture(code)),
        }
    }

    fn on_utterance(&mut self, text: String) {
        let events = self.sink();
        self.watchdog.arm(self.config.silence_timeout, &events);

        if self.state != ConversationState::Listening {
            tracing::debug!(state = %self.state, "utterance outside listening not forwarded");
            return;
        }

        let sent = self
            .channel
            .as_mut()
            .is_some_and(|channel| channel.send(OutboundFrame::Utterance(text.clone())));

        if sent {
            tracing::debug!(chars = text.len(), "utterance forwarded");
            self.emit(&Notification::Transcript { text });
        } else {
            tracing::warn!("channel not ready, utterance dropped");
        }
    }

    fn on_playback_finished(&mut self, playback: u64, outcome: PlaybackOutcome) {
        if !self.playback.finish(playback) {
            tracing::trace!(playback, "stale playback finish");
            return;
        }

        if let PlaybackOutcome::Failed(reason) = &outcome {
            tracing::warn!(playback, reason, "playback failed, resuming listening");
        }

        match self.state {
            ConversationState::Speaking => self.set_state(ConversationState::Listening),
            ConversationState::Listening => {}
            _ => return,
        }

        let events = self.sink();
        if let Err(e) = self.capture.start(&events) {
            self.fail(Fault::CaptureUnavailable(e.to_string()));
            return;
        }
        self.watchdog.arm(self.config.silence_timeout, &events);
    }

    fn on_watchdog(&mut self, generation: u64) {
        if !self.watchdog.fired(generation) {
            return;
        }

        if self.state != ConversationState::Listening {
            tracing::debug!(state = %self.state, "silence timeout outside listening ignored");
            return;
        }

        tracing::info!(
            timeout_ms = self.config.silence_timeout.as_millis(),
            "silence timeout, ending conversation"
        );
        self.release();
        self.set_state(ConversationState::Idle);
    }

    /// End the session on an unrecoverable fault
    fn fail(&mut self, fault: Fault) {
        tracing::error!(session = self.session, error = %fault, "conversation failed");
        self.release();
        self.set_state(ConversationState::Idle);
        self.emit(&Notification::Error { reason: fault });
    }

    /// Release every owned resource; idempotent
    fn release(&mut self) {
        // Events still queued from released handles become stale
        self.session += 1;

        self.playback.stop();
        self.capture.stop();
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.watchdog.cancel();
    }

    fn set_state(&mut self, to: ConversationState) {
        let from = self.state;
        if from == to {
            return;
        }

        self.state = to;
        tracing::info!(%from, %to, "conversation state changed");
        self.state_tx.send_replace(to);
        self.emit(&Notification::StateChanged { from, to });
    }

    fn emit(&self, notification: &Notification) {
        self.listeners.emit(notification);
    }

    fn sink(&self) -> EventSink {
        EventSink::new(self.session, self.events.clone())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.release();
    }
}
