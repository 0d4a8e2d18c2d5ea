//! Shared test utilities
//!
//! Scripted stand-ins for the channel, recognizer and audio sink. Each probe
//! shares its state with the boxed subsystem handed to the controller, so a
//! test can drive and inspect the subsystem after giving it away.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beacon_call::channel::{AgentChannel, ChannelConnector, ChannelEvent};
use beacon_call::conversation::{Event, EventSink};
use beacon_call::protocol::{self, InboundFrame, OutboundFrame};
use beacon_call::voice::{
    AudioSink, RecognitionError, RecognitionEvent, RecognitionSink, SpeechRecognizer,
};
use beacon_call::{
    Config, Controller, ConversationState, Fault, Notification, NotificationKind, Subsystems,
};
use tokio::sync::{Semaphore, mpsc};
use url::Url;

/// Silence timeout used by test configurations
pub const SILENCE: Duration = Duration::from_secs(5);

/// Configuration for agent "abc" with a short silence timeout
#[must_use]
pub fn test_config() -> Config {
    Config {
        agent_id: "abc".to_string(),
        silence_timeout: SILENCE,
        ..Config::default()
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChannelLog {
    endpoints: Vec<Url>,
    sinks: Vec<EventSink>,
    sent: Vec<OutboundFrame>,
    closes: usize,
    open: bool,
}

/// Test-side view of the mock channel
#[derive(Clone, Default)]
pub struct ChannelProbe {
    log: Arc<Mutex<ChannelLog>>,
}

impl ChannelProbe {
    #[must_use]
    pub fn connector(&self) -> Box<dyn ChannelConnector> {
        Box::new(MockConnector {
            log: Arc::clone(&self.log),
        })
    }

    fn latest(&self) -> EventSink {
        self.log
            .lock()
            .unwrap()
            .sinks
            .last()
            .cloned()
            .expect("no channel opened")
    }

    /// Sink of the most recently opened channel
    #[must_use]
    pub fn sink(&self) -> EventSink {
        self.latest()
    }

    /// Complete the handshake of the latest channel
    pub fn ready(&self) {
        self.log.lock().unwrap().open = true;
        self.latest().channel(ChannelEvent::Ready);
    }

    /// Deliver a text frame, classified the way the real adapter does
    pub fn inbound(&self, text: &str) {
        if let Some(frame) = protocol::classify_text(text) {
            self.latest().channel(ChannelEvent::Frame(frame));
        }
    }

    /// Deliver a call-state announcement
    pub fn announce(&self, call_state: &str) {
        self.inbound(&format!(r#"{{"type":"state","call_state":"{call_state}"}}"#));
    }

    /// Deliver a binary audio payload
    pub fn audio(&self, payload: &[u8]) {
        self.latest()
            .channel(ChannelEvent::Frame(InboundFrame::Audio(payload.to_vec())));
    }

    /// Remote side closes the connection
    pub fn remote_close(&self) {
        self.log.lock().unwrap().open = false;
        self.latest().channel(ChannelEvent::Closed);
    }

    /// Transport fails (or the connect deadline passes)
    pub fn fail(&self, fault: Fault) {
        self.log.lock().unwrap().open = false;
        self.latest().channel(ChannelEvent::Failed(fault));
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutboundFrame> {
        self.log.lock().unwrap().sent.clone()
    }

    /// Raw text of every frame sent so far
    #[must_use]
    pub fn sent_text(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|frame| frame.to_text().unwrap())
            .collect()
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().sinks.len()
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }

    #[must_use]
    pub fn endpoints(&self) -> Vec<Url> {
        self.log.lock().unwrap().endpoints.clone()
    }
}

struct MockConnector {
    log: Arc<Mutex<ChannelLog>>,
}

impl ChannelConnector for MockConnector {
    fn open(&mut self, endpoint: &Url, events: EventSink) -> Box<dyn AgentChannel> {
        let mut log = self.log.lock().unwrap();
        log.endpoints.push(endpoint.clone());
        log.sinks.push(events);
        log.open = false;

        Box::new(MockChannel {
            log: Arc::clone(&self.log),
            closed: false,
        })
    }
}

struct MockChannel {
    log: Arc<Mutex<ChannelLog>>,
    closed: bool,
}

impl AgentChannel for MockChannel {
    fn send(&mut self, frame: OutboundFrame) -> bool {
        if !self.is_open() {
            return false;
        }
        self.log.lock().unwrap().sent.push(frame);
        true
    }

    fn is_open(&self) -> bool {
        !self.closed && self.log.lock().unwrap().open
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut log = self.log.lock().unwrap();
            log.closes += 1;
            log.open = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Recognizer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecognizerLog {
    sinks: Vec<RecognitionSink>,
    active: bool,
    stops: usize,
    fail_starts: bool,
}

/// Test-side view of the scripted recognizer
#[derive(Clone, Default)]
pub struct RecognizerProbe {
    log: Arc<Mutex<RecognizerLog>>,
}

impl RecognizerProbe {
    #[must_use]
    pub fn recognizer(&self) -> Box<dyn SpeechRecognizer> {
        Box::new(ScriptedRecognizer {
            log: Arc::clone(&self.log),
        })
    }

    fn latest(&self) -> RecognitionSink {
        self.log
            .lock()
            .unwrap()
            .sinks
            .last()
            .cloned()
            .expect("recognizer never started")
    }

    /// Sink handed to the most recent start
    #[must_use]
    pub fn sink(&self) -> RecognitionSink {
        self.latest()
    }

    /// Recognize a final utterance
    pub fn say(&self, text: &str) {
        self.latest().emit(RecognitionEvent::Result {
            transcript: text.to_string(),
            is_final: true,
        });
    }

    /// Recognize an interim result
    pub fn interim(&self, text: &str) {
        self.latest().emit(RecognitionEvent::Result {
            transcript: text.to_string(),
            is_final: false,
        });
    }

    /// Recognition session ends on its own
    pub fn end(&self) {
        self.log.lock().unwrap().active = false;
        self.latest().emit(RecognitionEvent::End);
    }

    /// Recognition reports an error code
    pub fn error(&self, code: &str) {
        self.latest()
            .emit(RecognitionEvent::Error(RecognitionError::from_code(code)));
    }

    pub fn fail_starts(&self, fail: bool) {
        self.log.lock().unwrap().fail_starts = fail;
    }

    #[must_use]
    pub fn starts(&self) -> usize {
        self.log.lock().unwrap().sinks.len()
    }

    #[must_use]
    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.log.lock().unwrap().active
    }
}

struct ScriptedRecognizer {
    log: Arc<Mutex<RecognizerLog>>,
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn start(&mut self, sink: RecognitionSink) -> beacon_call::Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_starts {
            return Err(beacon_call::Error::Capture("not-allowed".to_string()));
        }
        assert!(!log.active, "recognizer started twice");
        log.sinks.push(sink);
        log.active = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.active = false;
        log.stops += 1;
    }
}

// ---------------------------------------------------------------------------
// Audio sink
// ---------------------------------------------------------------------------

/// Audio sink whose renders finish only when the test allows it
#[derive(Clone)]
pub struct SinkProbe {
    gate: Arc<Semaphore>,
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    active: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl Default for SinkProbe {
    fn default() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            payloads: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl SinkProbe {
    #[must_use]
    pub fn sink(&self) -> Arc<dyn AudioSink> {
        Arc::new(self.clone())
    }

    /// Let one render run to completion
    pub fn finish_one(&self) {
        self.gate.add_permits(1);
    }

    /// Make renders resolve with an error
    pub fn fail_renders(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Payloads whose render started
    #[must_use]
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }

    /// Renders currently in progress
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSink for SinkProbe {
    async fn render(&self, payload: Vec<u8>) -> beacon_call::Result<()> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveGuard(Arc::clone(&self.active));
        self.payloads.lock().unwrap().push(payload);

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| beacon_call::Error::Playback(e.to_string()))?;
        permit.forget();

        if self.fail.load(Ordering::SeqCst) {
            return Err(beacon_call::Error::Playback("device lost".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller harness
// ---------------------------------------------------------------------------

/// A controller wired to probes, pumped by hand
pub struct Harness {
    pub controller: Controller,
    pub events: mpsc::UnboundedReceiver<Event>,
    pub channel: ChannelProbe,
    pub recognizer: RecognizerProbe,
    pub audio: SinkProbe,
    notes: Arc<Mutex<Vec<Notification>>>,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    #[must_use]
    pub fn with_config(config: Config) -> Self {
        let channel = ChannelProbe::default();
        let recognizer = RecognizerProbe::default();
        let audio = SinkProbe::default();

        let (mut controller, events) = Controller::new(
            config,
            Subsystems {
                connector: channel.connector(),
                recognizer: recognizer.recognizer(),
                sink: audio.sink(),
            },
        );

        let notes = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            NotificationKind::Transcript,
            NotificationKind::Response,
            NotificationKind::Error,
            NotificationKind::State,
        ] {
            let notes = Arc::clone(&notes);
            controller.on(kind, move |n| notes.lock().unwrap().push(n.clone()));
        }

        Self {
            controller,
            events,
            channel,
            recognizer,
            audio,
            notes,
        }
    }

    /// Let spawned subsystem tasks run and apply every queued event
    pub async fn pump(&mut self) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
            while let Ok(event) = self.events.try_recv() {
                self.controller.handle(event);
            }
        }
    }

    /// Connect and complete the channel handshake
    pub async fn connect_ready(&mut self) {
        self.controller.connect();
        self.channel.ready();
        self.pump().await;
        assert_eq!(self.controller.state(), ConversationState::Listening);
    }

    /// Drive into the speaking state with one render in flight
    pub async fn speaking_with(&mut self, payload: &[u8]) {
        self.connect_ready().await;
        self.channel.announce("agent_speaking");
        self.channel.audio(payload);
        self.pump().await;
        assert_eq!(self.controller.state(), ConversationState::Speaking);
    }

    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.controller.state()
    }

    #[must_use]
    pub fn notes(&self) -> Vec<Notification> {
        self.notes.lock().unwrap().clone()
    }

    pub fn clear_notes(&self) {
        self.notes.lock().unwrap().clear();
    }

    #[must_use]
    pub fn errors(&self) -> Vec<Fault> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Error { reason } => Some(reason),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn transcripts(&self) -> Vec<String> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Transcript { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn responses(&self) -> Vec<String> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Response { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Every state entered, in order
    #[must_use]
    pub fn states(&self) -> Vec<ConversationState> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Notification::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    /// Assert no owned resource is left behind
    pub fn assert_released(&self) {
        assert!(!self.controller.has_channel(), "channel still held");
        assert!(!self.controller.is_connected(), "still connected");
        assert!(!self.controller.is_capturing(), "capture still active");
        assert!(!self.controller.is_playing(), "playback still active");
        assert!(!self.controller.watchdog_armed(), "watchdog still armed");
        assert!(!self.recognizer.is_active(), "recognizer still running");
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
