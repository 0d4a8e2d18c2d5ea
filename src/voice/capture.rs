//! Speech capture loop
//!
//! Wraps a [`SpeechRecognizer`] and turns its raw output into finalized
//! utterances. Benign ends restart the recognizer while the conversation still
//! wants to listen; any other recognition error is fatal for the session.

use std::fmt;

use crate::Result;
use crate::conversation::{EventKind, EventSink};

/// Raw output of a speech recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A recognition result; interim results have `is_final == false`
    Result { transcript: String, is_final: bool },
    /// Recognition reported an error
    Error(RecognitionError),
    /// The recognition session ended
    End,
}

/// Recognition error classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Recognition was aborted; always benign
    Aborted,
    /// Any other error code (e.g. "not-allowed", "network")
    Other(String),
}

impl RecognitionError {
    /// Classify a recognizer error code
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        if code == "aborted" {
            Self::Aborted
        } else {
            Self::Other(code.to_string())
        }
    }
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => f.write_str("aborted"),
            Self::Other(code) => f.write_str(code),
        }
    }
}

/// Where a recognizer run posts its output
///
/// Each start of the recognizer gets a fresh run number so late output from a
/// stopped run is never mistaken for the current one.
#[derive(Debug, Clone)]
pub struct RecognitionSink {
    events: EventSink,
    run: u64,
}

impl RecognitionSink {
    #[must_use]
    pub const fn new(events: EventSink, run: u64) -> Self {
        Self { events, run }
    }

    #[must_use]
    pub const fn run(&self) -> u64 {
        self.run
    }

    /// Post recognizer output; returns false once the controller is gone
    pub fn emit(&self, event: RecognitionEvent) -> bool {
        self.events.post(EventKind::Recognition {
            run: self.run,
            event,
        })
    }
}

/// A continuous speech-to-text engine
pub trait SpeechRecognizer: Send {
    /// Begin continuous recognition, posting output to `sink`
    ///
    /// # Errors
    ///
    /// Returns error if recognition cannot start (no microphone, unsupported, ...)
    fn start(&mut self, sink: RecognitionSink) -> Result<()>;

    /// Stop recognition; must tolerate being called when not started
    fn stop(&mut self);
}

/// What the capture loop reports to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutput {
    /// A finalized, trimmed, non-empty utterance
    Utterance(String),
    /// Recognition failed; the session cannot continue
    Fatal(String),
}

/// Owns the recognizer and its restart policy
pub struct CaptureLoop {
    recognizer: Box<dyn SpeechRecognizer>,
    events: Option<EventSink>,
    run: u64,
    running: bool,
    restarts: u64,
}

impl CaptureLoop {
    #[must_use]
    pub fn new(recognizer: Box<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            events: None,
            run: 0,
            running: false,
            restarts: 0,
        }
    }

    /// Start capturing for the session behind `events`
    ///
    /// No-op while a run is already active.
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer cannot start
    pub fn start(&mut self, events: &EventSink) -> Result<()> {
        if self.running {
            return Ok(());
        }

        self.run += 1;
        self.recognizer
            .start(RecognitionSink::new(events.clone(), self.run))?;
        self.events = Some(events.clone());
        self.running = true;

        tracing::debug!(session = events.session(), run = self.run, "capture started");
        Ok(())
    }

    /// Stop capturing; idempotent
    pub fn stop(&mut self) {
        if self.events.take().is_some() || self.running {
            self.recognizer.stop();
            tracing::debug!(run = self.run, "capture stopped");
        }
        self.running = false;
        // Anything still queued from this run is now stale
        self.run += 1;
    }

    /// Whether a recognizer run is active
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.running
    }

    /// How many transparent restarts happened since construction
    #[must_use]
    pub const fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Apply one recognizer event
    ///
    /// `keep_listening` tells the loop whether a benign end should restart
    /// recognition.
    pub fn on_event(
        &mut self,
        run: u64,
        event: RecognitionEvent,
        keep_listening: bool,
    ) -> Option<CaptureOutput> {
        if run != self.run || self.events.is_none() {
            tracing::trace!(run, current = self.run, "stale recognition event");
            return None;
        }

        match event {
            RecognitionEvent::Result {
                transcript,
                is_final,
            } => {
                if !is_final {
                    return None;
                }
                let text = transcript.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(CaptureOutput::Utterance(text.to_string()))
                }
            }
            RecognitionEvent::Error(RecognitionError::Aborted) => {
                tracing::debug!(run, "recognition aborted");
                None
            }
            RecognitionEvent::Error(RecognitionError::Other(code)) => {
                tracing::error!(run, code, "speech recognition failed");
                self.stop();
                Some(CaptureOutput::Fatal(code))
            }
            RecognitionEvent::End => {
                self.running = false;
                if keep_listening {
                    self.restart();
                } else {
                    tracing::debug!(run, "capture ended");
                }
                None
            }
        }
    }

    fn restart(&mut self) {
        let Some(events) = self.events.clone() else {
            return;
        };

        self.run += 1;
        match self
            .recognizer
            .start(RecognitionSink::new(events, self.run))
        {
            Ok(()) => {
                self.running = true;
                self.restarts += 1;
                tracing::debug!(run = self.run, restarts = self.restarts, "capture restarted");
            }
            // The silence watchdog ends the session if speech never resumes
            Err(e) => tracing::warn!(error = %e, "capture restart failed"),
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
