//! Line-based speech recognizer for terminals
//!
//! Each line read from standard input is treated as one finalized utterance.
//! Stands in for a platform speech engine when running in a shell.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use super::{RecognitionError, RecognitionEvent, RecognitionSink, SpeechRecognizer};
use crate::{Error, Result};

/// Recognizes typed lines as speech
pub struct LineRecognizer {
    current: watch::Sender<Option<RecognitionSink>>,
    reader: Option<Box<dyn AsyncBufRead + Send + Unpin>>,
    eof: Arc<AtomicBool>,
}

impl LineRecognizer {
    /// Read utterances from standard input
    #[must_use]
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    /// Read utterances from any buffered reader
    #[must_use]
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let (current, _) = watch::channel(None);
        Self {
            current,
            reader: Some(Box::new(reader)),
            eof: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_reader(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        let current = self.current.subscribe();
        let eof = Arc::clone(&self.eof);

        tokio::spawn(async move {
            let mut lines = reader.lines();
            let reason = loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let sink = current.borrow().clone();
                        match sink {
                            Some(sink) => {
                                sink.emit(RecognitionEvent::Result {
                                    transcript: line,
                                    is_final: true,
                                });
                            }
                            None => tracing::debug!("not listening, input line discarded"),
                        }
                    }
                    Ok(None) => break "input closed".to_string(),
                    Err(e) => break format!("input error: {e}"),
                }
            };

            eof.store(true, Ordering::Release);
            tracing::debug!(reason, "line recognizer finished");
            if let Some(sink) = current.borrow().clone() {
                sink.emit(RecognitionEvent::Error(RecognitionError::Other(reason)));
            }
        });
    }
}

impl SpeechRecognizer for LineRecognizer {
    fn start(&mut self, sink: RecognitionSink) -> Result<()> {
        if self.eof.load(Ordering::Acquire) {
            return Err(Error::Capture("input closed".to_string()));
        }

        self.current.send_replace(Some(sink));
        self.spawn_reader();
        Ok(())
    }

    fn stop(&mut self) {
        self.current.send_replace(None);
    }
}
