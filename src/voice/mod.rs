//! Voice processing module
//!
//! Speech capture turns recognizer output into utterances; playback renders
//! agent audio to the speakers.

mod capture;
mod decode;
mod playback;
mod recognizer;

pub use capture::{
    CaptureLoop, CaptureOutput, RecognitionError, RecognitionEvent, RecognitionSink,
    SpeechRecognizer,
};
pub use decode::{PLAYBACK_SAMPLE_RATE, decode_payload, samples_to_wav, tone};
pub use playback::{AudioSink, CpalSink, NullSink, PlaybackOutcome, PlaybackSink};
pub use recognizer::LineRecognizer;
