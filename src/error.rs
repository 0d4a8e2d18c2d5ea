//! Error types for Beacon call

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Beacon call operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Beacon call
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio payload could not be decoded or rendered
    #[error("playback error: {0}")]
    Playback(String),

    /// Speech capture error
    #[error("capture error: {0}")]
    Capture(String),

    /// URL parsing error
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// A condition that ends the current conversation session
///
/// Faults are delivered to listeners through the `error` notification. None of
/// them are retried; a new `connect()` is required afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The channel did not become ready within the connect timeout
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The channel raised a transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Speech recognition reported a non-benign error
    #[error("speech recognition error: {0}")]
    Capture(String),

    /// Speech recognition could not be started
    #[error("speech recognition unavailable: {0}")]
    CaptureUnavailable(String),
}
