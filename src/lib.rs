//! Beacon Call - Spoken conversations with remote voice agents
//!
//! This library provides the client side of a voice call:
//! - A conversation controller (idle, connecting, listening, thinking, speaking)
//! - A WebSocket channel to the agent
//! - Speech capture with transparent restarts
//! - Playback of agent audio and a silence watchdog
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Presentation shell                   │
//! │   connect  │  disconnect  │  on/off  │  state        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │            VoiceAgent / Controller                   │
//! │   Channel  │  Capture  │  Playback  │  Watchdog      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Remote voice agent                      │
//! │   metadata  │  utterances  │  state  │  audio        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod error;
pub mod protocol;
pub mod voice;
pub mod watchdog;

pub use agent::VoiceAgent;
pub use config::Config;
pub use conversation::{
    Controller, ConversationState, ListenerId, Notification, NotificationKind, Subsystems,
};
pub use error::{Error, Fault, Result};
