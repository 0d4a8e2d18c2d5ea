//! Conversation states

use std::fmt;

/// The single externally observable mode of a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConversationState {
    /// No session; also the recovery state for every failure
    #[default]
    Idle,
    /// Channel is being opened
    Connecting,
    /// Capturing the user's speech
    Listening,
    /// Agent is generating a reply
    Thinking,
    /// Agent audio is playing
    Speaking,
}

impl ConversationState {
    /// Whether a session exists
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Status label shown by presentation shells; idle has none
    #[must_use]
    pub const fn label(self) -> Option<&'static str> {
        match self {
            Self::Idle => None,
            Self::Connecting => Some("Connecting..."),
            Self::Listening => Some("Listening..."),
            Self::Thinking => Some("Thinking..."),
            Self::Speaking => Some("Stop me"),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
