//! Session roles, states and configuration

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ProtocolError, ProtocolResult, RECEIVE_BUFFER_SIZE};

/// Local identifier for one chat session, used only for log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First UUID group, enough to tell sessions apart in logs
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Session role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionRole {
    /// Connecting peer; generates the session key
    Initiator,
    /// Listening peer; publishes its public key
    Responder,
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Responder => write!(f, "responder"),
        }
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Both operations are live
    Running,
    /// Shutdown was signalled; waiting for the receive operation to stop
    ShuttingDown,
    /// Receive operation has stopped
    Closed,
}

impl SessionState {
    /// Whether `to` is reachable from `self` in one step
    pub fn can_transition_to(self, to: SessionState) -> bool {
        matches!(
            (self, to),
            (Self::Running, Self::ShuttingDown) | (Self::ShuttingDown, Self::Closed)
        )
    }

    /// Validate and perform a transition
    pub fn transition(self, to: SessionState) -> ProtocolResult<SessionState> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(ProtocolError::InvalidStateTransition { from: self, to })
        }
    }
}

/// Why a session ended; the first signalled reason wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownReason {
    /// Local user issued the quit directive
    LocalQuit,
    /// Local input reached end-of-input
    InputClosed,
    /// Peer sent the exit sentinel
    PeerExited,
    /// Stream returned a zero-length read
    PeerClosed,
    /// Writing a message frame failed
    SendFailed,
    /// Reading from the stream failed
    ReceiveFailed,
    /// A frame failed to decrypt under the terminate policy
    DecryptionFailed,
    /// Shutdown requested from outside the session
    Cancelled,
}

impl ShutdownReason {
    /// True when the local side chose to leave
    pub fn is_local(self) -> bool {
        matches!(self, Self::LocalQuit | Self::InputClosed | Self::Cancelled)
    }
}

/// What the receive operation does with a frame that fails to decrypt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecryptFailurePolicy {
    /// Report the frame and keep receiving
    #[default]
    Skip,
    /// Report the frame and end the session
    Terminate,
}

/// How message frames are delimited on the stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One read is one frame; the plain wire format
    #[default]
    ReadBoundary,
    /// 4-byte little-endian length before every frame; both peers must opt in
    LengthPrefixed,
}

impl std::str::FromStr for DecryptFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "terminate" => Ok(Self::Terminate),
            other => Err(format!("unknown decrypt failure policy '{}' (expected skip or terminate)", other)),
        }
    }
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read-boundary" => Ok(Self::ReadBoundary),
            "length-prefixed" => Ok(Self::LengthPrefixed),
            other => Err(format!(
                "unknown framing '{}' (expected read-boundary or length-prefixed)",
                other
            )),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Receive buffer capacity; also the largest accepted frame
    pub receive_buffer_size: usize,
    /// Handling of undecryptable frames
    pub decrypt_failure_policy: DecryptFailurePolicy,
    /// Message frame delimiting
    pub framing: Framing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: RECEIVE_BUFFER_SIZE,
            decrypt_failure_policy: DecryptFailurePolicy::default(),
            framing: Framing::default(),
        }
    }
}
