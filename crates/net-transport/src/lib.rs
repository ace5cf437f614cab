//! Network Transport - TCP plumbing for duochat
//!
//! Provides deadline-bounded connection establishment for both roles,
//! the stream half of the key exchange, and message framing.

mod countdown;
mod error;
mod establish;
mod framing;
mod handshake;

pub use countdown::*;
pub use error::*;
pub use establish::*;
pub use framing::*;
pub use handshake::*;

use std::time::Duration;

/// Pause between failed connect attempts
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(500);

/// Bound on the whole key exchange once connected
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Size of the length header used by length-prefixed framing
pub const LENGTH_PREFIX_SIZE: usize = 4;
