//! Shared Protocol Definitions for duochat
//!
//! This crate contains the wire frames, session types and input
//! classification shared by the transport, crypto and chat layers.

mod error;
mod frames;
mod input;
mod session;

pub use error::*;
pub use frames::*;
pub use input::*;
pub use session::*;

/// Default TCP port for hosting and connecting
pub const DEFAULT_PORT: u16 = 9000;

/// Default bound on accept/connect waits, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default receive buffer; one read must hold one whole message frame
pub const RECEIVE_BUFFER_SIZE: usize = 2048;

/// Upper bound on the responder's public key frame (base64 SPKI + newline)
pub const MAX_PUBLIC_KEY_FRAME: usize = 1024;

/// Upper bound on the initiator's encrypted session key frame
pub const MAX_SESSION_KEY_FRAME: usize = 512;

/// Reserved plaintext that ends a session when either side decrypts it
pub const EXIT_SENTINEL: &str = "__exit__";
