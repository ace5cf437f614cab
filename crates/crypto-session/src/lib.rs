//! Crypto Session - secure channel bootstrap for duochat
//!
//! RSA-OAEP (SHA-256) transports a fresh AES-256-CBC session key from the
//! initiator to the responder; the session cipher then protects every chat
//! message.

mod cipher;
mod error;
mod handshake;
mod keys;

pub use cipher::*;
pub use error::*;
pub use handshake::*;
pub use keys::*;

/// RSA modulus size for freshly generated keypairs
pub const RSA_KEY_BITS: usize = 2048;

/// Symmetric key size (256 bits / 32 bytes)
pub const SESSION_KEY_SIZE: usize = 32;

/// Initialization vector size (one AES block / 16 bytes)
pub const IV_SIZE: usize = 16;

/// Session key payload carried by the session key frame: key || iv
pub const SESSION_KEY_PAYLOAD_SIZE: usize = SESSION_KEY_SIZE + IV_SIZE;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// SHA-256 output size, used in the OAEP overhead
const OAEP_HASH_SIZE: usize = 32;

/// Largest payload OAEP-SHA256 can carry under a modulus of `modulus_bytes`
pub const fn max_oaep_payload(modulus_bytes: usize) -> usize {
    modulus_bytes.saturating_sub(2 * OAEP_HASH_SIZE + 2)
}
