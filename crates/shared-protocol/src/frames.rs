//! Wire frames exchanged during the handshake and the chat

use bytes::Bytes;

use crate::{MAX_PUBLIC_KEY_FRAME, MAX_SESSION_KEY_FRAME, ProtocolError, ProtocolResult};

/// Responder's public key in its transportable text form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyFrame {
    encoded: String,
}

impl PublicKeyFrame {
    pub const TERMINATOR: u8 = b'\n';

    pub fn new(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    /// The encoded key without the terminator
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Serialize for transmission, terminator included
    pub fn to_bytes(&self) -> Bytes {
        let mut data = Vec::with_capacity(self.encoded.len() + 1);
        data.extend_from_slice(self.encoded.as_bytes());
        data.push(Self::TERMINATOR);
        Bytes::from(data)
    }

    /// Parse received bytes; surrounding whitespace and the terminator are dropped
    pub fn from_bytes(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() > MAX_PUBLIC_KEY_FRAME {
            return Err(ProtocolError::FrameTooLarge {
                size: data.len(),
                max: MAX_PUBLIC_KEY_FRAME,
            });
        }

        let text = std::str::from_utf8(data)
            .map_err(|e| ProtocolError::MalformedFrame(format!("public key is not UTF-8: {}", e)))?;
        let encoded = text.trim();
        if encoded.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        Ok(Self::new(encoded))
    }
}

/// Session key material encrypted for the responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyFrame {
    ciphertext: Bytes,
}

impl SessionKeyFrame {
    pub fn new(ciphertext: impl Into<Bytes>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn to_bytes(&self) -> Bytes {
        self.ciphertext.clone()
    }

    pub fn from_bytes(data: &[u8]) -> ProtocolResult<Self> {
        if data.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        if data.len() > MAX_SESSION_KEY_FRAME {
            return Err(ProtocolError::FrameTooLarge {
                size: data.len(),
                max: MAX_SESSION_KEY_FRAME,
            });
        }

        Ok(Self::new(Bytes::copy_from_slice(data)))
    }
}

/// One encrypted chat message exactly as it travels on the wire
///
/// The payload is opaque here; the session cipher owns its encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFrame {
    payload: Bytes,
}

impl MessageFrame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_bytes(self) -> Bytes {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
