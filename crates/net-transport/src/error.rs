//! Transport error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Accept error: {0}")]
    Accept(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub(crate) fn handshake(reason: impl std::fmt::Display) -> Self {
        Self::HandshakeFailed(reason.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
