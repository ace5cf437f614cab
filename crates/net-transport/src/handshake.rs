//! Key exchange over a connected stream
//!
//! Wire order: responder sends its public key frame (newline terminated),
//! initiator answers with the sealed session key frame. Nothing else is
//! exchanged before chat traffic starts.

use std::time::Duration;

use crypto_session::{InitiatorHandshake, ResponderHandshake, SessionCipher};
use shared_protocol::{MAX_PUBLIC_KEY_FRAME, PublicKeyFrame, SessionKeyFrame};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::{TransportError, TransportResult};

/// What both sides hold once the key exchange succeeded
#[derive(Debug)]
pub struct HandshakeOutcome {
    pub cipher: SessionCipher,
    /// Fingerprint of the responder's public key
    pub fingerprint: String,
}

/// Run the responder side: publish a fresh public key, receive the session key
pub async fn perform_responder_handshake<S>(
    stream: &mut S,
    timeout: Duration,
) -> TransportResult<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, responder_exchange(stream))
        .await
        .map_err(|_| TransportError::handshake(format!("timed out after {:?}", timeout)))?
}

/// Run the initiator side: read the responder key, send a sealed session key
pub async fn perform_initiator_handshake<S>(
    stream: &mut S,
    timeout: Duration,
) -> TransportResult<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, initiator_exchange(stream))
        .await
        .map_err(|_| TransportError::handshake(format!("timed out after {:?}", timeout)))?
}

async fn responder_exchange<S>(stream: &mut S) -> TransportResult<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // RSA key generation is CPU bound
    let handshake = tokio::task::spawn_blocking(ResponderHandshake::new)
        .await
        .map_err(TransportError::handshake)?
        .map_err(TransportError::handshake)?;
    let fingerprint = handshake.fingerprint();
    debug!("Generated key pair {}", fingerprint);

    stream
        .write_all(&handshake.public_key_frame().to_bytes())
        .await
        .map_err(|e| TransportError::handshake(format!("sending public key: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| TransportError::handshake(format!("sending public key: {}", e)))?;

    // Read exactly one ciphertext so early chat bytes stay in the stream
    let mut sealed = vec![0u8; handshake.session_key_frame_len()];
    stream.read_exact(&mut sealed).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::handshake("peer closed before sending the session key")
        } else {
            TransportError::handshake(format!("receiving session key: {}", e))
        }
    })?;

    let frame = SessionKeyFrame::from_bytes(&sealed).map_err(TransportError::handshake)?;
    let cipher = handshake.complete(&frame).map_err(TransportError::handshake)?;

    info!("Secure session established (responder key {})", fingerprint);
    Ok(HandshakeOutcome {
        cipher,
        fingerprint,
    })
}

async fn initiator_exchange<S>(stream: &mut S) -> TransportResult<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = read_public_key_line(stream).await?;
    let frame = PublicKeyFrame::from_bytes(&line).map_err(TransportError::handshake)?;

    let handshake = InitiatorHandshake::accept(&frame).map_err(TransportError::handshake)?;
    let fingerprint = handshake.fingerprint();
    debug!("Received responder key {}", fingerprint);

    let (key_frame, cipher) = handshake.complete().map_err(TransportError::handshake)?;

    stream
        .write_all(key_frame.as_bytes())
        .await
        .map_err(|e| TransportError::handshake(format!("sending session key: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| TransportError::handshake(format!("sending session key: {}", e)))?;

    info!("Secure session established (responder key {})", fingerprint);
    Ok(HandshakeOutcome {
        cipher,
        fingerprint,
    })
}

/// Read up to and including the terminator of the public key frame
///
/// The responder sends nothing after its key until it hears back, so any
/// bytes past the terminator are a protocol violation.
async fn read_public_key_line<R>(reader: &mut R) -> TransportResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| TransportError::handshake(format!("receiving public key: {}", e)))?;
        if n == 0 {
            return Err(TransportError::handshake(
                "peer closed before sending its public key",
            ));
        }

        line.extend_from_slice(&chunk[..n]);

        if let Some(pos) = line.iter().position(|&b| b == PublicKeyFrame::TERMINATOR) {
            if pos + 1 != line.len() {
                return Err(TransportError::handshake(
                    "unexpected data after public key",
                ));
            }
            return Ok(line);
        }

        if line.len() > MAX_PUBLIC_KEY_FRAME {
            return Err(TransportError::handshake(format!(
                "public key frame exceeds {} bytes",
                MAX_PUBLIC_KEY_FRAME
            )));
        }
    }
}
