//! Handshake state for both roles, independent of any stream
//!
//! Responder: publish public key, then open the session key frame.
//! Initiator: import the public key, then seal a fresh session key to it.
//! The initiator trusts the first key it sees; nothing here authenticates
//! the responder.

use shared_protocol::{PublicKeyFrame, SessionKeyFrame};
use tracing::debug;

use crate::{CryptoError, CryptoResult, KeyPair, PeerPublicKey, SessionCipher, SessionKey};

/// Responder side of the handshake
#[derive(Debug)]
pub struct ResponderHandshake {
    keypair: KeyPair,
}

impl ResponderHandshake {
    /// Start a new handshake with a freshly generated key pair
    pub fn new() -> CryptoResult<Self> {
        Ok(Self::with_keypair(KeyPair::generate()?))
    }

    pub fn with_keypair(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Frame to send to the initiator
    pub fn public_key_frame(&self) -> PublicKeyFrame {
        PublicKeyFrame::new(self.keypair.export_public_key())
    }

    /// Exact size of the session key frame the initiator must send
    pub fn session_key_frame_len(&self) -> usize {
        self.keypair.ciphertext_len()
    }

    pub fn fingerprint(&self) -> String {
        self.keypair.fingerprint()
    }

    /// Complete the handshake with the initiator's session key frame
    pub fn complete(self, frame: &SessionKeyFrame) -> CryptoResult<SessionCipher> {
        let payload = zeroize::Zeroizing::new(self.keypair.decrypt(frame.as_bytes())?);
        let key = SessionKey::from_bytes(&payload).map_err(|e| {
            CryptoError::HandshakeFailed(format!("bad session key payload: {}", e))
        })?;

        debug!("Responder handshake complete");
        Ok(SessionCipher::new(key))
    }
}

/// Initiator side of the handshake
#[derive(Debug)]
pub struct InitiatorHandshake {
    responder_key: PeerPublicKey,
}

impl InitiatorHandshake {
    /// Import the responder's public key frame
    pub fn accept(frame: &PublicKeyFrame) -> CryptoResult<Self> {
        let responder_key = PeerPublicKey::import(frame.as_str())
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;

        Ok(Self { responder_key })
    }

    /// Fingerprint of the responder key being trusted
    pub fn fingerprint(&self) -> String {
        self.responder_key.fingerprint()
    }

    /// Generate the session key and seal it for the responder
    ///
    /// Returns the frame to send and the cipher built from the same key.
    pub fn complete(self) -> CryptoResult<(SessionKeyFrame, SessionCipher)> {
        let key = SessionKey::generate();
        let sealed = self
            .responder_key
            .encrypt(&key.to_bytes())
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;

        debug!("Initiator handshake complete");
        Ok((SessionKeyFrame::new(sealed), SessionCipher::new(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_and_encryption() {
        let responder = ResponderHandshake::new().unwrap();
        let public_frame = responder.public_key_frame();

        let initiator = InitiatorHandshake::accept(&public_frame).unwrap();
        assert_eq!(initiator.fingerprint(), responder.fingerprint());

        let (key_frame, initiator_cipher) = initiator.complete().unwrap();
        assert_eq!(key_frame.as_bytes().len(), responder.session_key_frame_len());
        let responder_cipher = responder.complete(&key_frame).unwrap();

        // Test initiator -> responder
        let frame = initiator_cipher.encrypt("Hello from initiator!");
        assert_eq!(
            responder_cipher.decrypt(&frame).unwrap(),
            "Hello from initiator!"
        );

        // Test responder -> initiator
        let frame = responder_cipher.encrypt("Hello from responder!");
        assert_eq!(
            initiator_cipher.decrypt(&frame).unwrap(),
            "Hello from responder!"
        );
    }

    #[test]
    fn test_malformed_public_key_frame_fails_handshake() {
        let frame = PublicKeyFrame::new("definitely-not-a-key");
        assert!(matches!(
            InitiatorHandshake::accept(&frame),
            Err(CryptoError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_foreign_session_key_frame_fails_handshake() {
        let responder = ResponderHandshake::new().unwrap();
        let garbage = SessionKeyFrame::new(vec![0x42u8; responder.session_key_frame_len()]);

        assert!(matches!(
            responder.complete(&garbage),
            Err(CryptoError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_wrong_payload_size_fails_handshake() {
        let responder = ResponderHandshake::new().unwrap();
        let public = PeerPublicKey::import(responder.public_key_frame().as_str()).unwrap();

        // Correctly sealed, but not a key || iv payload
        let sealed = public.encrypt(&[9u8; 32]).unwrap();
        let result = responder.complete(&SessionKeyFrame::new(sealed));

        assert!(matches!(result, Err(CryptoError::HandshakeFailed(msg)) if msg.contains("payload")));
    }
}
