//! Symmetric session cipher: AES-256-CBC with PKCS#7, base64 on the wire
//!
//! One (key, iv) pair protects every message of a session in both
//! directions. There is no rekeying and no per-message iv.

use aes::Aes256;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use rand::rngs::OsRng;
use shared_protocol::MessageFrame;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{BLOCK_SIZE, CryptoError, CryptoResult, IV_SIZE, SESSION_KEY_PAYLOAD_SIZE, SESSION_KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Symmetric key and iv for one session
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl SessionKey {
    /// Draw a fresh key and iv from the OS RNG
    pub fn generate() -> Self {
        let mut key = [0u8; SESSION_KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);

        let session_key = Self { key, iv };
        key.zeroize();
        iv.zeroize();
        session_key
    }

    /// Rebuild from the `key || iv` payload carried by the session key frame
    pub fn from_bytes(payload: &[u8]) -> CryptoResult<Self> {
        if payload.len() != SESSION_KEY_PAYLOAD_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SESSION_KEY_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }

        let mut key = [0u8; SESSION_KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        key.copy_from_slice(&payload[..SESSION_KEY_SIZE]);
        iv.copy_from_slice(&payload[SESSION_KEY_SIZE..]);

        let session_key = Self { key, iv };
        key.zeroize();
        iv.zeroize();
        Ok(session_key)
    }

    /// Serialize as `key || iv`
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut payload = Zeroizing::new(Vec::with_capacity(SESSION_KEY_PAYLOAD_SIZE));
        payload.extend_from_slice(&self.key);
        payload.extend_from_slice(&self.iv);
        payload
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Encrypts and decrypts chat text under one session key
pub struct SessionCipher {
    key: SessionKey,
}

impl SessionCipher {
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    /// Encrypt one line of text into one message frame
    pub fn encrypt(&self, plaintext: &str) -> MessageFrame {
        let ciphertext = Aes256CbcEnc::new(&self.key.key.into(), &self.key.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        MessageFrame::new(STANDARD.encode(ciphertext).into_bytes())
    }

    /// Decrypt one message frame
    ///
    /// Every malformed input maps to [`CryptoError::DecryptionFailed`]:
    /// bad base64, a length that is not a whole number of blocks, bad
    /// padding, or plaintext that is not UTF-8.
    pub fn decrypt(&self, frame: &MessageFrame) -> CryptoResult<String> {
        let ciphertext = STANDARD
            .decode(frame.as_bytes())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::DecryptionFailed);
        }

        let plaintext = Aes256CbcDec::new(&self.key.key.into(), &self.key.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}
