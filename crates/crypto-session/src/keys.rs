//! RSA key exchange used only to transport the session key

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::{CryptoError, CryptoResult, RSA_KEY_BITS, max_oaep_payload};

/// Bytes of the SHA-256 digest shown in a fingerprint
const FINGERPRINT_BYTES: usize = 16;

/// Key pair owned by the responder for one hosting attempt
pub struct KeyPair {
    private: RsaPrivateKey,
    public: PeerPublicKey,
}

impl KeyPair {
    /// Generate a new 2048-bit key pair
    ///
    /// CPU-bound; call from a blocking context when on an async runtime.
    pub fn generate() -> CryptoResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = PeerPublicKey::from_key(RsaPublicKey::from(&private))?;

        Ok(Self { private, public })
    }

    /// Public half in its transportable text form (base64 SubjectPublicKeyInfo)
    pub fn export_public_key(&self) -> String {
        STANDARD.encode(&self.public.der)
    }

    /// Public half as the initiator will see it
    pub fn public_key(&self) -> &PeerPublicKey {
        &self.public
    }

    /// Size of every ciphertext produced under this key
    pub fn ciphertext_len(&self) -> usize {
        self.public.modulus_len()
    }

    pub fn fingerprint(&self) -> String {
        self.public.fingerprint()
    }

    /// Decrypt an OAEP-SHA256 ciphertext addressed to this key pair
    pub fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|e| CryptoError::HandshakeFailed(format!("session key decryption: {}", e)))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Public key imported from the peer, trusted on first use
#[derive(Clone)]
pub struct PeerPublicKey {
    key: RsaPublicKey,
    der: Vec<u8>,
}

impl PeerPublicKey {
    fn from_key(key: RsaPublicKey) -> CryptoResult<Self> {
        let der = key
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?
            .as_bytes()
            .to_vec();

        Ok(Self { key, der })
    }

    /// Import a key exported with [`KeyPair::export_public_key`]
    pub fn import(encoded: &str) -> CryptoResult<Self> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidPublicKey(format!("not base64: {}", e)))?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

        Ok(Self { key, der })
    }

    /// Modulus size in bytes
    pub fn modulus_len(&self) -> usize {
        self.key.size()
    }

    /// Largest payload [`encrypt`](Self::encrypt) accepts
    pub fn max_payload(&self) -> usize {
        max_oaep_payload(self.modulus_len())
    }

    /// Encrypt a small payload with OAEP-SHA256 padding
    pub fn encrypt(&self, payload: &[u8]) -> CryptoResult<Vec<u8>> {
        let max = self.max_payload();
        if payload.len() > max {
            return Err(CryptoError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        self.key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), payload)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Colon-separated hex of the leading SHA-256 bytes of the DER encoding
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.der);
        digest[..FINGERPRINT_BYTES]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl std::fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerPublicKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_import_and_transport() {
        let keypair = KeyPair::generate().unwrap();
        let exported = keypair.export_public_key();
        let imported = PeerPublicKey::import(&exported).unwrap();

        assert_eq!(imported.fingerprint(), keypair.fingerprint());
        assert_eq!(imported.modulus_len(), 256);
        assert_eq!(imported.max_payload(), 190);

        let payload = [0x5au8; 48];
        let ciphertext = imported.encrypt(&payload).unwrap();
        assert_eq!(ciphertext.len(), keypair.ciphertext_len());

        let decrypted = keypair.decrypt(&ciphertext).unwrap();
        assert_eq!(decrypted, payload);
    }

    #[test]
    fn test_oaep_is_randomized() {
        let keypair = KeyPair::generate().unwrap();
        let public = keypair.public_key();

        let first = public.encrypt(b"same payload").unwrap();
        let second = public.encrypt(b"same payload").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let ours = KeyPair::generate().unwrap();
        let theirs = KeyPair::generate().unwrap();

        let ciphertext = theirs.public_key().encrypt(&[1u8; 48]).unwrap();
        assert!(matches!(
            ours.decrypt(&ciphertext),
            Err(CryptoError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_import_rejects_garbage() {
        assert!(matches!(
            PeerPublicKey::import("not base64 at all!"),
            Err(CryptoError::InvalidPublicKey(_))
        ));
        // Valid base64, not a key
        assert!(matches!(
            PeerPublicKey::import("aGVsbG8gd29ybGQ="),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_encrypt_rejects_oversized_payload() {
        let keypair = KeyPair::generate().unwrap();
        let result = keypair.public_key().encrypt(&[0u8; 191]);
        assert!(matches!(
            result,
            Err(CryptoError::PayloadTooLarge { size: 191, max: 190 })
        ));
    }

    #[test]
    fn test_fingerprint_format() {
        let keypair = KeyPair::generate().unwrap();
        let fingerprint = keypair.fingerprint();

        assert_eq!(fingerprint.split(':').count(), FINGERPRINT_BYTES);
        assert!(fingerprint.chars().all(|c| c == ':' || c.is_ascii_hexdigit()));
    }
}
