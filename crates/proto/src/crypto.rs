use aes::Aes128;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::{Decryptor, Encryptor};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// AES-128 session keys.
pub const SESSION_KEY_LEN: usize = 16;

/// Fixed initialization vector shared by every frame of every session.
///
/// Reusing one IV in CFB mode means two frames with a common plaintext
/// prefix produce a common ciphertext prefix. This is a known weakness of
/// the wire format and is kept only because deployed clients depend on it;
/// see DESIGN.md before changing.
const SESSION_IV: [u8; SESSION_KEY_LEN] = *b"lunamud.fixed.iv";

type Aes128CfbEnc = Encryptor<Aes128>;
type Aes128CfbDec = Decryptor<Aes128>;

/// Unencrypted first frame: the server's public key as decimal strings.
#[derive(Debug, Serialize, Deserialize)]
struct PublicKeyFrame {
    n: String,
    e: String,
}

/// The server's RSA identity for the session-key bootstrap.
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl ServerKeyPair {
    /// Generate a fresh keypair. 2048 bits in production; tests use fewer.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, bits)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// The unencrypted `(modulus, exponent)` frame sent first on every
    /// connection.
    pub fn public_key_frame(&self) -> Vec<u8> {
        let frame = PublicKeyFrame {
            n: self.public.n().to_str_radix(10),
            e: self.public.e().to_str_radix(10),
        };
        serde_json::to_vec(&frame).expect("public key frame serializes")
    }

    /// Decrypt the client's RSA-wrapped bootstrap frame back to plaintext.
    pub fn unwrap_bootstrap(&self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.private.decrypt(Oaep::new::<sha2::Sha256>(), frame)?)
    }
}

/// Client side of the bootstrap: encrypt `plaintext` under the public key
/// frame received from the server.
pub fn wrap_session_key(public_frame: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let frame: PublicKeyFrame =
        serde_json::from_slice(public_frame).map_err(|_| CryptoError::BadPublicKey)?;
    let n = BigUint::parse_bytes(frame.n.as_bytes(), 10).ok_or(CryptoError::BadPublicKey)?;
    let e = BigUint::parse_bytes(frame.e.as_bytes(), 10).ok_or(CryptoError::BadPublicKey)?;
    let key = RsaPublicKey::new(n, e).map_err(|_| CryptoError::BadPublicKey)?;
    let mut rng = rand::thread_rng();
    Ok(key.encrypt(&mut rng, Oaep::new::<sha2::Sha256>(), plaintext)?)
}

/// Per-session symmetric cipher state.
///
/// Until [`SessionCipher::install`] succeeds, inbound frames must be routed
/// through the RSA bootstrap path instead.
#[derive(Debug, Default)]
pub struct SessionCipher {
    key: Option<[u8; SESSION_KEY_LEN]>,
}

impl SessionCipher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn established(&self) -> bool {
        self.key.is_some()
    }

    pub fn install(&mut self, key: &[u8]) -> Result<(), CryptoError> {
        let key: [u8; SESSION_KEY_LEN] = key
            .try_into()
            .map_err(|_| CryptoError::BadKeyLength(SESSION_KEY_LEN))?;
        self.key = Some(key);
        Ok(())
    }

    /// Encrypt an outbound frame payload.
    pub fn seal(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self.key.as_ref().ok_or(CryptoError::NoSessionKey)?;
        let enc = Aes128CfbEnc::new_from_slices(key, &SESSION_IV)
            .expect("key and iv lengths are fixed");
        let mut buf = plain.to_vec();
        enc.encrypt(&mut buf);
        Ok(buf)
    }

    /// Decrypt an inbound frame payload.
    pub fn open(&self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self.key.as_ref().ok_or(CryptoError::NoSessionKey)?;
        let dec = Aes128CfbDec::new_from_slices(key, &SESSION_IV)
            .expect("key and iv lengths are fixed");
        let mut buf = frame.to_vec();
        dec.decrypt(&mut buf);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small keys keep the test suite fast; production uses 2048.
    const TEST_BITS: usize = 1024;

    #[test]
    fn bootstrap_roundtrip() {
        let pair = ServerKeyPair::generate(TEST_BITS).unwrap();
        let frame = pair.public_key_frame();
        let wrapped = wrap_session_key(&frame, b"0123456789abcdef").unwrap();
        assert_ne!(wrapped, b"0123456789abcdef");
        let plain = pair.unwrap_bootstrap(&wrapped).unwrap();
        assert_eq!(plain, b"0123456789abcdef");
    }

    #[test]
    fn bootstrap_rejects_garbage_public_frame() {
        assert!(matches!(
            wrap_session_key(b"not json", b"key"),
            Err(CryptoError::BadPublicKey)
        ));
    }

    #[test]
    fn bootstrap_wrong_key_fails() {
        let a = ServerKeyPair::generate(TEST_BITS).unwrap();
        let b = ServerKeyPair::generate(TEST_BITS).unwrap();
        let wrapped = wrap_session_key(&a.public_key_frame(), b"secret").unwrap();
        assert!(b.unwrap_bootstrap(&wrapped).is_err());
    }

    #[test]
    fn cipher_requires_key() {
        let cipher = SessionCipher::new();
        assert!(!cipher.established());
        assert!(matches!(cipher.seal(b"x"), Err(CryptoError::NoSessionKey)));
        assert!(matches!(cipher.open(b"x"), Err(CryptoError::NoSessionKey)));
    }

    #[test]
    fn cipher_rejects_short_key() {
        let mut cipher = SessionCipher::new();
        assert!(matches!(
            cipher.install(b"short"),
            Err(CryptoError::BadKeyLength(_))
        ));
    }

    #[test]
    fn symmetric_roundtrip() {
        let mut cipher = SessionCipher::new();
        cipher.install(b"0123456789abcdef").unwrap();
        let sealed = cipher.seal(b"attack at dawn").unwrap();
        assert_ne!(sealed, b"attack at dawn");
        assert_eq!(cipher.open(&sealed).unwrap(), b"attack at dawn");
    }

    #[test]
    fn fixed_iv_repeats_ciphertext() {
        // Documents the wire format's keystream-reuse weakness: identical
        // plaintexts under one session key encrypt identically.
        let mut cipher = SessionCipher::new();
        cipher.install(b"0123456789abcdef").unwrap();
        let first = cipher.seal(b"same message").unwrap();
        let second = cipher.seal(b"same message").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_keys_differ() {
        let mut a = SessionCipher::new();
        let mut b = SessionCipher::new();
        a.install(b"0123456789abcdef").unwrap();
        b.install(b"fedcba9876543210").unwrap();
        assert_ne!(a.seal(b"hello").unwrap(), b.seal(b"hello").unwrap());
    }
}
