//! Secret encryption
//!
//! Messages are sealed with XChaCha20-Poly1305 under a 256-bit key formed by
//! concatenating the server sign key with the recipient pin. The sign key is
//! sized so that `sign_key.len() + pin.len() == 32`; anything else is
//! rejected rather than padded.
//!
//! Sealed layout: `nonce (24) || ciphertext || tag (16)`.

use std::fmt;

use burnbox_core::{BoxError, Crypter};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Key size (256 bits)
pub const KEY_SIZE: usize = 32;

/// Nonce size for XChaCha20-Poly1305 (192 bits)
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// Stretch or cut an operator secret to `32 - pin_size` bytes.
///
/// Short secrets are repeated, long ones truncated, so any non-empty secret
/// yields a sign key that completes a full key with a `pin_size` pin.
pub fn derive_sign_key(secret: &str, pin_size: usize) -> Result<Vec<u8>> {
    if secret.is_empty() || pin_size >= KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: pin_size,
        });
    }

    let len = KEY_SIZE - pin_size;
    Ok(secret.as_bytes().iter().cycle().take(len).copied().collect())
}

/// Pin-keyed message cipher
pub struct SecretCipher {
    sign_key: Zeroizing<Vec<u8>>,
}

impl SecretCipher {
    /// Create a cipher around the server sign key
    pub fn new(sign_key: impl Into<Vec<u8>>) -> Self {
        Self {
            sign_key: Zeroizing::new(sign_key.into()),
        }
    }

    /// Length of the pin this cipher expects
    pub fn pin_size(&self) -> usize {
        KEY_SIZE.saturating_sub(self.sign_key.len())
    }

    /// Seal `plaintext` under the sign key and `pin`
    pub fn encrypt(&self, plaintext: &[u8], pin: &str) -> Result<Vec<u8>> {
        let cipher = self.cipher_for(pin)?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed("XChaCha20-Poly1305 failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open data produced by [`SecretCipher::encrypt`].
    ///
    /// Truncated input, tampering and a wrong pin all fail the same way.
    pub fn decrypt(&self, sealed: &[u8], pin: &str) -> Result<Vec<u8>> {
        let cipher = self.cipher_for(pin)?;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            debug!("Sealed input too short: {} bytes", sealed.len());
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        Ok(cipher.decrypt(XNonce::from_slice(nonce), ciphertext)?)
    }

    fn cipher_for(&self, pin: &str) -> Result<XChaCha20Poly1305> {
        let actual = self.sign_key.len() + pin.len();
        if actual != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual,
            });
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key[..self.sign_key.len()].copy_from_slice(&self.sign_key);
        key[self.sign_key.len()..].copy_from_slice(pin.as_bytes());

        XChaCha20Poly1305::new_from_slice(key.as_slice()).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual,
            }
        })
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher")
            .field("pin_size", &self.pin_size())
            .finish_non_exhaustive()
    }
}

impl Crypter for SecretCipher {
    fn encrypt(&self, data: &[u8], pin: &str) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(SecretCipher::encrypt(self, data, pin)?)
    }

    fn decrypt(&self, data: &[u8], pin: &str) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(SecretCipher::decrypt(self, data, pin)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PIN: &str = "12345";

    fn cipher() -> SecretCipher {
        SecretCipher::new(derive_sign_key("stew-pub-barcan-scatty-daimio-wicker-yakona", 5).unwrap())
    }

    #[test]
    fn test_derive_sign_key() {
        let cases = [
            ("abcdefg", 5, "abcdefgabcdefgabcdefgabcdef"),
            ("abcdefgabcdefgabcdefgabcdef", 5, "abcdefgabcdefgabcdefgabcdef"),
            (
                "11223344556677889900112233445566778899001122334455",
                6,
                "11223344556677889900112233",
            ),
        ];

        for (secret, pin_size, expected) in cases {
            let key = derive_sign_key(secret, pin_size).unwrap();
            assert_eq!(key, expected.as_bytes());
            assert_eq!(key.len() + pin_size, KEY_SIZE);
        }
    }

    #[test]
    fn test_derive_sign_key_invalid() {
        assert!(matches!(
            derive_sign_key("", 5),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
        assert!(matches!(
            derive_sign_key("secret", 32),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"abc", PIN).unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + 3 + TAG_SIZE);
        assert_eq!(cipher.decrypt(&sealed, PIN).unwrap(), b"abc");
    }

    #[test]
    fn test_encrypt_empty() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"", PIN).unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert!(cipher.decrypt(&sealed, PIN).unwrap().is_empty());
    }

    #[test]
    fn test_random_nonce() {
        let cipher = cipher();
        let a = cipher.encrypt(b"same", PIN).unwrap();
        let b = cipher.encrypt(b"same", PIN).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_pin_fails() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"secret", PIN).unwrap();

        assert!(matches!(
            cipher.decrypt(&sealed, "54321"),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_fails() {
        let cipher = cipher();
        let mut sealed = cipher.encrypt(b"secret", PIN).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(matches!(
            cipher.decrypt(&sealed, PIN),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_short_input_fails() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt(&[0u8; NONCE_SIZE + TAG_SIZE - 1], PIN),
            Err(CryptoError::DecryptionFailed)
        ));
        assert!(matches!(
            cipher.decrypt(b"", PIN),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        let cipher = cipher();

        assert!(matches!(
            cipher.encrypt(b"abc", "123456"),
            Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: 33
            })
        ));
        assert!(matches!(
            cipher.decrypt(&[0u8; 64], "1234"),
            Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: 31
            })
        ));
    }

    #[test]
    fn test_pin_size() {
        assert_eq!(cipher().pin_size(), 5);
    }

    #[test]
    fn test_debug_hides_key() {
        let cipher = SecretCipher::new(b"supersecretsupersecretsupers".to_vec());
        assert!(!format!("{:?}", cipher).contains("supersecret"));
    }

    #[test]
    fn test_crypter_impl() {
        let crypter: &dyn Crypter = &cipher();
        let sealed = crypter.encrypt(b"via trait", PIN).unwrap();
        assert_eq!(crypter.decrypt(&sealed, PIN).unwrap(), b"via trait");
        assert!(crypter.decrypt(&sealed, "00000").is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let cipher = cipher();
            let sealed = cipher.encrypt(&data, PIN).unwrap();
            prop_assert_eq!(cipher.decrypt(&sealed, PIN).unwrap(), data);
        }

        #[test]
        fn prop_wrong_pin_fails(
            data in proptest::collection::vec(any::<u8>(), 0..256),
            pin in "[0-9]{5}",
        ) {
            prop_assume!(pin != PIN);
            let cipher = cipher();
            let sealed = cipher.encrypt(&data, PIN).unwrap();
            prop_assert!(cipher.decrypt(&sealed, &pin).is_err());
        }
    }
}
