// SPDX-License-Identifier: MIT OR Apache-2.0
//! Encryption of new shares for named recipients.
//!
//! Recipient keys are base64 X25519 public keys. Each share is sealed with an
//! ephemeral X25519 exchange, HKDF-SHA256 and AES-256-GCM, so only the holder
//! of the matching secret key can open it. Output layout:
//! `ephemeral_public (32) || nonce (12) || ciphertext+tag`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use blake2::{digest::consts::U20, Blake2b, Digest};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{RekeyError, Result};

const SEAL_INFO: &[u8] = b"vault-rekey:sealed-share:v1";
const PUBLIC_KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// A share sealed for one recipient.
#[derive(Debug, Clone)]
pub struct EncryptedShare {
    /// Fingerprint of the recipient key used.
    pub fingerprint: String,
    pub ciphertext: Vec<u8>,
}

/// Encrypts output shares for their recipients.
pub trait ShareEncryptor: Send + Sync {
    /// Parse a recipient key and return its fingerprint.
    fn fingerprint(&self, public_key: &str) -> Result<String>;

    fn encrypt(&self, public_key: &str, share: &[u8]) -> Result<EncryptedShare>;
}

/// X25519 sealed-box encryptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealedBoxEncryptor;

fn parse_public_key(encoded: &str) -> Result<PublicKey> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| RekeyError::Config(format!("invalid recipient key encoding: {e}")))?;
    let bytes: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
        RekeyError::Config(format!(
            "recipient key is {} bytes (expected {PUBLIC_KEY_SIZE})",
            b.len()
        ))
    })?;
    Ok(PublicKey::from(bytes))
}

fn fingerprint_of(key: &PublicKey) -> String {
    hex::encode(Blake2b::<U20>::digest(key.as_bytes()))
}

fn derive_key(
    shared: &[u8; 32],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut salt = [0u8; PUBLIC_KEY_SIZE * 2];
    salt[..PUBLIC_KEY_SIZE].copy_from_slice(ephemeral.as_bytes());
    salt[PUBLIC_KEY_SIZE..].copy_from_slice(recipient.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(SEAL_INFO, &mut key[..])
        .map_err(|e| RekeyError::Crypto(format!("key derivation failed: {e}")))?;
    Ok(key)
}

impl ShareEncryptor for SealedBoxEncryptor {
    fn fingerprint(&self, public_key: &str) -> Result<String> {
        parse_public_key(public_key).map(|key| fingerprint_of(&key))
    }

    fn encrypt(&self, public_key: &str, share: &[u8]) -> Result<EncryptedShare> {
        let recipient = parse_public_key(public_key)?;

        let mut secret_bytes = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut secret_bytes[..]);
        let ephemeral = StaticSecret::from(*secret_bytes);
        let ephemeral_public = PublicKey::from(&ephemeral);

        let shared = ephemeral.diffie_hellman(&recipient);
        if !shared.was_contributory() {
            return Err(RekeyError::Crypto(
                "recipient key is a low-order point".to_string(),
            ));
        }
        let key = derive_key(shared.as_bytes(), &ephemeral_public, &recipient)?;

        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| RekeyError::Crypto(format!("invalid key: {e}")))?;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), share)
            .map_err(|e| RekeyError::Crypto(format!("encryption failed: {e}")))?;

        let mut ciphertext = Vec::with_capacity(PUBLIC_KEY_SIZE + NONCE_SIZE + sealed.len());
        ciphertext.extend_from_slice(ephemeral_public.as_bytes());
        ciphertext.extend_from_slice(&nonce_bytes);
        ciphertext.extend_from_slice(&sealed);

        Ok(EncryptedShare {
            fingerprint: fingerprint_of(&recipient),
            ciphertext,
        })
    }
}

/// The secret half of a recipient key, held by a share holder.
pub struct RecipientKey {
    secret: StaticSecret,
}

impl RecipientKey {
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut bytes[..]);
        Self {
            secret: StaticSecret::from(*bytes),
        }
    }

    /// Base64 public key, in the form accepted as a `pgp_keys` entry.
    pub fn public_key(&self) -> String {
        STANDARD.encode(PublicKey::from(&self.secret).as_bytes())
    }

    pub fn fingerprint(&self) -> String {
        fingerprint_of(&PublicKey::from(&self.secret))
    }

    /// Open a share sealed by [`SealedBoxEncryptor`].
    pub fn open(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < PUBLIC_KEY_SIZE + NONCE_SIZE {
            return Err(RekeyError::Crypto("sealed share too short".to_string()));
        }
        let (ephemeral, rest) = ciphertext.split_at(PUBLIC_KEY_SIZE);
        let (nonce, sealed) = rest.split_at(NONCE_SIZE);

        let mut ephemeral_bytes = [0u8; PUBLIC_KEY_SIZE];
        ephemeral_bytes.copy_from_slice(ephemeral);
        let ephemeral = PublicKey::from(ephemeral_bytes);
        let recipient = PublicKey::from(&self.secret);

        let shared = self.secret.diffie_hellman(&ephemeral);
        let key = derive_key(shared.as_bytes(), &ephemeral, &recipient)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| RekeyError::Crypto(format!("invalid key: {e}")))?;

        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map(Zeroizing::new)
            .map_err(|e| RekeyError::Crypto(format!("decryption failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let recipient = RecipientKey::generate();
        let encrypted = SealedBoxEncryptor
            .encrypt(&recipient.public_key(), b"share-bytes")
            .unwrap();

        assert_eq!(encrypted.fingerprint, recipient.fingerprint());
        assert_ne!(&encrypted.ciphertext[PUBLIC_KEY_SIZE + NONCE_SIZE..], b"share-bytes");
        assert_eq!(recipient.open(&encrypted.ciphertext).unwrap().as_slice(), b"share-bytes");
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let alice = RecipientKey::generate();
        let bob = RecipientKey::generate();
        let encrypted = SealedBoxEncryptor
            .encrypt(&alice.public_key(), b"for alice")
            .unwrap();
        assert!(bob.open(&encrypted.ciphertext).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let recipient = RecipientKey::generate();
        let mut encrypted = SealedBoxEncryptor
            .encrypt(&recipient.public_key(), b"payload")
            .unwrap();
        let last = encrypted.ciphertext.len() - 1;
        encrypted.ciphertext[last] ^= 0x01;
        assert!(recipient.open(&encrypted.ciphertext).is_err());
        assert!(recipient.open(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_encryption_is_randomized() {
        let recipient = RecipientKey::generate();
        let a = SealedBoxEncryptor.encrypt(&recipient.public_key(), b"x").unwrap();
        let b = SealedBoxEncryptor.encrypt(&recipient.public_key(), b"x").unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let recipient = RecipientKey::generate();
        let fp = SealedBoxEncryptor.fingerprint(&recipient.public_key()).unwrap();
        assert_eq!(fp.len(), 40);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, recipient.fingerprint());
    }

    #[test]
    fn test_invalid_public_keys() {
        assert!(matches!(
            SealedBoxEncryptor.fingerprint("pgpkey1"),
            Err(RekeyError::Config(_))
        ));
        let short = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            SealedBoxEncryptor.fingerprint(&short),
            Err(RekeyError::Config(_))
        ));
    }

    #[test]
    fn test_low_order_key_rejected() {
        let zero = STANDARD.encode([0u8; 32]);
        assert!(matches!(
            SealedBoxEncryptor.encrypt(&zero, b"x"),
            Err(RekeyError::Crypto(_))
        ));
    }
}
