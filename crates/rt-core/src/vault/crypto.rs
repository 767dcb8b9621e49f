//! Key derivation and authenticated encryption

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::Rng;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::VaultError;

/// PBKDF2 rounds used when nothing else is configured
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Salt length in bytes
pub const SALT_LEN: usize = 32;

/// Key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const SEALED_VERSION: &str = "v1";
const VERIFY_SUFFIX: &[u8] = b"_verify";

/// A 256-bit working key, wiped on drop
#[derive(Clone)]
pub struct VaultKey(Zeroizing<[u8; KEY_LEN]>);

impl VaultKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// A fresh random key (passphrase-less vaults)
    pub fn random() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rand::thread_rng().fill(&mut bytes[..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub(crate) fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.0[..]))
    }

    pub(crate) fn from_hex(text: &str) -> Result<Self, VaultError> {
        let raw = Zeroizing::new(
            hex::decode(text.trim()).map_err(|e| VaultError::Corrupt(format!("key: {}", e)))?,
        );
        let bytes: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::Corrupt(format!("key must be {} bytes", KEY_LEN)))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(***)")
    }
}

/// Generate a random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill(&mut salt);
    salt
}

/// Derive the working key from a passphrase with PBKDF2-HMAC-SHA256
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> VaultKey {
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut out[..]);
    VaultKey(out)
}

/// Hash used to check a passphrase before deriving the key.
///
/// Salted with `salt || "_verify"` so it never equals the working key.
pub fn verifier(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut verify_salt = Vec::with_capacity(salt.len() + VERIFY_SUFFIX.len());
    verify_salt.extend_from_slice(salt);
    verify_salt.extend_from_slice(VERIFY_SUFFIX);
    let mut out = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), &verify_salt, iterations, &mut out);
    out
}

/// Compare two byte strings in constant time
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// An encrypted secret: nonce plus AES-GCM ciphertext (tag included)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl fmt::Display for SealedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            SEALED_VERSION,
            hex::encode(self.nonce),
            hex::encode(&self.ciphertext)
        )
    }
}

impl FromStr for SealedSecret {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let (Some(version), Some(nonce), Some(ciphertext)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(VaultError::Corrupt("expected v1:<nonce>:<ciphertext>".to_string()));
        };
        if version != SEALED_VERSION {
            return Err(VaultError::Corrupt(format!("unknown format {}", version)));
        }
        let nonce: [u8; NONCE_LEN] = hex::decode(nonce)
            .map_err(|e| VaultError::Corrupt(format!("nonce: {}", e)))?
            .try_into()
            .map_err(|_| VaultError::Corrupt("nonce must be 12 bytes".to_string()))?;
        let ciphertext =
            hex::decode(ciphertext).map_err(|e| VaultError::Corrupt(format!("ciphertext: {}", e)))?;
        Ok(Self { nonce, ciphertext })
    }
}

/// Encrypt `plaintext` under `key` with a fresh random nonce
pub fn seal(plaintext: &str, key: &VaultKey) -> Result<SealedSecret, VaultError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| VaultError::Corrupt("encryption failed".to_string()))?;
    Ok(SealedSecret { nonce, ciphertext })
}

/// Decrypt a sealed secret. A wrong key or any tampering fails
/// authentication and yields `VaultError::Corrupt`.
pub fn open(sealed: &SealedSecret, key: &VaultKey) -> Result<Zeroizing<String>, VaultError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
            .map_err(|_| VaultError::Corrupt("authentication failed".to_string()))?,
    );
    let text = std::str::from_utf8(&plaintext)
        .map_err(|_| VaultError::Corrupt("plaintext is not UTF-8".to_string()))?;
    Ok(Zeroizing::new(text.to_string()))
}
