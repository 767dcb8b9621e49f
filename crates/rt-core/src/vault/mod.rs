//! Credential vault
//!
//! Host passwords are stored sealed with AES-256-GCM under a key derived
//! from the master passphrase. The vault directory holds two files:
//!
//! - `vault.json`: the header (salt, iteration count, passphrase verifier)
//! - `session.json`: the cached working key, mode 0600, removed by `lock`
//!
//! A vault initialized without a passphrase uses a random key that lives
//! only in the session cache. Losing that file makes its secrets
//! unrecoverable.

mod cache;
mod crypto;

pub use crypto::{
    constant_time_eq, derive_key, generate_salt, open, seal, verifier, SealedSecret, VaultKey,
    DEFAULT_ITERATIONS, KEY_LEN, SALT_LEN,
};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::VaultError;
use crate::types::Secret;

const HEADER_FILE: &str = "vault.json";
const CACHE_FILE: &str = "session.json";

/// How the working key is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultMode {
    /// Derived from a master passphrase
    Passphrase,
    /// Random, kept only in the session cache
    Keyless,
}

/// Derivation parameters persisted next to the sealed secrets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultHeader {
    pub mode: VaultMode,
    /// Hex-encoded salt
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub iterations: u32,
    /// Hex-encoded passphrase verifier
    #[serde(default)]
    pub verifier: String,
}

impl VaultHeader {
    fn for_passphrase(passphrase: &str, iterations: u32) -> (Self, VaultKey) {
        let salt = generate_salt();
        let key = derive_key(passphrase, &salt, iterations);
        let header = Self {
            mode: VaultMode::Passphrase,
            salt: hex::encode(salt),
            iterations,
            verifier: hex::encode(verifier(passphrase, &salt, iterations)),
        };
        (header, key)
    }

    fn salt_bytes(&self) -> Result<Vec<u8>, VaultError> {
        hex::decode(&self.salt).map_err(|e| VaultError::Corrupt(format!("salt: {}", e)))
    }

    /// Check `passphrase` against the verifier and derive the key if it matches
    fn check(&self, passphrase: &str) -> Result<VaultKey, VaultError> {
        if self.mode != VaultMode::Passphrase {
            return Err(VaultError::Corrupt(
                "vault has no passphrase to check".to_string(),
            ));
        }
        let salt = self.salt_bytes()?;
        let stored = hex::decode(&self.verifier)
            .map_err(|e| VaultError::Corrupt(format!("verifier: {}", e)))?;
        let computed = verifier(passphrase, &salt, self.iterations);
        if !constant_time_eq(&computed, &stored) {
            return Err(VaultError::WrongPassphrase);
        }
        Ok(derive_key(passphrase, &salt, self.iterations))
    }
}

/// An unlocked vault: seals and opens secrets with the working key
#[derive(Debug, Clone)]
pub struct VaultSession {
    key: VaultKey,
}

impl VaultSession {
    pub fn new(key: VaultKey) -> Self {
        Self { key }
    }

    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, VaultError> {
        seal(plaintext, &self.key)
    }

    pub fn open(&self, sealed: &SealedSecret) -> Result<Secret, VaultError> {
        let plaintext = open(sealed, &self.key)?;
        Ok(Secret::new(plaintext.as_str()))
    }

    /// Parse and open the `v1:...` text form
    pub fn open_str(&self, sealed: &str) -> Result<Secret, VaultError> {
        self.open(&sealed.parse()?)
    }
}

/// The vault directory
#[derive(Debug, Clone)]
pub struct Vault {
    dir: PathBuf,
    iterations: u32,
    use_cache: bool,
}

impl Vault {
    /// Vault in `dir` with default KDF parameters and the session cache on
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            iterations: DEFAULT_ITERATIONS,
            use_cache: true,
        }
    }

    /// KDF rounds for newly initialized vaults and passphrase changes
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// Whether `unlock` writes the session cache file
    pub fn with_session_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Default vault location next to the config file
    pub fn default_dir() -> PathBuf {
        crate::config::default_config_dir().join("vault")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn header_path(&self) -> PathBuf {
        self.dir.join(HEADER_FILE)
    }

    fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.header_path().exists()
    }

    /// Whether a cached working key is present
    pub fn has_cached_session(&self) -> bool {
        self.cache_path().exists()
    }

    /// Read the header
    pub fn header(&self) -> Result<VaultHeader, VaultError> {
        let content = match fs::read_to_string(self.header_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotInitialized)
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| VaultError::Corrupt(format!("header: {}", e)))
    }

    fn write_header(&self, header: &VaultHeader) -> Result<(), VaultError> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(header)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.header_path(), json)?;
        Ok(())
    }

    /// Create a new vault, replacing any previous header.
    ///
    /// With `None` a random key is generated and cached; there is nothing
    /// to type on later runs, but the cache file must survive.
    pub fn initialize(&self, passphrase: Option<&str>) -> Result<VaultSession, VaultError> {
        let passphrase = passphrase.filter(|p| !p.is_empty());
        let (header, key) = match passphrase {
            Some(passphrase) => VaultHeader::for_passphrase(passphrase, self.iterations),
            None => (
                VaultHeader {
                    mode: VaultMode::Keyless,
                    salt: String::new(),
                    iterations: 0,
                    verifier: String::new(),
                },
                VaultKey::random(),
            ),
        };

        self.write_header(&header)?;
        if header.mode == VaultMode::Keyless || self.use_cache {
            cache::write(&self.cache_path(), &key)?;
        } else {
            cache::remove(&self.cache_path())?;
        }
        tracing::info!("Initialized vault in {:?} ({:?} mode)", self.dir, header.mode);
        Ok(VaultSession::new(key))
    }

    /// Verify the passphrase and derive the working key
    pub fn unlock(&self, passphrase: &str) -> Result<VaultSession, VaultError> {
        let header = self.header()?;
        let key = match header.check(passphrase) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Vault unlock failed: {}", e);
                return Err(e);
            }
        };
        if self.use_cache {
            cache::write(&self.cache_path(), &key)?;
        }
        tracing::info!("Vault unlocked");
        Ok(VaultSession::new(key))
    }

    /// Restore the working key from the session cache
    pub fn resume(&self) -> Result<VaultSession, VaultError> {
        self.header()?;
        match cache::read(&self.cache_path())? {
            Some(key) => {
                tracing::debug!("Vault session resumed from cache");
                Ok(VaultSession::new(key))
            }
            None => Err(VaultError::Locked),
        }
    }

    /// Forget the cached key.
    ///
    /// For a keyless vault this destroys the only copy of the key.
    pub fn lock(&self) -> Result<(), VaultError> {
        cache::remove(&self.cache_path())?;
        tracing::info!("Vault locked");
        Ok(())
    }

    /// Switch to a new passphrase and re-seal `secrets` under the new key.
    ///
    /// `old` is ignored for keyless vaults, whose key comes from the cache.
    /// Returns the new session and the re-sealed secrets in input order.
    pub fn change_passphrase(
        &self,
        old: Option<&str>,
        new: &str,
        secrets: &[SealedSecret],
    ) -> Result<(VaultSession, Vec<SealedSecret>), VaultError> {
        let header = self.header()?;
        let current = match header.mode {
            VaultMode::Passphrase => header.check(old.unwrap_or_default())?,
            VaultMode::Keyless => cache::read(&self.cache_path())?.ok_or(VaultError::Locked)?,
        };

        let plaintexts: Vec<Zeroizing<String>> = secrets
            .iter()
            .map(|s| open(s, &current))
            .collect::<Result<_, _>>()?;

        let (new_header, new_key) = VaultHeader::for_passphrase(new, self.iterations);
        let resealed = plaintexts
            .iter()
            .map(|p| seal(p, &new_key))
            .collect::<Result<Vec<_>, _>>()?;

        self.write_header(&new_header)?;
        if self.use_cache {
            cache::write(&self.cache_path(), &new_key)?;
        } else {
            cache::remove(&self.cache_path())?;
        }
        tracing::info!("Vault passphrase changed, {} secrets re-sealed", resealed.len());
        Ok((VaultSession::new(new_key), resealed))
    }
}
