//! Session cache file
//!
//! Holds the working key between process runs so the passphrase does not
//! have to be entered every time. The file is created with mode 0600 on Unix.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::crypto::VaultKey;
use crate::error::VaultError;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    key: String,
    created_at: u64,
}

impl Drop for CacheFile {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.key);
    }
}

/// Write the key to `path`, replacing any previous cache
pub fn write(path: &Path, key: &VaultKey) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = CacheFile {
        key: key.to_hex().to_string(),
        created_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };
    let json = Zeroizing::new(
        serde_json::to_string(&file).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
    );

    fs::write(path, json.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, permissions)?;
    }

    Ok(())
}

/// Read the cached key, `None` if there is no cache
pub fn read(path: &Path) -> Result<Option<VaultKey>, VaultError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => Zeroizing::new(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let file: CacheFile = serde_json::from_str(&content)
        .map_err(|e| VaultError::Corrupt(format!("session cache: {}", e)))?;
    VaultKey::from_hex(&file.key).map(Some)
}

/// Remove the cache; a missing file is not an error
pub fn remove(path: &Path) -> Result<(), VaultError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed vault session cache");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
