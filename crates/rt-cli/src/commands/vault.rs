//! Vault command implementations

use anyhow::{Context, Result};
use rt_core::vault::{Vault, VaultMode};

use crate::output::{print_info, print_success, print_warning};
use crate::prompter::{read_line, read_new_secret};
use crate::setup::open_vault;

/// Create the vault; without a passphrase the key lives only in the cache
pub fn vault_init(vault: &Vault, no_passphrase: bool, force: bool) -> Result<()> {
    if vault.is_initialized() && !force {
        print_warning(&format!("Vault already exists in {:?}", vault.dir()));
        print_info("Use --force to replace it; secrets sealed with the old key become unreadable");
        return Ok(());
    }

    let passphrase = if no_passphrase {
        None
    } else {
        Some(
            read_new_secret("New vault passphrase: ")?
                .ok_or_else(|| anyhow::anyhow!("Vault init cancelled"))?,
        )
    };

    vault
        .initialize(passphrase.as_deref())
        .context("Failed to initialize vault")?;
    print_success(&format!("Vault initialized in {:?}", vault.dir()));
    if passphrase.is_none() {
        print_warning("No passphrase: 'relay vault lock' would destroy the only copy of the key");
    }
    Ok(())
}

/// Check the passphrase and cache the working key
pub fn vault_unlock(vault: &Vault) -> Result<()> {
    let passphrase = read_line("Vault passphrase: ", false)?
        .ok_or_else(|| anyhow::anyhow!("Vault unlock cancelled"))?;
    vault.unlock(&passphrase).context("Failed to unlock vault")?;
    print_success("Vault unlocked");
    Ok(())
}

/// Remove the cached key
pub fn vault_lock(vault: &Vault) -> Result<()> {
    if vault.header()?.mode == VaultMode::Keyless {
        anyhow::bail!("Refusing to lock a vault without passphrase: its key exists only in the cache");
    }
    vault.lock().context("Failed to lock vault")?;
    print_success("Vault locked");
    Ok(())
}

/// Read a password without echo and print its sealed form
pub fn vault_seal(vault: &Vault) -> Result<()> {
    let session = open_vault(vault)?;
    let secret = read_line("Password to seal: ", false)?
        .ok_or_else(|| anyhow::anyhow!("Seal cancelled"))?;
    let sealed = session.seal(&secret).context("Failed to seal password")?;
    println!("{}", sealed);
    Ok(())
}

/// Print whether the vault exists and is unlocked
pub fn vault_status(vault: &Vault) -> Result<()> {
    if !vault.is_initialized() {
        print_info(&format!("No vault in {:?}", vault.dir()));
        return Ok(());
    }
    let header = vault.header()?;
    let mode = match header.mode {
        VaultMode::Passphrase => "passphrase",
        VaultMode::Keyless => "no passphrase",
    };
    let state = if vault.has_cached_session() {
        "unlocked"
    } else {
        "locked"
    };
    print_info(&format!("Vault in {:?} ({}): {}", vault.dir(), mode, state));
    Ok(())
}
