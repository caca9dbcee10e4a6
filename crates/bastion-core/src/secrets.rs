//! Generated secrets
//!
//! The WireGuard private key is the only value the provisioner writes back
//! into the configuration store. Once set it is reused as-is.

use crate::config::{Secret, keys};
use crate::env_file::EnvFile;
use crate::error::{Error, Result};
use crate::traits::KeyGenerator;

/// Resolve the private key, generating and persisting it when absent
///
/// The store is written before the key is returned, so a failure later in
/// the run never leads to a different key on the next one.
pub async fn ensure_private_key(store: &mut EnvFile, keygen: &dyn KeyGenerator) -> Result<Secret> {
    if let Some(existing) = store.get_non_empty(keys::WG_PRIVATE_KEY) {
        tracing::debug!("Reusing WireGuard private key from the configuration store");
        return Ok(Secret::new(existing));
    }

    tracing::info!("No WireGuard private key configured; generating one");
    let key = keygen.generate_private_key().await?;
    if key.is_empty() {
        return Err(Error::backend(keygen.tool(), "generated an empty private key"));
    }

    store
        .set_and_persist(keys::WG_PRIVATE_KEY, key.expose().trim())
        .await?;

    match store.path() {
        Some(path) => tracing::info!("Private key saved to {}", path.display()),
        None => tracing::debug!("Private key kept in memory (store has no file)"),
    }

    Ok(Secret::new(key.expose().trim()))
}
