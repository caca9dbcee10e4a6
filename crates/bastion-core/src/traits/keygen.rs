use async_trait::async_trait;

use crate::config::Secret;

/// Source of WireGuard key material
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Tool that must be installed for this generator to work
    fn tool(&self) -> &'static str;

    /// Generate a fresh private key
    async fn generate_private_key(&self) -> Result<Secret, crate::Error>;

    /// Derive the public key for a private key
    async fn public_key(&self, private_key: &Secret) -> Result<String, crate::Error>;
}
