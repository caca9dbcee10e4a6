// # Admin API Trait
//
// The reverse proxy's admin API as seen by the credential bootstrap.
//
// ## Contract
//
// - `probe` succeeds only once the API answers; any error means "not ready yet"
// - `replace_credentials` authenticates with the factory defaults and
//   overwrites the admin identity; it is called at most once per run

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::AdminSettings;

/// Replacement admin identity
#[derive(Clone, Serialize)]
pub struct CredentialUpdate {
    pub email: String,
    pub name: String,
    pub nickname: String,
    pub password: String,
    pub roles: Vec<String>,
}

impl CredentialUpdate {
    pub fn from_settings(admin: &AdminSettings) -> Self {
        Self {
            email: admin.email.clone(),
            name: admin.name.clone(),
            nickname: admin.nickname.clone(),
            password: admin.password.expose().to_string(),
            roles: vec!["admin".to_string()],
        }
    }
}

impl fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("nickname", &self.nickname)
            .field("password", &"<REDACTED>")
            .field("roles", &self.roles)
            .finish()
    }
}

/// Trait for the proxy admin API
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Check whether the API is reachable
    async fn probe(&self) -> Result<(), crate::Error>;

    /// Replace the default admin credentials
    ///
    /// Returns the API's response body.
    async fn replace_credentials(
        &self,
        update: &CredentialUpdate,
    ) -> Result<serde_json::Value, crate::Error>;
}
