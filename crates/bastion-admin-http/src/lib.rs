// # Reverse Proxy Admin API
//
// `AdminApi` implementation over the proxy's HTTP admin interface.
//
// ## Endpoints
//
// - `GET  <api>/api/`         readiness; any 2xx means the API is up
// - `POST <api>/api/tokens`   exchange the factory-default identity for a bearer token
// - `PUT  <api>/api/users/1`  overwrite the default admin account
//
// ## Scope
//
// One request per call. Polling, delays and the exactly-once guarantee
// belong to the handshake agent, so nothing here retries.

use async_trait::async_trait;
use bastion_core::config::AdminSettings;
use bastion_core::traits::{AdminApi, CredentialUpdate};
use bastion_core::{Error, Result, Secret};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Timeout for the token exchange and the account update
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Probes must fail fast so the agent's delay dominates the polling rhythm
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The account created by the proxy on first start
const DEFAULT_ADMIN_USER_ID: u32 = 1;

#[derive(Serialize)]
struct TokenRequest<'a> {
    identity: &'a str,
    secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// HTTP client for the proxy's admin API
///
/// The bootstrap secret and bearer tokens never appear in `Debug` output or
/// error messages.
pub struct HttpAdminApi {
    base_url: String,
    identity: String,
    secret: Secret,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpAdminApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAdminApi")
            .field("base_url", &self.base_url)
            .field("identity", &self.identity)
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

impl HttpAdminApi {
    /// Build a client for `admin.api_url`, authenticating with the bootstrap identity
    pub fn from_settings(admin: &AdminSettings) -> Result<Self> {
        let base_url = admin.api_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "Admin API URL must start with http:// or https://: {}",
                admin.api_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            identity: admin.bootstrap_identity.clone(),
            secret: admin.bootstrap_secret.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange the bootstrap identity for a bearer token
    async fn authenticate(&self) -> Result<Secret> {
        let response = self
            .client
            .post(self.url("/api/tokens"))
            .json(&TokenRequest {
                identity: &self.identity,
                secret: self.secret.expose(),
            })
            .send()
            .await
            .map_err(|e| Error::http(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Token request", status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::mutation(format!("Failed to parse token response: {}", e)))?;
        Ok(Secret::new(token.token))
    }
}

/// Map a non-success status to an error, the way every call site reports it
fn status_error(context: &str, status: StatusCode, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::mutation(format!(
            "{} rejected: default credentials no longer accepted. Status: {}",
            context, status
        )),
        404 => Error::mutation(format!("{} failed: endpoint not found. Status: {}", context, status)),
        429 => Error::mutation(format!("{} rate limited. Status: {}", context, status)),
        500..=599 => Error::mutation(format!(
            "{} failed: proxy server error: {} - {}",
            context, status, body
        )),
        _ => Error::mutation(format!("{} failed: {} - {}", context, status, body)),
    }
}

#[async_trait]
impl AdminApi for HttpAdminApi {
    async fn probe(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/api/"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::http(format!("Probe failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::http(format!("Probe returned {}", status)))
        }
    }

    async fn replace_credentials(&self, update: &CredentialUpdate) -> Result<Value> {
        let token = self.authenticate().await?;
        tracing::debug!("Authenticated as {}", self.identity);

        let response = self
            .client
            .put(self.url(&format!("/api/users/{}", DEFAULT_ADMIN_USER_ID)))
            .bearer_auth(token.expose())
            .json(update)
            .send()
            .await
            .map_err(|e| Error::http(format!("Credential update failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Credential update", status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::mutation(format!("Failed to parse update response: {}", e)))
    }
}
