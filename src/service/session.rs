//! Identity service client.
//!
//! After the key exchange both sides derive the same session hash. The client
//! registers it with the identity service before answering; the server then
//! asks the service whether `username` has joined under that hash. A match
//! comes back as the canonical profile (uuid, name, signed textures).
//!
//! A non-200 answer means "no match". Transport failures and timeouts are
//! errors; the login treats both the same way and never assumes success.

use crate::config::AuthConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::profile::VerifiedIdentity;
use crate::utils::timeout::with_timeout_error;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const HAS_JOINED_PATH: &str = "/session/minecraft/hasJoined";

/// Confirms that a client really holds the account it claims.
///
/// Implementations run off the tick context; the result is posted back to it.
pub trait IdentityVerifier: Send + Sync + 'static {
    /// `Ok(None)` when the service does not confirm the session.
    fn has_joined<'a>(
        &'a self,
        username: &'a str,
        server_hash: &'a str,
    ) -> BoxFuture<'a, Result<Option<VerifiedIdentity>>>;
}

/// HTTPS client for the `hasJoined` endpoint.
#[derive(Debug, Clone)]
pub struct SessionService {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SessionService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(config.session_server.clone(), config.request_timeout)
    }

    pub fn endpoint(&self) -> String {
        format!("{}{HAS_JOINED_PATH}", self.base_url)
    }

    #[instrument(skip(self, server_hash), fields(endpoint = %self.base_url))]
    async fn lookup(&self, username: &str, server_hash: &str) -> Result<Option<VerifiedIdentity>> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[("username", username), ("serverId", server_hash)])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Identity service request failed");
                ProtocolError::AuthenticationFailure(format!(
                    "{}: {e}",
                    constants::ERR_SESSION_UNREACHABLE
                ))
            })?;

        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "Identity service did not confirm session");
            return Ok(None);
        }

        let identity = response.json::<VerifiedIdentity>().await.map_err(|e| {
            ProtocolError::AuthenticationFailure(format!("Invalid identity service response: {e}"))
        })?;
        debug!(uuid = %identity.id, name = %identity.name, "Identity confirmed");
        Ok(Some(identity))
    }
}

impl IdentityVerifier for SessionService {
    fn has_joined<'a>(
        &'a self,
        username: &'a str,
        server_hash: &'a str,
    ) -> BoxFuture<'a, Result<Option<VerifiedIdentity>>> {
        Box::pin(with_timeout_error(
            self.lookup(username, server_hash),
            self.timeout,
        ))
    }
}
