//! GitHub App installation-token broker.
//!
//! Exchanges a long-lived RS256 signing key plus app and installation ids for
//! short-lived installation tokens (nominal TTL one hour), caching the
//! current token and refreshing transparently. The refresh mutex is held for
//! the full exchange, so concurrent callers await a single in-flight refresh
//! instead of issuing their own.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Refresh when the cached token is within this margin of its expiry, so
/// clock skew up to the margin never yields an expired credential.
const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

/// App JWTs are capped at 10 minutes by GitHub; stay inside it and backdate
/// the issue time to absorb skew.
const JWT_BACKDATE_SECS: i64 = 60;
const JWT_TTL_SECS: i64 = 9 * 60;

/// Source of bearer tokens for upstream git operations.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> RegistryResult<String>;
}

pub struct AppAuth {
    app_id: u64,
    installation_id: u64,
    key: EncodingKey,
    api_base: String,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for AppAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAuth")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AppAuth {
    pub fn new(app_id: u64, installation_id: u64, private_key_pem: &[u8]) -> RegistryResult<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|err| RegistryError::Auth(format!("invalid app private key: {err}")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("mcp-registry")
            .build()
            .map_err(|err| RegistryError::Auth(format!("failed to build http client: {err}")))?;

        Ok(Self {
            app_id,
            installation_id,
            key,
            api_base: DEFAULT_API_BASE.to_string(),
            client,
            cached: Mutex::new(None),
        })
    }

    /// Point the exchange at a different API base. Used by tests.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn refresh(&self) -> RegistryResult<CachedToken> {
        let jwt = self.app_jwt(Utc::now())?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, self.installation_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(jwt)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|err| RegistryError::Auth(format!("token exchange failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Auth(format!(
                "token exchange returned {status}"
            )));
        }

        let body: InstallationToken = response
            .json()
            .await
            .map_err(|err| RegistryError::Auth(format!("malformed token response: {err}")))?;

        info!(expires_at = %body.expires_at, "installation token refreshed");
        Ok(CachedToken {
            token: body.token,
            expires_at: body.expires_at,
        })
    }

    fn app_jwt(&self, now: DateTime<Utc>) -> RegistryResult<String> {
        let claims = AppClaims {
            iat: now.timestamp() - JWT_BACKDATE_SECS,
            exp: now.timestamp() + JWT_TTL_SECS,
            iss: self.app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|err| RegistryError::Auth(format!("failed to sign app jwt: {err}")))
    }
}

#[async_trait]
impl TokenProvider for AppAuth {
    async fn token(&self) -> RegistryResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(current) = cached.as_ref() {
            if !needs_refresh(current.expires_at, Utc::now()) {
                debug!("using cached installation token");
                return Ok(current.token.clone());
            }
        }

        let fresh = self.refresh().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

/// "Nearly expired" counts as expired.
fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (expires_at - now).num_seconds() < TOKEN_SAFETY_MARGIN_SECS
}
