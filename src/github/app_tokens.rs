//! Installation token issuance for one GitHub App.
//!
//! An app authenticates as itself with a short-lived RS256 JWT, then exchanges
//! that JWT for installation access tokens scoped to one organization. Tokens
//! are cached per installation until they get close to expiry.

use crate::config::AppConfiguration;
use crate::error::{PortalError, Result};
use crate::github::{github_headers, truncate_error_body};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// A token is only handed out while it has at least this much life left.
pub const TOKEN_SAFETY_MARGIN_SECONDS: i64 = 120;

/// Used when GitHub does not report an expiry.
pub const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct InstallationToken {
    pub installation_id: u64,
    pub organization_name: String,
    pub requested: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    header_value: String,
}

impl fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationToken")
            .field("installation_id", &self.installation_id)
            .field("organization_name", &self.organization_name)
            .field("requested", &self.requested)
            .field("expires", &self.expires)
            .field("header_value", &"<redacted>")
            .finish()
    }
}

impl InstallationToken {
    pub fn new(
        installation_id: u64,
        organization_name: &str,
        token: &str,
        requested: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            installation_id,
            organization_name: organization_name.to_string(),
            requested,
            expires,
            header_value: format!("token {token}"),
        }
    }

    /// Value for the `Authorization` header, `token <value>`.
    pub fn header_value(&self) -> &str {
        &self.header_value
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires > now + Duration::seconds(TOKEN_SAFETY_MARGIN_SECONDS)
    }
}

/// Drops expired tokens and returns the most recently requested live one.
fn select_live_token(
    tokens: &mut Vec<InstallationToken>,
    now: DateTime<Utc>,
) -> Option<InstallationToken> {
    tokens.retain(|t| !t.is_expired(now));
    tokens
        .iter()
        .filter(|t| t.is_live(now))
        .max_by_key(|t| t.requested)
        .cloned()
}

pub struct GitHubAppTokens {
    app_id: u64,
    slug: String,
    friendly_name: String,
    base_url: String,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    tokens: Mutex<HashMap<u64, Vec<InstallationToken>>>,
}

impl fmt::Debug for GitHubAppTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubAppTokens")
            .field("app_id", &self.app_id)
            .field("slug", &self.slug)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GitHubAppTokens {
    pub fn from_config(app: &AppConfiguration, http: reqwest::Client) -> Result<Self> {
        let pem = app.private_key_pem()?;
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| PortalError::PrivateKey {
                app_id: app.app_id,
                message: e.to_string(),
            })?;
        Ok(Self {
            app_id: app.app_id,
            slug: app.slug.clone(),
            friendly_name: app.display_name().to_string(),
            base_url: app.api_base_url().to_string(),
            encoding_key,
            http,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Signs a JWT identifying the app itself.
    ///
    /// Issued 60 seconds in the past to absorb clock drift, and kept under
    /// GitHub's ten minute ceiling.
    pub fn create_app_jwt(&self) -> Result<String> {
        let now = Utc::now();
        let claims = AppJwtClaims {
            iat: (now - Duration::seconds(60)).timestamp(),
            exp: (now + Duration::minutes(9)).timestamp(),
            iss: self.app_id.to_string(),
        };
        let token = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    pub fn cached_token(&self, installation_id: u64, now: DateTime<Utc>) -> Option<InstallationToken> {
        let mut tokens = self.tokens.lock();
        let list = tokens.get_mut(&installation_id)?;
        let live = select_live_token(list, now);
        if list.is_empty() {
            tokens.remove(&installation_id);
        }
        live
    }

    pub fn cached_token_count(&self, installation_id: u64) -> usize {
        self.tokens
            .lock()
            .get(&installation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn invalidate(&self, installation_id: u64) {
        self.tokens.lock().remove(&installation_id);
    }

    pub(crate) fn store(&self, token: InstallationToken) {
        self.tokens
            .lock()
            .entry(token.installation_id)
            .or_default()
            .push(token);
    }

    pub async fn get_installation_token(
        &self,
        installation_id: u64,
        organization_name: &str,
    ) -> Result<InstallationToken> {
        if let Some(token) = self.cached_token(installation_id, Utc::now()) {
            debug!(
                app_id = self.app_id,
                installation_id,
                expires = %token.expires,
                "reusing cached installation token"
            );
            return Ok(token);
        }

        let token = self.mint(installation_id, organization_name).await?;
        self.store(token.clone());
        Ok(token)
    }

    pub async fn get_installation_authorization_header(
        &self,
        installation_id: u64,
        organization_name: &str,
    ) -> Result<String> {
        let token = self
            .get_installation_token(installation_id, organization_name)
            .await?;
        Ok(token.header_value().to_string())
    }

    async fn mint(&self, installation_id: u64, organization_name: &str) -> Result<InstallationToken> {
        let jwt = self.create_app_jwt()?;
        let requested = Utc::now();
        let url = format!(
            "{}/app/installations/{installation_id}/access_tokens",
            self.base_url
        );

        let response = self
            .http
            .post(&url)
            .headers(github_headers())
            .bearer_auth(jwt)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = truncate_error_body(response.text().await.unwrap_or_default());
            return Err(PortalError::TokenMint {
                app_id: self.app_id,
                installation_id,
                status: status.as_u16(),
                message,
            });
        }

        let body: AccessTokenResponse = response.json().await?;
        let expires = body
            .expires_at
            .unwrap_or_else(|| requested + Duration::minutes(DEFAULT_TOKEN_LIFETIME_MINUTES));

        info!(
            app_id = self.app_id,
            installation_id,
            organization = organization_name,
            expires = %expires,
            "minted installation token"
        );

        Ok(InstallationToken::new(
            installation_id,
            organization_name,
            &body.token,
            requested,
            expires,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) const TEST_KEY: &str = include_str!("../../tests/fixtures/test-app-key.pem");

    pub(crate) fn test_app(app_id: u64, base_url: &str, purposes: &[&str]) -> AppConfiguration {
        AppConfiguration {
            app_id,
            slug: format!("portal-app-{app_id}"),
            friendly_name: None,
            private_key: Some(TEST_KEY.to_string()),
            private_key_file: None,
            webhook_secret: Some("webhook-secret".to_string()),
            base_url: Some(base_url.to_string()),
            purposes: purposes.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn token_at(requested_offset_secs: i64, expires_offset_secs: i64) -> InstallationToken {
        let now = Utc::now();
        InstallationToken::new(
            42,
            "contoso",
            &format!("t{requested_offset_secs}"),
            now + Duration::seconds(requested_offset_secs),
            now + Duration::seconds(expires_offset_secs),
        )
    }

    #[test]
    fn header_value_uses_token_scheme() {
        let token = token_at(0, 3600);
        assert_eq!(token.header_value(), "token t0");
        assert!(!format!("{token:?}").contains("t0\""));
    }

    #[test]
    fn live_requires_safety_margin() {
        let now = Utc::now();
        let inside_margin = token_at(-3000, 100);
        let outside_margin = token_at(-3000, 200);
        assert!(!inside_margin.is_live(now));
        assert!(!inside_margin.is_expired(now));
        assert!(outside_margin.is_live(now));
    }

    #[test]
    fn select_purges_expired_and_prefers_newest() {
        let now = Utc::now();
        let mut tokens = vec![
            token_at(-4000, -10),
            token_at(-1200, 2400),
            token_at(-60, 3540),
            token_at(-3500, 60),
        ];
        let chosen = select_live_token(&mut tokens, now).unwrap();
        assert_eq!(chosen.header_value(), "token t-60");
        // the expired token is gone, the one inside the margin is kept
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn select_returns_none_when_only_near_expiry() {
        let now = Utc::now();
        let mut tokens = vec![token_at(-3500, 90)];
        assert!(select_live_token(&mut tokens, now).is_none());
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn invalid_private_key_is_rejected() {
        let mut app = test_app(1, "http://localhost", &[]);
        app.private_key = Some("not-a-valid-key".to_string());
        let err = GitHubAppTokens::from_config(&app, reqwest::Client::new()).unwrap_err();
        assert!(matches!(err, PortalError::PrivateKey { app_id: 1, .. }));
    }

    #[test]
    fn app_jwt_has_three_segments() {
        let tokens =
            GitHubAppTokens::from_config(&test_app(7, "http://localhost", &[]), reqwest::Client::new())
                .unwrap();
        let jwt = tokens.create_app_jwt().unwrap();
        assert_eq!(jwt.split('.').count(), 3);
    }

    #[tokio::test]
    async fn mints_once_and_reuses_live_token() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let expires = (Utc::now() + Duration::minutes(60)).to_rfc3339();
        Mock::given(method("POST"))
            .and(path("/app/installations/42/access_tokens"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "token": "ghs_first",
                "expires_at": expires,
                "permissions": {"metadata": "read"},
                "repository_selection": "all"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens =
            GitHubAppTokens::from_config(&test_app(7, &server.uri(), &[]), reqwest::Client::new())?;
        let first = tokens.get_installation_authorization_header(42, "contoso").await?;
        let second = tokens.get_installation_authorization_header(42, "contoso").await?;

        assert_eq!(first, "token ghs_first");
        assert_eq!(first, second);
        assert_eq!(tokens.cached_token_count(42), 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_expiry_defaults_to_one_hour() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/9/access_tokens"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"token": "ghs_x"})),
            )
            .mount(&server)
            .await;

        let tokens =
            GitHubAppTokens::from_config(&test_app(7, &server.uri(), &[]), reqwest::Client::new())?;
        let token = tokens.get_installation_token(9, "fabrikam").await?;
        let lifetime = token.expires - token.requested;
        assert_eq!(lifetime, Duration::minutes(DEFAULT_TOKEN_LIFETIME_MINUTES));
        assert_eq!(token.organization_name, "fabrikam");
        Ok(())
    }

    #[tokio::test]
    async fn near_expiry_token_triggers_new_mint() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/42/access_tokens"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"token": "ghs_fresh"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens =
            GitHubAppTokens::from_config(&test_app(7, &server.uri(), &[]), reqwest::Client::new())?;
        tokens.store(token_at(-3500, 60));

        let header = tokens.get_installation_authorization_header(42, "contoso").await?;
        assert_eq!(header, "token ghs_fresh");
        // the old token overlaps until it expires
        assert_eq!(tokens.cached_token_count(42), 2);
        Ok(())
    }

    #[tokio::test]
    async fn mint_failure_propagates_and_caches_nothing() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/42/access_tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "message": "A JSON web token could not be decoded"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let tokens =
            GitHubAppTokens::from_config(&test_app(7, &server.uri(), &[]), reqwest::Client::new())?;
        for _ in 0..2 {
            let err = tokens
                .get_installation_token(42, "contoso")
                .await
                .unwrap_err();
            match err {
                PortalError::TokenMint {
                    app_id,
                    installation_id,
                    status,
                    message,
                } => {
                    assert_eq!(app_id, 7);
                    assert_eq!(installation_id, 42);
                    assert_eq!(status, 401);
                    assert!(message.contains("could not be decoded"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(tokens.cached_token_count(42), 0);
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_forces_new_mint() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/42/access_tokens"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"token": "ghs_y"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let tokens =
            GitHubAppTokens::from_config(&test_app(7, &server.uri(), &[]), reqwest::Client::new())?;
        tokens.get_installation_token(42, "contoso").await?;
        tokens.invalidate(42);
        assert_eq!(tokens.cached_token_count(42), 0);
        tokens.get_installation_token(42, "contoso").await?;
        Ok(())
    }
}
