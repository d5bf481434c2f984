//! Resolves which app, installation and token back a call.
//!
//! Each purpose maps to exactly one app, optionally overridden per
//! organization. Apps are keyed by id, so purposes that share an app share
//! its token cache.

use crate::config::Config;
use crate::error::{PortalError, Result};
use crate::github::app_tokens::{GitHubAppTokens, InstallationToken};
use crate::github::application::GitHubApplication;
use crate::github::collections::{scope_for_app, Credential};
use crate::github::purpose::{AppAuthenticationType, AppPurpose, PurposeRegistry};
use crate::settings::OrganizationSettingsStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct GitHubTokenManager {
    applications: HashMap<u64, GitHubApplication>,
    purposes: HashMap<AppPurpose, u64>,
    registry: PurposeRegistry,
    settings: OrganizationSettingsStore,
    webhook_secrets: HashMap<u64, String>,
    discovered: Mutex<HashMap<(u64, String), u64>>,
}

impl GitHubTokenManager {
    pub fn from_config(
        config: &Config,
        settings: OrganizationSettingsStore,
        http: reqwest::Client,
    ) -> Result<Self> {
        let registry = config.purpose_registry()?;
        let purposes = config.purpose_map(&registry)?;

        let mut applications = HashMap::new();
        let mut webhook_secrets = HashMap::new();
        for app in &config.apps {
            let tokens = Arc::new(GitHubAppTokens::from_config(app, http.clone())?);
            let mut served: Vec<AppPurpose> = purposes
                .iter()
                .filter(|(_, id)| **id == app.app_id)
                .map(|(purpose, _)| purpose.clone())
                .collect();
            served.sort_by(|a, b| a.id().cmp(b.id()));
            if let Some(secret) = &app.webhook_secret {
                webhook_secrets.insert(app.app_id, secret.clone());
            }
            if applications
                .insert(app.app_id, GitHubApplication::new(tokens, served))
                .is_some()
            {
                return Err(PortalError::Config(format!(
                    "app {} is configured more than once",
                    app.app_id
                )));
            }
        }

        Ok(Self {
            applications,
            purposes,
            registry,
            settings,
            webhook_secrets,
            discovered: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &PurposeRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &OrganizationSettingsStore {
        &self.settings
    }

    pub fn applications(&self) -> Vec<&GitHubApplication> {
        let mut apps: Vec<_> = self.applications.values().collect();
        apps.sort_by_key(|a| a.id());
        apps
    }

    pub fn application(&self, app_id: u64) -> Result<&GitHubApplication> {
        self.applications
            .get(&app_id)
            .ok_or(PortalError::UnknownApp(app_id))
    }

    pub fn webhook_secret(&self, app_id: u64) -> Result<&str> {
        self.application(app_id)?;
        self.webhook_secrets
            .get(&app_id)
            .map(String::as_str)
            .ok_or_else(|| PortalError::Config(format!("app {app_id} has no webhook_secret")))
    }

    /// Fails when any of `required` has no app, so gaps surface at startup.
    pub fn validate_purposes(&self, required: &[AppPurpose]) -> Result<()> {
        for purpose in required {
            if !self.purposes.contains_key(purpose) {
                return Err(PortalError::NoConfigurationForPurpose {
                    purpose: purpose.id().to_string(),
                    organization: None,
                });
            }
        }
        Ok(())
    }

    /// Everything request-time resolution will rely on: required purposes,
    /// then every organization's overrides and installations, including those
    /// loaded from the dynamic settings file.
    pub fn validate(&self, required: &[AppPurpose]) -> Result<()> {
        self.validate_purposes(required)?;
        for org in self.settings.organizations() {
            for (purpose_id, app_id) in &org.purpose_apps {
                if self.registry.resolve(purpose_id).is_err() {
                    return Err(PortalError::Config(format!(
                        "organization {} overrides unknown purpose {purpose_id}",
                        org.name
                    )));
                }
                if !self.applications.contains_key(app_id) {
                    return Err(PortalError::Config(format!(
                        "organization {} maps {purpose_id} to unconfigured app {app_id}",
                        org.name
                    )));
                }
            }
            for installation in &org.installations {
                if !self.applications.contains_key(&installation.app_id) {
                    return Err(PortalError::Config(format!(
                        "organization {} lists an installation of unconfigured app {}",
                        org.name, installation.app_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// The app backing `purpose`, honouring per-organization overrides.
    pub fn app_for_purpose(
        &self,
        purpose: &AppPurpose,
        organization: Option<&str>,
    ) -> Result<&GitHubApplication> {
        let override_id = organization
            .and_then(|org| self.settings.get(org))
            .and_then(|settings| settings.app_override(purpose.id()));

        let app_id = override_id
            .or_else(|| self.purposes.get(purpose).copied())
            .ok_or_else(|| PortalError::NoConfigurationForPurpose {
                purpose: purpose.id().to_string(),
                organization: organization.map(str::to_string),
            })?;
        self.application(app_id)
    }

    pub async fn get_installation_token(
        &self,
        purpose: &AppPurpose,
        organization: &str,
        installation_id: u64,
    ) -> Result<InstallationToken> {
        let app = self.app_for_purpose(purpose, Some(organization))?;
        debug!(
            purpose = %purpose,
            organization,
            app_id = app.id(),
            installation_id,
            "resolving installation token"
        );
        app.tokens()
            .get_installation_token(installation_id, organization)
            .await
    }

    pub async fn get_installation_authorization_header(
        &self,
        purpose: &AppPurpose,
        organization: &str,
        installation_id: u64,
    ) -> Result<String> {
        let token = self
            .get_installation_token(purpose, organization, installation_id)
            .await?;
        Ok(token.header_value().to_string())
    }

    /// Installation of `app_id` on `organization`: settings first, then the
    /// app itself. Discoveries are remembered for the life of the manager.
    pub async fn resolve_installation(&self, app_id: u64, organization: &str) -> Result<u64> {
        if let Some(id) = self
            .settings
            .get(organization)
            .and_then(|s| s.installation_for_app(app_id))
        {
            return Ok(id);
        }

        let key = (app_id, organization.to_lowercase());
        let remembered = self.discovered.lock().get(&key).copied();
        if let Some(id) = remembered {
            return Ok(id);
        }

        let app = self.application(app_id)?;
        let installation = app
            .get_installation_for_organization(organization)
            .await?
            .ok_or_else(|| PortalError::NoInstallation {
                app_id,
                organization: organization.to_string(),
            })?;
        info!(
            app_id,
            organization,
            installation_id = installation.id,
            "discovered installation"
        );
        self.discovered.lock().insert(key, installation.id);
        Ok(installation.id)
    }

    pub async fn get_organization_token(
        &self,
        organization: &str,
        purpose: &AppPurpose,
        auth_type: AppAuthenticationType,
    ) -> Result<InstallationToken> {
        let installation_id = match auth_type {
            AppAuthenticationType::ForceSpecificInstallation { installation_id } => installation_id,
            AppAuthenticationType::BestAvailable => {
                let app = self.app_for_purpose(purpose, Some(organization))?;
                self.resolve_installation(app.id(), organization).await?
            }
        };
        self.get_installation_token(purpose, organization, installation_id)
            .await
    }

    pub async fn get_organization_authorization_header(
        &self,
        organization: &str,
        purpose: &AppPurpose,
        auth_type: AppAuthenticationType,
    ) -> Result<String> {
        let token = self
            .get_organization_token(organization, purpose, auth_type)
            .await?;
        Ok(token.header_value().to_string())
    }

    pub fn authorization_for(self: &Arc<Self>, organization: &str) -> OrganizationAuthorization {
        OrganizationAuthorization {
            manager: Arc::clone(self),
            organization: organization.to_string(),
            auth_type: AppAuthenticationType::BestAvailable,
        }
    }
}

/// What a business object holds instead of a credential: given a purpose it
/// produces the right `Authorization` header for its organization.
#[derive(Clone)]
pub struct OrganizationAuthorization {
    manager: Arc<GitHubTokenManager>,
    organization: String,
    auth_type: AppAuthenticationType,
}

impl OrganizationAuthorization {
    pub fn with_installation(mut self, installation_id: u64) -> Self {
        self.auth_type = AppAuthenticationType::ForceSpecificInstallation { installation_id };
        self
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn manager(&self) -> &Arc<GitHubTokenManager> {
        &self.manager
    }

    pub async fn header(&self, purpose: &AppPurpose) -> Result<String> {
        self.manager
            .get_organization_authorization_header(&self.organization, purpose, self.auth_type)
            .await
    }

    /// Pins `purpose`. Resolving the app needs no network; the token is only
    /// minted when the credential is first used for a request.
    pub fn credential(&self, purpose: &AppPurpose) -> Result<PurposeCredential> {
        let app_id = self
            .manager
            .app_for_purpose(purpose, Some(&self.organization))?
            .id();
        Ok(PurposeCredential {
            authorization: self.clone(),
            purpose: purpose.clone(),
            app_id,
        })
    }
}

pub struct PurposeCredential {
    authorization: OrganizationAuthorization,
    purpose: AppPurpose,
    app_id: u64,
}

impl PurposeCredential {
    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub fn purpose(&self) -> &AppPurpose {
        &self.purpose
    }
}

#[async_trait]
impl Credential for PurposeCredential {
    fn cache_scope(&self) -> String {
        scope_for_app(self.app_id)
    }

    async fn authorization_header(&self) -> Result<String> {
        self.authorization.header(&self.purpose).await
    }
}
