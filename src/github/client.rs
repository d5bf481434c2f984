use crate::config::{Config, DEFAULT_API_BASE_URL};
use crate::entities::Organization;
use crate::error::{PortalError, Result};
use crate::github::cache::{CacheProvider, FileCache, TieredCache};
use crate::github::collections::RestCollections;
use crate::github::models::RateLimit;
use crate::github::purpose::AppPurpose;
use crate::github::token_manager::GitHubTokenManager;
use crate::settings::OrganizationSettingsStore;
use chrono::Duration;
use octocrab::Octocrab;
use std::sync::Arc;

/// Entry point for everything that talks to GitHub on behalf of the portal.
pub struct GithubClient {
    manager: Arc<GitHubTokenManager>,
    collections: Arc<RestCollections>,
    base_url: String,
    max_age: Duration,
    verbose: bool,
}

impl GithubClient {
    pub fn from_config(config: &Config, verbose: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::github::USER_AGENT_VALUE)
            .build()?;
        let settings = OrganizationSettingsStore::load(
            &config.organizations,
            config.dynamic_settings_file.as_deref(),
        )?;
        let manager = Arc::new(GitHubTokenManager::from_config(config, settings, http.clone())?);

        let shared = config
            .cache
            .shared_directory()
            .map(|dir| Arc::new(FileCache::new(dir)) as Arc<dyn CacheProvider>);
        let cache = Arc::new(TieredCache::new(shared));

        // Every configured app talks to the same GitHub instance.
        let base_url = config
            .apps
            .first()
            .map(|a| a.api_base_url().to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if let Some(other) = config.apps.iter().find(|a| a.api_base_url() != base_url) {
            return Err(PortalError::Config(format!(
                "app {} uses {} but other apps use {base_url}",
                other.app_id,
                other.api_base_url()
            )));
        }

        let collections = Arc::new(RestCollections::new(
            http,
            &base_url,
            cache,
            config.cache.concurrency,
        ));
        Ok(Self::new(
            manager,
            collections,
            Duration::seconds(config.cache.max_age_seconds as i64),
            verbose,
        ))
    }

    pub fn new(
        manager: Arc<GitHubTokenManager>,
        collections: Arc<RestCollections>,
        max_age: Duration,
        verbose: bool,
    ) -> Self {
        let base_url = collections.base_url().to_string();
        Self {
            manager,
            collections,
            base_url,
            max_age,
            verbose,
        }
    }

    pub fn manager(&self) -> &Arc<GitHubTokenManager> {
        &self.manager
    }

    pub fn collections(&self) -> &Arc<RestCollections> {
        &self.collections
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn organization(&self, name: &str) -> Organization {
        Organization::new(
            name,
            self.manager.authorization_for(name),
            Arc::clone(&self.collections),
            self.base_url.clone(),
            self.max_age,
        )
    }

    pub async fn get_rate_limit(&self, organization: &str, purpose: &AppPurpose) -> Result<RateLimit> {
        let credential = self
            .manager
            .authorization_for(organization)
            .credential(purpose)?;
        self.collections.get_uncached(&credential, "/rate_limit").await
    }

    pub async fn check_rate_limit_if_verbose(&self, organization: &str, purpose: &AppPurpose) {
        if !self.verbose {
            return;
        }
        match self.get_rate_limit(organization, purpose).await {
            Ok(rl) => {
                let core = &rl.resources.core;
                eprintln!(
                    "Rate limit ({purpose} in {organization}): {}/{} remaining (resets at {})",
                    core.remaining,
                    core.limit,
                    chrono::DateTime::from_timestamp(core.reset, 0)
                        .map(|dt| dt.format("%H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| core.reset.to_string())
                );
            }
            Err(e) => eprintln!("Could not check rate limit: {e}"),
        }
    }
}

/// Builds an octocrab client that sends `authorization` on every request.
pub fn octocrab_for(base_url: &str, authorization: &str) -> Result<Octocrab> {
    let token = authorization
        .strip_prefix("token ")
        .ok_or_else(|| PortalError::InvalidParameter("authorization is not a token header".into()))?;
    let octocrab = Octocrab::builder()
        .base_uri(base_url)?
        .personal_token(token.to_string())
        .build()?;
    Ok(octocrab)
}
